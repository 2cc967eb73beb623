//! Declarative element selectors.
//!
//! Source configurations describe page elements as `"prefix: value"`
//! strings (e.g. `"css: article.teaser a"`). These are resolved once at
//! configuration load into [`Locator`] values; lookups never re-parse
//! the raw string. An unrecognized prefix, a missing colon, or an empty
//! value all mean "no selector" — absence is data, not an error.

use serde::{Deserialize, Serialize};

/// The closed set of locator strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LocatorKind {
    Id,
    Name,
    Xpath,
    Tag,
    Class,
    Css,
}

impl LocatorKind {
    /// Map a lower-cased selector prefix to a locator kind.
    ///
    /// `tag_name`, `class_name` and `css_selector` are accepted as
    /// aliases for `tag`, `class` and `css`.
    fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "id" => Some(Self::Id),
            "name" => Some(Self::Name),
            "xpath" => Some(Self::Xpath),
            "tag" | "tag_name" => Some(Self::Tag),
            "class" | "class_name" => Some(Self::Class),
            "css" | "css_selector" => Some(Self::Css),
            _ => None,
        }
    }
}

/// A resolved element locator: strategy plus value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locator {
    pub kind: LocatorKind,
    pub value: String,
}

impl Locator {
    /// Parse a raw `"prefix: value"` string.
    ///
    /// Returns `None` when the string lacks a colon, the value is empty,
    /// or the prefix is unrecognized.
    pub fn parse(raw: &str) -> Option<Self> {
        let (prefix, value) = raw.split_once(':')?;
        let prefix = prefix.trim().to_lowercase();
        let value = value.trim();
        if value.is_empty() {
            return None;
        }
        let kind = LocatorKind::from_prefix(&prefix)?;
        Some(Self {
            kind,
            value: value.to_string(),
        })
    }

    /// Render this locator as a CSS selector where the strategy allows it.
    ///
    /// XPath locators have no CSS equivalent and return `None`; browser
    /// backends handle them through their own XPath machinery.
    pub fn as_css(&self) -> Option<String> {
        let escaped = self.value.replace('\\', "\\\\").replace('"', "\\\"");
        match self.kind {
            LocatorKind::Id => Some(format!("[id=\"{escaped}\"]")),
            LocatorKind::Name => Some(format!("[name=\"{escaped}\"]")),
            LocatorKind::Tag => Some(self.value.clone()),
            LocatorKind::Class => Some(format!("[class~=\"{escaped}\"]")),
            LocatorKind::Css => Some(self.value.clone()),
            LocatorKind::Xpath => None,
        }
    }
}

/// The named selector roles a source configuration may carry.
///
/// Every role is optional. Roles whose raw string fails to parse are
/// treated as absent, matching the "no selector" rule above.
#[derive(Debug, Clone, Default)]
pub struct SelectorSet {
    pub popup_close: Option<Locator>,
    pub next_page: Option<Locator>,
    pub load_more: Option<Locator>,
    pub single_article_link: Option<Locator>,
    pub title: Option<Locator>,
    pub article_description: Option<Locator>,
    pub article_full_text: Option<Locator>,
    pub published: Option<Locator>,
    pub author: Option<Locator>,
    pub attachment: Option<Locator>,
    pub additional_id: Option<Locator>,
}

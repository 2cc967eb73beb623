//! Canonical article records and the text policies that shape them.
//!
//! A record's identity hash is a pure function of (author, title, review)
//! so that byte-identical extractions hash identically across runs —
//! downstream deduplication depends on this exact formula. The feed
//! ingestion path uses a different formula (author, title, link) and is
//! out of scope here; the two must never be merged.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::OnceLock;
use uuid::Uuid;

/// Maximum title length in characters.
pub const TITLE_MAX: usize = 200;

/// Maximum review/summary length in characters.
pub const REVIEW_MAX: usize = 500;

/// Timestamp format used for the published field.
pub const PUBLISHED_FORMAT: &str = "%d.%m.%Y - %H:%M";

/// A named extension attribute attached to a record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecordAttribute {
    pub key: String,
    pub value: String,
    /// MIME type of the binary payload, empty when there is none.
    pub binary_mime_type: String,
    /// Base64 binary payload, empty when there is none.
    pub binary_value: String,
}

impl RecordAttribute {
    pub fn new(key: &str, value: &str) -> Self {
        Self {
            key: key.to_string(),
            value: value.to_string(),
            binary_mime_type: String::new(),
            binary_value: String::new(),
        }
    }
}

/// One extracted article, ready for the publish sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticleRecord {
    /// Opaque record identity.
    pub id: Uuid,
    /// Deduplication hash over (author, title, review).
    pub hash: String,
    pub title: String,
    pub review: String,
    /// The configured source locator the record came from.
    pub source: String,
    /// URL of the page the fields were extracted from.
    pub link: String,
    /// Best-effort parsed publication time, `%d.%m.%Y - %H:%M`.
    pub published: String,
    pub author: String,
    /// When the extraction happened.
    pub collected: DateTime<Local>,
    /// Full body text, possibly word-limited.
    pub content: String,
    /// Identifier of the configured source.
    pub source_id: String,
    pub attributes: Vec<RecordAttribute>,
}

impl ArticleRecord {
    /// An empty record for `source_id`, collected now.
    pub fn new(source_id: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            hash: String::new(),
            title: String::new(),
            review: String::new(),
            source: String::new(),
            link: String::new(),
            published: String::new(),
            author: String::new(),
            collected: Local::now(),
            content: String::new(),
            source_id: source_id.to_string(),
            attributes: Vec::new(),
        }
    }

    /// Log the assembled fields at debug level, mirroring what operators
    /// see from the other ingestion paths.
    pub fn log_debug(&self) {
        tracing::debug!(
            id = %self.id,
            hash = %self.hash,
            title = %self.title,
            link = %self.link,
            published = %self.published,
            author = %self.author,
            "assembled article record"
        );
    }
}

/// SHA-256 identity hash over the concatenation of author, title and review.
pub fn content_hash(author: &str, title: &str, review: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(author.as_bytes());
    hasher.update(title.as_bytes());
    hasher.update(review.as_bytes());
    hex::encode(hasher.finalize())
}

/// Truncate `text` to at most `limit` characters, cutting at the nearest
/// preceding word boundary. A word straddling the limit is dropped
/// whole, so the result can be empty when the first word alone exceeds
/// the limit; the result never exceeds the limit and never contains a
/// partial word.
pub fn smart_truncate(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    // one extra char so a word ending exactly at the limit is kept
    let prefix: String = text.chars().take(limit + 1).collect();
    match prefix.rfind(char::is_whitespace) {
        Some(cut) => prefix[..cut].trim_end().to_string(),
        None => String::new(),
    }
}

/// Keep at most the first `limit` whitespace-delimited tokens.
/// A limit of 0 means unbounded.
pub fn limit_words(text: &str, limit: usize) -> String {
    if limit == 0 {
        return text.to_string();
    }
    text.split_whitespace()
        .take(limit)
        .collect::<Vec<_>>()
        .join(" ")
}

fn date_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            // ISO date, optionally with a time
            r"\d{4}-\d{2}-\d{2}(?:[T ]\d{2}:\d{2}(?::\d{2})?)?",
            // day.month.year / day/month/year, optionally with a time
            r"\d{1,2}[./]\d{1,2}[./]\d{4}(?: \d{2}:\d{2})?",
            // "January 2, 2026" / "Jan 2 2026"
            r"(?i)[a-z]{3,9}\.? \d{1,2},? \d{4}",
            // "2 January 2026"
            r"(?i)\d{1,2}\.? [a-z]{3,9}\.? \d{4}",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("static date pattern"))
        .collect()
    })
}

fn try_formats(text: &str) -> Option<NaiveDateTime> {
    const DATETIME_FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
        "%d.%m.%Y %H:%M",
        "%d/%m/%Y %H:%M",
    ];
    const DATE_FORMATS: &[&str] = &[
        "%Y-%m-%d",
        "%d.%m.%Y",
        "%d/%m/%Y",
        "%B %d, %Y",
        "%B %d %Y",
        "%b %d, %Y",
        "%b %d %Y",
        "%b. %d, %Y",
        "%d %B %Y",
        "%d %b %Y",
        "%d. %B %Y",
        "%d. %b %Y",
    ];
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, fmt) {
            return Some(dt);
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(text, fmt) {
            return d.and_hms_opt(0, 0, 0);
        }
    }
    None
}

/// Best-effort fuzzy parse of a publication timestamp.
///
/// Tries the whole trimmed string against a fixed set of formats plus
/// RFC 3339/2822, then scans for date-looking substrings and retries on
/// those. Returns `None` when nothing in the text parses — callers fall
/// back to the current time.
pub fn parse_published(text: &str) -> Option<DateTime<Local>> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Local));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(trimmed) {
        return Some(dt.with_timezone(&Local));
    }
    if let Some(dt) = try_formats(trimmed) {
        return Local.from_local_datetime(&dt).single();
    }

    // fuzzy: pull candidate substrings out of surrounding prose
    for pattern in date_patterns() {
        for m in pattern.find_iter(trimmed) {
            if let Some(dt) = try_formats(m.as_str().trim()) {
                return Local.from_local_datetime(&dt).single();
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_content_hash_is_stable() {
        let a = content_hash("alice", "Title", "Review text");
        let b = content_hash("alice", "Title", "Review text");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_content_hash_changes_with_any_input() {
        let base = content_hash("alice", "Title", "Review");
        assert_ne!(base, content_hash("bob", "Title", "Review"));
        assert_ne!(base, content_hash("alice", "Other", "Review"));
        assert_ne!(base, content_hash("alice", "Title", "Other"));
    }

    #[test]
    fn test_record_round_trips_as_json() {
        let mut record = ArticleRecord::new("src-1");
        record.title = "Title".to_string();
        record.hash = content_hash("", "Title", "");
        record.attributes.push(RecordAttribute::new("Additional_ID", "story-1"));

        let json = serde_json::to_string(&record).unwrap();
        let back: ArticleRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, record.id);
        assert_eq!(back.hash, record.hash);
        assert_eq!(back.attributes, record.attributes);
    }

    #[test]
    fn test_smart_truncate_short_text_unchanged() {
        assert_eq!(smart_truncate("short title", 200), "short title");
    }

    #[test]
    fn test_smart_truncate_cuts_at_word_boundary() {
        let text = "alpha beta gamma delta";
        let cut = smart_truncate(text, 14); // mid-"gamma"
        assert_eq!(cut, "alpha beta");
        assert!(cut.chars().count() <= 14);
    }

    #[test]
    fn test_smart_truncate_never_exceeds_limit() {
        let word = "word ".repeat(100);
        for limit in [1, 7, 50, 199, 200] {
            let cut = smart_truncate(&word, limit);
            assert!(cut.chars().count() <= limit, "limit {limit}: {cut:?}");
            // no partial words, even when the limit is inside the first one
            for token in cut.split_whitespace() {
                assert_eq!(token, "word");
            }
        }
        assert_eq!(smart_truncate(&word, 1), "");
        assert_eq!(smart_truncate(&word, 4), "word");
    }

    #[test]
    fn test_smart_truncate_word_ending_at_limit_is_kept() {
        assert_eq!(smart_truncate("alpha beta gamma", 10), "alpha beta");
    }

    #[test]
    fn test_smart_truncate_unbroken_word_dropped() {
        // a single word longer than the limit leaves nothing to keep
        let long = "x".repeat(300);
        assert_eq!(smart_truncate(&long, 200), "");
    }

    #[test]
    fn test_limit_words() {
        assert_eq!(limit_words("one  two\tthree four", 3), "one two three");
        assert_eq!(limit_words("one two", 0), "one two");
        assert_eq!(limit_words("one two", 10), "one two");
    }

    #[test]
    fn test_parse_published_iso() {
        let dt = parse_published("2026-03-14 09:26:53").unwrap();
        assert_eq!(dt.year(), 2026);
        assert_eq!(dt.month(), 3);
        assert_eq!(dt.hour(), 9);
    }

    #[test]
    fn test_parse_published_rfc3339() {
        assert!(parse_published("2026-03-14T09:26:53+01:00").is_some());
    }

    #[test]
    fn test_parse_published_month_name() {
        let dt = parse_published("March 14, 2026").unwrap();
        assert_eq!(dt.day(), 14);
        assert_eq!(dt.month(), 3);
    }

    #[test]
    fn test_parse_published_fuzzy_prose() {
        let dt = parse_published("Published on 14.03.2026 by the editors").unwrap();
        assert_eq!(dt.day(), 14);
        assert_eq!(dt.year(), 2026);
    }

    #[test]
    fn test_parse_published_garbage() {
        assert!(parse_published("").is_none());
        assert!(parse_published("no date here").is_none());
    }
}

//! Per-source crawl configuration.
//!
//! A raw [`SourceParams`] (deserialized from JSON or built by a caller)
//! is resolved once into an immutable [`CrawlConfig`]: the target string
//! becomes a URI or local-directory target, credentials are embedded into
//! the URI, limits are normalized, and every selector string is parsed
//! into a [`Locator`] up front. Lookups downstream never see raw selector
//! strings.

use crate::error::CrawlError;
use crate::selector::{Locator, SelectorSet};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

/// Raw per-source parameters as configured by an operator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceParams {
    /// Identifier of the source, copied onto every record.
    #[serde(default)]
    pub id: String,
    /// URI or local-directory path to crawl.
    #[serde(default)]
    pub target: String,
    #[serde(default)]
    pub auth_username: String,
    #[serde(default)]
    pub auth_password: String,
    #[serde(default)]
    pub user_agent: String,
    /// Route the browser through a local Tor SOCKS proxy.
    #[serde(default)]
    pub tor: bool,
    /// `host:port` or `scheme://host:port`.
    #[serde(default)]
    pub proxy_server: String,
    /// Maximum number of pages to visit (≥ 1; 1 = no paging).
    #[serde(default = "default_pagination_limit")]
    pub pagination_limit: u32,
    /// Maximum number of article links to process per title page (0 = unbounded).
    #[serde(default)]
    pub links_limit: u32,
    /// Word cap for article body and review text (0 = unbounded).
    #[serde(default)]
    pub word_limit: usize,
    /// Browser backend: `chromium` (default) or `remote`.
    #[serde(default)]
    pub driver: String,
    /// CDP endpoint for the `remote` driver.
    #[serde(default)]
    pub cdp_url: String,
    /// Directory with client certificates to offer to the target.
    #[serde(default)]
    pub client_cert_dir: String,
    #[serde(default)]
    pub selectors: SelectorParams,
}

fn default_pagination_limit() -> u32 {
    1
}

/// Raw selector strings for the eleven named roles, `"prefix: value"` each.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SelectorParams {
    #[serde(default)]
    pub popup_close: String,
    #[serde(default)]
    pub next_page: String,
    #[serde(default)]
    pub load_more: String,
    #[serde(default)]
    pub single_article_link: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub article_description: String,
    #[serde(default)]
    pub article_full_text: String,
    #[serde(default)]
    pub published: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub attachment: String,
    #[serde(default)]
    pub additional_id: String,
}

/// What the target string resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// A single title page.
    Uri(Url),
    /// A directory whose `.html` files are each crawled as a title page.
    Directory(PathBuf),
}

/// Which browser backend to drive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverKind {
    /// Launch a local headless Chromium process.
    Chromium,
    /// Attach to an already-running browser over CDP.
    Remote { cdp_url: String },
}

/// Immutable, resolved per-crawl configuration.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    pub source_id: String,
    pub target: Target,
    pub user_agent: Option<String>,
    pub tor: bool,
    /// Explicit proxy; ignored when `tor` is set.
    pub proxy: Option<Url>,
    pub driver: DriverKind,
    pub client_cert_dir: Option<PathBuf>,
    pub pagination_limit: u32,
    pub links_limit: u32,
    pub word_limit: usize,
    pub selectors: SelectorSet,
}

impl CrawlConfig {
    /// Resolve raw parameters into a crawl configuration.
    pub fn resolve(params: &SourceParams) -> Result<Self, CrawlError> {
        let mut target = resolve_target(&params.target)?;

        if let Target::Uri(url) = &mut target {
            embed_basic_auth(url, &params.auth_username, &params.auth_password);
        }

        let proxy = if params.proxy_server.trim().is_empty() {
            None
        } else {
            Some(parse_proxy(&params.proxy_server)?)
        };

        let driver = match params.driver.trim().to_lowercase().as_str() {
            "" | "chromium" | "chrome" => DriverKind::Chromium,
            "remote" => {
                if params.cdp_url.trim().is_empty() {
                    return Err(CrawlError::Configuration(
                        "driver 'remote' requires cdp_url".to_string(),
                    ));
                }
                DriverKind::Remote {
                    cdp_url: params.cdp_url.trim().to_string(),
                }
            }
            other => {
                return Err(CrawlError::Configuration(format!(
                    "unknown driver kind: {other}"
                )))
            }
        };

        Ok(Self {
            source_id: params.id.clone(),
            target,
            user_agent: non_empty(&params.user_agent),
            tor: params.tor,
            proxy,
            driver,
            client_cert_dir: non_empty(&params.client_cert_dir).map(PathBuf::from),
            pagination_limit: params.pagination_limit.max(1),
            links_limit: params.links_limit,
            word_limit: params.word_limit,
            selectors: resolve_selectors(&params.selectors),
        })
    }

    /// The configured source locator as a string, copied onto records.
    pub fn source_url(&self) -> String {
        match &self.target {
            Target::Uri(url) => url.to_string(),
            Target::Directory(dir) => dir.display().to_string(),
        }
    }
}

fn non_empty(s: &str) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn resolve_selectors(params: &SelectorParams) -> SelectorSet {
    SelectorSet {
        popup_close: Locator::parse(&params.popup_close),
        next_page: Locator::parse(&params.next_page),
        load_more: Locator::parse(&params.load_more),
        single_article_link: Locator::parse(&params.single_article_link),
        title: Locator::parse(&params.title),
        article_description: Locator::parse(&params.article_description),
        article_full_text: Locator::parse(&params.article_full_text),
        published: Locator::parse(&params.published),
        author: Locator::parse(&params.author),
        attachment: Locator::parse(&params.attachment),
        additional_id: Locator::parse(&params.additional_id),
    }
}

/// Resolve the raw target string.
///
/// Interpretation rules, in order: an explicit `file://` prefix is split
/// into file vs directory; any other `scheme://` string is a URI; a path
/// naming an existing file becomes a `file://` URI; a path naming an
/// existing directory enters directory mode; anything else is promoted to
/// `https://`.
fn resolve_target(raw: &str) -> Result<Target, CrawlError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(CrawlError::Configuration(
            "target is not set, skipping collection".to_string(),
        ));
    }

    let lower = raw.to_lowercase();
    if let Some(path_part) = lower.strip_prefix("file://") {
        // keep the original casing of the path
        let path = &raw[raw.len() - path_part.len()..];
        if Path::new(path).is_file() {
            return file_uri(path).map(Target::Uri);
        }
        if Path::new(path).is_dir() {
            return Ok(Target::Directory(PathBuf::from(path)));
        }
        return Err(CrawlError::Configuration(format!("missing file {raw}")));
    }

    if scheme_prefixed(&lower) {
        let url = Url::parse(raw)
            .map_err(|e| CrawlError::Configuration(format!("invalid target {raw}: {e}")))?;
        return Ok(Target::Uri(url));
    }

    if Path::new(raw).is_file() {
        return file_uri(raw).map(Target::Uri);
    }
    if Path::new(raw).is_dir() {
        return Ok(Target::Directory(PathBuf::from(raw)));
    }

    let url = Url::parse(&format!("https://{raw}"))
        .map_err(|e| CrawlError::Configuration(format!("invalid target {raw}: {e}")))?;
    Ok(Target::Uri(url))
}

/// `^[a-z0-9]+://` without pulling in a regex for it.
fn scheme_prefixed(lower: &str) -> bool {
    match lower.find("://") {
        Some(pos) if pos > 0 => lower[..pos]
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit()),
        _ => false,
    }
}

fn file_uri(path: &str) -> Result<Url, CrawlError> {
    let abs = std::fs::canonicalize(path)
        .map_err(|e| CrawlError::Configuration(format!("missing file {path}: {e}")))?;
    Url::from_file_path(&abs)
        .map_err(|_| CrawlError::Configuration(format!("not a valid file path: {path}")))
}

/// Embed basic-auth credentials into the URI when both are present.
fn embed_basic_auth(url: &mut Url, username: &str, password: &str) {
    if username.is_empty() || password.is_empty() {
        return;
    }
    // file:// and other non-authority URLs cannot carry credentials
    let _ = url.set_username(username);
    let _ = url.set_password(Some(password));
}

/// Parse a proxy specification; a bare `host:port` defaults to `http://`.
fn parse_proxy(raw: &str) -> Result<Url, CrawlError> {
    let raw = raw.trim();
    let candidate = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("http://{raw}")
    };
    Url::parse(&candidate)
        .map_err(|e| CrawlError::Configuration(format!("invalid proxy_server {raw}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn params(target: &str) -> SourceParams {
        SourceParams {
            target: target.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_schemeless_target_promoted_to_https() {
        let cfg = CrawlConfig::resolve(&params("news.example.com/latest")).unwrap();
        match cfg.target {
            Target::Uri(url) => assert_eq!(url.as_str(), "https://news.example.com/latest"),
            other => panic!("unexpected target {other:?}"),
        }
    }

    #[test]
    fn test_http_target_kept() {
        let cfg = CrawlConfig::resolve(&params("http://example.com/x")).unwrap();
        assert!(matches!(cfg.target, Target::Uri(_)));
    }

    #[test]
    fn test_empty_target_is_configuration_error() {
        assert!(matches!(
            CrawlConfig::resolve(&params("")),
            Err(CrawlError::Configuration(_))
        ));
    }

    #[test]
    fn test_existing_file_becomes_file_uri() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("index.html");
        writeln!(std::fs::File::create(&file).unwrap(), "<html></html>").unwrap();

        let cfg = CrawlConfig::resolve(&params(file.to_str().unwrap())).unwrap();
        match cfg.target {
            Target::Uri(url) => assert_eq!(url.scheme(), "file"),
            other => panic!("unexpected target {other:?}"),
        }
    }

    #[test]
    fn test_existing_directory_enters_directory_mode() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = CrawlConfig::resolve(&params(dir.path().to_str().unwrap())).unwrap();
        assert!(matches!(cfg.target, Target::Directory(_)));
    }

    #[test]
    fn test_file_prefix_missing_path_is_error() {
        let res = CrawlConfig::resolve(&params("file:///definitely/not/here.html"));
        assert!(matches!(res, Err(CrawlError::Configuration(_))));
    }

    #[test]
    fn test_basic_auth_embedded() {
        let mut p = params("https://example.com/feed");
        p.auth_username = "user".to_string();
        p.auth_password = "secret".to_string();
        let cfg = CrawlConfig::resolve(&p).unwrap();
        match cfg.target {
            Target::Uri(url) => {
                assert_eq!(url.username(), "user");
                assert_eq!(url.password(), Some("secret"));
            }
            other => panic!("unexpected target {other:?}"),
        }
    }

    #[test]
    fn test_basic_auth_requires_both_credentials() {
        let mut p = params("https://example.com/");
        p.auth_username = "user".to_string();
        let cfg = CrawlConfig::resolve(&p).unwrap();
        match cfg.target {
            Target::Uri(url) => assert_eq!(url.username(), ""),
            other => panic!("unexpected target {other:?}"),
        }
    }

    #[test]
    fn test_pagination_limit_floor_is_one() {
        let mut p = params("https://example.com/");
        p.pagination_limit = 0;
        let cfg = CrawlConfig::resolve(&p).unwrap();
        assert_eq!(cfg.pagination_limit, 1);
    }

    #[test]
    fn test_proxy_defaults_to_http_scheme() {
        let mut p = params("https://example.com/");
        p.proxy_server = "10.0.0.1:3128".to_string();
        let cfg = CrawlConfig::resolve(&p).unwrap();
        assert_eq!(cfg.proxy.unwrap().as_str(), "http://10.0.0.1:3128/");
    }

    #[test]
    fn test_socks_proxy_scheme_kept() {
        let mut p = params("https://example.com/");
        p.proxy_server = "socks5://10.0.0.1:1080".to_string();
        let cfg = CrawlConfig::resolve(&p).unwrap();
        assert_eq!(cfg.proxy.unwrap().scheme(), "socks5");
    }

    #[test]
    fn test_remote_driver_requires_cdp_url() {
        let mut p = params("https://example.com/");
        p.driver = "remote".to_string();
        assert!(matches!(
            CrawlConfig::resolve(&p),
            Err(CrawlError::Configuration(_))
        ));
        p.cdp_url = "http://localhost:9222".to_string();
        let cfg = CrawlConfig::resolve(&p).unwrap();
        assert!(matches!(cfg.driver, DriverKind::Remote { .. }));
    }

    #[test]
    fn test_unknown_driver_rejected() {
        let mut p = params("https://example.com/");
        p.driver = "webkit".to_string();
        assert!(matches!(
            CrawlConfig::resolve(&p),
            Err(CrawlError::Configuration(_))
        ));
    }

    #[test]
    fn test_selectors_resolved_once() {
        let mut p = params("https://example.com/");
        p.selectors.title = "css: h1.headline".to_string();
        p.selectors.author = "not a selector".to_string();
        let cfg = CrawlConfig::resolve(&p).unwrap();
        assert!(cfg.selectors.title.is_some());
        // unparseable strings mean "no selector", not an error
        assert!(cfg.selectors.author.is_none());
    }

    #[test]
    fn test_params_deserialize_with_defaults() {
        let cfg: SourceParams =
            serde_json::from_str(r#"{"target": "https://example.com"}"#).unwrap();
        assert_eq!(cfg.pagination_limit, 1);
        assert_eq!(cfg.links_limit, 0);
        assert!(!cfg.tor);
    }
}

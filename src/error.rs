//! Crawl error taxonomy.
//!
//! Only two conditions abort a crawl with an `Err` before producing an
//! outcome: a broken configuration and a browser that fails to start. A
//! failed title-page load ends the crawl too, but is reported through the
//! outcome's failure count (zero records, failures ≥ 1) because the
//! session was already live and must be disposed of on that path as well.
//! Everything below that level — a missing element, a failed click, one
//! broken article — is degraded-mode data, not an error.

use thiserror::Error;

/// Fatal, per-crawl errors surfaced to the caller.
///
/// A crawl failure for one source must never prevent other sources from
/// being crawled; callers log these and move on.
#[derive(Debug, Error)]
pub enum CrawlError {
    /// Unresolvable target, unreadable directory, or otherwise broken
    /// configuration. Raised before any browser is started.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The browser process or CDP connection could not be established.
    #[error("browser session failed to start")]
    Session(#[source] anyhow::Error),

    /// The publish sink rejected the finished records.
    #[error("publishing records failed")]
    Publish(#[source] anyhow::Error),
}

/// Outcome of a best-effort element operation.
///
/// Popup dismissal, load-more expansion and next-page clicks are "never
/// fatal unless explicitly listed" policies; this type lets the
/// orchestrator consume those outcomes as values instead of routing them
/// through error control flow.
#[derive(Debug)]
pub enum Lookup<T> {
    /// The element was found (and, where applicable, acted on).
    Found(T),
    /// No element matched within the wait budget.
    NotFound,
    /// The browser reported a failure while looking or acting.
    Failed(anyhow::Error),
}

impl<T> Lookup<T> {
    pub fn found(self) -> Option<T> {
        match self {
            Lookup::Found(v) => Some(v),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CrawlError::Configuration("web url is not set".to_string());
        assert_eq!(err.to_string(), "configuration error: web url is not set");
    }

    #[test]
    fn test_lookup_found() {
        assert_eq!(Lookup::Found(7).found(), Some(7));
        assert_eq!(Lookup::<i32>::NotFound.found(), None);
        assert!(Lookup::<i32>::Failed(anyhow::anyhow!("boom")).found().is_none());
    }
}

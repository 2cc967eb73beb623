//! Per-article processing on one title page.
//!
//! Discovered link elements are processed strictly in order. An item
//! carrying an `href` is opened in a fresh tab and extracted there
//! ("tab mode"); an item without one is extracted in place ("scope
//! mode"). Each item is isolated: a failure increments the page's
//! failure count and processing moves on. The one page-level stop is a
//! tab restoration that fails even after reloading the title page.

use super::assemble;
use crate::browser::{wait_for_present, BrowserSession, ElementId, Scope, TabId};
use crate::config::CrawlConfig;
use crate::error::Lookup;
use crate::record::ArticleRecord;
use tracing::{debug, warn};
use url::Url;

/// Bound on history-back attempts in scope mode.
const BACK_ATTEMPTS: u32 = 3;

/// What one title page yielded.
#[derive(Debug, Default)]
pub struct PageOutcome {
    pub records: Vec<ArticleRecord>,
    pub failed: u32,
    /// The page loop must not advance to another page.
    pub stop: bool,
}

/// Process every article discovered on the current title page.
pub async fn process_page(
    session: &mut dyn BrowserSession,
    config: &CrawlConfig,
    title_tab: TabId,
    title_url: &str,
    page: u32,
) -> PageOutcome {
    let mut outcome = PageOutcome::default();

    let Some(link_locator) = &config.selectors.single_article_link else {
        warn!(source_id = %config.source_id, page, "no article link selector configured");
        outcome.failed += 1;
        outcome.stop = true;
        return outcome;
    };

    // bounded wait for the first link, then collect the full list
    let budget = session.waits().element;
    if let Lookup::Failed(e) = wait_for_present(session, Scope::Page, link_locator, budget).await {
        warn!(source_id = %config.source_id, page, error = %e, "article link lookup failed");
    }
    let items = match session.find_all(Scope::Page, link_locator).await {
        Ok(items) => items,
        Err(e) => {
            warn!(source_id = %config.source_id, page, error = %e, "article link lookup failed");
            Vec::new()
        }
    };
    if items.is_empty() {
        warn!(source_id = %config.source_id, page, "no articles found on title page");
        outcome.failed += 1;
        outcome.stop = true;
        return outcome;
    }
    debug!(source_id = %config.source_id, page, count = items.len(), "found article links");

    for (index, item) in (1u32..).zip(items) {
        process_item(session, config, title_tab, title_url, page, index, item, &mut outcome)
            .await;
        if outcome.stop {
            break;
        }
        if config.links_limit > 0 && index >= config.links_limit {
            debug!(source_id = %config.source_id, page, "links limit reached");
            break;
        }
    }
    outcome
}

#[allow(clippy::too_many_arguments)]
async fn process_item(
    session: &mut dyn BrowserSession,
    config: &CrawlConfig,
    title_tab: TabId,
    title_url: &str,
    page: u32,
    index: u32,
    item: ElementId,
    outcome: &mut PageOutcome,
) {
    let href = match session.attribute(item, "href").await {
        Ok(href) => href,
        Err(e) => {
            warn!(source_id = %config.source_id, page, index, error = %e, "article item lost");
            outcome.failed += 1;
            return;
        }
    };

    match href {
        Some(href) if !href.trim().is_empty() => {
            tab_mode(session, config, title_tab, title_url, page, index, &href, outcome).await
        }
        _ => scope_mode(session, config, page, index, item, outcome).await,
    }
}

/// Open the link in a new tab, extract there, then restore the title tab.
#[allow(clippy::too_many_arguments)]
async fn tab_mode(
    session: &mut dyn BrowserSession,
    config: &CrawlConfig,
    title_tab: TabId,
    title_url: &str,
    page: u32,
    index: u32,
    href: &str,
    outcome: &mut PageOutcome,
) {
    let link = resolve_link(title_url, href);
    debug!(source_id = %config.source_id, page, index, link = %link, "processing article");

    match session.open_tab(&link).await {
        Ok(_) => match assemble::extract_record(session, config, Scope::Page).await {
            Ok(record) => {
                record.log_debug();
                outcome.records.push(record);
            }
            Err(e) => {
                warn!(source_id = %config.source_id, page, index, error = %e, "extraction failed");
                outcome.failed += 1;
            }
        },
        Err(e) => {
            warn!(source_id = %config.source_id, page, index, link = %link, error = %e,
                "failed to open article");
            outcome.failed += 1;
        }
    }

    // the opening attempt may have left a tab behind even on failure
    if !restore_tabs(session, title_tab, title_url).await {
        warn!(source_id = %config.source_id, page, "could not restore title page, stopping page");
        outcome.failed += 1;
        outcome.stop = true;
    }
}

/// Extract in place on the title page, then walk history back if the
/// page navigated away under us.
async fn scope_mode(
    session: &mut dyn BrowserSession,
    config: &CrawlConfig,
    page: u32,
    index: u32,
    item: ElementId,
    outcome: &mut PageOutcome,
) {
    let url_before = match session.current_url().await {
        Ok(url) => url,
        Err(e) => {
            warn!(source_id = %config.source_id, page, index, error = %e, "title page lost");
            outcome.failed += 1;
            return;
        }
    };

    match assemble::extract_record(session, config, Scope::Element(item)).await {
        Ok(record) => {
            record.log_debug();
            outcome.records.push(record);
        }
        Err(e) => {
            warn!(source_id = %config.source_id, page, index, error = %e, "extraction failed");
            outcome.failed += 1;
        }
    }

    for _ in 0..BACK_ATTEMPTS {
        match session.current_url().await {
            Ok(url) if url == url_before => return,
            Ok(_) => {
                if let Err(e) = session.back().await {
                    warn!(source_id = %config.source_id, page, index, error = %e, "history back failed");
                    return;
                }
            }
            Err(e) => {
                warn!(source_id = %config.source_id, page, index, error = %e, "title page lost");
                return;
            }
        }
    }
    if !matches!(session.current_url().await, Ok(url) if url == url_before) {
        warn!(source_id = %config.source_id, page, index, "could not restore pre-click url");
    }
}

/// Close every tab except the title tab, one at a time, and switch back
/// to it. Falls back to reloading the title page in place; returns
/// whether the title page is usable again.
pub async fn restore_tabs(
    session: &mut dyn BrowserSession,
    title_tab: TabId,
    title_url: &str,
) -> bool {
    loop {
        let ids = match session.tab_ids().await {
            Ok(ids) => ids,
            Err(e) => {
                warn!(error = %e, "tab enumeration failed");
                return reload_title_page(session, title_url).await;
            }
        };
        let Some(extra) = ids.iter().copied().find(|t| *t != title_tab) else {
            break;
        };
        if ids.len() <= 1 {
            // the title tab itself is gone; reload in whatever is left
            return reload_title_page(session, title_url).await;
        }
        if let Err(e) = session.close_tab(extra).await {
            warn!(error = %e, "closing extra tab failed");
            return reload_title_page(session, title_url).await;
        }
    }
    if let Err(e) = session.switch_to(title_tab).await {
        warn!(error = %e, "switching to title tab failed");
        return reload_title_page(session, title_url).await;
    }
    true
}

async fn reload_title_page(session: &mut dyn BrowserSession, title_url: &str) -> bool {
    debug!(url = title_url, "falling back to reloading the title page");
    session.goto(title_url).await.is_ok()
}

/// Resolve a possibly-relative href against the title page URL.
fn resolve_link(base: &str, href: &str) -> String {
    if let Ok(url) = Url::parse(href) {
        return url.to_string();
    }
    Url::parse(base)
        .and_then(|b| b.join(href))
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_link_absolute() {
        assert_eq!(
            resolve_link("https://example.com/news/", "https://other.test/a"),
            "https://other.test/a"
        );
    }

    #[test]
    fn test_resolve_link_relative() {
        assert_eq!(
            resolve_link("https://example.com/news/", "a1.html"),
            "https://example.com/news/a1.html"
        );
        assert_eq!(
            resolve_link("https://example.com/news/", "/top/a1"),
            "https://example.com/top/a1"
        );
    }
}

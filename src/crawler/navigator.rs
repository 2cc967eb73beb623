//! Title-page preparation: popup dismissal and load-more expansion.
//!
//! Both are best-effort. A popup that will not close or a load-more
//! button that stops responding degrades the crawl, it never aborts it.

use crate::browser::{wait_for_clickable, wait_for_present, BrowserSession, Scope};
use crate::config::CrawlConfig;
use crate::error::Lookup;
use tracing::{debug, warn};

/// Dismiss a blocking popup if the source configures a close control.
pub async fn dismiss_popup(session: &mut dyn BrowserSession, config: &CrawlConfig) {
    let Some(locator) = &config.selectors.popup_close else {
        return;
    };
    let budget = session.waits().popup;
    match wait_for_present(session, Scope::Page, locator, budget).await {
        Lookup::Found(el) => {
            if let Err(e) = session.click(el).await {
                warn!(source_id = %config.source_id, error = %e, "popup close click failed");
            }
        }
        Lookup::NotFound => debug!(source_id = %config.source_id, "no popup to dismiss"),
        Lookup::Failed(e) => {
            warn!(source_id = %config.source_id, error = %e, "popup lookup failed");
        }
    }
}

/// Click the load-more control up to `pagination_limit - 1` times.
///
/// Each successful click counts as one visited page; the returned
/// counter (starting at 1 for the title page itself) feeds the same
/// pagination bound the next-page loop uses. Any failure ends the
/// expansion early without aborting the crawl.
pub async fn expand_load_more(session: &mut dyn BrowserSession, config: &CrawlConfig) -> u32 {
    let mut page = 1u32;
    let Some(locator) = &config.selectors.load_more else {
        return page;
    };
    let budget = session.waits().load_more;

    while page < config.pagination_limit {
        let el = match wait_for_clickable(session, locator, budget).await {
            Lookup::Found(el) => el,
            Lookup::NotFound => {
                debug!(source_id = %config.source_id, page, "load-more control gone");
                break;
            }
            Lookup::Failed(e) => {
                warn!(source_id = %config.source_id, page, error = %e, "load-more lookup failed");
                break;
            }
        };

        if let Err(first) = session.click(el).await {
            // retry once after scrolling the control into the viewport
            debug!(source_id = %config.source_id, error = %first, "direct load-more click failed");
            let retried = match session.scroll_into_view(el).await {
                Ok(()) => session.click(el).await,
                Err(e) => Err(e),
            };
            if let Err(e) = retried {
                warn!(source_id = %config.source_id, page, error = %e, "load-more click failed");
                break;
            }
        }
        page += 1;

        // the old control going stale signals the new content is in
        if !crate::browser::wait_for_stale(session, el, budget).await {
            debug!(source_id = %config.source_id, page, "load-more control never went stale");
        }
    }
    page
}

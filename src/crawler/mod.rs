//! Crawl orchestration.
//!
//! One [`Crawler::collect`] call crawls one configured source: acquire a
//! browser session, load the title page, dismiss popups, expand
//! load-more content, walk the article loop page by page, publish the
//! accumulated records, and release the session on every exit path.
//! Directory targets crawl each contained `.html` file as its own title
//! page within the same invocation.

pub mod article;
pub mod assemble;
pub mod navigator;

use crate::browser::{BrowserSession, Scope, SessionFactory};
use crate::config::{CrawlConfig, Target};
use crate::error::CrawlError;
use crate::publish::{AlwaysModified, FreshnessProbe, RecordSink};
use crate::record::ArticleRecord;
use std::path::Path;
use tracing::{debug, info, warn};
use url::Url;

/// What one crawl invocation produced.
#[derive(Debug, Default)]
pub struct CrawlOutcome {
    /// Records in discovery order.
    pub records: Vec<ArticleRecord>,
    /// Articles (or pages) that failed without aborting the crawl.
    pub failed: u32,
}

/// Crawls one source per [`collect`](Crawler::collect) call.
pub struct Crawler<'a> {
    factory: &'a dyn SessionFactory,
    sink: &'a dyn RecordSink,
    probe: &'a dyn FreshnessProbe,
}

impl<'a> Crawler<'a> {
    pub fn new(factory: &'a dyn SessionFactory, sink: &'a dyn RecordSink) -> Self {
        Self {
            factory,
            sink,
            probe: &AlwaysModified,
        }
    }

    /// Replace the change probe; sources it reports unmodified are
    /// skipped without starting a browser.
    pub fn with_probe(mut self, probe: &'a dyn FreshnessProbe) -> Self {
        self.probe = probe;
        self
    }

    /// Crawl one source to completion.
    ///
    /// `Err` means the crawl could not run at all (configuration,
    /// session start, publishing). Everything the crawl survived is in
    /// the outcome's failure count.
    pub async fn collect(&self, config: &CrawlConfig) -> Result<CrawlOutcome, CrawlError> {
        let source = config.source_url();
        if self.probe.unmodified(&source) {
            info!(source_id = %config.source_id, source = %source, "source unmodified, skipping");
            return Ok(CrawlOutcome::default());
        }
        info!(source_id = %config.source_id, source = %source, "starting crawl");

        let mut outcome = CrawlOutcome::default();
        match &config.target {
            Target::Uri(url) => {
                outcome = self.crawl_title_page(config, url.as_str()).await?;
            }
            Target::Directory(dir) => {
                for url in html_files(dir)? {
                    let one = self.crawl_title_page(config, url.as_str()).await?;
                    outcome.records.extend(one.records);
                    outcome.failed += one.failed;
                }
            }
        }

        if !outcome.records.is_empty() {
            self.sink
                .publish(&config.source_id, &outcome.records)
                .map_err(CrawlError::Publish)?;
        }
        info!(
            source_id = %config.source_id,
            records = outcome.records.len(),
            failed = outcome.failed,
            "crawl finished"
        );
        Ok(outcome)
    }

    /// Run one title page with a fresh session, releasing it on every path.
    async fn crawl_title_page(
        &self,
        config: &CrawlConfig,
        url: &str,
    ) -> Result<CrawlOutcome, CrawlError> {
        let mut session = self
            .factory
            .launch(config)
            .await
            .map_err(CrawlError::Session)?;
        let outcome = run_pages(session.as_mut(), config, url).await;
        if let Err(e) = session.quit().await {
            warn!(source_id = %config.source_id, error = %e, "failed to release browser session");
        }
        Ok(outcome)
    }
}

/// The per-title-page state machine, from navigation to the last page.
async fn run_pages(
    session: &mut dyn BrowserSession,
    config: &CrawlConfig,
    url: &str,
) -> CrawlOutcome {
    let mut outcome = CrawlOutcome::default();

    if let Err(e) = session.goto(url).await {
        warn!(source_id = %config.source_id, url, error = %e, "title page failed to load");
        outcome.failed += 1;
        return outcome;
    }

    navigator::dismiss_popup(session, config).await;
    let title_tab = session.current_tab();
    let mut page = navigator::expand_load_more(session, config).await;

    loop {
        let result = article::process_page(session, config, title_tab, url, page).await;
        outcome.records.extend(result.records);
        outcome.failed += result.failed;
        if result.stop || page >= config.pagination_limit {
            break;
        }
        if !next_page(session, config, page).await {
            break;
        }
        page += 1;
    }
    outcome
}

/// Click through to the next page; false means the last page is reached.
async fn next_page(session: &mut dyn BrowserSession, config: &CrawlConfig, page: u32) -> bool {
    let Some(locator) = &config.selectors.next_page else {
        return false;
    };
    let el = match session.find(Scope::Page, locator).await {
        Ok(Some(el)) => el,
        Ok(None) => {
            debug!(source_id = %config.source_id, page, "no next page link");
            return false;
        }
        Err(e) => {
            warn!(source_id = %config.source_id, page, error = %e, "next page lookup failed");
            return false;
        }
    };
    if let Err(first) = session.click(el).await {
        debug!(source_id = %config.source_id, error = %first, "direct next-page click failed");
        let retried = match session.scroll_into_view(el).await {
            Ok(()) => session.click(el).await,
            Err(e) => Err(e),
        };
        if let Err(e) = retried {
            warn!(source_id = %config.source_id, page, error = %e, "next page click failed");
            return false;
        }
    }
    true
}

/// Enumerate the `.html` files of a directory target, in name order.
fn html_files(dir: &Path) -> Result<Vec<Url>, CrawlError> {
    let entries = std::fs::read_dir(dir).map_err(|e| {
        CrawlError::Configuration(format!("unreadable directory {}: {e}", dir.display()))
    })?;
    let mut paths: Vec<_> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("html"))
        })
        .collect();
    paths.sort();
    paths
        .into_iter()
        .map(|path| {
            Url::from_file_path(&path).map_err(|_| {
                CrawlError::Configuration(format!("not a valid file path: {}", path.display()))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_html_files_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.html", "a.HTML", "notes.txt", "c.html"] {
            let mut f = std::fs::File::create(dir.path().join(name)).unwrap();
            writeln!(f, "<html></html>").unwrap();
        }
        let urls = html_files(dir.path()).unwrap();
        let names: Vec<_> = urls
            .iter()
            .map(|u| u.path_segments().unwrap().next_back().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["a.HTML", "b.html", "c.html"]);
    }

    #[test]
    fn test_html_files_missing_dir() {
        assert!(matches!(
            html_files(Path::new("/definitely/not/here")),
            Err(CrawlError::Configuration(_))
        ));
    }
}

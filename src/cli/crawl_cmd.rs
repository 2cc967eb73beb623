//! The `crawl` subcommand.

use crate::browser::chromium::ChromiumFactory;
use crate::config::{CrawlConfig, SourceParams};
use crate::crawler::Crawler;
use crate::publish::JsonLinesSink;
use anyhow::{bail, Context, Result};
use std::path::Path;
use tracing::{error, info};

/// Crawl every source in the given configuration file.
///
/// The file holds either one source object or an array of them. Sources
/// are crawled sequentially and isolated from each other: one source
/// failing never stops the rest. Records go to stdout as JSON Lines.
pub async fn run(config_path: &Path) -> Result<()> {
    let raw = std::fs::read_to_string(config_path)
        .with_context(|| format!("reading {}", config_path.display()))?;
    let sources = parse_sources(&raw)
        .with_context(|| format!("parsing {}", config_path.display()))?;
    if sources.is_empty() {
        bail!("no sources configured in {}", config_path.display());
    }

    let factory = ChromiumFactory;
    let sink = JsonLinesSink;
    let crawler = Crawler::new(&factory, &sink);

    let mut failed_sources = 0u32;
    for params in &sources {
        let config = match CrawlConfig::resolve(params) {
            Ok(config) => config,
            Err(e) => {
                error!(source_id = %params.id, error = %e, "source skipped");
                failed_sources += 1;
                continue;
            }
        };
        match crawler.collect(&config).await {
            Ok(outcome) => {
                info!(
                    source_id = %config.source_id,
                    records = outcome.records.len(),
                    failed = outcome.failed,
                    "source done"
                );
            }
            Err(e) => {
                error!(source_id = %config.source_id, error = %e, "source failed");
                failed_sources += 1;
            }
        }
    }

    if failed_sources > 0 {
        bail!("{failed_sources} of {} sources failed", sources.len());
    }
    Ok(())
}

/// Accept a single source object or an array of sources.
fn parse_sources(raw: &str) -> Result<Vec<SourceParams>> {
    let value: serde_json::Value = serde_json::from_str(raw)?;
    if value.is_array() {
        Ok(serde_json::from_value(value)?)
    } else {
        Ok(vec![serde_json::from_value(value)?])
    }
}

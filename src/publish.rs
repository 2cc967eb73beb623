//! Record publishing.
//!
//! A crawl hands its finished batch to a [`RecordSink`]; the sink owns
//! the wire format and the destination. The stock sink writes JSON
//! Lines to stdout so the binary composes with shell pipelines; tests
//! use [`MemorySink`] to assert on the records themselves.

use crate::record::ArticleRecord;
use anyhow::{Context, Result};
use std::io::Write;
use std::sync::{Arc, Mutex};
use tracing::info;

/// Destination for the records of one finished crawl.
pub trait RecordSink: Send + Sync {
    /// Publish a whole batch. Implementations should be atomic per call
    /// where their destination allows it.
    fn publish(&self, source_id: &str, records: &[ArticleRecord]) -> Result<()>;
}

/// Answers whether a source is unchanged since its last crawl.
///
/// When the probe answers true the crawl is skipped entirely. The crate
/// ships no change-tracking of its own; [`AlwaysModified`] is the
/// default and crawls every time.
pub trait FreshnessProbe: Send + Sync {
    fn unmodified(&self, source_url: &str) -> bool;
}

/// Crawls unconditionally.
pub struct AlwaysModified;

impl FreshnessProbe for AlwaysModified {
    fn unmodified(&self, _source_url: &str) -> bool {
        false
    }
}

/// Writes one JSON object per record to stdout.
pub struct JsonLinesSink;

impl RecordSink for JsonLinesSink {
    fn publish(&self, source_id: &str, records: &[ArticleRecord]) -> Result<()> {
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        for record in records {
            let line = serde_json::to_string(record)
                .with_context(|| format!("serializing record {}", record.id))?;
            writeln!(out, "{line}").context("writing record to stdout")?;
        }
        out.flush().context("flushing stdout")?;
        info!(source_id, count = records.len(), "published records");
        Ok(())
    }
}

/// Collects published records in memory.
#[derive(Default, Clone)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<ArticleRecord>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<ArticleRecord> {
        self.records.lock().expect("sink poisoned").clone()
    }
}

impl RecordSink for MemorySink {
    fn publish(&self, _source_id: &str, records: &[ArticleRecord]) -> Result<()> {
        self.records
            .lock()
            .expect("sink poisoned")
            .extend_from_slice(records);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{content_hash, ArticleRecord};

    fn record(title: &str) -> ArticleRecord {
        let mut r = ArticleRecord::new("src-1");
        r.title = title.to_string();
        r.hash = content_hash("", title, "");
        r
    }

    #[test]
    fn test_memory_sink_collects() {
        let sink = MemorySink::new();
        sink.publish("src-1", &[record("a"), record("b")]).unwrap();
        sink.publish("src-1", &[record("c")]).unwrap();
        let titles: Vec<_> = sink.records().into_iter().map(|r| r.title).collect();
        assert_eq!(titles, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_always_modified() {
        assert!(!AlwaysModified.unmodified("https://example.com/"));
    }
}

// Copyright 2026 Argus Contributors
// SPDX-License-Identifier: Apache-2.0

//! Argus — configuration-driven headless-browser web crawler.
//!
//! Given declarative element selectors and limits, Argus discovers a
//! title page, optionally paginates or expands dynamically loaded
//! content, visits every linked article, extracts structured fields and
//! emits canonical article records.

pub mod browser;
pub mod cli;
pub mod config;
pub mod crawler;
pub mod error;
pub mod publish;
pub mod record;
pub mod selector;

pub use config::{CrawlConfig, SourceParams};
pub use crawler::{CrawlOutcome, Crawler};
pub use error::CrawlError;
pub use record::ArticleRecord;

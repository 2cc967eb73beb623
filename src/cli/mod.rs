//! CLI subcommand implementations for the Argus binary.

pub mod crawl_cmd;
pub mod doctor;

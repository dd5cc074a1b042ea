//! Integration tests for Moebius
//!
//! Frontier behavior runs against on-disk SQLite databases; the pipeline and
//! the full crawl run against wiremock servers.

mod common;
mod crawl_tests;
mod frontier_tests;
mod pipeline_tests;

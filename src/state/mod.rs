//! State module for tracking crawl progress
//!
//! `CrawlStatus` is the closed set of statuses a frontier entry moves through
//! and owns the table of legal transitions.

mod crawl_status;

pub use crawl_status::CrawlStatus;

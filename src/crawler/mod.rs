//! Crawler module: the crawl pipeline and its collaborators
//!
//! This module contains:
//! - The HTTP collaborator (reqwest-backed fetcher)
//! - The HTML collaborator (scraper-backed link extractor)
//! - Task definitions and dispatch
//! - The Select / Fetch / Extract pipeline operations
//! - The worker pool and periodic trigger

mod coordinator;
mod dispatch;
mod fetcher;
mod parser;
mod pipeline;

pub use coordinator::{run_crawl, Coordinator, RunStats};
pub use dispatch::{
    DispatchError, Dispatcher, QueueDispatcher, RecordingDispatcher, Task, TaskEnvelope,
    TaskHandle, TaskPayload, TaskQueue,
};
pub use fetcher::{build_http_client, FetchError, FetchResponse, HttpFetcher, ReqwestFetcher};
pub use parser::{HtmlLinkExtractor, LinkExtractor};
pub use pipeline::{
    seed, ExtractReport, FetchOutcome, FetchPolicy, Pipeline, SelectOutcome, SelectReport,
};

use moebius::config::{Config, DispatchConfig, FetcherConfig, PolicyConfig, StoreConfig};
use moebius::crawler::{FetchPolicy, HtmlLinkExtractor, Pipeline, RecordingDispatcher, ReqwestFetcher};
use moebius::storage::SqliteStorage;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// A database file in its own temporary directory
pub struct TestDb {
    pub dir: TempDir,
}

impl TestDb {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.path().join("moebius.sqlite")
    }

    pub fn open(&self) -> SqliteStorage {
        SqliteStorage::new(&self.path()).unwrap()
    }

    pub fn config(&self, workers: u32, select_interval_secs: u64) -> Config {
        Config {
            store: StoreConfig::at(self.path().to_string_lossy()),
            fetcher: FetcherConfig::default(),
            dispatch: DispatchConfig {
                workers,
                select_interval_secs,
                max_attempts: 2,
                retry_delay_ms: 50,
            },
            policy: PolicyConfig::default(),
            seed: vec![],
        }
    }
}

/// A pipeline with the real collaborators whose follow-up tasks are recorded
pub fn recording_pipeline() -> (Pipeline, Arc<RecordingDispatcher>) {
    let dispatcher = Arc::new(RecordingDispatcher::new());
    let pipeline = Pipeline::new(
        Arc::new(ReqwestFetcher::new(&FetcherConfig::default()).unwrap()),
        Arc::new(HtmlLinkExtractor::new()),
        dispatcher.clone(),
        FetchPolicy::default(),
    );
    (pipeline, dispatcher)
}

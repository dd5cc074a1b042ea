use serde::Deserialize;

/// Main configuration structure for Moebius
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub store: StoreConfig,
    #[serde(default)]
    pub fetcher: FetcherConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub seed: Vec<SeedEntry>,
}

/// Persistent store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// How long a connection waits on a lock held by another worker (milliseconds)
    #[serde(rename = "busy-timeout-ms", default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

/// HTTP collaborator configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FetcherConfig {
    /// User-Agent header sent with every request
    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,

    /// Total request timeout (seconds)
    #[serde(rename = "timeout-secs", default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Connection establishment timeout (seconds)
    #[serde(rename = "connect-timeout-secs", default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

/// Task dispatch and periodic trigger configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
    /// Number of concurrent workers
    #[serde(default = "default_workers")]
    pub workers: u32,

    /// Interval between Select-and-Request triggers (seconds)
    #[serde(rename = "select-interval-secs", default = "default_select_interval_secs")]
    pub select_interval_secs: u64,

    /// Deliveries of a task before it is dropped
    #[serde(rename = "max-attempts", default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base delay before a failed task is redelivered (milliseconds)
    #[serde(rename = "retry-delay-ms", default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

/// Fetchability policy
#[derive(Debug, Clone, Deserialize)]
pub struct PolicyConfig {
    /// Schemes eligible for fetching
    #[serde(rename = "fetchable-schemes", default = "default_fetchable_schemes")]
    pub fetchable_schemes: Vec<String>,

    /// Host patterns (e.g. "example.com" or "*.example.com") never fetched
    #[serde(rename = "excluded-hosts", default)]
    pub excluded_hosts: Vec<String>,

    /// Maximum ineligible entries moved to Ignored per selection
    #[serde(rename = "sweep-batch", default = "default_sweep_batch")]
    pub sweep_batch: u32,
}

/// Seed URL submitted to the frontier at start-up
#[derive(Debug, Clone, Deserialize)]
pub struct SeedEntry {
    pub url: String,
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_user_agent() -> String {
    format!("moebius/{}", env!("CARGO_PKG_VERSION"))
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_workers() -> u32 {
    4
}

fn default_select_interval_secs() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1_000
}

fn default_fetchable_schemes() -> Vec<String> {
    vec!["http".to_string(), "https".to_string()]
}

fn default_sweep_batch() -> u32 {
    100
}

impl StoreConfig {
    /// Store configuration for the given database path with default timeouts
    pub fn at(database_path: impl Into<String>) -> Self {
        Self {
            database_path: database_path.into(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            select_interval_secs: default_select_interval_secs(),
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            fetchable_schemes: default_fetchable_schemes(),
            excluded_hosts: Vec::new(),
            sweep_batch: default_sweep_batch(),
        }
    }
}

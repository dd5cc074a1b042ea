//! Crawler coordinator - worker pool and periodic trigger
//!
//! The coordinator wires the pipeline to an in-process task queue:
//! - a trigger dispatches Select-and-Request on a fixed interval
//! - `workers` tasks drain the queue, each with its own store connection
//! - failed tasks are redelivered after a delay until `max-attempts`
//! - everything stops when the shutdown signal flips

use crate::config::Config;
use crate::crawler::dispatch::{Dispatcher, QueueDispatcher, Task, TaskEnvelope, TaskQueue};
use crate::crawler::fetcher::{HttpFetcher, ReqwestFetcher};
use crate::crawler::parser::HtmlLinkExtractor;
use crate::crawler::pipeline::{FetchPolicy, Pipeline};
use crate::storage::SqliteStorage;
use crate::MoebiusError;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinSet;

/// Task counters for one run
#[derive(Debug, Default)]
pub struct RunStats {
    pub succeeded: AtomicU64,
    pub retried: AtomicU64,
    pub dropped: AtomicU64,
}

impl RunStats {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Main crawler coordinator structure
pub struct Coordinator {
    config: Arc<Config>,
    pipeline: Pipeline,
    dispatcher: QueueDispatcher,
    queue: TaskQueue,
    stats: Arc<RunStats>,
}

impl Coordinator {
    /// Creates a coordinator with the reqwest-backed fetcher
    ///
    /// # Arguments
    ///
    /// * `config` - The crawler configuration
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Ready to run
    /// * `Err(MoebiusError)` - The HTTP client could not be built
    pub fn new(config: Config) -> Result<Self, MoebiusError> {
        let fetcher = ReqwestFetcher::new(&config.fetcher)?;
        Ok(Self::with_fetcher(config, Arc::new(fetcher)))
    }

    /// Creates a coordinator around an arbitrary HTTP collaborator
    pub fn with_fetcher(config: Config, fetcher: Arc<dyn HttpFetcher>) -> Self {
        let (dispatcher, queue) = QueueDispatcher::new();
        let pipeline = Pipeline::new(
            fetcher,
            Arc::new(HtmlLinkExtractor::new()),
            Arc::new(dispatcher.clone()),
            FetchPolicy::from_config(&config.policy),
        );

        Self {
            config: Arc::new(config),
            pipeline,
            dispatcher,
            queue,
            stats: Arc::new(RunStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<RunStats> {
        self.stats.clone()
    }

    /// Runs the trigger and the worker pool until `shutdown` becomes true
    ///
    /// Returns the first worker error (e.g. the database could not be
    /// opened); task failures are retried and logged, never returned.
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> Result<(), MoebiusError> {
        let dispatch = &self.config.dispatch;
        let database_path = PathBuf::from(&self.config.store.database_path);
        let busy_timeout = Duration::from_millis(self.config.store.busy_timeout_ms);

        tracing::info!(
            "Starting {} workers, selecting every {}s",
            dispatch.workers,
            dispatch.select_interval_secs
        );

        let queue = Arc::new(Mutex::new(self.queue));
        let mut workers = JoinSet::new();

        for worker_id in 0..dispatch.workers {
            let worker = Worker {
                id: worker_id,
                pipeline: self.pipeline.clone(),
                dispatcher: self.dispatcher.clone(),
                queue: queue.clone(),
                stats: self.stats.clone(),
                max_attempts: dispatch.max_attempts,
                retry_delay: Duration::from_millis(dispatch.retry_delay_ms),
            };
            let database_path = database_path.clone();
            let shutdown = shutdown.clone();

            workers.spawn(async move {
                let storage = SqliteStorage::open(&database_path, busy_timeout)?;
                worker.run(storage, shutdown).await;
                Ok::<_, MoebiusError>(())
            });
        }

        let trigger = tokio::spawn(run_trigger(
            self.dispatcher.clone(),
            Duration::from_secs(dispatch.select_interval_secs),
            shutdown,
        ));

        let mut result = Ok(());
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::error!("Worker failed: {}", e);
                    if result.is_ok() {
                        result = Err(e);
                    }
                }
                Err(e) => tracing::error!("Worker panicked: {}", e),
            }
        }

        trigger.abort();

        tracing::info!(
            "Crawl stopped: {} tasks succeeded, {} retried, {} dropped",
            self.stats.succeeded.load(Ordering::Relaxed),
            self.stats.retried.load(Ordering::Relaxed),
            self.stats.dropped.load(Ordering::Relaxed)
        );

        result
    }
}

struct Worker {
    id: u32,
    pipeline: Pipeline,
    dispatcher: QueueDispatcher,
    queue: Arc<Mutex<TaskQueue>>,
    stats: Arc<RunStats>,
    max_attempts: u32,
    retry_delay: Duration,
}

impl Worker {
    async fn run(self, mut storage: SqliteStorage, mut shutdown: watch::Receiver<bool>) {
        tracing::debug!("Worker {} started", self.id);

        loop {
            if *shutdown.borrow() {
                break;
            }

            let envelope = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                next = next_task(&self.queue) => match next {
                    Some(envelope) => envelope,
                    None => break,
                },
            };

            self.execute(&mut storage, envelope).await;
        }

        tracing::debug!("Worker {} stopped", self.id);
    }

    async fn execute(&self, storage: &mut SqliteStorage, envelope: TaskEnvelope) {
        match self.pipeline.run_task(storage, &envelope.task).await {
            Ok(()) => RunStats::bump(&self.stats.succeeded),
            Err(e) if envelope.attempt < self.max_attempts => {
                tracing::warn!(
                    "Task {} failed (attempt {}/{}): {}",
                    envelope.task,
                    envelope.attempt,
                    self.max_attempts,
                    e
                );
                RunStats::bump(&self.stats.retried);
                self.schedule_redelivery(envelope);
            }
            Err(e) => {
                tracing::error!(
                    "Task {} dropped after {} attempts: {}",
                    envelope.task,
                    envelope.attempt,
                    e
                );
                RunStats::bump(&self.stats.dropped);
            }
        }
    }

    /// Linear backoff: the n-th retry waits n * retry_delay
    fn schedule_redelivery(&self, envelope: TaskEnvelope) {
        let dispatcher = self.dispatcher.clone();
        let delay = self.retry_delay * envelope.attempt;

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = dispatcher.redeliver(envelope) {
                tracing::debug!("Could not redeliver task: {}", e);
            }
        });
    }
}

async fn next_task(queue: &Mutex<TaskQueue>) -> Option<TaskEnvelope> {
    queue.lock().await.next().await
}

/// Dispatches Select-and-Request every `period` until shutdown
async fn run_trigger(
    dispatcher: QueueDispatcher,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(period);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(e) = dispatcher.dispatch(Task::SelectAndRequest) {
                    tracing::warn!("Trigger stopped: {}", e);
                    break;
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

/// Runs a crawl until Ctrl-C
///
/// # Example
///
/// ```no_run
/// use moebius::config::load_config;
/// use moebius::crawler::run_crawl;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = load_config(Path::new("moebius.toml"))?;
/// run_crawl(config).await?;
/// # Ok(())
/// # }
/// ```
pub async fn run_crawl(config: Config) -> Result<(), MoebiusError> {
    let coordinator = Coordinator::new(config)?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Interrupt received, shutting down"),
            Err(e) => tracing::error!("Failed to listen for Ctrl-C: {}", e),
        }
        let _ = shutdown_tx.send(true);
    });

    coordinator.run(shutdown_rx).await
}

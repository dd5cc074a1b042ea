//! The three pipeline operations
//!
//! Each operation takes the worker's `SqliteStorage` and runs all of its
//! store mutations inside one transaction. Follow-up tasks are dispatched
//! only after that transaction has committed, so whoever picks them up sees
//! the committed state.

use crate::config::PolicyConfig;
use crate::crawler::dispatch::{Dispatcher, Task, TaskHandle};
use crate::crawler::fetcher::HttpFetcher;
use crate::crawler::parser::LinkExtractor;
use crate::state::CrawlStatus;
use crate::storage::{FrontierEntry, PageRecord, Repository, SqliteStorage};
use crate::url::{host_matches_any, parse, unparse, UrlComponents};
use crate::Result;
use std::sync::Arc;

/// Decides which frontier entries may be fetched
#[derive(Debug, Clone)]
pub struct FetchPolicy {
    fetchable_schemes: Vec<String>,
    excluded_hosts: Vec<String>,
    sweep_batch: usize,
}

impl FetchPolicy {
    pub fn from_config(config: &PolicyConfig) -> Self {
        Self {
            fetchable_schemes: config.fetchable_schemes.clone(),
            excluded_hosts: config.excluded_hosts.clone(),
            sweep_batch: config.sweep_batch as usize,
        }
    }

    pub fn fetchable_schemes(&self) -> &[String] {
        &self.fetchable_schemes
    }

    pub fn is_excluded_host(&self, host: &str) -> bool {
        host_matches_any(&self.excluded_hosts, host)
    }

    /// True when the scheme is fetchable and the host is present and not excluded
    pub fn allows(&self, components: &UrlComponents) -> bool {
        self.fetchable_schemes.contains(&components.scheme)
            && components
                .host
                .as_deref()
                .is_some_and(|host| !self.is_excluded_host(host))
    }
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self::from_config(&PolicyConfig::default())
    }
}

/// What a Select-and-Request run did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectReport {
    /// Entries moved New -> Ignored by policy during this run
    pub ignored: usize,
    pub outcome: SelectOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectOutcome {
    /// The entry was moved to Requested and its fetch dispatched
    Requested {
        entry: FrontierEntry,
        url: String,
        handle: TaskHandle,
    },
    /// No eligible New entry is left for now
    Exhausted,
}

/// What a Fetch-and-Store run did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Content stored, entry moved to Got and extraction dispatched
    Stored {
        page: PageRecord,
        handle: TaskHandle,
        /// Earliest other page with byte-identical content
        duplicate_of: Option<i64>,
    },
    /// The URL has no frontier entry
    Unknown,
    /// The entry is no longer Requested (e.g. a redelivered task)
    Skipped { status: CrawlStatus },
}

/// What an Extract-and-Submit run did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractReport {
    /// Links submitted to the frontier (new or already known)
    pub submitted: usize,
    /// Links that could not be canonicalized
    pub malformed: usize,
}

/// Runs pipeline operations against the external collaborators
#[derive(Clone)]
pub struct Pipeline {
    fetcher: Arc<dyn HttpFetcher>,
    extractor: Arc<dyn LinkExtractor>,
    dispatcher: Arc<dyn Dispatcher>,
    policy: FetchPolicy,
}

impl Pipeline {
    pub fn new(
        fetcher: Arc<dyn HttpFetcher>,
        extractor: Arc<dyn LinkExtractor>,
        dispatcher: Arc<dyn Dispatcher>,
        policy: FetchPolicy,
    ) -> Self {
        Self {
            fetcher,
            extractor,
            dispatcher,
            policy,
        }
    }

    /// Executes one task
    pub async fn run_task(&self, storage: &mut SqliteStorage, task: &Task) -> Result<()> {
        match task {
            Task::SelectAndRequest => {
                self.select_and_request(storage)?;
            }
            Task::FetchAndStore { url } => {
                self.fetch_and_store(storage, url).await?;
            }
            Task::ExtractAndSubmit { page_id } => {
                self.extract_and_submit(storage, *page_id)?;
            }
        }
        Ok(())
    }

    /// Select-and-Request
    ///
    /// Moves a bounded batch of New entries the policy can never fetch to
    /// Ignored, then selects the oldest eligible New entry. An entry whose
    /// host is excluded is Ignored and selection continues; the first
    /// fetchable one is moved to Requested and a fetch is dispatched for its
    /// canonical URL.
    pub fn select_and_request(&self, storage: &mut SqliteStorage) -> Result<SelectReport> {
        let policy = &self.policy;

        let (ignored, selected) = storage.transaction(|tx| -> Result<_> {
            let mut ignored = 0;

            for entry in tx.select_ineligible(policy.fetchable_schemes(), policy.sweep_batch)? {
                tx.transition(&entry, CrawlStatus::Ignored)?;
                tracing::debug!("Ignoring entry {} (not fetchable)", entry.id);
                ignored += 1;
            }

            while let Some(entry) = tx.select_next(policy.fetchable_schemes())? {
                let components = tx.entry_components(&entry)?;

                if policy.allows(&components) {
                    let entry = tx.transition(&entry, CrawlStatus::Requested)?;
                    return Ok((ignored, Some((entry, unparse(&components)))));
                }

                tx.transition(&entry, CrawlStatus::Ignored)?;
                tracing::debug!("Ignoring {} (excluded host)", components);
                ignored += 1;
            }

            Ok((ignored, None))
        })?;

        let outcome = match selected {
            Some((entry, url)) => {
                let handle = self
                    .dispatcher
                    .dispatch(Task::FetchAndStore { url: url.clone() })?;
                tracing::info!("Requested {} (entry {})", url, entry.id);
                SelectOutcome::Requested { entry, url, handle }
            }
            None => {
                tracing::debug!("Frontier exhausted");
                SelectOutcome::Exhausted
            }
        };

        Ok(SelectReport { ignored, outcome })
    }

    /// Fetch-and-Store
    ///
    /// The HTTP request runs outside any transaction. On a 200 response the
    /// page is stored and the entry moved Requested -> Got together; any
    /// other response leaves the entry Requested and returns the error so
    /// the dispatcher can retry.
    pub async fn fetch_and_store(
        &self,
        storage: &mut SqliteStorage,
        url: &str,
    ) -> Result<FetchOutcome> {
        let components = parse(url)?;

        let Some(entry) = storage.connection().find_entry(&components)? else {
            tracing::warn!("No frontier entry for {}", url);
            return Ok(FetchOutcome::Unknown);
        };

        if entry.status != CrawlStatus::Requested {
            tracing::debug!("Skipping fetch of {}: entry is {}", url, entry.status);
            return Ok(FetchOutcome::Skipped {
                status: entry.status,
            });
        }

        let response = self.fetcher.fetch(url).await?;

        let (page, duplicate_of) = storage.transaction(|tx| -> Result<_> {
            let page = tx.store_page(&entry, &response.body, response.declared_encoding.as_deref())?;
            tx.transition(&entry, CrawlStatus::Got)?;
            let duplicate_of = tx
                .pages_with_hash(&page.content_hash)?
                .into_iter()
                .find(|id| *id != page.id);
            Ok((page, duplicate_of))
        })?;

        let handle = self
            .dispatcher
            .dispatch(Task::ExtractAndSubmit { page_id: page.id })?;

        tracing::info!(
            "Stored {} ({} bytes, sha256 {})",
            url,
            page.content.len(),
            page.content_hash
        );
        if let Some(original) = duplicate_of {
            tracing::debug!("Page {} has the same content as page {}", page.id, original);
        }

        Ok(FetchOutcome::Stored {
            page,
            handle,
            duplicate_of,
        })
    }

    /// Extract-and-Submit
    ///
    /// Links are resolved against the page's canonical URL and submitted one
    /// at a time; a link that cannot be canonicalized is counted and skipped.
    pub fn extract_and_submit(
        &self,
        storage: &mut SqliteStorage,
        page_id: i64,
    ) -> Result<ExtractReport> {
        let extractor = &self.extractor;

        let report = storage.transaction(|tx| -> Result<_> {
            let page = tx.fetch_page(page_id)?;
            let entry = tx.get_entry(page.frontier_id)?;
            let base_url = tx.entry_url(&entry)?;

            let mut report = ExtractReport::default();
            for link in extractor.extract(&page.content, &base_url) {
                match parse(&link) {
                    Ok(components) => {
                        tx.submit(&components)?;
                        report.submitted += 1;
                    }
                    Err(e) => {
                        tracing::debug!("Skipping link on page {}: {}", page_id, e);
                        report.malformed += 1;
                    }
                }
            }

            Ok(report)
        })?;

        tracing::info!(
            "Extracted {} links from page {} ({} malformed)",
            report.submitted,
            page_id,
            report.malformed
        );

        Ok(report)
    }
}

/// Submits a raw URL to the frontier
///
/// Used for seed URLs; goes through the same canonicalization and dedup as
/// extracted links.
pub fn seed(storage: &mut SqliteStorage, raw: &str) -> Result<FrontierEntry> {
    let components = parse(raw)?;
    let entry = storage.transaction(|tx| -> Result<_> { Ok(tx.submit(&components)?) })?;
    tracing::info!("Seeded {} (entry {}, {})", components, entry.id, entry.status);
    Ok(entry)
}

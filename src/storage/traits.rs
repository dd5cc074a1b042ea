//! Storage traits and error types
//!
//! This module defines the repository interface over the persistent store
//! and the associated error types.

use crate::state::CrawlStatus;
use crate::storage::{AuthorityRecord, FrontierEntry, PageRecord, SchemeRecord};
use crate::url::{unparse, UrlComponents};
use std::collections::HashMap;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: i64 },

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition { from: CrawlStatus, to: CrawlStatus },

    #[error("Constraint violation: {0}")]
    Conflict(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Repository operations over a connection or an open transaction
///
/// Every operation returns plain value records. The identity tables and the
/// frontier rely on the store's uniqueness constraints for deduplication: a
/// losing concurrent insert is recovered by re-reading the winning row, so
/// `Conflict` never escapes `intern_*` or `submit`.
pub trait Repository {
    // ===== Identity Tables =====

    /// Returns the scheme row for `name`, inserting it if absent
    fn intern_scheme(&self, name: &str) -> StorageResult<SchemeRecord>;

    /// Returns the authority row for `(host, port)`, inserting it if absent
    ///
    /// An absent host is never materialized: `intern_authority(None, _)`
    /// returns `Ok(None)`.
    fn intern_authority(
        &self,
        host: Option<&str>,
        port: Option<u16>,
    ) -> StorageResult<Option<AuthorityRecord>>;

    /// Gets a scheme by ID
    fn get_scheme(&self, scheme_id: i64) -> StorageResult<SchemeRecord>;

    /// Gets an authority by ID
    fn get_authority(&self, authority_id: i64) -> StorageResult<AuthorityRecord>;

    // ===== Frontier =====

    /// Have-or-create on the dedup key
    ///
    /// Returns the existing entry for these components, or interns the scheme
    /// and authority and inserts a new entry with status `New`.
    fn submit(&self, components: &UrlComponents) -> StorageResult<FrontierEntry>;

    /// Looks up an entry by its dedup key without creating anything
    fn find_entry(&self, components: &UrlComponents) -> StorageResult<Option<FrontierEntry>>;

    /// Gets an entry by ID
    fn get_entry(&self, entry_id: i64) -> StorageResult<FrontierEntry>;

    /// Returns the oldest `New` entry with a fetchable scheme and an authority
    ///
    /// Ties are broken by lowest id, i.e. discovery order.
    fn select_next(&self, fetchable_schemes: &[String]) -> StorageResult<Option<FrontierEntry>>;

    /// Returns up to `limit` of the oldest `New` entries that `select_next`
    /// will never return (non-fetchable scheme or no authority)
    fn select_ineligible(
        &self,
        fetchable_schemes: &[String],
        limit: usize,
    ) -> StorageResult<Vec<FrontierEntry>>;

    /// Moves an entry to `next`, enforcing the crawl state machine
    ///
    /// The update is conditional on the entry still holding the status the
    /// caller observed; if another worker moved it first, the transition is
    /// rejected with `InvalidTransition` from the status now stored.
    fn transition(&self, entry: &FrontierEntry, next: CrawlStatus)
        -> StorageResult<FrontierEntry>;

    /// Counts entries per status; every status is present in the map
    fn count_by_status(&self) -> StorageResult<HashMap<CrawlStatus, u64>>;

    /// Rebuilds the URL components of an entry from the identity tables
    fn entry_components(&self, entry: &FrontierEntry) -> StorageResult<UrlComponents> {
        let scheme = self.get_scheme(entry.scheme_id)?;
        let authority = entry
            .authority_id
            .map(|id| self.get_authority(id))
            .transpose()?;

        Ok(UrlComponents {
            scheme: scheme.name,
            host: authority.as_ref().map(|a| a.host.clone()),
            port: authority.and_then(|a| a.port),
            path: entry.path.clone(),
            params: entry.params.clone(),
            query: entry.query.clone(),
            fragment: entry.fragment.clone(),
        })
    }

    /// Returns the canonical URL string of an entry
    fn entry_url(&self, entry: &FrontierEntry) -> StorageResult<String> {
        Ok(unparse(&self.entry_components(entry)?))
    }

    // ===== Content Store =====

    /// Stores fetched bytes for an entry, computing their content hash
    fn store_page(
        &self,
        entry: &FrontierEntry,
        content: &[u8],
        transfer_encoding: Option<&str>,
    ) -> StorageResult<PageRecord>;

    /// Gets a page by ID
    fn fetch_page(&self, page_id: i64) -> StorageResult<PageRecord>;

    /// Gets all pages stored for an entry, oldest first
    fn pages_for_entry(&self, entry_id: i64) -> StorageResult<Vec<PageRecord>>;

    /// Returns the ids of pages whose content hash equals `content_hash`
    fn pages_with_hash(&self, content_hash: &str) -> StorageResult<Vec<i64>>;

    /// Gets total page count
    fn count_pages(&self) -> StorageResult<u64>;
}

//! Storage module for persisting crawl data
//!
//! This module handles all database operations for the crawler, including:
//! - SQLite database initialization and schema management
//! - Scheme and authority interning
//! - The frontier and its status transitions
//! - Page content storage
//! - The transaction boundary every pipeline step runs inside

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{Repository, StorageError, StorageResult};

use crate::state::CrawlStatus;
use sha2::{Digest, Sha256};

/// An interned URL scheme
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemeRecord {
    pub id: i64,
    pub name: String,
}

/// An interned (host, port) pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorityRecord {
    pub id: i64,
    pub host: String,
    pub port: Option<u16>,
}

/// A discovered URL and its crawl status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontierEntry {
    pub id: i64,
    pub scheme_id: i64,
    pub authority_id: Option<i64>,
    pub path: String,
    pub params: String,
    pub query: String,
    pub fragment: String,
    pub status: CrawlStatus,
    pub discovered_at: String,
}

/// Content fetched for a frontier entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRecord {
    pub id: i64,
    pub frontier_id: i64,
    pub retrieved_at: String,
    pub content: Vec<u8>,
    pub transfer_encoding: Option<String>,
    pub content_hash: String,
}

/// Computes the content hash stored with every page
///
/// Hex-encoded SHA-256 of the raw bytes.
pub fn content_digest(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

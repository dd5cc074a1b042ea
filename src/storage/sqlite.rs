//! SQLite storage implementation
//!
//! `Repository` is implemented directly on `rusqlite::Connection`, so the same
//! operations run in autocommit mode on a bare connection or inside a
//! `rusqlite::Transaction` (which derefs to a connection). `SqliteStorage`
//! owns one connection and is the transaction boundary.

use crate::state::CrawlStatus;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Repository, StorageError, StorageResult};
use crate::storage::{content_digest, AuthorityRecord, FrontierEntry, PageRecord, SchemeRecord};
use crate::url::UrlComponents;
use chrono::Utc;
use rusqlite::types::{Type, Value};
use rusqlite::{
    ffi, params, params_from_iter, Connection, ErrorCode, OptionalExtension, Row, Transaction,
    TransactionBehavior,
};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const ENTRY_COLUMNS: &str = "f.id, f.scheme_id, f.authority_id, f.path, f.params, f.query, \
                             f.fragment, f.status_id, f.discovered_at";

const PAGE_COLUMNS: &str =
    "id, frontier_id, retrieved_at, content, transfer_encoding, content_hash";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Opens or creates the database at `path` with the default busy timeout
    pub fn new(path: &Path) -> StorageResult<Self> {
        Self::open(path, DEFAULT_BUSY_TIMEOUT)
    }

    /// Opens or creates the database at `path`
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    /// * `busy_timeout` - How long to wait on a lock held by another connection
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database or apply the schema
    pub fn open(path: &Path, busy_timeout: Duration) -> StorageResult<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Runs `f` inside one transaction
    ///
    /// The transaction is IMMEDIATE: the write lock is taken before `f` runs,
    /// so two workers selecting from the frontier are serialized by the store.
    /// Commits when `f` returns `Ok`; any `Err` (or a panic) rolls back every
    /// mutation `f` made.
    pub fn transaction<T, E, F>(&mut self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, E>,
        E: From<rusqlite::Error>,
    {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// The underlying connection, for autocommit reads
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

/// Returns true if the error is a UNIQUE / PRIMARY KEY constraint violation
pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => {
            e.code == ErrorCode::ConstraintViolation
                && (e.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
                    || e.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY)
        }
        _ => false,
    }
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<FrontierEntry> {
    let status_id: i64 = row.get(7)?;
    let status = CrawlStatus::from_id(status_id).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            7,
            Type::Integer,
            format!("unknown crawl status id {}", status_id).into(),
        )
    })?;

    Ok(FrontierEntry {
        id: row.get(0)?,
        scheme_id: row.get(1)?,
        authority_id: row.get(2)?,
        path: row.get(3)?,
        params: row.get(4)?,
        query: row.get(5)?,
        fragment: row.get(6)?,
        status,
        discovered_at: row.get(8)?,
    })
}

fn page_from_row(row: &Row<'_>) -> rusqlite::Result<PageRecord> {
    Ok(PageRecord {
        id: row.get(0)?,
        frontier_id: row.get(1)?,
        retrieved_at: row.get(2)?,
        content: row.get(3)?,
        transfer_encoding: row.get(4)?,
        content_hash: row.get(5)?,
    })
}

/// `?start, ?start+1, ...` placeholders for an IN list
fn placeholders(start: usize, count: usize) -> String {
    (start..start + count)
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Query parameters: the `New` status id followed by the scheme names
fn status_and_schemes(fetchable_schemes: &[String]) -> Vec<Value> {
    std::iter::once(Value::Integer(CrawlStatus::New.id()))
        .chain(fetchable_schemes.iter().map(|s| Value::Text(s.clone())))
        .collect()
}

trait ConnectionExt {
    fn find_scheme(&self, name: &str) -> StorageResult<Option<SchemeRecord>>;
    fn find_authority(&self, host: &str, port: Option<u16>)
        -> StorageResult<Option<AuthorityRecord>>;
    fn find_entry_by_key(
        &self,
        scheme_id: i64,
        authority_id: Option<i64>,
        components: &UrlComponents,
    ) -> StorageResult<Option<FrontierEntry>>;

    // Inserts that lost to a concurrent writer re-read the winning row
    fn insert_scheme(&self, name: &str) -> StorageResult<SchemeRecord>;
    fn insert_authority(&self, host: &str, port: Option<u16>) -> StorageResult<AuthorityRecord>;
    fn insert_entry(
        &self,
        scheme_id: i64,
        authority_id: Option<i64>,
        components: &UrlComponents,
    ) -> StorageResult<FrontierEntry>;
}

impl ConnectionExt for Connection {
    fn find_scheme(&self, name: &str) -> StorageResult<Option<SchemeRecord>> {
        let scheme = self
            .query_row(
                "SELECT id, name FROM schemes WHERE name = ?1",
                params![name],
                |row| {
                    Ok(SchemeRecord {
                        id: row.get(0)?,
                        name: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(scheme)
    }

    fn find_authority(
        &self,
        host: &str,
        port: Option<u16>,
    ) -> StorageResult<Option<AuthorityRecord>> {
        let authority = self
            .query_row(
                "SELECT id, host, port FROM authorities WHERE host = ?1 AND port IS ?2",
                params![host, port],
                |row| {
                    Ok(AuthorityRecord {
                        id: row.get(0)?,
                        host: row.get(1)?,
                        port: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(authority)
    }

    fn find_entry_by_key(
        &self,
        scheme_id: i64,
        authority_id: Option<i64>,
        components: &UrlComponents,
    ) -> StorageResult<Option<FrontierEntry>> {
        let sql = format!(
            "SELECT {} FROM frontier f
             WHERE f.scheme_id = ?1 AND f.authority_id IS ?2 AND f.path = ?3
               AND f.params = ?4 AND f.query = ?5 AND f.fragment = ?6",
            ENTRY_COLUMNS
        );
        let entry = self
            .query_row(
                &sql,
                params![
                    scheme_id,
                    authority_id,
                    components.path,
                    components.params,
                    components.query,
                    components.fragment
                ],
                entry_from_row,
            )
            .optional()?;
        Ok(entry)
    }

    fn insert_scheme(&self, name: &str) -> StorageResult<SchemeRecord> {
        match self.execute("INSERT INTO schemes (name) VALUES (?1)", params![name]) {
            Ok(_) => Ok(SchemeRecord {
                id: self.last_insert_rowid(),
                name: name.to_string(),
            }),
            Err(e) if is_unique_violation(&e) => {
                tracing::debug!("Scheme {} interned concurrently, re-reading", name);
                self.find_scheme(name)?
                    .ok_or_else(|| StorageError::Conflict(format!("scheme {}", name)))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn insert_authority(&self, host: &str, port: Option<u16>) -> StorageResult<AuthorityRecord> {
        match self.execute(
            "INSERT INTO authorities (host, port) VALUES (?1, ?2)",
            params![host, port],
        ) {
            Ok(_) => Ok(AuthorityRecord {
                id: self.last_insert_rowid(),
                host: host.to_string(),
                port,
            }),
            Err(e) if is_unique_violation(&e) => {
                tracing::debug!("Authority {} interned concurrently, re-reading", host);
                self.find_authority(host, port)?
                    .ok_or_else(|| StorageError::Conflict(format!("authority {}", host)))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn insert_entry(
        &self,
        scheme_id: i64,
        authority_id: Option<i64>,
        components: &UrlComponents,
    ) -> StorageResult<FrontierEntry> {
        let now = Utc::now().to_rfc3339();
        let inserted = self.execute(
            "INSERT INTO frontier (scheme_id, authority_id, path, params, query, fragment, status_id, discovered_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                scheme_id,
                authority_id,
                components.path,
                components.params,
                components.query,
                components.fragment,
                CrawlStatus::New.id(),
                now
            ],
        );

        match inserted {
            Ok(_) => Ok(FrontierEntry {
                id: self.last_insert_rowid(),
                scheme_id: scheme_id,
                authority_id,
                path: components.path.clone(),
                params: components.params.clone(),
                query: components.query.clone(),
                fragment: components.fragment.clone(),
                status: CrawlStatus::New,
                discovered_at: now,
            }),
            Err(e) if is_unique_violation(&e) => {
                tracing::debug!("Entry {} submitted concurrently, re-reading", components);
                self.find_entry_by_key(scheme_id, authority_id, components)?
                    .ok_or_else(|| StorageError::Conflict(components.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl Repository for Connection {
    // ===== Identity Tables =====

    fn intern_scheme(&self, name: &str) -> StorageResult<SchemeRecord> {
        if let Some(existing) = self.find_scheme(name)? {
            return Ok(existing);
        }

        self.insert_scheme(name)
    }

    fn intern_authority(
        &self,
        host: Option<&str>,
        port: Option<u16>,
    ) -> StorageResult<Option<AuthorityRecord>> {
        let Some(host) = host else {
            return Ok(None);
        };

        if let Some(existing) = self.find_authority(host, port)? {
            return Ok(Some(existing));
        }

        self.insert_authority(host, port).map(Some)
    }

    fn get_scheme(&self, scheme_id: i64) -> StorageResult<SchemeRecord> {
        self.query_row(
            "SELECT id, name FROM schemes WHERE id = ?1",
            params![scheme_id],
            |row| {
                Ok(SchemeRecord {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            },
        )
        .optional()?
        .ok_or(StorageError::NotFound {
            kind: "Scheme",
            id: scheme_id,
        })
    }

    fn get_authority(&self, authority_id: i64) -> StorageResult<AuthorityRecord> {
        self.query_row(
            "SELECT id, host, port FROM authorities WHERE id = ?1",
            params![authority_id],
            |row| {
                Ok(AuthorityRecord {
                    id: row.get(0)?,
                    host: row.get(1)?,
                    port: row.get(2)?,
                })
            },
        )
        .optional()?
        .ok_or(StorageError::NotFound {
            kind: "Authority",
            id: authority_id,
        })
    }

    // ===== Frontier =====

    fn submit(&self, components: &UrlComponents) -> StorageResult<FrontierEntry> {
        let scheme = self.intern_scheme(&components.scheme)?;
        let authority = self.intern_authority(components.host.as_deref(), components.port)?;
        let authority_id = authority.map(|a| a.id);

        if let Some(existing) = self.find_entry_by_key(scheme.id, authority_id, components)? {
            return Ok(existing);
        }

        self.insert_entry(scheme.id, authority_id, components)
    }

    fn find_entry(&self, components: &UrlComponents) -> StorageResult<Option<FrontierEntry>> {
        let Some(scheme) = self.find_scheme(&components.scheme)? else {
            return Ok(None);
        };

        let authority_id = match components.host.as_deref() {
            Some(host) => match self.find_authority(host, components.port)? {
                Some(authority) => Some(authority.id),
                None => return Ok(None),
            },
            None => None,
        };

        self.find_entry_by_key(scheme.id, authority_id, components)
    }

    fn get_entry(&self, entry_id: i64) -> StorageResult<FrontierEntry> {
        let sql = format!("SELECT {} FROM frontier f WHERE f.id = ?1", ENTRY_COLUMNS);
        self.query_row(&sql, params![entry_id], entry_from_row)
            .optional()?
            .ok_or(StorageError::NotFound {
                kind: "Frontier entry",
                id: entry_id,
            })
    }

    fn select_next(&self, fetchable_schemes: &[String]) -> StorageResult<Option<FrontierEntry>> {
        if fetchable_schemes.is_empty() {
            return Ok(None);
        }

        let sql = format!(
            "SELECT {} FROM frontier f JOIN schemes s ON s.id = f.scheme_id
             WHERE f.status_id = ?1 AND f.authority_id IS NOT NULL AND s.name IN ({})
             ORDER BY f.id ASC LIMIT 1",
            ENTRY_COLUMNS,
            placeholders(2, fetchable_schemes.len())
        );

        let entry = self
            .query_row(
                &sql,
                params_from_iter(status_and_schemes(fetchable_schemes)),
                entry_from_row,
            )
            .optional()?;
        Ok(entry)
    }

    fn select_ineligible(
        &self,
        fetchable_schemes: &[String],
        limit: usize,
    ) -> StorageResult<Vec<FrontierEntry>> {
        let sql = format!(
            "SELECT {} FROM frontier f JOIN schemes s ON s.id = f.scheme_id
             WHERE f.status_id = ?1 AND (f.authority_id IS NULL OR s.name NOT IN ({}))
             ORDER BY f.id ASC LIMIT {}",
            ENTRY_COLUMNS,
            placeholders(2, fetchable_schemes.len()),
            limit
        );

        let mut stmt = self.prepare(&sql)?;
        let entries = stmt
            .query_map(
                params_from_iter(status_and_schemes(fetchable_schemes)),
                entry_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    fn transition(
        &self,
        entry: &FrontierEntry,
        next: CrawlStatus,
    ) -> StorageResult<FrontierEntry> {
        if !entry.status.can_transition_to(next) {
            return Err(StorageError::InvalidTransition {
                from: entry.status,
                to: next,
            });
        }

        let changed = self.execute(
            "UPDATE frontier SET status_id = ?1 WHERE id = ?2 AND status_id = ?3",
            params![next.id(), entry.id, entry.status.id()],
        )?;

        if changed == 0 {
            let current = self.get_entry(entry.id)?;
            return Err(StorageError::InvalidTransition {
                from: current.status,
                to: next,
            });
        }

        Ok(FrontierEntry {
            status: next,
            ..entry.clone()
        })
    }

    fn count_by_status(&self) -> StorageResult<HashMap<CrawlStatus, u64>> {
        let mut counts: HashMap<CrawlStatus, u64> =
            CrawlStatus::all().into_iter().map(|s| (s, 0)).collect();

        let mut stmt = self.prepare("SELECT status_id, COUNT(*) FROM frontier GROUP BY status_id")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)))?;

        for row in rows {
            let (status_id, count) = row?;
            if let Some(status) = CrawlStatus::from_id(status_id) {
                counts.insert(status, count as u64);
            }
        }

        Ok(counts)
    }

    // ===== Content Store =====

    fn store_page(
        &self,
        entry: &FrontierEntry,
        content: &[u8],
        transfer_encoding: Option<&str>,
    ) -> StorageResult<PageRecord> {
        let now = Utc::now().to_rfc3339();
        let content_hash = content_digest(content);

        self.execute(
            "INSERT INTO pages (frontier_id, retrieved_at, content, transfer_encoding, content_hash)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![entry.id, now, content, transfer_encoding, content_hash],
        )?;

        Ok(PageRecord {
            id: self.last_insert_rowid(),
            frontier_id: entry.id,
            retrieved_at: now,
            content: content.to_vec(),
            transfer_encoding: transfer_encoding.map(str::to_string),
            content_hash,
        })
    }

    fn fetch_page(&self, page_id: i64) -> StorageResult<PageRecord> {
        let sql = format!("SELECT {} FROM pages WHERE id = ?1", PAGE_COLUMNS);
        self.query_row(&sql, params![page_id], page_from_row)
            .optional()?
            .ok_or(StorageError::NotFound {
                kind: "Page",
                id: page_id,
            })
    }

    fn pages_for_entry(&self, entry_id: i64) -> StorageResult<Vec<PageRecord>> {
        let sql = format!(
            "SELECT {} FROM pages WHERE frontier_id = ?1 ORDER BY id ASC",
            PAGE_COLUMNS
        );
        let mut stmt = self.prepare(&sql)?;
        let pages = stmt
            .query_map(params![entry_id], page_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(pages)
    }

    fn pages_with_hash(&self, content_hash: &str) -> StorageResult<Vec<i64>> {
        let mut stmt =
            self.prepare("SELECT id FROM pages WHERE content_hash = ?1 ORDER BY id ASC")?;
        let ids = stmt
            .query_map(params![content_hash], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    fn count_pages(&self) -> StorageResult<u64> {
        let count: i64 = self.query_row("SELECT COUNT(*) FROM pages", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Moebius database.
//! Nullable members of a dedup key are folded through `IFNULL` in expression
//! indexes so that NULL takes part in uniqueness.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Interned URL schemes
CREATE TABLE IF NOT EXISTS schemes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);

-- Interned (host, port) pairs; an absent port means the scheme default
CREATE TABLE IF NOT EXISTS authorities (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    host TEXT NOT NULL,
    port INTEGER
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_authorities_key
    ON authorities(host, IFNULL(port, -1));

-- Closed set of crawl statuses
CREATE TABLE IF NOT EXISTS crawl_statuses (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE
);

INSERT OR IGNORE INTO crawl_statuses (id, name) VALUES
    (1, 'New'),
    (2, 'Requested'),
    (3, 'Got'),
    (4, 'Ignored');

-- Every distinct canonical URL ever discovered
CREATE TABLE IF NOT EXISTS frontier (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    scheme_id INTEGER NOT NULL REFERENCES schemes(id),
    authority_id INTEGER REFERENCES authorities(id),
    path TEXT NOT NULL,
    params TEXT NOT NULL DEFAULT '',
    query TEXT NOT NULL DEFAULT '',
    fragment TEXT NOT NULL DEFAULT '',
    status_id INTEGER NOT NULL REFERENCES crawl_statuses(id),
    discovered_at TEXT NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_frontier_key
    ON frontier(scheme_id, IFNULL(authority_id, 0), path, params, query, fragment);
CREATE INDEX IF NOT EXISTS idx_frontier_status ON frontier(status_id, id);

-- Fetched content
CREATE TABLE IF NOT EXISTS pages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    frontier_id INTEGER NOT NULL REFERENCES frontier(id),
    retrieved_at TEXT NOT NULL,
    content BLOB NOT NULL,
    transfer_encoding TEXT,
    content_hash TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_pages_frontier ON pages(frontier_id);
CREATE INDEX IF NOT EXISTS idx_pages_hash ON pages(content_hash);
"#;

/// Initializes the database schema and seeds the crawl statuses
///
/// Safe to run against an already-initialized database.
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

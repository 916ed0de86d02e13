//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Skein database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track crawl runs
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL,
    pages_saved INTEGER NOT NULL DEFAULT 0,
    targets_discarded INTEGER NOT NULL DEFAULT 0
);

-- Fetched pages, one row per URL
CREATE TABLE IF NOT EXISTS pages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL UNIQUE,
    domain TEXT NOT NULL,
    title TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    content TEXT NOT NULL,
    content_hash TEXT NOT NULL,
    outbound_links TEXT NOT NULL,
    depth INTEGER NOT NULL,
    referrer TEXT,
    status_code INTEGER NOT NULL,
    last_modified TEXT,
    fetched_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_pages_domain ON pages(domain);
CREATE INDEX IF NOT EXISTS idx_pages_content_hash ON pages(content_hash);
CREATE INDEX IF NOT EXISTS idx_pages_depth ON pages(depth);

-- Directed link graph keyed by URL pair; page ids are filled in once known
CREATE TABLE IF NOT EXISTS links (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    from_url TEXT NOT NULL,
    to_url TEXT NOT NULL,
    from_page_id INTEGER REFERENCES pages(id),
    to_page_id INTEGER REFERENCES pages(id),
    anchor_text TEXT NOT NULL DEFAULT '',
    discovered_at TEXT NOT NULL,
    UNIQUE(from_url, to_url)
);

CREATE INDEX IF NOT EXISTS idx_links_from ON links(from_url);
CREATE INDEX IF NOT EXISTS idx_links_to ON links(to_url);

-- Every URL ever admitted to the frontier
CREATE TABLE IF NOT EXISTS visited_urls (
    url TEXT PRIMARY KEY,
    admitted_at TEXT NOT NULL
);

-- Admitted targets not yet finished by a worker, in admission order
CREATE TABLE IF NOT EXISTS frontier (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL UNIQUE,
    depth INTEGER NOT NULL,
    referrer TEXT
);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

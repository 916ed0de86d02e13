//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the [`Storage`] and
//! [`FrontierStore`] traits. The frontier and the workers each open their own
//! connection to the same database file; WAL mode plus a busy timeout lets
//! them write side by side.

use crate::crawler::CrawlTarget;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{FrontierStore, Storage, StorageError, StorageResult};
use crate::storage::{LinkRecord, NewPage, PageRecord, RunRecord, RunStatus};
use crate::SkeinError;
use chrono::Utc;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use url::Url;

/// How long a connection waits on a lock held by another connection
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const PAGE_COLUMNS: &str = "id, url, domain, title, description, content, content_hash, \
                            outbound_links, depth, referrer, status_code, last_modified, fetched_at";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Opens or creates the database at `path`
    pub fn new(path: &Path) -> Result<Self, SkeinError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

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

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> Result<Self, SkeinError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Runs raw SQL against the connection (for fault injection in tests)
    #[cfg(test)]
    pub(crate) fn execute_raw(&self, sql: &str) -> Result<(), rusqlite::Error> {
        self.conn.execute_batch(sql)
    }

    fn count(&self, sql: &str) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(sql, [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

fn page_from_row(row: &Row<'_>) -> rusqlite::Result<PageRecord> {
    let outbound_json: String = row.get(7)?;
    let outbound_links: Vec<String> = serde_json::from_str(&outbound_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(7, Type::Text, Box::new(e)))?;

    Ok(PageRecord {
        id: row.get(0)?,
        url: row.get(1)?,
        domain: row.get(2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        content: row.get(5)?,
        content_hash: row.get(6)?,
        outbound_links,
        depth: row.get(8)?,
        referrer: row.get(9)?,
        status_code: row.get(10)?,
        last_modified: row.get(11)?,
        fetched_at: row.get(12)?,
    })
}

fn link_from_row(row: &Row<'_>) -> rusqlite::Result<LinkRecord> {
    Ok(LinkRecord {
        from_url: row.get(0)?,
        to_url: row.get(1)?,
        from_page_id: row.get(2)?,
        to_page_id: row.get(3)?,
        anchor_text: row.get(4)?,
    })
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        config_hash: row.get(3)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(4)?)
            .unwrap_or(RunStatus::Failed),
        pages_saved: row.get::<_, i64>(5)? as u64,
        targets_discarded: row.get::<_, i64>(6)? as u64,
    })
}

impl Storage for SqliteStorage {
    // ===== Run Management =====

    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn finish_run(
        &mut self,
        run_id: i64,
        status: RunStatus,
        pages_saved: u64,
        targets_discarded: u64,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2, pages_saved = ?3,
             targets_discarded = ?4 WHERE id = ?5",
            params![
                status.to_db_string(),
                now,
                pages_saved as i64,
                targets_discarded as i64,
                run_id
            ],
        )?;
        Ok(())
    }

    fn latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let run = self
            .conn
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, status, pages_saved,
                 targets_discarded FROM runs ORDER BY id DESC LIMIT 1",
                [],
                run_from_row,
            )
            .optional()?;
        Ok(run)
    }

    // ===== Pages =====

    fn upsert_page(&mut self, page: &NewPage) -> StorageResult<i64> {
        let outbound = serde_json::to_string(&page.outbound_links)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        let tx = self.conn.transaction()?;

        // A re-save keeps the shallowest depth the URL was reached at
        tx.execute(
            "INSERT INTO pages (url, domain, title, description, content, content_hash,
             outbound_links, depth, referrer, status_code, last_modified, fetched_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
             ON CONFLICT(url) DO UPDATE SET
                domain = excluded.domain,
                title = excluded.title,
                description = excluded.description,
                content = excluded.content,
                content_hash = excluded.content_hash,
                outbound_links = excluded.outbound_links,
                depth = MIN(depth, excluded.depth),
                status_code = excluded.status_code,
                last_modified = excluded.last_modified,
                fetched_at = excluded.fetched_at",
            params![
                page.url,
                page.domain,
                page.title,
                page.description,
                page.content,
                page.content_hash,
                outbound,
                page.depth,
                page.referrer,
                page.status_code,
                page.last_modified,
                page.fetched_at.to_rfc3339(),
            ],
        )?;

        let page_id: i64 = tx.query_row(
            "SELECT id FROM pages WHERE url = ?1",
            params![page.url],
            |row| row.get(0),
        )?;

        // Backfill edges recorded before this page existed
        tx.execute(
            "UPDATE links SET from_page_id = ?1 WHERE from_url = ?2 AND from_page_id IS NULL",
            params![page_id, page.url],
        )?;
        tx.execute(
            "UPDATE links SET to_page_id = ?1 WHERE to_url = ?2 AND to_page_id IS NULL",
            params![page_id, page.url],
        )?;

        tx.commit()?;
        Ok(page_id)
    }

    fn page_id_by_url(&self, url: &str) -> StorageResult<Option<i64>> {
        let id = self
            .conn
            .query_row("SELECT id FROM pages WHERE url = ?1", params![url], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(id)
    }

    fn get_page_by_url(&self, url: &str) -> StorageResult<Option<PageRecord>> {
        let page = self
            .conn
            .query_row(
                &format!("SELECT {} FROM pages WHERE url = ?1", PAGE_COLUMNS),
                params![url],
                page_from_row,
            )
            .optional()?;
        Ok(page)
    }

    // ===== Links =====

    fn insert_link_if_absent(
        &mut self,
        from_url: &str,
        to_url: &str,
        anchor_text: &str,
    ) -> StorageResult<bool> {
        let now = Utc::now().to_rfc3339();
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO links
                (from_url, to_url, from_page_id, to_page_id, anchor_text, discovered_at)
             VALUES (?1, ?2,
                     (SELECT id FROM pages WHERE url = ?1),
                     (SELECT id FROM pages WHERE url = ?2),
                     ?3, ?4)",
            params![from_url, to_url, anchor_text, now],
        )?;
        Ok(inserted == 1)
    }

    fn get_outgoing_links(&self, from_url: &str) -> StorageResult<Vec<LinkRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT from_url, to_url, from_page_id, to_page_id, anchor_text FROM links
             WHERE from_url = ?1 ORDER BY id",
        )?;

        let links = stmt
            .query_map(params![from_url], link_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(links)
    }

    // ===== Statistics =====

    fn count_pages(&self) -> StorageResult<u64> {
        self.count("SELECT COUNT(*) FROM pages")
    }

    fn count_duplicate_content(&self) -> StorageResult<u64> {
        // Pages with no extracted content all hash alike and are not duplicates
        self.count(
            "SELECT COUNT(*) FROM pages WHERE content != '' AND content_hash IN
                (SELECT content_hash FROM pages WHERE content != ''
                 GROUP BY content_hash HAVING COUNT(*) > 1)",
        )
    }

    fn count_links(&self) -> StorageResult<u64> {
        self.count("SELECT COUNT(*) FROM links")
    }

    fn count_resolved_links(&self) -> StorageResult<u64> {
        self.count(
            "SELECT COUNT(*) FROM links WHERE from_page_id IS NOT NULL AND to_page_id IS NOT NULL",
        )
    }

    fn count_visited_urls(&self) -> StorageResult<u64> {
        self.count("SELECT COUNT(*) FROM visited_urls")
    }

    fn count_pending_targets(&self) -> StorageResult<u64> {
        self.count("SELECT COUNT(*) FROM frontier")
    }

    fn depth_breakdown(&self) -> StorageResult<BTreeMap<u32, u64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT depth, COUNT(*) FROM pages GROUP BY depth ORDER BY depth")?;

        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, u32>(0)?, row.get::<_, i64>(1)? as u64))
        })?;

        let mut breakdown = BTreeMap::new();
        for row in rows {
            let (depth, count) = row?;
            breakdown.insert(depth, count);
        }

        Ok(breakdown)
    }
}

impl FrontierStore for SqliteStorage {
    fn admit(&mut self, target: &CrawlTarget) -> StorageResult<bool> {
        let now = Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;

        let inserted = tx.execute(
            "INSERT OR IGNORE INTO visited_urls (url, admitted_at) VALUES (?1, ?2)",
            params![target.url.as_str(), now],
        )?;

        if inserted == 1 {
            tx.execute(
                "INSERT OR IGNORE INTO frontier (url, depth, referrer) VALUES (?1, ?2, ?3)",
                params![
                    target.url.as_str(),
                    target.depth,
                    target.referrer.as_ref().map(Url::as_str),
                ],
            )?;
        }

        tx.commit()?;
        Ok(inserted == 1)
    }

    fn complete(&mut self, url: &str) -> StorageResult<()> {
        self.conn
            .execute("DELETE FROM frontier WHERE url = ?1", params![url])?;
        Ok(())
    }

    fn pending(&self) -> StorageResult<Vec<CrawlTarget>> {
        let mut stmt = self
            .conn
            .prepare("SELECT url, depth, referrer FROM frontier ORDER BY seq ASC")?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, u32>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(url, depth, referrer)| {
                let url = Url::parse(&url)
                    .map_err(|e| StorageError::InvalidRecord(format!("frontier url {}: {}", url, e)))?;
                let referrer = referrer.and_then(|r| Url::parse(&r).ok());
                Ok(CrawlTarget {
                    url,
                    depth,
                    referrer,
                })
            })
            .collect()
    }

    fn clear(&mut self) -> StorageResult<()> {
        self.conn
            .execute_batch("DELETE FROM frontier; DELETE FROM visited_urls;")?;
        Ok(())
    }
}

//! SQLite-backed result store.
//!
//! Each result is one row: indexed columns for lookup plus the full
//! `PipelineResult` as JSON.

use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use docsift_core::{Error, PipelineResult, Result};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};
use uuid::Uuid;

use crate::repository::{ResultRepository, StoredResult};
use crate::schema::SCHEMA_SQL;

const SELECT_COLUMNS: &str = "SELECT id, created_at, result_json FROM results";

pub struct SqliteResultStore {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl SqliteResultStore {
    /// Open or create the store. The file will be `db_dir/docsift.db`.
    pub fn open(db_dir: impl AsRef<Path>) -> Result<Self> {
        let db_dir = db_dir.as_ref();
        std::fs::create_dir_all(db_dir).map_err(|e| Error::Storage(e.to_string()))?;
        let db_path = db_dir.join("docsift.db");

        let conn = Self::create_connection(&db_path)?;
        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| Error::Database(format!("Schema init failed: {}", e)))?;

        let store = Self {
            conn: Mutex::new(conn),
            db_path,
        };
        info!(
            "SqliteResultStore initialized: {} results, path={}",
            store.count()?,
            store.db_path.display()
        );
        Ok(store)
    }

    /// In-memory database, mostly for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| Error::Database(e.to_string()))?;
        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| Error::Database(format!("Schema init failed: {}", e)))?;
        Ok(Self {
            conn: Mutex::new(conn),
            db_path: PathBuf::from(":memory:"),
        })
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn create_connection(db_path: &Path) -> Result<Connection> {
        let conn = Connection::open(db_path).map_err(|e| Error::Database(e.to_string()))?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )
        .map_err(|e| Error::Database(e.to_string()))?;
        Ok(conn)
    }

    fn row_to_raw(row: &rusqlite::Row<'_>) -> rusqlite::Result<(String, String, String)> {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?))
    }

    fn decode((id, created_at, json): (String, String, String)) -> Result<StoredResult> {
        let id = Uuid::parse_str(&id).map_err(|e| Error::Storage(format!("bad id {}: {}", id, e)))?;
        let created_at = DateTime::parse_from_rfc3339(&created_at)
            .map_err(|e| Error::Storage(format!("bad timestamp {}: {}", created_at, e)))?
            .with_timezone(&Utc);
        let result: PipelineResult = serde_json::from_str(&json)?;
        Ok(StoredResult {
            id,
            created_at,
            result,
        })
    }

    fn query(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<StoredResult>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(sql)
            .map_err(|e| Error::Database(e.to_string()))?;
        let rows = stmt
            .query_map(params, Self::row_to_raw)
            .map_err(|e| Error::Database(e.to_string()))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::Database(e.to_string()))?;
        rows.into_iter().map(Self::decode).collect()
    }
}

impl ResultRepository for SqliteResultStore {
    fn save(&self, result: &PipelineResult) -> Result<StoredResult> {
        let stored = StoredResult::new(result.clone());
        let json = serde_json::to_string(&stored.result)?;
        let conn = self.conn.lock();
        conn.prepare_cached(
            "INSERT INTO results (id, content_hash, filename, document_type, success, result_json, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .map_err(|e| Error::Database(e.to_string()))?
        .execute(params![
            stored.id.to_string(),
            result.content_hash,
            result.filename,
            result.document_type.as_str(),
            result.success,
            json,
            stored.created_at.to_rfc3339_opts(SecondsFormat::Nanos, true),
        ])
        .map_err(|e| Error::Database(e.to_string()))?;
        debug!("Stored result {} for {}", stored.id, result.filename);
        Ok(stored)
    }

    fn get(&self, id: &Uuid) -> Result<Option<StoredResult>> {
        let raw = {
            let conn = self.conn.lock();
            let sql = format!("{} WHERE id = ?1", SELECT_COLUMNS);
            let row = conn
                .prepare_cached(&sql)
                .map_err(|e| Error::Database(e.to_string()))?
                .query_row(params![id.to_string()], Self::row_to_raw)
                .optional()
                .map_err(|e| Error::Database(e.to_string()))?;
            row
        };
        raw.map(Self::decode).transpose()
    }

    fn find_by_hash(&self, content_hash: &str) -> Result<Option<StoredResult>> {
        let sql = format!(
            "{} WHERE content_hash = ?1 ORDER BY created_at DESC, rowid DESC LIMIT 1",
            SELECT_COLUMNS
        );
        Ok(self.query(&sql, params![content_hash])?.into_iter().next())
    }

    fn list(&self, limit: usize, offset: usize) -> Result<Vec<StoredResult>> {
        let sql = format!(
            "{} ORDER BY created_at DESC, rowid DESC LIMIT ?1 OFFSET ?2",
            SELECT_COLUMNS
        );
        self.query(&sql, params![limit as i64, offset as i64])
    }

    fn count(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM results", [], |row| row.get(0))
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(count as usize)
    }

    fn delete(&self, id: &Uuid) -> Result<bool> {
        let conn = self.conn.lock();
        let count = conn
            .execute("DELETE FROM results WHERE id = ?1", params![id.to_string()])
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(count > 0)
    }
}

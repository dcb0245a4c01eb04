//! SQLite-backed scan history

use parking_lot::Mutex;
use rusqlite::{params, Connection};
use std::path::Path;
use tracing::debug;

use super::{HistoryStore, SessionRecord};
use crate::catalog::{ReferenceIngredient, ScanMode};
use crate::error::{Result, ScanError};

/// Scan history stored in a SQLite database
pub struct SqliteHistory {
    conn: Mutex<Connection>,
}

impl SqliteHistory {
    /// Open or create database at path
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let history = Self {
            conn: Mutex::new(conn),
        };
        history.init_schema()?;
        debug!("Opened scan history at {:?}", path);
        Ok(history)
    }

    /// Open a throwaway in-memory database
    pub fn open_in_memory() -> Result<Self> {
        let history = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        history.init_schema()?;
        Ok(history)
    }

    /// Create tables if they do not exist
    fn init_schema(&self) -> Result<()> {
        self.conn.lock().execute_batch(
            "CREATE TABLE IF NOT EXISTS scan_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                product_name TEXT NOT NULL,
                timestamp_ms INTEGER NOT NULL,
                is_clean INTEGER NOT NULL,
                matched_ingredients TEXT NOT NULL,
                category TEXT NOT NULL DEFAULT 'FOOD'
            );
            CREATE INDEX IF NOT EXISTS idx_scan_history_timestamp
                ON scan_history (timestamp_ms DESC);",
        )?;
        Ok(())
    }

    /// Most recent records first
    pub fn recent(&self, limit: usize) -> Result<Vec<SessionRecord>> {
        self.select(None, Some(limit))
    }

    /// Most recent records of one category and/or matching a search query
    ///
    /// `catalog` supplies localized ingredient names for the query; see
    /// [`SessionRecord::matches_query`].
    pub fn recent_filtered(
        &self,
        limit: usize,
        category: Option<ScanMode>,
        query: Option<&str>,
        catalog: &[ReferenceIngredient],
    ) -> Result<Vec<SessionRecord>> {
        let query = query.map(str::trim).filter(|q| !q.is_empty());
        let Some(query) = query else {
            return self.select(category, Some(limit));
        };

        let records = self.select(category, None)?;
        Ok(records
            .into_iter()
            .filter(|record| record.matches_query(query, catalog))
            .take(limit)
            .collect())
    }

    fn select(
        &self,
        category: Option<ScanMode>,
        limit: Option<usize>,
    ) -> Result<Vec<SessionRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT product_name, timestamp_ms, is_clean, matched_ingredients, category
             FROM scan_history
             WHERE ?1 IS NULL OR category = ?1
             ORDER BY timestamp_ms DESC, id DESC
             LIMIT ?2",
        )?;

        // SQLite treats a negative limit as unbounded
        let limit = limit.map_or(-1, |limit| limit as i64);
        let category = category.map(ScanMode::category);
        let rows = stmt.query_map(params![category, limit], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, bool>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (product_name, timestamp_ms, is_clean, matched_json, category) = row?;
            records.push(SessionRecord {
                product_name,
                timestamp_ms,
                is_clean,
                matched_ingredients: serde_json::from_str(&matched_json)?,
                category,
            });
        }
        Ok(records)
    }

    /// Delete every record
    pub fn clear(&self) -> Result<usize> {
        Ok(self.conn.lock().execute("DELETE FROM scan_history", [])?)
    }
}

impl HistoryStore for SqliteHistory {
    fn save(&self, record: &SessionRecord) -> Result<()> {
        let matched_json = serde_json::to_string(&record.matched_ingredients)?;
        self.conn
            .lock()
            .execute(
                "INSERT INTO scan_history
                    (product_name, timestamp_ms, is_clean, matched_ingredients, category)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    record.product_name,
                    record.timestamp_ms,
                    record.is_clean,
                    matched_json,
                    record.category
                ],
            )
            .map_err(|e| ScanError::Persistence(e.to_string()))?;
        Ok(())
    }
}

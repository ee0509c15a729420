//! SQLite history store behind an r2d2 pool.

use crate::domain::error::ScalpwatchError;
use crate::domain::history::{HistoryPage, HistoryQuery, HistoryResult, SignalHistoryRecord};
use crate::ports::history_port::HistoryPort;
use chrono::{DateTime, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use std::path::Path;

pub struct SqliteHistoryAdapter {
    pool: Pool<SqliteConnectionManager>,
}

fn db_err(e: r2d2::Error) -> ScalpwatchError {
    ScalpwatchError::Database {
        reason: e.to_string(),
    }
}

fn query_err(e: rusqlite::Error) -> ScalpwatchError {
    ScalpwatchError::DatabaseQuery {
        reason: e.to_string(),
    }
}

fn conversion_err(column: usize, reason: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        column,
        rusqlite::types::Type::Text,
        reason.into(),
    )
}

impl SqliteHistoryAdapter {
    /// Open (or create) the database file and make sure the schema exists.
    pub fn open<P: AsRef<Path>>(path: P, pool_size: u32) -> Result<Self, ScalpwatchError> {
        let manager = SqliteConnectionManager::file(path.as_ref());
        let pool = Pool::builder()
            .max_size(pool_size.max(1))
            .build(manager)
            .map_err(db_err)?;
        let adapter = Self { pool };
        adapter.initialize_schema()?;
        Ok(adapter)
    }

    pub fn in_memory() -> Result<Self, ScalpwatchError> {
        // Every in-memory connection is its own database, so keep just one.
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder().max_size(1).build(manager).map_err(db_err)?;
        let adapter = Self { pool };
        adapter.initialize_schema()?;
        Ok(adapter)
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, ScalpwatchError> {
        self.pool.get().map_err(db_err)
    }

    pub fn initialize_schema(&self) -> Result<(), ScalpwatchError> {
        self.conn()?
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS signal_history (
                    id INTEGER PRIMARY KEY,
                    ts_ms INTEGER NOT NULL,
                    signal_name TEXT NOT NULL,
                    signal_value REAL NOT NULL,
                    score REAL NOT NULL,
                    open_price REAL,
                    close_price REAL,
                    event TEXT NOT NULL,
                    result TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_signal_history_ts ON signal_history(ts_ms);",
            )
            .map_err(query_err)
    }

    fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<SignalHistoryRecord> {
        let id: i64 = row.get(0)?;
        let ts_ms: i64 = row.get(1)?;
        let timestamp = DateTime::<Utc>::from_timestamp_millis(ts_ms)
            .ok_or_else(|| conversion_err(1, format!("timestamp out of range: {}", ts_ms)))?;
        let event: String = row.get(7)?;
        let result: String = row.get(8)?;
        Ok(SignalHistoryRecord {
            id: id as u64,
            timestamp,
            signal_name: row.get(2)?,
            signal_value: row.get(3)?,
            score: row.get(4)?,
            open_price: row.get(5)?,
            close_price: row.get(6)?,
            event: event.parse().map_err(|e| conversion_err(7, e))?,
            result: result.parse().map_err(|e| conversion_err(8, e))?,
        })
    }
}

impl HistoryPort for SqliteHistoryAdapter {
    fn append(&self, record: &SignalHistoryRecord) -> Result<(), ScalpwatchError> {
        self.conn()?
            .execute(
                "INSERT OR IGNORE INTO signal_history
                 (id, ts_ms, signal_name, signal_value, score, open_price, close_price, event, result)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    record.id as i64,
                    record.timestamp.timestamp_millis(),
                    record.signal_name,
                    record.signal_value,
                    record.score,
                    record.open_price,
                    record.close_price,
                    record.event.as_str(),
                    record.result.as_str(),
                ],
            )
            .map_err(query_err)?;
        Ok(())
    }

    fn finalize(
        &self,
        id: u64,
        result: HistoryResult,
        close_price: Option<f64>,
    ) -> Result<bool, ScalpwatchError> {
        let changed = self
            .conn()?
            .execute(
                "UPDATE signal_history SET result = ?1, close_price = ?2
                 WHERE id = ?3 AND result = 'pending'",
                params![result.as_str(), close_price, id as i64],
            )
            .map_err(query_err)?;
        Ok(changed > 0)
    }

    fn query(&self, query: &HistoryQuery) -> Result<HistoryPage, ScalpwatchError> {
        let conn = self.conn()?;
        let from = query.from.map(|t| t.timestamp_millis()).unwrap_or(i64::MIN);
        let to = query.to.map(|t| t.timestamp_millis()).unwrap_or(i64::MAX);
        let fetch = query.limit.saturating_add(1).min(i64::MAX as usize) as i64;
        let offset = query.offset.min(i64::MAX as usize) as i64;

        let mut stmt = conn
            .prepare(
                "SELECT id, ts_ms, signal_name, signal_value, score, open_price, close_price, event, result
                 FROM signal_history
                 WHERE ts_ms >= ?1 AND ts_ms <= ?2
                 ORDER BY ts_ms DESC, id DESC
                 LIMIT ?3 OFFSET ?4",
            )
            .map_err(query_err)?;

        let rows = stmt
            .query_map(params![from, to, fetch, offset], Self::row_to_record)
            .map_err(query_err)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row.map_err(query_err)?);
        }
        let has_more = records.len() > query.limit;
        records.truncate(query.limit);
        Ok(HistoryPage { records, has_more })
    }

    fn max_id(&self) -> Result<Option<u64>, ScalpwatchError> {
        let max: Option<i64> = self
            .conn()?
            .query_row("SELECT MAX(id) FROM signal_history", [], |row| row.get(0))
            .map_err(query_err)?;
        Ok(max.map(|id| id as u64))
    }
}

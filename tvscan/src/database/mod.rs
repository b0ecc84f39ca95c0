//! SQLite channel store.
//!
//! This module keeps:
//! - Satellite/LNB settings of satellite scans
//! - Locked transponders and their services, with audio/subtitle/teletext tracks
//! - Final channel numbering
//! - Scan history

mod channels;
mod models;
mod schema;

pub use models::*;

use rusqlite::{Connection, Result as SqliteResult};
use std::path::Path;
use thiserror::Error;
use tvscan_protocol::ScanError;

/// Database error types.
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("Database path error: {0}")]
    PathError(String),
}

impl From<DatabaseError> for ScanError {
    fn from(e: DatabaseError) -> Self {
        ScanError::Store(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DatabaseError>;

/// Main database connection wrapper.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open or create a database at the specified path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| DatabaseError::PathError(format!("{}: {}", parent.display(), e)))?;
        }

        let conn = Connection::open(path)?;

        // Enable foreign keys
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        let db = Self { conn };
        db.initialize_schema()?;

        Ok(db)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        let db = Self { conn };
        db.initialize_schema()?;

        Ok(db)
    }

    fn initialize_schema(&self) -> Result<()> {
        self.conn.execute_batch(schema::SCHEMA_SQL)?;
        self.apply_migrations()?;
        Ok(())
    }

    /// Add a column to a table if it doesn't exist.
    fn add_column_if_not_exists(&self, table: &str, column: &str, column_type: &str) -> Result<()> {
        let mut stmt = self.conn.prepare(&format!("PRAGMA table_info({})", table))?;
        let column_exists = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .filter_map(|r| r.ok())
            .any(|name| name == column);

        if !column_exists {
            let sql = format!("ALTER TABLE {} ADD COLUMN {} {}", table, column, column_type);
            self.conn.execute(&sql, [])?;
            log::info!("Migration: Added column {} to table {}", column, table);
        }

        Ok(())
    }

    /// Columns added after the first schema version.
    fn apply_migrations(&self) -> Result<()> {
        self.add_column_if_not_exists("services", "hide_guide", "INTEGER DEFAULT 0")?;
        self.add_column_if_not_exists("sat_paras", "unicable_user_band", "INTEGER")?;
        self.add_column_if_not_exists("sat_paras", "unicable_band_freq", "INTEGER")?;
        Ok(())
    }

    /// Get the underlying connection (for advanced queries).
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Begin a transaction.
    pub fn transaction(&mut self) -> SqliteResult<rusqlite::Transaction<'_>> {
        self.conn.transaction()
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_in_memory() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.connection().is_autocommit());
    }

    #[test]
    fn test_schema_creation() {
        let db = Database::open_in_memory().unwrap();

        let count: i32 = db
            .connection()
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name IN ('sat_paras', 'transponders', 'services', 'service_audios', 'service_subtitles', 'service_teletexts', 'scan_history')",
                [],
                |row| row.get(0),
            )
            .unwrap();

        assert_eq!(count, 7);
    }

    #[test]
    fn test_migrations_are_repeatable() {
        let db = Database::open_in_memory().unwrap();
        db.apply_migrations().unwrap();
        db.add_column_if_not_exists("services", "favourite", "INTEGER DEFAULT 0")
            .unwrap();
        db.add_column_if_not_exists("services", "favourite", "INTEGER DEFAULT 0")
            .unwrap();
    }

    #[test]
    fn test_store_error_maps_to_scan_error() {
        let err: ScanError = DatabaseError::PathError("/nonexistent".to_string()).into();
        assert!(matches!(err, ScanError::Store(msg) if msg.contains("/nonexistent")));
    }
}

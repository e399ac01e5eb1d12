//! SQLite adapter for bot, version and run records.
//!
//! The run store proper is an external collaborator; this adapter exists so
//! the pipeline orchestrator has something concrete to read from and write
//! back to. All operations go through `tokio::task::spawn_blocking`.

use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::error::EngineError;

/// Thread-safe handle to the SQLite database.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) a SQLite database at the given path.
    pub fn open(db_path: &str) -> Result<Self, EngineError> {
        let path = Path::new(db_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let conn = Connection::open(db_path)
            .map_err(|e| EngineError::Database(format!("Failed to open database: {}", e)))?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .map_err(|e| EngineError::Database(format!("Failed to set pragmas: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.initialize_tables()?;

        tracing::info!("SQLite database opened at: {}", db_path);
        Ok(db)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self, EngineError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| EngineError::Database(format!("Failed to open in-memory db: {}", e)))?;

        conn.execute_batch("PRAGMA foreign_keys=ON;")
            .map_err(|e| EngineError::Database(format!("Failed to set pragmas: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.initialize_tables()?;
        Ok(db)
    }

    /// Execute a closure with access to the database connection.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, EngineError>
    where
        F: FnOnce(&Connection) -> Result<T, rusqlite::Error>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| EngineError::Database(format!("Lock poisoned: {}", e)))?;
        f(&conn).map_err(|e| EngineError::Database(e.to_string()))
    }

    /// Execute a closure with access to the database connection (async-friendly).
    pub async fn with_conn_async<F, T>(&self, f: F) -> Result<T, EngineError>
    where
        F: FnOnce(&Connection) -> Result<T, rusqlite::Error> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || db.with_conn(f))
            .await
            .map_err(|e| EngineError::Internal(format!("Task join error: {}", e)))?
    }

    /// Run raw SQL statements (migrations, fixtures, legacy schema tests).
    pub fn execute_batch(&self, sql: &str) -> Result<(), EngineError> {
        self.with_conn(|conn| conn.execute_batch(sql))
    }

    /// Create all tables if they don't exist.
    fn initialize_tables(&self) -> Result<(), EngineError> {
        self.with_conn(|conn| {
            conn.execute_batch(
                "
                CREATE TABLE IF NOT EXISTS bots (
                    id              TEXT PRIMARY KEY,
                    name            TEXT NOT NULL,
                    capabilities    TEXT NOT NULL DEFAULT '[]',
                    manifest        TEXT,
                    system_prompt   TEXT,
                    memory_strategy TEXT,
                    version_id      TEXT,
                    created_at      INTEGER NOT NULL,
                    updated_at      INTEGER NOT NULL
                );

                CREATE TABLE IF NOT EXISTS bot_versions (
                    id              TEXT PRIMARY KEY,
                    bot_id          TEXT NOT NULL REFERENCES bots(id) ON DELETE CASCADE,
                    capabilities    TEXT,
                    manifest        TEXT,
                    system_prompt   TEXT,
                    memory_strategy TEXT,
                    created_at      INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_bot_versions_bot ON bot_versions(bot_id);

                CREATE TABLE IF NOT EXISTS runs (
                    id              TEXT PRIMARY KEY,
                    bot_id          TEXT NOT NULL REFERENCES bots(id) ON DELETE CASCADE,
                    version_id      TEXT,
                    triggered_by    TEXT,
                    status          TEXT NOT NULL DEFAULT 'queued',
                    steps           TEXT NOT NULL DEFAULT '[]',
                    output          TEXT,
                    transcript      TEXT,
                    created_at      INTEGER NOT NULL,
                    started_at      INTEGER,
                    finished_at     INTEGER
                );
                CREATE INDEX IF NOT EXISTS idx_runs_bot ON runs(bot_id);
                ",
            )?;
            Ok(())
        })
    }
}

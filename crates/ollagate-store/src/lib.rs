//! Durable queue and rate-limit storage.
//!
//! Single-file SQLite database holding the download queue and the per-IP
//! daily request counters. Connections are shared behind a mutex; every
//! operation runs its own short transaction.

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::info;

mod model;
mod queue;
mod rate_limit;

pub use model::{EnqueueOutcome, HubSpec, QueueEntry, QueueKind, QueueStatus, RecentEntry};
pub use queue::{QueueStore, StatusCounts, StatusReport};
pub use rate_limit::RateLimiter;

/// Shared handle to the SQLite database.
#[derive(Clone)]
pub struct Db {
    conn: Arc<Mutex<Connection>>,
}

impl Db {
    /// Open (or create) the database at `path` and ensure the schema exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create database directory {}", parent.display())
                })?;
            }
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database at {}", path.display()))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.init_schema()?;
        info!("Database initialized at {}", path.display());
        Ok(db)
    }

    /// In-memory database for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.lock();

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS queue (
                 id INTEGER PRIMARY KEY AUTOINCREMENT,
                 model TEXT NOT NULL,
                 kind TEXT DEFAULT 'native',
                 requester_ip TEXT NOT NULL,
                 status TEXT DEFAULT 'pending',
                 error TEXT,
                 created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                 updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
             );
             CREATE TABLE IF NOT EXISTS rate_limits (
                 id INTEGER PRIMARY KEY AUTOINCREMENT,
                 ip_address TEXT NOT NULL,
                 request_date DATE NOT NULL,
                 request_count INTEGER DEFAULT 1,
                 UNIQUE(ip_address, request_date)
             );
             CREATE INDEX IF NOT EXISTS idx_queue_status ON queue(status);
             CREATE INDEX IF NOT EXISTS idx_queue_model ON queue(model);
             CREATE INDEX IF NOT EXISTS idx_rate_limits_ip_date
                 ON rate_limits(ip_address, request_date);",
        )
        .context("Failed to create database schema")?;

        // Forward-compatible migration: databases created before the hub
        // queue existed lack the kind column.
        let mut has_kind = false;
        {
            let mut stmt = conn.prepare("PRAGMA table_info(queue)")?;
            let mut rows = stmt.query([])?;
            while let Some(row) = rows.next()? {
                let name: String = row.get(1)?;
                if name == "kind" {
                    has_kind = true;
                }
            }
        }
        if !has_kind {
            conn.execute("ALTER TABLE queue ADD COLUMN kind TEXT DEFAULT 'native'", [])?;
            info!("Added 'kind' column to queue table");
        }

        Ok(())
    }

    /// Cheap liveness probe used by the health endpoint.
    pub fn ping(&self) -> Result<()> {
        let conn = self.lock();
        conn.query_row("SELECT 1", [], |_| Ok(()))
            .context("Database ping failed")?;
        Ok(())
    }

    pub(crate) fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        // A poisoned mutex means a panic mid-statement; the connection
        // itself is still usable for independent operations.
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

//! Download queue operations.
//!
//! The queue is append-mostly: rows are created by the gateway, claimed and
//! resolved by the worker, and only removed by the retention sweep or an
//! explicit admin delete. Ordering is FIFO by creation time, ties by id.

use crate::model::{EnqueueOutcome, QueueEntry, QueueKind, QueueStatus, RecentEntry};
use crate::Db;
use anyhow::{Context, Result};
use rusqlite::{params, Row};
use serde::Serialize;
use std::collections::HashSet;
use tracing::info;

const ACTIVE_LIMIT: usize = 50;
const RECENT_LIMIT: usize = 10;

/// Counts by lifecycle state.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct StatusCounts {
    pub pending: u32,
    pub downloading: u32,
    pub completed: u32,
    pub failed: u32,
}

/// Snapshot returned by `GET /api/queue`.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub counts: StatusCounts,
    pub queue: Vec<QueueEntry>,
    pub recent: Vec<RecentEntry>,
}

#[derive(Clone)]
pub struct QueueStore {
    db: Db,
}

impl QueueStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Add a model to the queue unless an identical pending request exists.
    ///
    /// Deduplication is per `(model, kind)`; quota accounting is the
    /// caller's concern.
    pub fn enqueue(
        &self,
        model: &str,
        kind: QueueKind,
        requester_ip: &str,
    ) -> Result<EnqueueOutcome> {
        let conn = self.db.lock();

        let pending: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM queue WHERE model = ?1 AND kind = ?2 AND status = 'pending'",
                params![model, kind.as_str()],
                |row| row.get(0),
            )
            .context("Failed to check for duplicate queue entry")?;
        if pending > 0 {
            return Ok(EnqueueOutcome::AlreadyQueued);
        }

        conn.execute(
            "INSERT INTO queue (model, kind, requester_ip, status) VALUES (?1, ?2, ?3, 'pending')",
            params![model, kind.as_str(), requester_ip],
        )
        .context("Failed to insert queue entry")?;
        let id = conn.last_insert_rowid();

        info!("Queued model {} (id={}) from {}", model, id, requester_ip);
        Ok(EnqueueOutcome::Queued { id })
    }

    /// Queue snapshot: counts, active rows (FIFO, capped), recent terminal rows.
    pub fn status(&self) -> Result<StatusReport> {
        let conn = self.db.lock();

        let mut counts = StatusCounts::default();
        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM queue GROUP BY status")?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let status: String = row.get(0)?;
            let count: u32 = row.get(1)?;
            match QueueStatus::parse(&status) {
                QueueStatus::Pending => counts.pending = count,
                QueueStatus::Downloading => counts.downloading = count,
                QueueStatus::Completed => counts.completed = count,
                QueueStatus::Failed => counts.failed = count,
            }
        }

        let mut stmt = conn.prepare(
            "SELECT id, model, kind, requester_ip, status, error, created_at, updated_at
             FROM queue
             WHERE status IN ('pending', 'downloading')
             ORDER BY created_at ASC, id ASC
             LIMIT ?1",
        )?;
        let queue = stmt
            .query_map(params![ACTIVE_LIMIT as i64], entry_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut stmt = conn.prepare(
            "SELECT id, model, status, error, updated_at
             FROM queue
             WHERE status IN ('completed', 'failed')
             ORDER BY updated_at DESC, id DESC
             LIMIT ?1",
        )?;
        let recent = stmt
            .query_map(params![RECENT_LIMIT as i64], |row| {
                Ok(RecentEntry {
                    id: row.get(0)?,
                    model: row.get(1)?,
                    status: QueueStatus::parse(&row.get::<_, String>(2)?),
                    error: row.get(3)?,
                    updated_at: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(StatusReport {
            counts,
            queue,
            recent,
        })
    }

    /// All pending rows, oldest first. Used for the merged catalog view.
    pub fn pending_entries(&self) -> Result<Vec<QueueEntry>> {
        let conn = self.db.lock();
        let mut stmt = conn.prepare(
            "SELECT id, model, kind, requester_ip, status, error, created_at, updated_at
             FROM queue WHERE status = 'pending'
             ORDER BY created_at ASC, id ASC",
        )?;
        let entries = stmt
            .query_map([], entry_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    /// Whether a pending hub row for `repo_id` exists, regardless of how
    /// the request was encoded (bare id or JSON object).
    pub fn pending_hub_repo_exists(&self, repo_id: &str) -> Result<bool> {
        let pending = self.pending_entries()?;
        Ok(pending.iter().any(|entry| {
            entry.kind == QueueKind::Hub && crate::HubSpec::parse(&entry.model).repo_id == repo_id
        }))
    }

    /// Remove pending rows for `model`. Rows already downloading or in a
    /// terminal state are left alone.
    pub fn delete_pending(&self, model: &str) -> Result<usize> {
        let conn = self.db.lock();
        let removed = conn
            .execute(
                "DELETE FROM queue WHERE model = ?1 AND status = 'pending'",
                params![model],
            )
            .context("Failed to delete queue entry")?;
        if removed > 0 {
            info!("Removed {} from queue", model);
        }
        Ok(removed)
    }

    /// Claim the oldest pending row for processing.
    ///
    /// The transition is a conditional update on the specific id, so two
    /// workers can never own the same row.
    pub fn claim_next(&self) -> Result<Option<QueueEntry>> {
        let conn = self.db.lock();

        let candidate = conn
            .query_row(
                "SELECT id, model, kind, requester_ip, status, error, created_at, updated_at
                 FROM queue WHERE status = 'pending'
                 ORDER BY created_at ASC, id ASC
                 LIMIT 1",
                [],
                entry_from_row,
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;

        let Some(mut entry) = candidate else {
            return Ok(None);
        };

        let claimed = conn.execute(
            "UPDATE queue SET status = 'downloading', updated_at = datetime('now')
             WHERE id = ?1 AND status = 'pending'",
            params![entry.id],
        )?;
        if claimed == 0 {
            return Ok(None);
        }

        entry.status = QueueStatus::Downloading;
        Ok(Some(entry))
    }

    pub fn mark_completed(&self, id: i64) -> Result<()> {
        let conn = self.db.lock();
        conn.execute(
            "UPDATE queue SET status = 'completed', error = NULL, updated_at = datetime('now')
             WHERE id = ?1",
            params![id],
        )?;
        Ok(())
    }

    pub fn mark_failed(&self, id: i64, error: &str) -> Result<()> {
        let conn = self.db.lock();
        conn.execute(
            "UPDATE queue SET status = 'failed', error = ?2, updated_at = datetime('now')
             WHERE id = ?1",
            params![id, error],
        )?;
        Ok(())
    }

    /// Reset rows left in `downloading` by an interrupted previous run.
    pub fn recover_orphans(&self) -> Result<usize> {
        let conn = self.db.lock();
        let count = conn.execute(
            "UPDATE queue SET status = 'pending', updated_at = datetime('now')
             WHERE status = 'downloading'",
            [],
        )?;
        if count > 0 {
            info!("Reset {} orphaned 'downloading' entries to 'pending'", count);
        }
        Ok(count)
    }

    /// Delete terminal rows older than the retention window.
    pub fn sweep_retention(&self, days: u32) -> Result<usize> {
        let conn = self.db.lock();
        let cutoff = format!("-{} days", days);
        let count = conn.execute(
            "DELETE FROM queue
             WHERE status IN ('completed', 'failed')
             AND updated_at < datetime('now', ?1)",
            params![cutoff],
        )?;
        if count > 0 {
            info!("Cleaned up {} old entries (older than {} days)", count, days);
        }
        Ok(count)
    }

    /// Reset completed rows whose subject is no longer in the backend
    /// catalog, so they get re-downloaded.
    pub fn reconcile_completed(&self, catalog: &HashSet<String>) -> Result<usize> {
        let completed = {
            let conn = self.db.lock();
            let mut stmt = conn.prepare(
                "SELECT id, model, kind, requester_ip, status, error, created_at, updated_at
                 FROM queue WHERE status = 'completed'",
            )?;
            let rows = stmt
                .query_map([], entry_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };

        let orphaned: Vec<i64> = completed
            .iter()
            .filter(|entry| !entry.subject_names().iter().any(|n| catalog.contains(n)))
            .map(|entry| {
                info!(
                    "Model '{}' marked completed but not found in backend",
                    entry.model
                );
                entry.id
            })
            .collect();

        if orphaned.is_empty() {
            return Ok(0);
        }

        let conn = self.db.lock();
        for id in &orphaned {
            conn.execute(
                "UPDATE queue SET status = 'pending', updated_at = datetime('now') WHERE id = ?1",
                params![id],
            )?;
        }
        info!(
            "Reset {} orphaned 'completed' entries to 'pending'",
            orphaned.len()
        );
        Ok(orphaned.len())
    }
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<QueueEntry> {
    Ok(QueueEntry {
        id: row.get(0)?,
        model: row.get(1)?,
        kind: QueueKind::parse(&row.get::<_, Option<String>>(2)?.unwrap_or_default()),
        requester_ip: row.get(3)?,
        status: QueueStatus::parse(&row.get::<_, String>(4)?),
        error: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

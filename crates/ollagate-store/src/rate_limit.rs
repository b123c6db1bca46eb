//! Per-IP daily request counters.
//!
//! Counters are keyed on `(ip, date)` and only ever incremented; stale rows
//! age out with the calendar. The increment is a single upsert statement so
//! concurrent requests cannot double-credit a slot.

use crate::Db;
use anyhow::{Context, Result};
use rusqlite::params;

#[derive(Clone)]
pub struct RateLimiter {
    db: Db,
    limit: u32,
}

impl RateLimiter {
    pub fn new(db: Db, limit: u32) -> Self {
        Self { db, limit }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Whether `ip` may make another request today, and how many remain.
    pub fn check(&self, ip: &str) -> Result<(bool, u32)> {
        let today = today();
        let conn = self.db.lock();

        let count: u32 = conn
            .query_row(
                "SELECT request_count FROM rate_limits
                 WHERE ip_address = ?1 AND request_date = ?2",
                params![ip, today],
                |row| row.get(0),
            )
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(0),
                other => Err(other),
            })
            .context("Failed to read rate limit counter")?;

        let remaining = self.limit.saturating_sub(count);
        Ok((count < self.limit, remaining))
    }

    /// Consume one quota slot for `ip`.
    pub fn increment(&self, ip: &str) -> Result<()> {
        let today = today();
        let conn = self.db.lock();
        conn.execute(
            "INSERT INTO rate_limits (ip_address, request_date, request_count)
             VALUES (?1, ?2, 1)
             ON CONFLICT(ip_address, request_date)
             DO UPDATE SET request_count = request_count + 1",
            params![ip, today],
        )
        .context("Failed to increment rate limit counter")?;
        Ok(())
    }
}

fn today() -> String {
    chrono::Local::now().date_naive().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(limit: u32) -> RateLimiter {
        RateLimiter::new(Db::open_in_memory().unwrap(), limit)
    }

    #[test]
    fn fresh_ip_has_full_quota() {
        let rl = limiter(5);
        let (allowed, remaining) = rl.check("10.0.0.1").unwrap();
        assert!(allowed);
        assert_eq!(remaining, 5);
    }

    #[test]
    fn quota_is_monotonic() {
        let rl = limiter(3);
        for expected_remaining in [2u32, 1, 0] {
            rl.increment("10.0.0.1").unwrap();
            let (_, remaining) = rl.check("10.0.0.1").unwrap();
            assert_eq!(remaining, expected_remaining);
        }

        let (allowed, remaining) = rl.check("10.0.0.1").unwrap();
        assert!(!allowed);
        assert_eq!(remaining, 0);

        // Over-incrementing never underflows
        rl.increment("10.0.0.1").unwrap();
        let (allowed, remaining) = rl.check("10.0.0.1").unwrap();
        assert!(!allowed);
        assert_eq!(remaining, 0);
    }

    #[test]
    fn quotas_are_per_ip() {
        let rl = limiter(2);
        rl.increment("10.0.0.1").unwrap();
        rl.increment("10.0.0.1").unwrap();

        let (allowed, _) = rl.check("10.0.0.1").unwrap();
        assert!(!allowed);
        let (allowed, remaining) = rl.check("10.0.0.2").unwrap();
        assert!(allowed);
        assert_eq!(remaining, 2);
    }
}

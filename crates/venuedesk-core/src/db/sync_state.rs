//! Run lease and run history persistence

#![allow(clippy::cast_possible_wrap)]

use std::time::Duration;

use libsql::Connection;

use crate::error::Result;
use crate::util::unix_millis_now;

/// Outcome of a lease acquisition attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaseStatus {
    Acquired,
    HeldBy { holder: String, expires_at: i64 },
}

/// One persisted reconciliation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRun {
    pub run_id: String,
    pub started_at: i64,
    pub finished_at: i64,
    pub is_clean: bool,
    /// Serialized run summary (JSON)
    pub summary: String,
}

/// libSQL repository for sync bookkeeping tables
pub struct LibSqlSyncStateRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlSyncStateRepository<'a> {
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Take the named lease unless another holder has an unexpired one.
    ///
    /// A single upsert statement: an expired lease (or one already held by
    /// `holder`) is overwritten, a live foreign lease is left untouched.
    pub async fn try_acquire_lease(
        &self,
        name: &str,
        holder: &str,
        ttl: Duration,
    ) -> Result<LeaseStatus> {
        let now = unix_millis_now();
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let expires_at = now.saturating_add(ttl_ms);

        let changed = self
            .conn
            .execute(
                "INSERT INTO sync_leases (name, holder, acquired_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(name) DO UPDATE SET
                     holder = excluded.holder,
                     acquired_at = excluded.acquired_at,
                     expires_at = excluded.expires_at
                 WHERE sync_leases.expires_at <= ?3 OR sync_leases.holder = ?2",
                libsql::params![name, holder, now, expires_at],
            )
            .await?;

        if changed > 0 {
            return Ok(LeaseStatus::Acquired);
        }

        let mut rows = self
            .conn
            .query(
                "SELECT holder, expires_at FROM sync_leases WHERE name = ?",
                [name],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(LeaseStatus::HeldBy {
                holder: row.get(0)?,
                expires_at: row.get(1)?,
            }),
            None => Ok(LeaseStatus::HeldBy {
                holder: "unknown".to_string(),
                expires_at: now,
            }),
        }
    }

    /// Release the lease if `holder` still owns it.
    pub async fn release_lease(&self, name: &str, holder: &str) -> Result<bool> {
        let changed = self
            .conn
            .execute(
                "DELETE FROM sync_leases WHERE name = ? AND holder = ?",
                [name, holder],
            )
            .await?;
        Ok(changed > 0)
    }

    pub async fn record_run(&self, run: &StoredRun) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO sync_runs (run_id, started_at, finished_at, is_clean, summary)
                 VALUES (?, ?, ?, ?, ?)",
                libsql::params![
                    run.run_id.as_str(),
                    run.started_at,
                    run.finished_at,
                    i64::from(run.is_clean),
                    run.summary.as_str()
                ],
            )
            .await?;
        Ok(())
    }

    /// Most recent runs first
    pub async fn recent_runs(&self, limit: usize) -> Result<Vec<StoredRun>> {
        let mut rows = self
            .conn
            .query(
                "SELECT run_id, started_at, finished_at, is_clean, summary
                 FROM sync_runs
                 ORDER BY started_at DESC
                 LIMIT ?",
                [limit as i64],
            )
            .await?;

        let mut runs = Vec::new();
        while let Some(row) = rows.next().await? {
            runs.push(StoredRun {
                run_id: row.get(0)?,
                started_at: row.get(1)?,
                finished_at: row.get(2)?,
                is_clean: row.get::<i64>(3)? != 0,
                summary: row.get(4)?,
            });
        }
        Ok(runs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    const LEASE: &str = "reconcile";

    #[tokio::test(flavor = "multi_thread")]
    async fn second_holder_is_refused_while_lease_is_live() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = LibSqlSyncStateRepository::new(db.connection());

        let first = repo
            .try_acquire_lease(LEASE, "run-a", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(first, LeaseStatus::Acquired);

        let second = repo
            .try_acquire_lease(LEASE, "run-b", Duration::from_secs(60))
            .await
            .unwrap();
        assert!(matches!(second, LeaseStatus::HeldBy { ref holder, .. } if holder == "run-a"));

        assert!(repo.release_lease(LEASE, "run-a").await.unwrap());
        let third = repo
            .try_acquire_lease(LEASE, "run-b", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(third, LeaseStatus::Acquired);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn expired_lease_can_be_taken_over() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = LibSqlSyncStateRepository::new(db.connection());

        repo.try_acquire_lease(LEASE, "crashed-run", Duration::ZERO)
            .await
            .unwrap();
        let status = repo
            .try_acquire_lease(LEASE, "next-run", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(status, LeaseStatus::Acquired);
        assert!(!repo.release_lease(LEASE, "crashed-run").await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn runs_are_listed_newest_first() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = LibSqlSyncStateRepository::new(db.connection());

        for (run_id, started_at) in [("r1", 10), ("r2", 30), ("r3", 20)] {
            repo.record_run(&StoredRun {
                run_id: run_id.to_string(),
                started_at,
                finished_at: started_at + 5,
                is_clean: run_id != "r2",
                summary: "{}".to_string(),
            })
            .await
            .unwrap();
        }

        let runs = repo.recent_runs(2).await.unwrap();
        let ids = runs.iter().map(|run| run.run_id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["r2", "r3"]);
        assert!(!runs[0].is_clean);
    }
}

//! Shared local store wrapper used by the facade, push worker and reconciler.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tokio::sync::Mutex;

use crate::db::{
    Database, LeaseStatus, LibSqlEntityStore, LibSqlSyncStateRepository, StoredRun, SyncEntity,
    UpsertOutcome,
};
use crate::models::{
    BookingFields, ContactFields, EntityKind, LocalFields, LocalId, Opportunity,
    OpportunityFields, OpportunityStatus, Record, RemoteId, Task, TaskFields,
};
use crate::reconcile::ReconcileSummary;
use crate::Result;

/// Thread-safe service for local store operations.
///
/// Every call takes the connection lock for its own duration only; no lock
/// is ever held across a remote call.
#[derive(Clone)]
pub struct StoreService {
    db: Arc<Mutex<Database>>,
    db_path: Option<PathBuf>,
}

impl StoreService {
    /// Open a store at the given filesystem path.
    pub async fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::open(&db_path).await?;
        tracing::info!("Opened local store at {}", db_path.display());
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: Some(db_path),
        })
    }

    /// Open an in-memory store (primarily for tests).
    pub async fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory().await?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: None,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Insert a new unlinked record.
    pub async fn insert_local<F: SyncEntity>(&self, fields: F) -> Result<Record<F>> {
        let db = self.db.lock().await;
        LibSqlEntityStore::<F>::new(db.connection())
            .insert_local(fields)
            .await
    }

    pub async fn get<F: SyncEntity>(&self, id: &LocalId) -> Result<Option<Record<F>>> {
        let db = self.db.lock().await;
        LibSqlEntityStore::<F>::new(db.connection()).get(id).await
    }

    pub async fn get_by_remote_id<F: SyncEntity>(
        &self,
        remote_id: &RemoteId,
    ) -> Result<Option<Record<F>>> {
        let db = self.db.lock().await;
        LibSqlEntityStore::<F>::new(db.connection())
            .get_by_remote_id(remote_id)
            .await
    }

    /// Replace a record's fields, keeping its id and link.
    pub async fn update_fields<F: SyncEntity>(&self, id: &LocalId, fields: &F) -> Result<Record<F>> {
        let db = self.db.lock().await;
        LibSqlEntityStore::<F>::new(db.connection())
            .update_fields(id, fields)
            .await
    }

    /// Hard-delete a record and return what was removed.
    pub async fn delete<F: SyncEntity>(&self, id: &LocalId) -> Result<Record<F>> {
        let db = self.db.lock().await;
        LibSqlEntityStore::<F>::new(db.connection()).delete(id).await
    }

    pub async fn list_page<F: SyncEntity>(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Record<F>>> {
        let db = self.db.lock().await;
        LibSqlEntityStore::<F>::new(db.connection())
            .list_page(limit, offset)
            .await
    }

    /// Every record of a kind, read in pages of `page_size`.
    pub async fn list_all<F: SyncEntity>(&self, page_size: usize) -> Result<Vec<Record<F>>> {
        let db = self.db.lock().await;
        LibSqlEntityStore::<F>::new(db.connection())
            .list_all(page_size)
            .await
    }

    /// Records that have never been acknowledged by the CRM.
    pub async fn select_unlinked<F: SyncEntity>(&self, page_size: usize) -> Result<Vec<Record<F>>> {
        let db = self.db.lock().await;
        LibSqlEntityStore::<F>::new(db.connection())
            .select_unlinked(page_size)
            .await
    }

    pub async fn upsert_by_remote_id<F: SyncEntity>(
        &self,
        remote_id: &RemoteId,
        fields: &F,
    ) -> Result<UpsertOutcome> {
        let db = self.db.lock().await;
        LibSqlEntityStore::<F>::new(db.connection())
            .upsert_by_remote_id(remote_id, fields)
            .await
    }

    /// Upsert a kind-tagged field set pulled from the CRM.
    pub async fn upsert_remote(
        &self,
        remote_id: &RemoteId,
        fields: LocalFields,
    ) -> Result<UpsertOutcome> {
        match fields {
            LocalFields::Contact(fields) => self.upsert_by_remote_id(remote_id, &fields).await,
            LocalFields::Opportunity(fields) => self.upsert_by_remote_id(remote_id, &fields).await,
            LocalFields::CalendarEvent(fields) => {
                self.upsert_by_remote_id(remote_id, &fields).await
            }
            LocalFields::Task(fields) => self.upsert_by_remote_id(remote_id, &fields).await,
        }
    }

    /// Record the remote id acknowledged for a local record.
    pub async fn mark_linked(
        &self,
        kind: EntityKind,
        id: &LocalId,
        remote_id: &RemoteId,
    ) -> Result<()> {
        let db = self.db.lock().await;
        let conn = db.connection();
        match kind {
            EntityKind::Contact => {
                LibSqlEntityStore::<ContactFields>::new(conn)
                    .mark_linked(id, remote_id)
                    .await
            }
            EntityKind::Opportunity => {
                LibSqlEntityStore::<OpportunityFields>::new(conn)
                    .mark_linked(id, remote_id)
                    .await
            }
            EntityKind::CalendarEvent => {
                LibSqlEntityStore::<BookingFields>::new(conn)
                    .mark_linked(id, remote_id)
                    .await
            }
            EntityKind::Task => {
                LibSqlEntityStore::<TaskFields>::new(conn)
                    .mark_linked(id, remote_id)
                    .await
            }
        }
    }

    /// Current remote link of a record; `NotFound` when the row is gone.
    pub async fn linked_remote_id(
        &self,
        kind: EntityKind,
        id: &LocalId,
    ) -> Result<Option<RemoteId>> {
        match kind {
            EntityKind::Contact => self.remote_id_of::<ContactFields>(id).await,
            EntityKind::Opportunity => self.remote_id_of::<OpportunityFields>(id).await,
            EntityKind::CalendarEvent => self.remote_id_of::<BookingFields>(id).await,
            EntityKind::Task => self.remote_id_of::<TaskFields>(id).await,
        }
    }

    async fn remote_id_of<F: SyncEntity>(&self, id: &LocalId) -> Result<Option<RemoteId>> {
        self.get::<F>(id)
            .await?
            .map(|record| record.remote_id)
            .ok_or_else(|| crate::Error::not_found(F::KIND, id))
    }

    /// Resolve a user-supplied id prefix to full local ids.
    pub async fn find_by_id_prefix(
        &self,
        kind: EntityKind,
        prefix: &str,
        limit: usize,
    ) -> Result<Vec<String>> {
        let db = self.db.lock().await;
        let conn = db.connection();
        match kind {
            EntityKind::Contact => {
                LibSqlEntityStore::<ContactFields>::new(conn)
                    .find_by_id_prefix(prefix, limit)
                    .await
            }
            EntityKind::Opportunity => {
                LibSqlEntityStore::<OpportunityFields>::new(conn)
                    .find_by_id_prefix(prefix, limit)
                    .await
            }
            EntityKind::CalendarEvent => {
                LibSqlEntityStore::<BookingFields>::new(conn)
                    .find_by_id_prefix(prefix, limit)
                    .await
            }
            EntityKind::Task => {
                LibSqlEntityStore::<TaskFields>::new(conn)
                    .find_by_id_prefix(prefix, limit)
                    .await
            }
        }
    }

    pub async fn update_opportunity_status(
        &self,
        id: &LocalId,
        status: OpportunityStatus,
        monetary_value: Option<Decimal>,
    ) -> Result<Opportunity> {
        let db = self.db.lock().await;
        LibSqlEntityStore::<OpportunityFields>::new(db.connection())
            .update_opportunity_status(id, status, monetary_value)
            .await
    }

    pub async fn set_task_completed(&self, id: &LocalId, completed: bool) -> Result<Task> {
        let db = self.db.lock().await;
        LibSqlEntityStore::<TaskFields>::new(db.connection())
            .set_task_completed(id, completed)
            .await
    }

    pub async fn try_acquire_lease(
        &self,
        name: &str,
        holder: &str,
        ttl: Duration,
    ) -> Result<LeaseStatus> {
        let db = self.db.lock().await;
        LibSqlSyncStateRepository::new(db.connection())
            .try_acquire_lease(name, holder, ttl)
            .await
    }

    pub async fn release_lease(&self, name: &str, holder: &str) -> Result<bool> {
        let db = self.db.lock().await;
        LibSqlSyncStateRepository::new(db.connection())
            .release_lease(name, holder)
            .await
    }

    /// Persist a finished run for `sync history`.
    pub async fn record_run(&self, summary: &ReconcileSummary) -> Result<()> {
        let run = StoredRun {
            run_id: summary.run_id.clone(),
            started_at: summary.started_at.timestamp_millis(),
            finished_at: summary.finished_at.timestamp_millis(),
            is_clean: summary.is_clean(),
            summary: serde_json::to_string(summary)?,
        };
        let db = self.db.lock().await;
        LibSqlSyncStateRepository::new(db.connection())
            .record_run(&run)
            .await
    }

    /// Most recent run summaries, newest first.
    pub async fn recent_runs(&self, limit: usize) -> Result<Vec<ReconcileSummary>> {
        let runs = {
            let db = self.db.lock().await;
            LibSqlSyncStateRepository::new(db.connection())
                .recent_runs(limit)
                .await?
        };

        runs.into_iter()
            .map(|run| serde_json::from_str(&run.summary).map_err(Into::into))
            .collect()
    }
}

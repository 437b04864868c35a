//! One pull-then-push-unlinked pass between the local store and the CRM.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::watch;

use super::summary::{KindError, KindPullReport, PushUnlinkedReport, ReconcileSummary};
use crate::config::SyncSettings;
use crate::db::LeaseStatus;
use crate::error::{Error, Result};
use crate::mapper::{from_remote_record, to_remote_payload, MapperContext};
use crate::models::{EntityKind, LocalFields, LocalId, Opportunity, OpportunityFields, RemoteId};
use crate::push::link_created;
use crate::remote::{RemoteCrm, RemoteError};
use crate::services::StoreService;

/// Name of the lease guarding against overlapping runs.
pub const LEASE_NAME: &str = "reconcile";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    #[default]
    Idle,
    PullingAll,
    PushingUnlinked,
}

impl JobPhase {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::PullingAll => "pulling_all",
            Self::PushingUnlinked => "pushing_unlinked",
        }
    }
}

pub struct ReconciliationJob {
    remote: Arc<dyn RemoteCrm>,
    store: StoreService,
    context: MapperContext,
    settings: SyncSettings,
    phase: watch::Sender<JobPhase>,
}

impl ReconciliationJob {
    pub fn new(
        remote: Arc<dyn RemoteCrm>,
        store: StoreService,
        context: MapperContext,
        settings: SyncSettings,
    ) -> Self {
        let (phase, _) = watch::channel(JobPhase::Idle);
        Self {
            remote,
            store,
            context,
            settings,
            phase,
        }
    }

    /// Observe phase transitions of this job.
    pub fn phases(&self) -> watch::Receiver<JobPhase> {
        self.phase.subscribe()
    }

    pub fn phase(&self) -> JobPhase {
        *self.phase.borrow()
    }

    pub const fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Kinds pulled by every run.
    pub fn pulled_kinds(&self) -> Vec<EntityKind> {
        let mut kinds = vec![
            EntityKind::Contact,
            EntityKind::Opportunity,
            EntityKind::CalendarEvent,
        ];
        if self.settings.pull_tasks {
            kinds.push(EntityKind::Task);
        }
        kinds
    }

    /// Run one reconciliation pass.
    ///
    /// Returns `Error::RunInProgress` without touching the CRM when another
    /// holder owns a live lease. Per-kind and per-record failures land in the
    /// summary; only local bookkeeping failures are returned as errors.
    pub async fn run(&self) -> Result<ReconcileSummary> {
        let run_id = LocalId::new().to_string();

        match self
            .store
            .try_acquire_lease(LEASE_NAME, &run_id, self.settings.lease_ttl)
            .await?
        {
            LeaseStatus::Acquired => {}
            LeaseStatus::HeldBy { holder, .. } => {
                tracing::info!(%run_id, %holder, "Reconciliation skipped, lease is held");
                return Err(Error::RunInProgress(holder));
            }
        }

        let result = self.run_locked(run_id.clone()).await;
        self.phase.send_replace(JobPhase::Idle);

        match self.store.release_lease(LEASE_NAME, &run_id).await {
            Ok(true) => {}
            Ok(false) => tracing::warn!(%run_id, "Reconcile lease expired before release"),
            Err(error) => tracing::error!(%run_id, "Failed to release reconcile lease: {error}"),
        }

        result
    }

    async fn run_locked(&self, run_id: String) -> Result<ReconcileSummary> {
        let started_at = Utc::now();
        tracing::info!(%run_id, "Reconciliation started");

        self.phase.send_replace(JobPhase::PullingAll);
        let (contacts, opportunities, bookings, tasks) = tokio::join!(
            self.pull_kind(EntityKind::Contact),
            self.pull_kind(EntityKind::Opportunity),
            self.pull_kind(EntityKind::CalendarEvent),
            async {
                if self.settings.pull_tasks {
                    Some(self.pull_kind(EntityKind::Task).await)
                } else {
                    None
                }
            },
        );

        let mut pulls = Vec::new();
        let mut errors = Vec::new();
        for (report, error) in [Some(contacts), Some(opportunities), Some(bookings), tasks]
            .into_iter()
            .flatten()
        {
            pulls.push(report);
            errors.extend(error);
        }

        self.phase.send_replace(JobPhase::PushingUnlinked);
        let (push_unlinked, push_errors) = self.push_unlinked().await;
        errors.extend(push_errors);

        let summary = ReconcileSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            pulls,
            push_unlinked,
            errors,
        };
        self.store.record_run(&summary).await?;

        tracing::info!(
            run_id = %summary.run_id,
            succeeded = summary.succeeded_kinds().len(),
            failed = summary.failed_kinds().len(),
            pushed = summary.push_unlinked.created,
            duration_ms = summary.duration_ms(),
            "Reconciliation finished"
        );
        Ok(summary)
    }

    /// Pull every page of one kind, isolating its failure.
    async fn pull_kind(&self, kind: EntityKind) -> (KindPullReport, Option<KindError>) {
        let mut report = KindPullReport::new(kind);
        match self.pull_pages(kind, &mut report).await {
            Ok(()) => {
                report.succeeded = true;
                tracing::debug!(
                    %kind,
                    pages = report.pages,
                    inserted = report.inserted,
                    updated = report.updated,
                    "Pull complete"
                );
                (report, None)
            }
            Err(error) => {
                tracing::warn!(%kind, pages = report.pages, "Pull failed: {error}");
                let error = KindError::from_error(kind, &error);
                (report, Some(error))
            }
        }
    }

    async fn pull_pages(&self, kind: EntityKind, report: &mut KindPullReport) -> Result<()> {
        let mut cursor: Option<String> = None;
        let mut seen = HashSet::new();

        loop {
            if report.pages >= self.settings.max_pages {
                return Err(RemoteError::decode(format!(
                    "{kind} listing exceeded {} pages",
                    self.settings.max_pages
                ))
                .into());
            }

            let page = self.remote.list(kind, cursor.as_deref()).await?;
            report.pages += 1;
            report.fetched += page.records.len() + page.undecodable;
            report.skipped += page.undecodable;

            for record in page.records {
                let (remote_id, fields) = match from_remote_record(record) {
                    Ok(mapped) => mapped,
                    Err(error) => {
                        report.skipped += 1;
                        tracing::warn!(%kind, "Skipping unmappable record: {error}");
                        continue;
                    }
                };
                if fields.kind() != kind {
                    report.skipped += 1;
                    continue;
                }

                if self.store.upsert_remote(&remote_id, fields).await?.is_insert() {
                    report.inserted += 1;
                } else {
                    report.updated += 1;
                }
            }

            let Some(next) = page.next_cursor else {
                return Ok(());
            };
            if !seen.insert(next.clone()) {
                return Err(
                    RemoteError::decode(format!("{kind} listing repeated cursor '{next}'")).into(),
                );
            }
            cursor = Some(next);
        }
    }

    /// Create every never-linked opportunity remotely and record its link.
    async fn push_unlinked(&self) -> (PushUnlinkedReport, Vec<KindError>) {
        let kind = EntityKind::Opportunity;
        let mut report = PushUnlinkedReport::default();
        let mut errors = Vec::new();

        let candidates = match self
            .store
            .select_unlinked::<OpportunityFields>(self.settings.local_page_size)
            .await
        {
            Ok(candidates) => candidates,
            Err(error) => {
                tracing::error!("Failed to select unlinked opportunities: {error}");
                errors.push(KindError::from_error(kind, &error));
                return (report, errors);
            }
        };
        report.candidates = candidates.len();

        for record in candidates {
            match self.push_one(&record).await {
                Ok(remote_id) => {
                    report.created += 1;
                    tracing::debug!(local_id = %record.id, %remote_id, "Linked unlinked opportunity");
                }
                Err(error) => {
                    report.failed += 1;
                    tracing::warn!(local_id = %record.id, "Push of unlinked opportunity failed: {error}");
                    errors.push(KindError::from_error(kind, &error).for_record(record.id));
                }
            }
        }

        (report, errors)
    }

    async fn push_one(&self, record: &Opportunity) -> Result<RemoteId> {
        let fields = LocalFields::Opportunity(record.fields.clone());
        let payload = to_remote_payload(&fields, &self.context);
        let remote_id = self.remote.create(&payload).await?;
        link_created(
            &self.store,
            self.remote.as_ref(),
            EntityKind::Opportunity,
            &record.id,
            &remote_id,
        )
        .await?;
        Ok(remote_id)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::mapper::RemoteRecord;
    use crate::models::{BookingFields, ContactFields, TaskFields};
    use crate::reconcile::FailureClass;
    use crate::remote::fake::{appointment, contact, opportunity, task, Call, FakeCrm};
    use crate::remote::RemotePage;

    fn timeout() -> RemoteError {
        RemoteError::Timeout
    }

    fn unavailable() -> RemoteError {
        RemoteError::rejected(503, "maintenance")
    }

    fn job(remote: &Arc<FakeCrm>, store: &StoreService, settings: SyncSettings) -> ReconciliationJob {
        ReconciliationJob::new(
            remote.clone(),
            store.clone(),
            MapperContext::default(),
            settings,
        )
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn create_then_sync_links_the_record_once() {
        let store = StoreService::open_in_memory().await.unwrap();
        let remote = Arc::new(FakeCrm::new());
        let record = store
            .insert_local(OpportunityFields::titled("Corporate offsite"))
            .await
            .unwrap();

        let summary = job(&remote, &store, SyncSettings::default())
            .run()
            .await
            .unwrap();

        assert_eq!(remote.create_count(), 1);
        assert_eq!(summary.push_unlinked.candidates, 1);
        assert_eq!(summary.push_unlinked.created, 1);
        assert!(summary.is_clean());
        let linked = store
            .get::<OpportunityFields>(&record.id)
            .await
            .unwrap()
            .unwrap();
        assert!(linked.is_linked());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn pull_updates_linked_record_in_place() {
        let store = StoreService::open_in_memory().await.unwrap();
        let record = store
            .insert_local(OpportunityFields::titled("Old title"))
            .await
            .unwrap();
        let remote_id = RemoteId::new("opp-42").unwrap();
        store
            .mark_linked(EntityKind::Opportunity, &record.id, &remote_id)
            .await
            .unwrap();

        let remote = Arc::new(FakeCrm::new().with_pages(
            EntityKind::Opportunity,
            vec![vec![opportunity("opp-42", "New title")]],
        ));
        let summary = job(&remote, &store, SyncSettings::default())
            .run()
            .await
            .unwrap();

        let all = store.list_all::<OpportunityFields>(100).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, record.id);
        assert_eq!(all[0].fields.title, "New title");
        assert_eq!(all[0].remote_id, Some(remote_id));
        assert_eq!(summary.pull(EntityKind::Opportunity).unwrap().updated, 1);
        assert_eq!(remote.create_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn repeated_pulls_are_idempotent() {
        let store = StoreService::open_in_memory().await.unwrap();
        let remote = Arc::new(FakeCrm::new().with_pages(
            EntityKind::Contact,
            vec![
                vec![contact("c-1", "Ada"), contact("c-2", "Grace")],
                vec![contact("c-3", "Edsger")],
            ],
        ));
        let job = job(&remote, &store, SyncSettings::default());

        let first = job.run().await.unwrap();
        let before = store.list_all::<ContactFields>(100).await.unwrap();
        let second = job.run().await.unwrap();
        let after = store.list_all::<ContactFields>(100).await.unwrap();

        let first_pull = first.pull(EntityKind::Contact).unwrap();
        assert_eq!(first_pull.pages, 2);
        assert_eq!(first_pull.inserted, 3);
        assert_eq!(second.pull(EntityKind::Contact).unwrap().updated, 3);
        assert_eq!(before.len(), 3);
        assert_eq!(
            before.iter().map(|c| (c.id, c.fields.clone())).collect::<Vec<_>>(),
            after.iter().map(|c| (c.id, c.fields.clone())).collect::<Vec<_>>()
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn one_failing_kind_does_not_block_the_others() {
        let store = StoreService::open_in_memory().await.unwrap();
        store
            .insert_local(OpportunityFields::titled("Local only"))
            .await
            .unwrap();
        let remote = Arc::new(
            FakeCrm::new()
                .failing_list(EntityKind::Contact, timeout)
                .with_pages(
                    EntityKind::Opportunity,
                    vec![vec![opportunity("opp-1", "From CRM")]],
                )
                .with_pages(
                    EntityKind::CalendarEvent,
                    vec![vec![appointment("evt-1", "Tasting")]],
                ),
        );

        let summary = job(&remote, &store, SyncSettings::default())
            .run()
            .await
            .unwrap();

        assert_eq!(summary.failed_kinds(), vec![EntityKind::Contact]);
        assert_eq!(
            summary.succeeded_kinds(),
            vec![EntityKind::Opportunity, EntityKind::CalendarEvent]
        );
        assert_eq!(summary.errors.len(), 1);
        assert_eq!(summary.errors[0].class, FailureClass::Timeout);
        assert_eq!(summary.push_unlinked.created, 1);
        assert_eq!(store.list_all::<OpportunityFields>(100).await.unwrap().len(), 2);
        assert_eq!(store.list_all::<BookingFields>(100).await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn push_still_runs_when_every_pull_fails() {
        let store = StoreService::open_in_memory().await.unwrap();
        store
            .insert_local(OpportunityFields::titled("Anniversary"))
            .await
            .unwrap();
        let remote = Arc::new(
            FakeCrm::new()
                .failing_list(EntityKind::Contact, timeout)
                .failing_list(EntityKind::Opportunity, unavailable)
                .failing_list(EntityKind::CalendarEvent, timeout),
        );

        let summary = job(&remote, &store, SyncSettings::default())
            .run()
            .await
            .unwrap();

        assert!(summary.succeeded_kinds().is_empty());
        assert_eq!(summary.failed_kinds().len(), 3);
        assert_eq!(summary.push_unlinked.created, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn pushed_record_is_not_duplicated_by_a_later_pull() {
        let store = StoreService::open_in_memory().await.unwrap();
        let record = store
            .insert_local(OpportunityFields::titled("Product launch"))
            .await
            .unwrap();

        let first_remote = Arc::new(FakeCrm::new());
        job(&first_remote, &store, SyncSettings::default())
            .run()
            .await
            .unwrap();
        let linked = store
            .get::<OpportunityFields>(&record.id)
            .await
            .unwrap()
            .unwrap()
            .remote_id
            .unwrap();

        let second_remote = Arc::new(FakeCrm::new().with_pages(
            EntityKind::Opportunity,
            vec![vec![opportunity(linked.as_str(), "Product launch")]],
        ));
        let summary = job(&second_remote, &store, SyncSettings::default())
            .run()
            .await
            .unwrap();

        let all = store.list_all::<OpportunityFields>(100).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, record.id);
        assert_eq!(summary.push_unlinked.candidates, 0);
        assert_eq!(second_remote.create_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn overlapping_run_is_refused() {
        let store = StoreService::open_in_memory().await.unwrap();
        let remote = Arc::new(FakeCrm::new());
        store
            .try_acquire_lease(LEASE_NAME, "scheduler-a", Duration::from_secs(60))
            .await
            .unwrap();

        let job = job(&remote, &store, SyncSettings::default());
        let error = job.run().await.unwrap_err();
        assert!(matches!(error, Error::RunInProgress(ref holder) if holder == "scheduler-a"));
        assert!(remote.calls().is_empty());

        store.release_lease(LEASE_NAME, "scheduler-a").await.unwrap();
        job.run().await.unwrap();
        // The lease is released after a completed run.
        job.run().await.unwrap();
        assert_eq!(job.phase(), JobPhase::Idle);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn repeated_cursor_fails_only_that_kind() {
        let store = StoreService::open_in_memory().await.unwrap();
        let remote = Arc::new(
            FakeCrm::new()
                .with_page(
                    EntityKind::Contact,
                    None,
                    RemotePage {
                        records: vec![contact("c-1", "Ada")],
                        next_cursor: Some("loop".to_string()),
                        undecodable: 0,
                    },
                )
                .with_page(
                    EntityKind::Contact,
                    Some("loop"),
                    RemotePage {
                        records: vec![contact("c-2", "Grace")],
                        next_cursor: Some("loop".to_string()),
                        undecodable: 0,
                    },
                ),
        );

        let summary = job(&remote, &store, SyncSettings::default())
            .run()
            .await
            .unwrap();

        assert_eq!(summary.failed_kinds(), vec![EntityKind::Contact]);
        assert_eq!(summary.errors[0].class, FailureClass::Decode);
        // Pages read before the failure stay committed.
        assert_eq!(store.list_all::<ContactFields>(100).await.unwrap().len(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn page_limit_bounds_a_runaway_listing() {
        let store = StoreService::open_in_memory().await.unwrap();
        let remote = Arc::new(FakeCrm::new().with_pages(
            EntityKind::CalendarEvent,
            vec![
                vec![appointment("evt-1", "A")],
                vec![appointment("evt-2", "B")],
                vec![appointment("evt-3", "C")],
            ],
        ));
        let settings = SyncSettings {
            max_pages: 2,
            ..SyncSettings::default()
        };

        let summary = job(&remote, &store, settings).run().await.unwrap();

        let pull = summary.pull(EntityKind::CalendarEvent).unwrap();
        assert!(!pull.succeeded);
        assert_eq!(pull.pages, 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unmappable_records_are_skipped() {
        let store = StoreService::open_in_memory().await.unwrap();
        let broken = RemoteRecord::CalendarEvent(
            serde_json::from_value(json!({ "id": "evt-9", "title": "No start" })).unwrap(),
        );
        let remote = Arc::new(FakeCrm::new().with_pages(
            EntityKind::CalendarEvent,
            vec![vec![broken, appointment("evt-1", "Walkthrough")]],
        ));

        let summary = job(&remote, &store, SyncSettings::default())
            .run()
            .await
            .unwrap();

        let pull = summary.pull(EntityKind::CalendarEvent).unwrap();
        assert!(pull.succeeded);
        assert_eq!(pull.skipped, 1);
        assert_eq!(pull.inserted, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn undecodable_items_count_as_skipped() {
        let store = StoreService::open_in_memory().await.unwrap();
        let remote = Arc::new(FakeCrm::new().with_page(
            EntityKind::Contact,
            None,
            RemotePage {
                records: vec![contact("c-1", "Ada")],
                next_cursor: None,
                undecodable: 2,
            },
        ));

        let summary = job(&remote, &store, SyncSettings::default())
            .run()
            .await
            .unwrap();

        let pull = summary.pull(EntityKind::Contact).unwrap();
        assert!(pull.succeeded);
        assert_eq!(pull.fetched, 3);
        assert_eq!(pull.skipped, 2);
        assert_eq!(pull.inserted, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn tasks_are_pulled_only_when_enabled() {
        let store = StoreService::open_in_memory().await.unwrap();
        let remote = Arc::new(
            FakeCrm::new().with_pages(EntityKind::Task, vec![vec![task("t-1", "Send contract")]]),
        );

        let summary = job(&remote, &store, SyncSettings::default())
            .run()
            .await
            .unwrap();
        assert!(summary.pull(EntityKind::Task).is_none());
        assert!(store.list_all::<TaskFields>(10).await.unwrap().is_empty());

        let settings = SyncSettings {
            pull_tasks: true,
            ..SyncSettings::default()
        };
        let summary = job(&remote, &store, settings).run().await.unwrap();
        assert_eq!(summary.pull(EntityKind::Task).unwrap().inserted, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failed_unlinked_push_is_reported_per_record() {
        let store = StoreService::open_in_memory().await.unwrap();
        let record = store
            .insert_local(OpportunityFields::titled("Rejected"))
            .await
            .unwrap();
        let remote = Arc::new(FakeCrm::new().failing_writes(&[unavailable]));

        let summary = job(&remote, &store, SyncSettings::default())
            .run()
            .await
            .unwrap();

        assert_eq!(summary.push_unlinked.failed, 1);
        assert_eq!(summary.errors.len(), 1);
        assert_eq!(summary.errors[0].local_id, Some(record.id.to_string()));
        assert!(!summary.is_clean());
        assert!(summary.failed_kinds().is_empty());

        let history = store.recent_runs(1).await.unwrap();
        assert_eq!(history[0].run_id, summary.run_id);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn record_deleted_during_push_does_not_come_back() {
        let store = StoreService::open_in_memory().await.unwrap();
        let record = store
            .insert_local(OpportunityFields::titled("Withdrawn inquiry"))
            .await
            .unwrap();
        let remote = Arc::new(FakeCrm::new().deleting_on_create(store.clone(), record.id));

        let summary = job(&remote, &store, SyncSettings::default())
            .run()
            .await
            .unwrap();

        assert_eq!(summary.push_unlinked.failed, 1);
        assert_eq!(summary.errors.len(), 1);
        assert_eq!(summary.errors[0].class, FailureClass::Local);
        assert_eq!(summary.errors[0].local_id, Some(record.id.to_string()));
        let orphan = RemoteId::new("opportunity-1").unwrap();
        assert!(remote
            .calls()
            .contains(&Call::Delete(EntityKind::Opportunity, orphan)));

        let second = job(&remote, &store, SyncSettings::default())
            .run()
            .await
            .unwrap();
        assert_eq!(second.push_unlinked.candidates, 0);
        assert!(store
            .list_all::<OpportunityFields>(100)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn phases_end_idle() {
        let store = StoreService::open_in_memory().await.unwrap();
        let remote = Arc::new(FakeCrm::new());
        let job = job(&remote, &store, SyncSettings::default());
        let mut phases = job.phases();

        job.run().await.unwrap();

        assert!(phases.has_changed().unwrap());
        assert_eq!(*phases.borrow_and_update(), JobPhase::Idle);
    }
}

//! In-memory CRM double with scripted pages, injected failures and a call log.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::json;

use super::{RemoteCrm, RemoteError, RemotePage, RemoteResult};
use crate::mapper::{RemotePayload, RemoteRecord, StatusPayload};
use crate::models::{EntityKind, LocalId, OpportunityFields, RemoteId};
use crate::services::StoreService;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Create(RemotePayload),
    Update(RemoteId, RemotePayload),
    UpdateStatus(RemoteId, StatusPayload),
    Delete(EntityKind, RemoteId),
    List(EntityKind, Option<String>),
}

type ErrorFactory = fn() -> RemoteError;

#[derive(Default)]
pub struct FakeCrm {
    pages: Mutex<HashMap<(EntityKind, Option<String>), RemotePage>>,
    list_failures: Mutex<HashMap<EntityKind, ErrorFactory>>,
    write_failures: Mutex<Vec<ErrorFactory>>,
    next_id: AtomicUsize,
    calls: Mutex<Vec<Call>>,
    vanishing: Mutex<Option<(StoreService, LocalId)>>,
}

impl FakeCrm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the pages returned for `kind`, chained by generated cursors.
    pub fn with_pages(self, kind: EntityKind, pages: Vec<Vec<RemoteRecord>>) -> Self {
        {
            let mut scripted = self.pages.lock().unwrap();
            let count = pages.len();
            for (index, records) in pages.into_iter().enumerate() {
                let cursor = (index > 0).then(|| format!("{kind}-page-{index}"));
                let next_cursor = (index + 1 < count).then(|| format!("{kind}-page-{}", index + 1));
                scripted.insert(
                    (kind, cursor),
                    RemotePage {
                        records,
                        next_cursor,
                        undecodable: 0,
                    },
                );
            }
        }
        self
    }

    /// Script a single raw page keyed by cursor.
    pub fn with_page(self, kind: EntityKind, cursor: Option<&str>, page: RemotePage) -> Self {
        self.pages
            .lock()
            .unwrap()
            .insert((kind, cursor.map(ToString::to_string)), page);
        self
    }

    /// Every list call for `kind` fails.
    pub fn failing_list(self, kind: EntityKind, error: ErrorFactory) -> Self {
        self.list_failures.lock().unwrap().insert(kind, error);
        self
    }

    /// The next write calls (create/update/status/delete) fail in order.
    pub fn failing_writes(self, errors: &[ErrorFactory]) -> Self {
        let mut failures = self.write_failures.lock().unwrap();
        failures.extend(errors.iter().rev());
        drop(failures);
        self
    }

    /// The first create deletes local opportunity `local_id` before answering.
    pub fn deleting_on_create(self, store: StoreService, local_id: LocalId) -> Self {
        *self.vanishing.lock().unwrap() = Some((store, local_id));
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn create_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, Call::Create(_)))
            .count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn next_write_failure(&self) -> Option<RemoteError> {
        self.write_failures.lock().unwrap().pop().map(|make| make())
    }
}

#[async_trait]
impl RemoteCrm for FakeCrm {
    async fn create(&self, payload: &RemotePayload) -> RemoteResult<RemoteId> {
        self.record(Call::Create(payload.clone()));
        if let Some(error) = self.next_write_failure() {
            return Err(error);
        }
        let vanishing = self.vanishing.lock().unwrap().take();
        if let Some((store, local_id)) = vanishing {
            store
                .delete::<OpportunityFields>(&local_id)
                .await
                .unwrap();
        }
        let sequence = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(RemoteId::new(format!("{}-{sequence}", payload.kind())).unwrap())
    }

    async fn update(&self, remote_id: &RemoteId, payload: &RemotePayload) -> RemoteResult<()> {
        self.record(Call::Update(remote_id.clone(), payload.clone()));
        self.next_write_failure().map_or(Ok(()), Err)
    }

    async fn update_status(
        &self,
        remote_id: &RemoteId,
        payload: &StatusPayload,
    ) -> RemoteResult<()> {
        self.record(Call::UpdateStatus(remote_id.clone(), payload.clone()));
        self.next_write_failure().map_or(Ok(()), Err)
    }

    async fn delete(&self, kind: EntityKind, remote_id: &RemoteId) -> RemoteResult<()> {
        self.record(Call::Delete(kind, remote_id.clone()));
        self.next_write_failure().map_or(Ok(()), Err)
    }

    async fn list(&self, kind: EntityKind, cursor: Option<&str>) -> RemoteResult<RemotePage> {
        self.record(Call::List(kind, cursor.map(ToString::to_string)));
        let failure = self.list_failures.lock().unwrap().get(&kind).copied();
        if let Some(make) = failure {
            return Err(make());
        }
        Ok(self
            .pages
            .lock()
            .unwrap()
            .get(&(kind, cursor.map(ToString::to_string)))
            .cloned()
            .unwrap_or_default())
    }
}

pub fn contact(id: &str, first_name: &str) -> RemoteRecord {
    RemoteRecord::Contact(
        serde_json::from_value(json!({ "id": id, "firstName": first_name })).unwrap(),
    )
}

pub fn opportunity(id: &str, name: &str) -> RemoteRecord {
    RemoteRecord::Opportunity(serde_json::from_value(json!({ "id": id, "name": name })).unwrap())
}

pub fn appointment(id: &str, title: &str) -> RemoteRecord {
    RemoteRecord::CalendarEvent(
        serde_json::from_value(json!({
            "id": id,
            "title": title,
            "startTime": "2026-06-20T16:00:00Z",
            "endTime": "2026-06-20T23:00:00Z"
        }))
        .unwrap(),
    )
}

pub fn task(id: &str, title: &str) -> RemoteRecord {
    RemoteRecord::Task(serde_json::from_value(json!({ "id": id, "title": title })).unwrap())
}

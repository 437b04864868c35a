//! Interactive mutation facade.
//!
//! Every mutation commits to the local store first and only then notifies
//! the push dispatcher. The returned record is the committed local state;
//! remote delivery happens in the background.

use std::sync::Arc;

use rust_decimal::Decimal;
use tokio::sync::broadcast;

use super::StoreService;
use crate::db::SyncEntity;
use crate::error::{Error, Result};
use crate::mapper::{status_payload, MapperContext};
use crate::models::{LocalFields, LocalId, Opportunity, OpportunityStatus, Record, Task};
use crate::push::{PushAction, PushDispatcher, PushEvent, PushOutcome, RetryPolicy};
use crate::remote::RemoteCrm;

pub struct CrmService {
    store: StoreService,
    dispatcher: PushDispatcher,
}

impl CrmService {
    pub const fn new(store: StoreService, dispatcher: PushDispatcher) -> Self {
        Self { store, dispatcher }
    }

    /// Build the facade with its own push worker.
    pub fn connect(
        store: StoreService,
        remote: Arc<dyn RemoteCrm>,
        context: MapperContext,
        policy: RetryPolicy,
    ) -> Self {
        let dispatcher = PushDispatcher::spawn(remote, store.clone(), context, policy);
        Self::new(store, dispatcher)
    }

    pub const fn store(&self) -> &StoreService {
        &self.store
    }

    /// Outcomes of background deliveries triggered through this facade.
    pub fn subscribe(&self) -> broadcast::Receiver<PushOutcome> {
        self.dispatcher.subscribe()
    }

    pub async fn create<F: SyncEntity>(&self, fields: F) -> Result<Record<F>> {
        validate(&fields.clone().into_local())?;
        let record = self.store.insert_local(fields).await?;
        tracing::info!(kind = %F::KIND, local_id = %record.id, "Created");

        self.dispatcher.notify(PushEvent::upsert(
            record.id,
            record.fields.clone().into_local(),
            None,
        ));
        Ok(record)
    }

    pub async fn update<F: SyncEntity>(&self, id: &LocalId, fields: F) -> Result<Record<F>> {
        validate(&fields.clone().into_local())?;
        let record = self.store.update_fields(id, &fields).await?;
        tracing::info!(kind = %F::KIND, local_id = %record.id, "Updated");

        self.dispatcher.notify(PushEvent::upsert(
            record.id,
            record.fields.clone().into_local(),
            record.remote_id.clone(),
        ));
        Ok(record)
    }

    /// Delete locally; linked records are also deleted remotely.
    pub async fn delete<F: SyncEntity>(&self, id: &LocalId) -> Result<Record<F>> {
        let record = self.store.delete::<F>(id).await?;
        tracing::info!(kind = %F::KIND, local_id = %record.id, "Deleted");

        if let Some(remote_id) = record.remote_id.clone() {
            self.dispatcher
                .notify(PushEvent::delete(record.id, F::KIND, remote_id));
        }
        Ok(record)
    }

    /// Move an inquiry through the pipeline.
    pub async fn change_opportunity_status(
        &self,
        id: &LocalId,
        status: OpportunityStatus,
        monetary_value: Option<Decimal>,
    ) -> Result<Opportunity> {
        let record = self
            .store
            .update_opportunity_status(id, status, monetary_value)
            .await?;
        tracing::info!(local_id = %record.id, status = %status, "Status changed");

        let event = match &record.remote_id {
            Some(remote_id) => PushEvent {
                local_id: record.id,
                action: PushAction::StatusChange {
                    remote_id: remote_id.clone(),
                    payload: status_payload(&record.fields),
                },
            },
            // Not created remotely yet: create with the current status.
            None => PushEvent::upsert(record.id, record.fields.clone(), None),
        };
        self.dispatcher.notify(event);
        Ok(record)
    }

    pub async fn set_task_completed(&self, id: &LocalId, completed: bool) -> Result<Task> {
        let record = self.store.set_task_completed(id, completed).await?;
        tracing::info!(local_id = %record.id, completed, "Task completion toggled");

        self.dispatcher.notify(PushEvent::upsert(
            record.id,
            record.fields.clone(),
            record.remote_id.clone(),
        ));
        Ok(record)
    }

    /// Wait for queued deliveries, then stop the push worker.
    pub async fn shutdown(self) {
        self.dispatcher.shutdown().await;
    }
}

fn validate(fields: &LocalFields) -> Result<()> {
    match fields {
        LocalFields::Contact(contact) => {
            let has_identity = [
                &contact.first_name,
                &contact.last_name,
                &contact.email,
                &contact.phone,
            ]
            .iter()
            .any(|value| value.as_deref().is_some_and(|value| !value.trim().is_empty()));
            if !has_identity {
                return Err(Error::InvalidInput(
                    "contact needs a name, email or phone".to_string(),
                ));
            }
        }
        LocalFields::Opportunity(opportunity) => require_title(&opportunity.title)?,
        LocalFields::CalendarEvent(booking) => {
            require_title(&booking.title)?;
            booking.validate().map_err(Error::InvalidInput)?;
        }
        LocalFields::Task(task) => require_title(&task.title)?,
    }
    Ok(())
}

fn require_title(title: &str) -> Result<()> {
    if title.trim().is_empty() {
        return Err(Error::InvalidInput("title cannot be empty".to_string()));
    }
    Ok(())
}

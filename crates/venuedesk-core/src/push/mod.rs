//! Outbound push of local mutations.
//!
//! Mutations are committed locally first and then handed to a
//! [`PushDispatcher`] as [`PushEvent`]s. A single background worker delivers
//! them to the CRM in submission order. Delivery failures never reach the
//! caller: they are logged, broadcast as a [`PushOutcome`], and left for the
//! next reconciliation run to repair.

mod retry;

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

pub use retry::RetryPolicy;

use crate::error::{Error, Result};
use crate::mapper::{to_remote_payload, MapperContext, StatusPayload};
use crate::models::{EntityKind, LocalFields, LocalId, RemoteId};
use crate::reconcile::FailureClass;
use crate::remote::{ApiRetryClass, RemoteCrm};
use crate::services::StoreService;

const OUTCOME_CAPACITY: usize = 64;

/// Remote side effect of a committed local mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum PushAction {
    /// Create when unlinked, otherwise replace the remote fields.
    Upsert {
        fields: LocalFields,
        remote_id: Option<RemoteId>,
    },
    /// Pipeline status move of a linked opportunity.
    StatusChange {
        remote_id: RemoteId,
        payload: StatusPayload,
    },
    Delete {
        kind: EntityKind,
        remote_id: RemoteId,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PushEvent {
    pub local_id: LocalId,
    pub action: PushAction,
}

impl PushEvent {
    pub fn upsert(
        local_id: LocalId,
        fields: impl Into<LocalFields>,
        remote_id: Option<RemoteId>,
    ) -> Self {
        Self {
            local_id,
            action: PushAction::Upsert {
                fields: fields.into(),
                remote_id,
            },
        }
    }

    pub const fn delete(local_id: LocalId, kind: EntityKind, remote_id: RemoteId) -> Self {
        Self {
            local_id,
            action: PushAction::Delete { kind, remote_id },
        }
    }

    pub const fn kind(&self) -> EntityKind {
        match &self.action {
            PushAction::Upsert { fields, .. } => fields.kind(),
            PushAction::StatusChange { .. } => EntityKind::Opportunity,
            PushAction::Delete { kind, .. } => *kind,
        }
    }

    const fn verb(&self) -> &'static str {
        match &self.action {
            PushAction::Upsert { .. } => "upsert",
            PushAction::StatusChange { .. } => "status",
            PushAction::Delete { .. } => "delete",
        }
    }
}

/// Result of delivering one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    Delivered {
        kind: EntityKind,
        local_id: LocalId,
        /// Remote id acknowledged by a create, if this delivery created.
        linked: Option<RemoteId>,
        attempts: u32,
    },
    Failed {
        kind: EntityKind,
        local_id: LocalId,
        class: FailureClass,
        message: String,
        attempts: u32,
    },
}

impl PushOutcome {
    pub const fn local_id(&self) -> LocalId {
        match self {
            Self::Delivered { local_id, .. } | Self::Failed { local_id, .. } => *local_id,
        }
    }

    pub const fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }
}

/// Queue in front of the single delivery worker.
pub struct PushDispatcher {
    sender: mpsc::UnboundedSender<PushEvent>,
    outcomes: broadcast::Sender<PushOutcome>,
    worker: JoinHandle<()>,
}

impl PushDispatcher {
    /// Start the delivery worker on the current tokio runtime.
    pub fn spawn(
        remote: Arc<dyn RemoteCrm>,
        store: StoreService,
        context: MapperContext,
        policy: RetryPolicy,
    ) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let (outcomes, _) = broadcast::channel(OUTCOME_CAPACITY);
        let worker = PushWorker {
            remote,
            store,
            context,
            policy,
        };
        let handle = tokio::spawn(worker.run(receiver, outcomes.clone()));

        Self {
            sender,
            outcomes,
            worker: handle,
        }
    }

    /// Enqueue an event without waiting for delivery.
    pub fn notify(&self, event: PushEvent) {
        let kind = event.kind();
        let local_id = event.local_id;
        if self.sender.send(event).is_err() {
            tracing::warn!(%kind, %local_id, "Push worker stopped; dropping event");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PushOutcome> {
        self.outcomes.subscribe()
    }

    /// Stop accepting events and wait until the queue is drained.
    pub async fn shutdown(self) {
        drop(self.sender);
        if let Err(error) = self.worker.await {
            tracing::error!("Push worker terminated abnormally: {error}");
        }
    }
}

struct PushWorker {
    remote: Arc<dyn RemoteCrm>,
    store: StoreService,
    context: MapperContext,
    policy: RetryPolicy,
}

impl PushWorker {
    async fn run(
        self,
        mut receiver: mpsc::UnboundedReceiver<PushEvent>,
        outcomes: broadcast::Sender<PushOutcome>,
    ) {
        while let Some(event) = receiver.recv().await {
            let outcome = self.deliver(&event).await;
            // No subscribers is fine
            let _ = outcomes.send(outcome);
        }
        tracing::debug!("Push queue closed");
    }

    async fn deliver(&self, event: &PushEvent) -> PushOutcome {
        let kind = event.kind();
        let local_id = event.local_id;
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.attempt(event).await {
                Ok(linked) => {
                    tracing::debug!(%kind, %local_id, verb = event.verb(), attempt, "Pushed");
                    return PushOutcome::Delivered {
                        kind,
                        local_id,
                        linked,
                        attempts: attempt,
                    };
                }
                Err(error) => {
                    if Self::is_retryable(&error) && attempt < self.policy.max_attempts {
                        let backoff = self.policy.backoff(attempt);
                        tracing::debug!(
                            %kind,
                            %local_id,
                            "Push retry attempt {}/{} in {:?}: {}",
                            attempt + 1,
                            self.policy.max_attempts,
                            backoff,
                            error
                        );
                        tokio::time::sleep(backoff).await;
                        continue;
                    }

                    tracing::warn!(
                        %kind,
                        %local_id,
                        verb = event.verb(),
                        attempts = attempt,
                        "Push failed, left for reconciliation: {error}"
                    );
                    return PushOutcome::Failed {
                        kind,
                        local_id,
                        class: FailureClass::of(&error),
                        message: error.to_string(),
                        attempts: attempt,
                    };
                }
            }
        }
    }

    fn is_retryable(error: &Error) -> bool {
        matches!(error, Error::Remote(remote) if remote.retry_class() == ApiRetryClass::Retryable)
    }

    /// One delivery attempt; returns the remote id when it created.
    async fn attempt(&self, event: &PushEvent) -> Result<Option<RemoteId>> {
        match &event.action {
            PushAction::Upsert { fields, remote_id } => {
                // An earlier queued create may have linked the record since
                // this event was emitted.
                let remote_id = match remote_id {
                    Some(remote_id) => Some(remote_id.clone()),
                    None => {
                        self.store
                            .linked_remote_id(fields.kind(), &event.local_id)
                            .await?
                    }
                };
                let payload = to_remote_payload(fields, &self.context);

                match remote_id {
                    Some(remote_id) => {
                        self.remote.update(&remote_id, &payload).await?;
                        Ok(None)
                    }
                    None => {
                        let remote_id = self.remote.create(&payload).await?;
                        link_created(
                            &self.store,
                            self.remote.as_ref(),
                            fields.kind(),
                            &event.local_id,
                            &remote_id,
                        )
                        .await?;
                        Ok(Some(remote_id))
                    }
                }
            }
            PushAction::StatusChange { remote_id, payload } => {
                self.remote.update_status(remote_id, payload).await?;
                Ok(None)
            }
            PushAction::Delete { kind, remote_id } => {
                self.remote.delete(*kind, remote_id).await?;
                Ok(None)
            }
        }
    }
}

/// Record the link of a just-created remote record.
///
/// When the local record was deleted while the create was in flight, the
/// remote copy is removed so a later pull cannot bring the record back. The
/// `NotFound` is still returned to the caller.
pub(crate) async fn link_created(
    store: &StoreService,
    remote: &dyn RemoteCrm,
    kind: EntityKind,
    local_id: &LocalId,
    remote_id: &RemoteId,
) -> Result<()> {
    match store.mark_linked(kind, local_id, remote_id).await {
        Err(error @ Error::NotFound { .. }) => {
            tracing::info!(%kind, %local_id, %remote_id, "Removing remote orphan");
            if let Err(delete_error) = remote.delete(kind, remote_id).await {
                tracing::warn!(
                    %kind,
                    %remote_id,
                    "Failed to remove remote orphan: {delete_error}"
                );
            }
            Err(error)
        }
        other => other,
    }
}

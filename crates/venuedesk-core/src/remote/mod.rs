//! Remote CRM boundary

mod client;
mod error;
#[cfg(test)]
pub(crate) mod fake;

use async_trait::async_trait;

pub use client::CrmClient;
pub use error::{ApiRetryClass, RemoteError};

use crate::mapper::{RemotePayload, RemoteRecord, StatusPayload};
use crate::models::{EntityKind, RemoteId};

pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// One page of a remote list call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemotePage {
    pub records: Vec<RemoteRecord>,
    /// Cursor for the following page; `None` on the last page.
    pub next_cursor: Option<String>,
    /// Items on the page that could not be decoded.
    pub undecodable: usize,
}

/// Kind-tagged operations the sync engine needs from the CRM.
#[async_trait]
pub trait RemoteCrm: Send + Sync {
    /// Create a resource and return its remote id.
    async fn create(&self, payload: &RemotePayload) -> RemoteResult<RemoteId>;

    /// Replace a resource's fields.
    async fn update(&self, remote_id: &RemoteId, payload: &RemotePayload) -> RemoteResult<()>;

    /// Move an opportunity through its pipeline.
    async fn update_status(&self, remote_id: &RemoteId, payload: &StatusPayload)
        -> RemoteResult<()>;

    async fn delete(&self, kind: EntityKind, remote_id: &RemoteId) -> RemoteResult<()>;

    /// Fetch the page after `cursor` (first page when `None`).
    async fn list(&self, kind: EntityKind, cursor: Option<&str>) -> RemoteResult<RemotePage>;
}

//! Database layer for Venuedesk

mod connection;
mod entity;
mod migrations;
mod repository;
mod sync_state;

pub use connection::Database;
pub use entity::SyncEntity;
pub use repository::{LibSqlEntityStore, UpsertOutcome};
pub use sync_state::{LeaseStatus, LibSqlSyncStateRepository, StoredRun};

//! Scheduled reconciliation between the local store and the CRM.
//!
//! A run pulls every kind concurrently (each kind isolated from the others'
//! failures), upserting by remote id, then pushes opportunities that were
//! never linked. Overlapping runs are refused through a store-backed lease.

mod job;
pub mod scheduler;
mod summary;

pub use job::{JobPhase, ReconciliationJob, LEASE_NAME};
pub use summary::{FailureClass, KindError, KindPullReport, PushUnlinkedReport, ReconcileSummary};

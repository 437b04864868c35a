//! Data models for Venuedesk

mod booking;
mod contact;
mod ids;
mod kind;
mod opportunity;
mod record;
mod task;

pub use booking::{BookingFields, BookingStatus};
pub use contact::ContactFields;
pub use ids::{LocalId, RemoteId};
pub use kind::EntityKind;
pub use opportunity::{OpportunityFields, OpportunityStatus};
pub use record::{Booking, Contact, LocalFields, Opportunity, Record, Task};
pub use task::{TaskFields, TaskPriority};

//! Generic local record envelope

use serde::{Deserialize, Serialize};

use super::{
    BookingFields, ContactFields, EntityKind, LocalId, OpportunityFields, RemoteId, TaskFields,
};

/// A locally stored entity plus its sync linkage.
///
/// `remote_id` is `None` until the record has been pushed and acknowledged,
/// or from birth when the record was created by a reconciliation pull.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record<F> {
    pub id: LocalId,
    pub remote_id: Option<RemoteId>,
    pub fields: F,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last update timestamp (Unix ms)
    pub updated_at: i64,
}

impl<F> Record<F> {
    /// Create a new unlinked record with the given fields
    #[must_use]
    pub fn new(fields: F) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            id: LocalId::new(),
            remote_id: None,
            fields,
            created_at: now,
            updated_at: now,
        }
    }

    pub const fn is_linked(&self) -> bool {
        self.remote_id.is_some()
    }
}

pub type Contact = Record<ContactFields>;
pub type Opportunity = Record<OpportunityFields>;
pub type Booking = Record<BookingFields>;
pub type Task = Record<TaskFields>;

/// Kind-tagged local field set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "fields", rename_all = "snake_case")]
pub enum LocalFields {
    Contact(ContactFields),
    Opportunity(OpportunityFields),
    CalendarEvent(BookingFields),
    Task(TaskFields),
}

impl LocalFields {
    pub const fn kind(&self) -> EntityKind {
        match self {
            Self::Contact(_) => EntityKind::Contact,
            Self::Opportunity(_) => EntityKind::Opportunity,
            Self::CalendarEvent(_) => EntityKind::CalendarEvent,
            Self::Task(_) => EntityKind::Task,
        }
    }
}

impl From<ContactFields> for LocalFields {
    fn from(value: ContactFields) -> Self {
        Self::Contact(value)
    }
}

impl From<OpportunityFields> for LocalFields {
    fn from(value: OpportunityFields) -> Self {
        Self::Opportunity(value)
    }
}

impl From<BookingFields> for LocalFields {
    fn from(value: BookingFields) -> Self {
        Self::CalendarEvent(value)
    }
}

impl From<TaskFields> for LocalFields {
    fn from(value: TaskFields) -> Self {
        Self::Task(value)
    }
}

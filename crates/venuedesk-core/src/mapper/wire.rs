//! Remote resource shapes as they travel over the wire.
//!
//! Inbound structs are lenient (unknown fields ignored, most fields
//! optional). Outbound payloads never skip a field: an absent value is sent
//! as an explicit `null`.

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

use crate::models::EntityKind;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteContact {
    pub id: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteOpportunity {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub pipeline_stage_id: Option<String>,
    /// Number or numeric string.
    #[serde(default)]
    pub monetary_value: Option<serde_json::Value>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default, deserialize_with = "lenient_count")]
    pub guest_count: Option<u32>,
    #[serde(default)]
    pub event_type: Option<String>,
    #[serde(default)]
    pub contact_id: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteAppointment {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub appointment_status: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub contact_id: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteTask {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub assigned_to: Option<String>,
    #[serde(default)]
    pub contact_id: Option<String>,
}

/// Counts outside the `u32` range (negative, fractional, text) read as absent.
fn lenient_count<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value
        .as_ref()
        .and_then(serde_json::Value::as_u64)
        .and_then(|count| u32::try_from(count).ok()))
}

/// A record received from the remote system, tagged by kind.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteRecord {
    Contact(RemoteContact),
    Opportunity(RemoteOpportunity),
    CalendarEvent(RemoteAppointment),
    Task(RemoteTask),
}

impl RemoteRecord {
    pub const fn kind(&self) -> EntityKind {
        match self {
            Self::Contact(_) => EntityKind::Contact,
            Self::Opportunity(_) => EntityKind::Opportunity,
            Self::CalendarEvent(_) => EntityKind::CalendarEvent,
            Self::Task(_) => EntityKind::Task,
        }
    }

    /// Raw remote id as sent by the server (may be blank on bad data).
    pub fn raw_id(&self) -> &str {
        match self {
            Self::Contact(record) => &record.id,
            Self::Opportunity(record) => &record.id,
            Self::CalendarEvent(record) => &record.id,
            Self::Task(record) => &record.id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactPayload {
    pub location_id: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company_name: Option<String>,
    pub source: Option<String>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpportunityPayload {
    pub location_id: String,
    pub pipeline_id: Option<String>,
    pub pipeline_stage_id: Option<String>,
    pub name: String,
    pub status: String,
    pub monetary_value: Option<Decimal>,
    pub start_date: Option<String>,
    pub guest_count: Option<u32>,
    pub event_type: Option<String>,
    pub contact_id: Option<String>,
    pub source: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentPayload {
    pub location_id: String,
    pub calendar_id: Option<String>,
    pub title: String,
    pub start_time: String,
    pub end_time: String,
    pub appointment_status: String,
    pub address: Option<String>,
    pub contact_id: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPayload {
    pub title: String,
    pub body: Option<String>,
    pub due_date: Option<String>,
    pub completed: bool,
    pub priority: String,
    pub assigned_to: Option<String>,
    pub contact_id: Option<String>,
}

/// Outbound body for a create or update, tagged by kind.
///
/// Serializes as the bare inner body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum RemotePayload {
    Contact(ContactPayload),
    Opportunity(OpportunityPayload),
    CalendarEvent(AppointmentPayload),
    Task(TaskPayload),
}

impl RemotePayload {
    pub const fn kind(&self) -> EntityKind {
        match self {
            Self::Contact(_) => EntityKind::Contact,
            Self::Opportunity(_) => EntityKind::Opportunity,
            Self::CalendarEvent(_) => EntityKind::CalendarEvent,
            Self::Task(_) => EntityKind::Task,
        }
    }
}

/// Opportunity status-change body: only the fields a pipeline move touches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusPayload {
    pub status: String,
    pub monetary_value: Option<Decimal>,
}

//! Entity mapper: pure translation between local field sets and remote
//! resource shapes.
//!
//! Identity (local id and remote link) is owned by the caller. The mapper
//! only ever sees and produces syncable fields.

mod wire;

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rust_decimal::Decimal;

pub use wire::{
    AppointmentPayload, ContactPayload, OpportunityPayload, RemoteAppointment, RemoteContact,
    RemoteOpportunity, RemotePayload, RemoteRecord, RemoteTask, StatusPayload, TaskPayload,
};

use crate::config::RemoteConfig;
use crate::error::Result;
use crate::models::{
    BookingFields, BookingStatus, ContactFields, LocalFields, OpportunityFields,
    OpportunityStatus, RemoteId, TaskFields, TaskPriority,
};
use crate::remote::RemoteError;
use crate::util::non_blank;

/// Tenant-level identifiers every outbound payload may need.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MapperContext {
    pub location_id: String,
    pub pipeline_id: Option<String>,
    pub pipeline_stage_id: Option<String>,
    pub calendar_id: Option<String>,
}

impl MapperContext {
    pub fn from_config(config: &RemoteConfig) -> Self {
        Self {
            location_id: config.location_id.clone(),
            pipeline_id: config.pipeline_id.clone(),
            pipeline_stage_id: config.pipeline_stage_id.clone(),
            calendar_id: config.calendar_id.clone(),
        }
    }
}

/// Build the remote create/update body for a local field set.
pub fn to_remote_payload(fields: &LocalFields, context: &MapperContext) -> RemotePayload {
    match fields {
        LocalFields::Contact(contact) => RemotePayload::Contact(contact_payload(contact, context)),
        LocalFields::Opportunity(opportunity) => {
            RemotePayload::Opportunity(opportunity_payload(opportunity, context))
        }
        LocalFields::CalendarEvent(booking) => {
            RemotePayload::CalendarEvent(appointment_payload(booking, context))
        }
        LocalFields::Task(task) => RemotePayload::Task(task_payload(task)),
    }
}

/// Normalize a remote record into its remote id and local field set.
pub fn from_remote_record(record: RemoteRecord) -> Result<(RemoteId, LocalFields)> {
    let kind = record.kind();
    let remote_id = RemoteId::new(record.raw_id())
        .ok_or_else(|| RemoteError::decode(format!("{kind} record without an id")))?;

    let fields = match record {
        RemoteRecord::Contact(contact) => LocalFields::Contact(contact_fields(contact)),
        RemoteRecord::Opportunity(opportunity) => {
            LocalFields::Opportunity(opportunity_fields(opportunity)?)
        }
        RemoteRecord::CalendarEvent(appointment) => {
            LocalFields::CalendarEvent(booking_fields(appointment)?)
        }
        RemoteRecord::Task(task) => LocalFields::Task(task_fields(task)?),
    };

    Ok((remote_id, fields))
}

/// Status-change body for an opportunity pipeline move.
pub fn status_payload(fields: &OpportunityFields) -> StatusPayload {
    StatusPayload {
        status: fields.status.as_str().to_string(),
        monetary_value: fields.monetary_value.map(normalize_money),
    }
}

fn contact_payload(fields: &ContactFields, context: &MapperContext) -> ContactPayload {
    ContactPayload {
        location_id: context.location_id.clone(),
        first_name: fields.first_name.clone(),
        last_name: fields.last_name.clone(),
        email: fields.email.clone(),
        phone: fields.phone.clone(),
        company_name: fields.company_name.clone(),
        source: fields.source.clone(),
        tags: fields.tags.clone(),
    }
}

fn opportunity_payload(fields: &OpportunityFields, context: &MapperContext) -> OpportunityPayload {
    OpportunityPayload {
        location_id: context.location_id.clone(),
        pipeline_id: context.pipeline_id.clone(),
        pipeline_stage_id: fields
            .stage_id
            .clone()
            .or_else(|| context.pipeline_stage_id.clone()),
        name: fields.title.clone(),
        status: fields.status.as_str().to_string(),
        monetary_value: fields.monetary_value.map(normalize_money),
        start_date: fields
            .preferred_date
            .map(|date| date.format("%Y-%m-%d").to_string()),
        guest_count: fields.guest_count,
        event_type: fields.event_type.clone(),
        contact_id: remote_id_string(fields.contact_remote_id.as_ref()),
        source: fields.source.clone(),
        notes: fields.notes.clone(),
    }
}

fn appointment_payload(fields: &BookingFields, context: &MapperContext) -> AppointmentPayload {
    AppointmentPayload {
        location_id: context.location_id.clone(),
        calendar_id: context.calendar_id.clone(),
        title: fields.title.clone(),
        start_time: format_timestamp(fields.start_time),
        end_time: format_timestamp(fields.end_time),
        appointment_status: fields.status.as_str().to_string(),
        address: fields.space.clone(),
        contact_id: remote_id_string(fields.contact_remote_id.as_ref()),
        notes: fields.notes.clone(),
    }
}

fn task_payload(fields: &TaskFields) -> TaskPayload {
    TaskPayload {
        title: fields.title.clone(),
        body: fields.body.clone(),
        due_date: fields.due_date.map(format_timestamp),
        completed: fields.completed,
        priority: fields.priority.as_str().to_string(),
        assigned_to: fields.assigned_to.clone(),
        contact_id: remote_id_string(fields.contact_remote_id.as_ref()),
    }
}

fn contact_fields(remote: RemoteContact) -> ContactFields {
    ContactFields {
        first_name: non_blank(remote.first_name),
        last_name: non_blank(remote.last_name),
        email: non_blank(remote.email),
        phone: non_blank(remote.phone),
        company_name: non_blank(remote.company_name),
        source: non_blank(remote.source),
        tags: remote
            .tags
            .into_iter()
            .filter_map(|tag| non_blank(Some(tag)))
            .collect(),
    }
}

fn opportunity_fields(remote: RemoteOpportunity) -> Result<OpportunityFields> {
    let monetary_value = remote
        .monetary_value
        .as_ref()
        .map(parse_money)
        .transpose()?
        .flatten();

    Ok(OpportunityFields {
        title: title_or(remote.name, "Untitled inquiry"),
        status: OpportunityStatus::from_remote(remote.status.as_deref()),
        stage_id: non_blank(remote.pipeline_stage_id),
        monetary_value,
        preferred_date: remote.start_date.as_deref().and_then(parse_date),
        guest_count: remote.guest_count,
        event_type: non_blank(remote.event_type),
        contact_remote_id: remote.contact_id.and_then(RemoteId::new),
        source: non_blank(remote.source),
        notes: non_blank(remote.notes),
    })
}

fn booking_fields(remote: RemoteAppointment) -> Result<BookingFields> {
    let start_time = remote
        .start_time
        .as_deref()
        .map(|value| parse_timestamp(value, "startTime"))
        .transpose()?
        .ok_or_else(|| {
            RemoteError::decode(format!("appointment {} has no startTime", remote.id.trim()))
        })?;
    let end_time = remote
        .end_time
        .as_deref()
        .map(|value| parse_timestamp(value, "endTime"))
        .transpose()?
        .unwrap_or(start_time);

    Ok(BookingFields {
        title: title_or(remote.title, "Untitled booking"),
        start_time,
        end_time,
        status: BookingStatus::from_remote(remote.appointment_status.as_deref()),
        space: non_blank(remote.address),
        contact_remote_id: remote.contact_id.and_then(RemoteId::new),
        notes: non_blank(remote.notes),
    })
}

fn task_fields(remote: RemoteTask) -> Result<TaskFields> {
    let due_date = remote
        .due_date
        .as_deref()
        .filter(|value| !value.trim().is_empty())
        .map(|value| parse_timestamp(value, "dueDate"))
        .transpose()?;

    Ok(TaskFields {
        title: title_or(remote.title, "Untitled task"),
        body: non_blank(remote.body),
        due_date,
        completed: remote.completed,
        priority: remote
            .priority
            .as_deref()
            .and_then(|value| value.parse().ok())
            .unwrap_or(TaskPriority::Medium),
        assigned_to: non_blank(remote.assigned_to),
        contact_remote_id: remote.contact_id.and_then(RemoteId::new),
    })
}

fn title_or(value: Option<String>, fallback: &str) -> String {
    non_blank(value).unwrap_or_else(|| fallback.to_string())
}

fn remote_id_string(id: Option<&RemoteId>) -> Option<String> {
    id.map(|id| id.as_str().to_string())
}

/// Money is exchanged with two decimal places.
fn normalize_money(value: Decimal) -> Decimal {
    value.round_dp(2)
}

fn parse_money(value: &serde_json::Value) -> Result<Option<Decimal>> {
    let text = match value {
        serde_json::Value::Null => return Ok(None),
        serde_json::Value::Number(number) => number.to_string(),
        serde_json::Value::String(text) if text.trim().is_empty() => return Ok(None),
        serde_json::Value::String(text) => text.trim().to_string(),
        other => {
            return Err(RemoteError::decode(format!("monetaryValue is not numeric: {other}")).into())
        }
    };

    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map(|value| Some(normalize_money(value)))
        .map_err(|_| RemoteError::decode(format!("monetaryValue is not numeric: {text}")).into())
}

/// Accepts `YYYY-MM-DD` or a full timestamp; unparseable dates are dropped.
fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    NaiveDate::parse_from_str(value.get(..10)?, "%Y-%m-%d").ok()
}

fn parse_timestamp(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|timestamp| timestamp.with_timezone(&Utc))
        .map_err(|error| RemoteError::decode(format!("{field} '{value}': {error}")).into())
}

fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use rust_decimal::prelude::FromPrimitive;
    use serde_json::json;

    fn context() -> MapperContext {
        MapperContext {
            location_id: "loc-1".to_string(),
            pipeline_id: Some("pipe-1".to_string()),
            pipeline_stage_id: Some("stage-new".to_string()),
            calendar_id: Some("cal-1".to_string()),
        }
    }

    fn remote_opportunity(id: &str) -> RemoteOpportunity {
        serde_json::from_value(json!({ "id": id, "name": "Summer gala" })).unwrap()
    }

    #[test]
    fn opportunity_payload_translates_field_names() {
        let mut fields = OpportunityFields::titled("Summer gala");
        fields.preferred_date = NaiveDate::from_ymd_opt(2026, 7, 4);
        fields.monetary_value = Decimal::from_f64(12_500.456);
        fields.contact_remote_id = RemoteId::new("c-9");

        let payload = to_remote_payload(&fields.into(), &context());
        let body = serde_json::to_value(&payload).unwrap();

        assert_eq!(body["name"], "Summer gala");
        assert_eq!(body["startDate"], "2026-07-04");
        let money = body["monetaryValue"].as_f64().unwrap();
        assert!((money - 12_500.46).abs() < 1e-6);
        assert_eq!(body["contactId"], "c-9");
        assert_eq!(body["pipelineStageId"], "stage-new");
        assert_eq!(body["locationId"], "loc-1");
    }

    #[test]
    fn absent_optionals_serialize_as_explicit_null() {
        let payload = to_remote_payload(&OpportunityFields::titled("Bare").into(), &context());
        let body = serde_json::to_value(&payload).unwrap();
        let object = body.as_object().unwrap();

        for key in ["monetaryValue", "startDate", "guestCount", "contactId", "notes"] {
            assert!(object.contains_key(key), "{key} must be present");
            assert!(object[key].is_null(), "{key} must be null");
        }
    }

    #[test]
    fn booking_status_maps_to_appointment_status() {
        let start = Utc.with_ymd_and_hms(2026, 9, 12, 17, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2026, 9, 12, 23, 0, 0).unwrap();
        let mut fields = BookingFields::new("Reception", start, end);
        fields.status = BookingStatus::Confirmed;
        fields.space = Some("Garden hall".to_string());

        let RemotePayload::CalendarEvent(payload) = to_remote_payload(&fields.into(), &context())
        else {
            panic!("expected appointment payload");
        };
        assert_eq!(payload.appointment_status, "confirmed");
        assert_eq!(payload.start_time, "2026-09-12T17:00:00Z");
        assert_eq!(payload.address.as_deref(), Some("Garden hall"));
        assert_eq!(payload.calendar_id.as_deref(), Some("cal-1"));
    }

    #[test]
    fn remote_opportunity_normalizes_money_and_dates() {
        let remote: RemoteOpportunity = serde_json::from_value(json!({
            "id": " opp-42 ",
            "name": "Winter ball",
            "status": "won",
            "monetaryValue": "1999.999",
            "startDate": "2026-12-20T00:00:00.000Z",
            "guestCount": 180,
            "contactId": ""
        }))
        .unwrap();

        let (remote_id, fields) = from_remote_record(RemoteRecord::Opportunity(remote)).unwrap();
        assert_eq!(remote_id.as_str(), "opp-42");

        let LocalFields::Opportunity(fields) = fields else {
            panic!("expected opportunity fields");
        };
        assert_eq!(fields.title, "Winter ball");
        assert_eq!(fields.status, OpportunityStatus::Won);
        assert_eq!(fields.monetary_value, Decimal::from_str("2000.00").ok());
        assert_eq!(fields.preferred_date, NaiveDate::from_ymd_opt(2026, 12, 20));
        assert_eq!(fields.guest_count, Some(180));
        assert_eq!(fields.contact_remote_id, None);
    }

    #[test]
    fn unknown_statuses_fall_back() {
        let mut remote = remote_opportunity("opp-1");
        remote.status = Some("archived".to_string());
        let (_, fields) = from_remote_record(RemoteRecord::Opportunity(remote)).unwrap();
        assert!(matches!(
            fields,
            LocalFields::Opportunity(OpportunityFields {
                status: OpportunityStatus::Open,
                ..
            })
        ));

        let appointment: RemoteAppointment = serde_json::from_value(json!({
            "id": "evt-1",
            "startTime": "2026-05-01T10:00:00Z",
            "appointmentStatus": "rescheduled"
        }))
        .unwrap();
        let (_, fields) = from_remote_record(RemoteRecord::CalendarEvent(appointment)).unwrap();
        let LocalFields::CalendarEvent(booking) = fields else {
            panic!("expected booking fields");
        };
        assert_eq!(booking.status, BookingStatus::New);
        assert_eq!(booking.end_time, booking.start_time);
        assert_eq!(booking.title, "Untitled booking");
    }

    #[test]
    fn record_without_id_is_a_decode_failure() {
        let error = from_remote_record(RemoteRecord::Opportunity(remote_opportunity("  ")))
            .unwrap_err();
        assert!(matches!(
            error,
            crate::Error::Remote(RemoteError::Decode(_))
        ));
    }

    #[test]
    fn appointment_without_start_is_a_decode_failure() {
        let appointment: RemoteAppointment =
            serde_json::from_value(json!({ "id": "evt-2", "title": "Tasting" })).unwrap();
        assert!(from_remote_record(RemoteRecord::CalendarEvent(appointment)).is_err());
    }

    #[test]
    fn non_numeric_money_is_rejected() {
        let mut remote = remote_opportunity("opp-3");
        remote.monetary_value = Some(json!({ "amount": 10 }));
        assert!(from_remote_record(RemoteRecord::Opportunity(remote)).is_err());
    }

    #[test]
    fn contact_tags_are_trimmed_and_blank_tags_dropped() {
        let remote: RemoteContact = serde_json::from_value(json!({
            "id": "c-1",
            "firstName": " Ada ",
            "email": "",
            "tags": ["vip", "  ", " wedding "]
        }))
        .unwrap();
        let (_, fields) = from_remote_record(RemoteRecord::Contact(remote)).unwrap();
        assert_eq!(
            fields,
            LocalFields::Contact(ContactFields {
                first_name: Some("Ada".to_string()),
                tags: vec!["vip".to_string(), "wedding".to_string()],
                ..Default::default()
            })
        );
    }

    #[test]
    fn task_round_trip_keeps_priority_and_due_date() {
        let mut fields = TaskFields::titled("Confirm florist");
        fields.priority = TaskPriority::High;
        fields.due_date = Some(Utc.with_ymd_and_hms(2026, 3, 2, 9, 30, 0).unwrap());
        fields.completed = true;

        let RemotePayload::Task(payload) = to_remote_payload(&fields.clone().into(), &context())
        else {
            panic!("expected task payload");
        };
        let remote = RemoteTask {
            id: "t-1".to_string(),
            title: Some(payload.title),
            body: payload.body,
            due_date: payload.due_date,
            completed: payload.completed,
            priority: Some(payload.priority),
            assigned_to: payload.assigned_to,
            contact_id: payload.contact_id,
        };

        let (_, mapped) = from_remote_record(RemoteRecord::Task(remote)).unwrap();
        assert_eq!(mapped, LocalFields::Task(fields));
    }

    #[test]
    fn status_payload_carries_only_status_and_value() {
        let mut fields = OpportunityFields::titled("Launch party");
        fields.status = OpportunityStatus::Lost;
        let body = serde_json::to_value(status_payload(&fields)).unwrap();
        assert_eq!(body, json!({ "status": "lost", "monetaryValue": null }));
    }
}

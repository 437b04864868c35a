//! Column layout and row codecs for the syncable field sets.
//!
//! Every entity table shares the same leading columns
//! (`id, remote_id, created_at, updated_at`) followed by the per-kind field
//! columns listed in [`SyncEntity::COLUMNS`].

#![allow(clippy::cast_possible_wrap)] // SQLite stores integers as i64

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use libsql::{Row, Value};
use rust_decimal::Decimal;

use crate::error::{Error, Result};
use crate::models::{
    BookingFields, ContactFields, EntityKind, LocalFields, OpportunityFields, RemoteId, TaskFields,
};

/// Index of the first field column in a `SELECT` built by the store.
pub const FIELD_OFFSET: i32 = 4;

/// A field set that can be stored in its own table and mirrored remotely.
pub trait SyncEntity: Clone + Send + Sync + Sized + 'static {
    const KIND: EntityKind;

    /// Field columns in bind order.
    const COLUMNS: &'static [&'static str];

    /// Bind values for [`Self::COLUMNS`], same order.
    fn to_values(&self) -> Result<Vec<Value>>;

    /// Decode field columns starting at `offset`.
    fn from_row(row: &Row, offset: i32) -> Result<Self>;

    fn into_local(self) -> LocalFields;

    fn table() -> &'static str {
        Self::KIND.table()
    }
}

impl SyncEntity for ContactFields {
    const KIND: EntityKind = EntityKind::Contact;
    const COLUMNS: &'static [&'static str] = &[
        "first_name",
        "last_name",
        "email",
        "phone",
        "company_name",
        "source",
        "tags",
    ];

    fn to_values(&self) -> Result<Vec<Value>> {
        Ok(vec![
            text(self.first_name.as_deref()),
            text(self.last_name.as_deref()),
            text(self.email.as_deref()),
            text(self.phone.as_deref()),
            text(self.company_name.as_deref()),
            text(self.source.as_deref()),
            Value::Text(serde_json::to_string(&self.tags)?),
        ])
    }

    fn from_row(row: &Row, offset: i32) -> Result<Self> {
        let tags = read_text(row, offset + 6)?
            .map(|raw| serde_json::from_str::<Vec<String>>(&raw))
            .transpose()?
            .unwrap_or_default();

        Ok(Self {
            first_name: read_text(row, offset)?,
            last_name: read_text(row, offset + 1)?,
            email: read_text(row, offset + 2)?,
            phone: read_text(row, offset + 3)?,
            company_name: read_text(row, offset + 4)?,
            source: read_text(row, offset + 5)?,
            tags,
        })
    }

    fn into_local(self) -> LocalFields {
        LocalFields::Contact(self)
    }
}

impl SyncEntity for OpportunityFields {
    const KIND: EntityKind = EntityKind::Opportunity;
    const COLUMNS: &'static [&'static str] = &[
        "title",
        "status",
        "stage_id",
        "monetary_value",
        "preferred_date",
        "guest_count",
        "event_type",
        "contact_remote_id",
        "source",
        "notes",
    ];

    fn to_values(&self) -> Result<Vec<Value>> {
        Ok(vec![
            Value::Text(self.title.clone()),
            Value::Text(self.status.as_str().to_string()),
            text(self.stage_id.as_deref()),
            self.monetary_value
                .map_or(Value::Null, |value| Value::Text(value.to_string())),
            self.preferred_date.map_or(Value::Null, |date| {
                Value::Text(date.format("%Y-%m-%d").to_string())
            }),
            self.guest_count
                .map_or(Value::Null, |count| Value::Integer(i64::from(count))),
            text(self.event_type.as_deref()),
            text(self.contact_remote_id.as_ref().map(RemoteId::as_str)),
            text(self.source.as_deref()),
            text(self.notes.as_deref()),
        ])
    }

    fn from_row(row: &Row, offset: i32) -> Result<Self> {
        let monetary_value = read_text(row, offset + 3)?
            .map(|raw| {
                Decimal::from_str(&raw)
                    .map_err(|error| Error::Database(format!("bad monetary_value '{raw}': {error}")))
            })
            .transpose()?;
        let preferred_date = read_text(row, offset + 4)?
            .map(|raw| {
                NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
                    .map_err(|error| Error::Database(format!("bad preferred_date '{raw}': {error}")))
            })
            .transpose()?;
        let guest_count = read_i64(row, offset + 5)?
            .map(|count| {
                u32::try_from(count)
                    .map_err(|_| Error::Database(format!("bad guest_count {count}")))
            })
            .transpose()?;

        Ok(Self {
            title: read_required_text(row, offset)?,
            status: parse_column(&read_required_text(row, offset + 1)?)?,
            stage_id: read_text(row, offset + 2)?,
            monetary_value,
            preferred_date,
            guest_count,
            event_type: read_text(row, offset + 6)?,
            contact_remote_id: read_text(row, offset + 7)?.and_then(RemoteId::new),
            source: read_text(row, offset + 8)?,
            notes: read_text(row, offset + 9)?,
        })
    }

    fn into_local(self) -> LocalFields {
        LocalFields::Opportunity(self)
    }
}

impl SyncEntity for BookingFields {
    const KIND: EntityKind = EntityKind::CalendarEvent;
    const COLUMNS: &'static [&'static str] = &[
        "title",
        "start_time",
        "end_time",
        "status",
        "space",
        "contact_remote_id",
        "notes",
    ];

    fn to_values(&self) -> Result<Vec<Value>> {
        Ok(vec![
            Value::Text(self.title.clone()),
            Value::Integer(self.start_time.timestamp_millis()),
            Value::Integer(self.end_time.timestamp_millis()),
            Value::Text(self.status.as_str().to_string()),
            text(self.space.as_deref()),
            text(self.contact_remote_id.as_ref().map(RemoteId::as_str)),
            text(self.notes.as_deref()),
        ])
    }

    fn from_row(row: &Row, offset: i32) -> Result<Self> {
        Ok(Self {
            title: read_required_text(row, offset)?,
            start_time: millis_to_datetime(row.get::<i64>(offset + 1)?)?,
            end_time: millis_to_datetime(row.get::<i64>(offset + 2)?)?,
            status: parse_column(&read_required_text(row, offset + 3)?)?,
            space: read_text(row, offset + 4)?,
            contact_remote_id: read_text(row, offset + 5)?.and_then(RemoteId::new),
            notes: read_text(row, offset + 6)?,
        })
    }

    fn into_local(self) -> LocalFields {
        LocalFields::CalendarEvent(self)
    }
}

impl SyncEntity for TaskFields {
    const KIND: EntityKind = EntityKind::Task;
    const COLUMNS: &'static [&'static str] = &[
        "title",
        "body",
        "due_date",
        "completed",
        "priority",
        "assigned_to",
        "contact_remote_id",
    ];

    fn to_values(&self) -> Result<Vec<Value>> {
        Ok(vec![
            Value::Text(self.title.clone()),
            text(self.body.as_deref()),
            self.due_date
                .map_or(Value::Null, |due| Value::Integer(due.timestamp_millis())),
            Value::Integer(i64::from(self.completed)),
            Value::Text(self.priority.as_str().to_string()),
            text(self.assigned_to.as_deref()),
            text(self.contact_remote_id.as_ref().map(RemoteId::as_str)),
        ])
    }

    fn from_row(row: &Row, offset: i32) -> Result<Self> {
        Ok(Self {
            title: read_required_text(row, offset)?,
            body: read_text(row, offset + 1)?,
            due_date: read_i64(row, offset + 2)?
                .map(millis_to_datetime)
                .transpose()?,
            completed: row.get::<i64>(offset + 3)? != 0,
            priority: parse_column(&read_required_text(row, offset + 4)?)?,
            assigned_to: read_text(row, offset + 5)?,
            contact_remote_id: read_text(row, offset + 6)?.and_then(RemoteId::new),
        })
    }

    fn into_local(self) -> LocalFields {
        LocalFields::Task(self)
    }
}

fn text(value: Option<&str>) -> Value {
    value.map_or(Value::Null, |value| Value::Text(value.to_string()))
}

/// Read a nullable text column.
pub fn read_text(row: &Row, index: i32) -> Result<Option<String>> {
    match row.get_value(index)? {
        Value::Null => Ok(None),
        Value::Text(value) => Ok(Some(value)),
        other => Err(Error::Database(format!(
            "expected text in column {index}, found {other:?}"
        ))),
    }
}

pub fn read_required_text(row: &Row, index: i32) -> Result<String> {
    read_text(row, index)?
        .ok_or_else(|| Error::Database(format!("unexpected NULL in column {index}")))
}

/// Read a nullable integer column.
pub fn read_i64(row: &Row, index: i32) -> Result<Option<i64>> {
    match row.get_value(index)? {
        Value::Null => Ok(None),
        Value::Integer(value) => Ok(Some(value)),
        other => Err(Error::Database(format!(
            "expected integer in column {index}, found {other:?}"
        ))),
    }
}

fn millis_to_datetime(millis: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| Error::Database(format!("timestamp out of range: {millis}")))
}

fn parse_column<T: FromStr<Err = String>>(raw: &str) -> Result<T> {
    raw.parse().map_err(Error::Database)
}

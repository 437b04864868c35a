//! Venue booking (remote calendar appointment) model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::RemoteId;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    #[default]
    New,
    Confirmed,
    Cancelled,
    Showed,
    NoShow,
}

impl BookingStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Confirmed => "confirmed",
            Self::Cancelled => "cancelled",
            Self::Showed => "showed",
            Self::NoShow => "noshow",
        }
    }

    /// Lenient parse used for remote values; unknown statuses become `New`.
    #[must_use]
    pub fn from_remote(value: Option<&str>) -> Self {
        value.and_then(|value| value.parse().ok()).unwrap_or_default()
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "new" | "tentative" => Ok(Self::New),
            "confirmed" => Ok(Self::Confirmed),
            "cancelled" | "canceled" => Ok(Self::Cancelled),
            "showed" => Ok(Self::Showed),
            "noshow" | "no_show" | "no-show" => Ok(Self::NoShow),
            other => Err(format!("unknown booking status '{other}'")),
        }
    }
}

/// Syncable booking fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingFields {
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: BookingStatus,
    /// Venue space or room name.
    pub space: Option<String>,
    pub contact_remote_id: Option<RemoteId>,
    pub notes: Option<String>,
}

impl BookingFields {
    pub fn new(title: impl Into<String>, start_time: DateTime<Utc>, end_time: DateTime<Utc>) -> Self {
        Self {
            title: title.into(),
            start_time,
            end_time,
            status: BookingStatus::New,
            space: None,
            contact_remote_id: None,
            notes: None,
        }
    }

    /// Validate that the booking does not end before it starts.
    pub fn validate(&self) -> Result<(), String> {
        if self.end_time < self.start_time {
            return Err(format!(
                "booking '{}' ends before it starts",
                self.title.trim()
            ));
        }
        Ok(())
    }
}

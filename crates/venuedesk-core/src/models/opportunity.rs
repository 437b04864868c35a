//! Sales inquiry (remote opportunity) model

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::RemoteId;

/// Pipeline status of an inquiry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpportunityStatus {
    #[default]
    Open,
    Won,
    Lost,
    Abandoned,
}

impl OpportunityStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Won => "won",
            Self::Lost => "lost",
            Self::Abandoned => "abandoned",
        }
    }

    /// Lenient parse used for remote values; unknown statuses stay open.
    #[must_use]
    pub fn from_remote(value: Option<&str>) -> Self {
        value.and_then(|value| value.parse().ok()).unwrap_or_default()
    }
}

impl fmt::Display for OpportunityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OpportunityStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open" => Ok(Self::Open),
            "won" => Ok(Self::Won),
            "lost" => Ok(Self::Lost),
            "abandoned" | "abandon" => Ok(Self::Abandoned),
            other => Err(format!("unknown opportunity status '{other}'")),
        }
    }
}

/// Syncable inquiry fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpportunityFields {
    pub title: String,
    pub status: OpportunityStatus,
    /// Remote pipeline stage identifier.
    pub stage_id: Option<String>,
    pub monetary_value: Option<Decimal>,
    /// Date the client would like to hold the event.
    pub preferred_date: Option<NaiveDate>,
    pub guest_count: Option<u32>,
    pub event_type: Option<String>,
    pub contact_remote_id: Option<RemoteId>,
    pub source: Option<String>,
    pub notes: Option<String>,
}

impl OpportunityFields {
    /// Fresh open inquiry with only a title.
    #[must_use]
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            status: OpportunityStatus::Open,
            stage_id: None,
            monetary_value: None,
            preferred_date: None,
            guest_count: None,
            event_type: None,
            contact_remote_id: None,
            source: None,
            notes: None,
        }
    }
}

//! Structured result of one reconciliation run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::models::EntityKind;
use crate::remote::RemoteError;

/// Coarse failure class reported per error entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    Transport,
    Timeout,
    Rejected,
    Decode,
    /// Local store failure (constraint, I/O, corrupt row)
    Local,
}

impl FailureClass {
    pub const fn of(error: &Error) -> Self {
        match error {
            Error::Remote(remote) => Self::of_remote(remote),
            _ => Self::Local,
        }
    }

    pub const fn of_remote(error: &RemoteError) -> Self {
        match error {
            RemoteError::Rejected { .. } => Self::Rejected,
            RemoteError::Timeout => Self::Timeout,
            RemoteError::Transport(_) => Self::Transport,
            RemoteError::Decode(_) => Self::Decode,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Transport => "transport",
            Self::Timeout => "timeout",
            Self::Rejected => "rejected",
            Self::Decode => "decode",
            Self::Local => "local",
        }
    }
}

/// Outcome of one kind's pull-and-upsert sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindPullReport {
    pub kind: EntityKind,
    pub succeeded: bool,
    pub pages: usize,
    pub fetched: usize,
    pub inserted: usize,
    pub updated: usize,
    /// Records dropped because they could not be mapped.
    pub skipped: usize,
}

impl KindPullReport {
    pub const fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            succeeded: false,
            pages: 0,
            fetched: 0,
            inserted: 0,
            updated: 0,
            skipped: 0,
        }
    }
}

/// Outcome of the unlinked-opportunity push pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushUnlinkedReport {
    pub candidates: usize,
    pub created: usize,
    pub failed: usize,
}

/// One failure recorded during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindError {
    pub kind: EntityKind,
    pub class: FailureClass,
    pub message: String,
    /// Local record the failure relates to (push pass only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_id: Option<String>,
}

impl KindError {
    pub fn from_error(kind: EntityKind, error: &Error) -> Self {
        Self {
            kind,
            class: FailureClass::of(error),
            message: error.to_string(),
            local_id: None,
        }
    }

    #[must_use]
    pub fn for_record(mut self, local_id: impl ToString) -> Self {
        self.local_id = Some(local_id.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileSummary {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub pulls: Vec<KindPullReport>,
    pub push_unlinked: PushUnlinkedReport,
    pub errors: Vec<KindError>,
}

impl ReconcileSummary {
    pub fn succeeded_kinds(&self) -> Vec<EntityKind> {
        self.pulls
            .iter()
            .filter(|pull| pull.succeeded)
            .map(|pull| pull.kind)
            .collect()
    }

    pub fn failed_kinds(&self) -> Vec<EntityKind> {
        self.pulls
            .iter()
            .filter(|pull| !pull.succeeded)
            .map(|pull| pull.kind)
            .collect()
    }

    pub fn pull(&self, kind: EntityKind) -> Option<&KindPullReport> {
        self.pulls.iter().find(|pull| pull.kind == kind)
    }

    /// No pull failed and every unlinked record was pushed.
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary() -> ReconcileSummary {
        let now = Utc::now();
        let mut contacts = KindPullReport::new(EntityKind::Contact);
        contacts.succeeded = false;
        let mut opportunities = KindPullReport::new(EntityKind::Opportunity);
        opportunities.succeeded = true;

        ReconcileSummary {
            run_id: "run-1".to_string(),
            started_at: now,
            finished_at: now,
            pulls: vec![contacts, opportunities],
            push_unlinked: PushUnlinkedReport::default(),
            errors: vec![KindError {
                kind: EntityKind::Contact,
                class: FailureClass::Timeout,
                message: "CRM request timed out".to_string(),
                local_id: None,
            }],
        }
    }

    #[test]
    fn splits_kinds_by_outcome() {
        let summary = summary();
        assert_eq!(summary.succeeded_kinds(), vec![EntityKind::Opportunity]);
        assert_eq!(summary.failed_kinds(), vec![EntityKind::Contact]);
        assert!(!summary.is_clean());
    }

    #[test]
    fn classifies_errors() {
        let remote = Error::Remote(RemoteError::rejected(400, "bad"));
        assert_eq!(FailureClass::of(&remote), FailureClass::Rejected);
        let local = Error::InvalidInput("x".to_string());
        assert_eq!(FailureClass::of(&local), FailureClass::Local);
    }

    #[test]
    fn serializes_class_names_in_snake_case() {
        let json = serde_json::to_value(summary()).unwrap();
        assert_eq!(json["errors"][0]["class"], "timeout");
        assert_eq!(json["pulls"][0]["kind"], "contact");
        assert!(json["errors"][0].get("local_id").is_none());
    }
}

use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::broadcast;
use venuedesk_core::config::{RemoteConfig, SyncSettings};
use venuedesk_core::db::SyncEntity;
use venuedesk_core::mapper::MapperContext;
use venuedesk_core::models::{LocalFields, Record, RemoteId};
use venuedesk_core::push::{PushOutcome, RetryPolicy};
use venuedesk_core::reconcile::{ReconcileSummary, ReconciliationJob};
use venuedesk_core::remote::CrmClient;
use venuedesk_core::services::{CrmService, StoreService};
use venuedesk_core::{EntityKind, LocalId};

use crate::error::CliError;

/// Local page size for interactive listings.
pub const LIST_PAGE_SIZE: usize = 500;

#[derive(Debug, Serialize)]
pub struct RecordListItem {
    pub id: String,
    pub kind: EntityKind,
    pub remote_id: Option<String>,
    pub title: String,
    pub detail: String,
    pub created_at: i64,
    pub updated_at: i64,
    pub relative_time: String,
}

/// A mutation facade plus the receiver for its push outcomes.
pub struct CrmSession {
    crm: CrmService,
    outcomes: broadcast::Receiver<PushOutcome>,
}

impl CrmSession {
    /// Resolve CRM configuration (fatal when missing) and open the store.
    pub async fn open(db_path: &Path) -> Result<Self, CliError> {
        let remote_config =
            RemoteConfig::from_env().map_err(venuedesk_core::Error::from)?;
        let settings = SyncSettings::from_env().map_err(venuedesk_core::Error::from)?;
        Self::open_with(db_path, &remote_config, &settings).await
    }

    pub async fn open_with(
        db_path: &Path,
        remote_config: &RemoteConfig,
        settings: &SyncSettings,
    ) -> Result<Self, CliError> {
        let client = CrmClient::new(remote_config)
            .map_err(venuedesk_core::Error::from)?
            .with_page_limit(settings.remote_page_limit);
        let store = open_store(db_path).await?;
        let crm = CrmService::connect(
            store,
            Arc::new(client),
            MapperContext::from_config(remote_config),
            RetryPolicy::from_settings(settings),
        );
        Ok(Self::new(crm))
    }

    pub fn new(crm: CrmService) -> Self {
        let outcomes = crm.subscribe();
        Self { crm, outcomes }
    }

    pub const fn crm(&self) -> &CrmService {
        &self.crm
    }

    pub const fn store(&self) -> &StoreService {
        self.crm.store()
    }

    /// Drain pending pushes and print a notice for each failed one.
    pub async fn finish(self) -> Vec<PushOutcome> {
        let Self { crm, mut outcomes } = self;
        crm.shutdown().await;

        let mut collected = Vec::new();
        while let Ok(outcome) = outcomes.try_recv() {
            collected.push(outcome);
        }
        for line in format_push_notices(&collected) {
            eprintln!("{line}");
        }
        collected
    }
}

pub fn format_push_notices(outcomes: &[PushOutcome]) -> Vec<String> {
    outcomes
        .iter()
        .filter_map(|outcome| match outcome {
            PushOutcome::Delivered { .. } => None,
            PushOutcome::Failed {
                kind,
                local_id,
                class,
                message,
                ..
            } => Some(format!(
                "Notice: {kind} {} saved locally but not pushed to the CRM ({}): {message}. The next sync will retry.",
                short_id(&local_id.to_string()),
                class.as_str()
            )),
        })
        .collect()
}

pub async fn open_store(db_path: &Path) -> Result<StoreService, CliError> {
    Ok(StoreService::open_path(db_path.to_path_buf()).await?)
}

pub async fn build_job(db_path: &Path) -> Result<ReconciliationJob, CliError> {
    let remote_config = RemoteConfig::from_env().map_err(venuedesk_core::Error::from)?;
    let settings = SyncSettings::from_env().map_err(venuedesk_core::Error::from)?;
    let client = CrmClient::new(&remote_config)
        .map_err(venuedesk_core::Error::from)?
        .with_page_limit(settings.remote_page_limit);
    let store = open_store(db_path).await?;

    Ok(ReconciliationJob::new(
        Arc::new(client),
        store,
        MapperContext::from_config(&remote_config),
        settings,
    ))
}

/// Resolve a full id or unique id prefix to a local id.
pub async fn resolve_local_id(
    store: &StoreService,
    kind: EntityKind,
    query: &str,
) -> Result<LocalId, CliError> {
    let query = normalize_identifier(query)?;
    let not_found = || CliError::RecordNotFound {
        kind,
        query: query.clone(),
    };

    let matching_ids = store.find_by_id_prefix(kind, &query, 3).await?;
    let exact = matching_ids
        .iter()
        .find(|id| id.eq_ignore_ascii_case(&query));

    let resolved = match (exact, matching_ids.len()) {
        (Some(id), _) => id,
        (None, 0) => return Err(not_found()),
        (None, 1) => &matching_ids[0],
        (None, _) => {
            let options = matching_ids
                .iter()
                .map(|id| short_id(id))
                .collect::<Vec<_>>()
                .join(", ");
            return Err(CliError::AmbiguousId(format!(
                "ID prefix '{query}' is ambiguous; matches: {options}"
            )));
        }
    };

    resolved.parse::<LocalId>().map_err(|_| not_found())
}

pub fn normalize_identifier(id: &str) -> Result<String, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyId)
    } else {
        Ok(trimmed.to_ascii_lowercase())
    }
}

pub fn normalize_text(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Optional CRM id argument; blank values are rejected.
pub fn parse_remote_id(value: Option<String>) -> Result<Option<RemoteId>, CliError> {
    value
        .map(|value| {
            RemoteId::new(value.trim())
                .ok_or_else(|| CliError::InvalidInput("CRM id cannot be empty".to_string()))
        })
        .transpose()
}

pub fn short_id(id: &str) -> String {
    id.chars().take(13).collect()
}

pub fn to_list_item<F: SyncEntity>(record: &Record<F>) -> RecordListItem {
    let now_ms = Utc::now().timestamp_millis();
    let (title, detail) = describe(&record.fields.clone().into_local());

    RecordListItem {
        id: record.id.to_string(),
        kind: F::KIND,
        remote_id: record.remote_id.as_ref().map(ToString::to_string),
        title,
        detail,
        created_at: record.created_at,
        updated_at: record.updated_at,
        relative_time: format_relative_time(record.updated_at, now_ms),
    }
}

/// Title and one-line detail for a field set.
pub fn describe(fields: &LocalFields) -> (String, String) {
    match fields {
        LocalFields::Contact(contact) => {
            let detail = [contact.email.as_deref(), contact.phone.as_deref()]
                .into_iter()
                .flatten()
                .collect::<Vec<_>>()
                .join(" ");
            (contact.display_name(), detail)
        }
        LocalFields::Opportunity(opportunity) => {
            let mut parts = vec![opportunity.status.to_string()];
            if let Some(value) = opportunity.monetary_value {
                parts.push(format!("${value}"));
            }
            if let Some(date) = opportunity.preferred_date {
                parts.push(date.format("%Y-%m-%d").to_string());
            }
            if let Some(guests) = opportunity.guest_count {
                parts.push(format!("{guests} guests"));
            }
            (opportunity.title.clone(), parts.join(" "))
        }
        LocalFields::CalendarEvent(booking) => {
            let mut detail = format!(
                "{} {} to {}",
                booking.status,
                booking.start_time.format("%Y-%m-%d %H:%M"),
                booking.end_time.format("%H:%M")
            );
            if let Some(space) = &booking.space {
                detail.push_str(&format!(" @ {space}"));
            }
            (booking.title.clone(), detail)
        }
        LocalFields::Task(task) => {
            let mark = if task.completed { "[x]" } else { "[ ]" };
            let mut detail = format!("{mark} {}", task.priority);
            if let Some(due) = task.due_date {
                detail.push_str(&format!(" due {}", due.format("%Y-%m-%d")));
            }
            (task.title.clone(), detail)
        }
    }
}

pub fn format_record_lines(items: &[RecordListItem]) -> Vec<String> {
    items
        .iter()
        .map(|item| {
            let link = if item.remote_id.is_some() {
                "linked"
            } else {
                "local"
            };
            format!(
                "{:<13}  {:<6}  {:<32}  {:<10}  {}",
                short_id(&item.id),
                link,
                truncate(&item.title, 32),
                item.relative_time,
                item.detail
            )
        })
        .collect()
}

pub fn format_summary_lines(summary: &ReconcileSummary) -> Vec<String> {
    let mut lines = vec![format!(
        "Run {} finished in {} ms ({})",
        short_id(&summary.run_id),
        summary.duration_ms(),
        if summary.is_clean() { "clean" } else { "with errors" }
    )];

    for pull in &summary.pulls {
        lines.push(format!(
            "  {:<14} {:<6}  pages={} fetched={} inserted={} updated={} skipped={}",
            pull.kind.label(),
            if pull.succeeded { "ok" } else { "FAILED" },
            pull.pages,
            pull.fetched,
            pull.inserted,
            pull.updated,
            pull.skipped
        ));
    }

    let push = &summary.push_unlinked;
    lines.push(format!(
        "  {:<14} {:<6}  candidates={} created={} failed={}",
        "push-unlinked",
        if push.failed == 0 { "ok" } else { "FAILED" },
        push.candidates,
        push.created,
        push.failed
    ));

    for error in &summary.errors {
        let target = error
            .local_id
            .as_deref()
            .map(|id| format!(" {}", short_id(id)))
            .unwrap_or_default();
        lines.push(format!(
            "  error {}{target} [{}]: {}",
            error.kind,
            error.class.as_str(),
            error.message
        ));
    }

    lines
}

pub fn format_history_lines(runs: &[ReconcileSummary]) -> Vec<String> {
    runs.iter()
        .map(|run| {
            format!(
                "{}  {:<11}  run={}  ok={} failed={} pushed={}",
                run.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
                if run.is_clean() { "clean" } else { "with-errors" },
                short_id(&run.run_id),
                run.succeeded_kinds().len(),
                run.failed_kinds().len(),
                run.push_unlinked.created
            )
        })
        .collect()
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}

fn truncate(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        value.to_string()
    } else {
        let mut truncated = value
            .chars()
            .take(max_chars.saturating_sub(3))
            .collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os("VENUEDESK_DB_PATH").map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("venuedesk")
        .join("venuedesk.db")
}

use std::path::Path;

use venuedesk_core::db::SyncEntity;
use venuedesk_core::models::{BookingFields, ContactFields, OpportunityFields, TaskFields};
use venuedesk_core::services::StoreService;
use venuedesk_core::EntityKind;

use crate::commands::common::{
    format_record_lines, open_store, to_list_item, RecordListItem, LIST_PAGE_SIZE,
};
use crate::error::CliError;

pub async fn run_list(
    kind: EntityKind,
    unlinked_only: bool,
    limit: usize,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let store = open_store(db_path).await?;
    let items = list_records(&store, kind, unlinked_only, limit).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    if items.is_empty() {
        println!("No {} records found.", kind.label());
        return Ok(());
    }
    for line in format_record_lines(&items) {
        println!("{line}");
    }
    Ok(())
}

/// Local records of one kind, most recently updated first.
pub async fn list_records(
    store: &StoreService,
    kind: EntityKind,
    unlinked_only: bool,
    limit: usize,
) -> Result<Vec<RecordListItem>, CliError> {
    match kind {
        EntityKind::Contact => list_kind::<ContactFields>(store, unlinked_only, limit).await,
        EntityKind::Opportunity => {
            list_kind::<OpportunityFields>(store, unlinked_only, limit).await
        }
        EntityKind::CalendarEvent => list_kind::<BookingFields>(store, unlinked_only, limit).await,
        EntityKind::Task => list_kind::<TaskFields>(store, unlinked_only, limit).await,
    }
}

async fn list_kind<F: SyncEntity>(
    store: &StoreService,
    unlinked_only: bool,
    limit: usize,
) -> Result<Vec<RecordListItem>, CliError> {
    let mut records = if unlinked_only {
        store.select_unlinked::<F>(LIST_PAGE_SIZE).await?
    } else {
        store.list_all::<F>(LIST_PAGE_SIZE).await?
    };
    records.sort_by(|left, right| {
        right
            .updated_at
            .cmp(&left.updated_at)
            .then_with(|| right.id.to_string().cmp(&left.id.to_string()))
    });
    records.truncate(limit);

    Ok(records.iter().map(to_list_item).collect())
}

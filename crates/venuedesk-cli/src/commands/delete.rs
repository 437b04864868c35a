use std::path::Path;

use venuedesk_core::models::{BookingFields, ContactFields, OpportunityFields, TaskFields};
use venuedesk_core::services::CrmService;
use venuedesk_core::{EntityKind, LocalId};

use crate::commands::common::{resolve_local_id, CrmSession};
use crate::error::CliError;

pub async fn run_delete(kind: EntityKind, id: &str, db_path: &Path) -> Result<(), CliError> {
    let session = CrmSession::open(db_path).await?;
    let result = async {
        let local_id = resolve_local_id(session.store(), kind, id).await?;
        delete_record(session.crm(), kind, &local_id).await?;
        Ok::<_, CliError>(local_id)
    }
    .await;
    session.finish().await;

    println!("{}", result?);
    Ok(())
}

async fn delete_record(crm: &CrmService, kind: EntityKind, id: &LocalId) -> Result<(), CliError> {
    match kind {
        EntityKind::Contact => {
            crm.delete::<ContactFields>(id).await?;
        }
        EntityKind::Opportunity => {
            crm.delete::<OpportunityFields>(id).await?;
        }
        EntityKind::CalendarEvent => {
            crm.delete::<BookingFields>(id).await?;
        }
        EntityKind::Task => {
            crm.delete::<TaskFields>(id).await?;
        }
    }
    Ok(())
}

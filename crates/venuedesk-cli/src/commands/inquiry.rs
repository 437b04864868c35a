use std::path::Path;

use rust_decimal::Decimal;
use venuedesk_core::models::{OpportunityFields, OpportunityStatus};
use venuedesk_core::EntityKind;

use crate::cli::InquiryAddArgs;
use crate::commands::common::{
    normalize_text, parse_remote_id, resolve_local_id, short_id, CrmSession,
};
use crate::error::CliError;

pub fn inquiry_fields(args: InquiryAddArgs) -> Result<OpportunityFields, CliError> {
    let title = args.title.trim().to_string();
    if title.is_empty() {
        return Err(CliError::InvalidInput(
            "inquiry title cannot be empty".to_string(),
        ));
    }
    if args.value.is_some_and(|value| value.is_sign_negative()) {
        return Err(CliError::InvalidInput(
            "inquiry value cannot be negative".to_string(),
        ));
    }

    Ok(OpportunityFields {
        monetary_value: args.value,
        preferred_date: args.date,
        guest_count: args.guests,
        event_type: normalize_text(args.event_type),
        contact_remote_id: parse_remote_id(args.contact_remote_id)?,
        source: normalize_text(args.source),
        notes: normalize_text(args.notes),
        ..OpportunityFields::titled(title)
    })
}

pub async fn run_inquiry_add(args: InquiryAddArgs, db_path: &Path) -> Result<(), CliError> {
    let fields = inquiry_fields(args)?;
    let session = CrmSession::open(db_path).await?;
    let record = session.crm().create(fields).await;
    session.finish().await;

    println!("{}", record?.id);
    Ok(())
}

pub async fn run_inquiry_status(
    id: &str,
    status: OpportunityStatus,
    value: Option<Decimal>,
    db_path: &Path,
) -> Result<(), CliError> {
    let session = CrmSession::open(db_path).await?;
    let result = async {
        let local_id = resolve_local_id(session.store(), EntityKind::Opportunity, id).await?;
        let record = session
            .crm()
            .change_opportunity_status(&local_id, status, value)
            .await?;
        Ok::<_, CliError>(record)
    }
    .await;
    session.finish().await;

    let record = result?;
    println!("{} {}", short_id(&record.id.to_string()), record.fields.status);
    Ok(())
}

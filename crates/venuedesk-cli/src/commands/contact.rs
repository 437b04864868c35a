use std::path::Path;

use venuedesk_core::models::ContactFields;

use crate::cli::ContactAddArgs;
use crate::commands::common::{normalize_text, CrmSession};
use crate::error::CliError;

pub fn contact_fields(args: ContactAddArgs) -> ContactFields {
    let mut tags = args
        .tags
        .into_iter()
        .map(|tag| tag.trim().to_ascii_lowercase())
        .filter(|tag| !tag.is_empty())
        .collect::<Vec<_>>();
    tags.sort();
    tags.dedup();

    ContactFields {
        first_name: normalize_text(args.first_name),
        last_name: normalize_text(args.last_name),
        email: normalize_text(args.email).map(|email| email.to_ascii_lowercase()),
        phone: normalize_text(args.phone),
        company_name: normalize_text(args.company),
        source: normalize_text(args.source),
        tags,
    }
}

pub async fn run_contact_add(args: ContactAddArgs, db_path: &Path) -> Result<(), CliError> {
    let fields = contact_fields(args);
    let session = CrmSession::open(db_path).await?;
    let record = session.crm().create(fields).await;
    session.finish().await;

    println!("{}", record?.id);
    Ok(())
}

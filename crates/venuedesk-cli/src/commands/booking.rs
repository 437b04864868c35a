use std::path::Path;

use venuedesk_core::models::BookingFields;

use crate::cli::BookingAddArgs;
use crate::commands::common::{normalize_text, parse_remote_id, CrmSession};
use crate::error::CliError;

pub fn booking_fields(args: BookingAddArgs) -> Result<BookingFields, CliError> {
    let fields = BookingFields {
        status: args.status,
        space: normalize_text(args.space),
        contact_remote_id: parse_remote_id(args.contact_remote_id)?,
        notes: normalize_text(args.notes),
        ..BookingFields::new(args.title.trim(), args.start, args.end)
    };
    fields.validate().map_err(CliError::InvalidInput)?;
    Ok(fields)
}

pub async fn run_booking_add(args: BookingAddArgs, db_path: &Path) -> Result<(), CliError> {
    let fields = booking_fields(args)?;
    let session = CrmSession::open(db_path).await?;
    let record = session.crm().create(fields).await;
    session.finish().await;

    println!("{}", record?.id);
    Ok(())
}

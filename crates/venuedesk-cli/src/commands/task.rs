use std::path::Path;

use venuedesk_core::models::TaskFields;
use venuedesk_core::EntityKind;

use crate::cli::TaskAddArgs;
use crate::commands::common::{
    normalize_text, parse_remote_id, resolve_local_id, short_id, CrmSession,
};
use crate::error::CliError;

pub fn task_fields(args: TaskAddArgs) -> Result<TaskFields, CliError> {
    Ok(TaskFields {
        body: normalize_text(args.body),
        due_date: args.due,
        priority: args.priority,
        assigned_to: normalize_text(args.assigned_to),
        contact_remote_id: parse_remote_id(args.contact_remote_id)?,
        ..TaskFields::titled(args.title.trim())
    })
}

pub async fn run_task_add(args: TaskAddArgs, db_path: &Path) -> Result<(), CliError> {
    let fields = task_fields(args)?;
    let session = CrmSession::open(db_path).await?;
    let record = session.crm().create(fields).await;
    session.finish().await;

    println!("{}", record?.id);
    Ok(())
}

pub async fn run_task_done(id: &str, undo: bool, db_path: &Path) -> Result<(), CliError> {
    let session = CrmSession::open(db_path).await?;
    let result = async {
        let local_id = resolve_local_id(session.store(), EntityKind::Task, id).await?;
        Ok::<_, CliError>(session.crm().set_task_completed(&local_id, !undo).await?)
    }
    .await;
    session.finish().await;

    let record = result?;
    let state = if record.fields.completed { "done" } else { "open" };
    println!("{} {state}", short_id(&record.id.to_string()));
    Ok(())
}

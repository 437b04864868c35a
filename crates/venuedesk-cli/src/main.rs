//! Venuedesk CLI - venue inquiries, bookings and tasks kept in sync with the CRM
//!
//! Every mutation lands in the local database first; CRM delivery follows in
//! the background and `venuedesk sync` reconciles whatever was missed.

mod cli;
mod commands;
mod error;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{
    BookingCommands, Cli, Commands, ContactCommands, InquiryCommands, SyncCommands, TaskCommands,
};
use crate::commands::booking::run_booking_add;
use crate::commands::common::resolve_db_path;
use crate::commands::completions::run_completions;
use crate::commands::contact::run_contact_add;
use crate::commands::delete::run_delete;
use crate::commands::inquiry::{run_inquiry_add, run_inquiry_status};
use crate::commands::list::run_list;
use crate::commands::sync::{run_sync, run_sync_history};
use crate::commands::task::{run_task_add, run_task_done};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let mut filter = EnvFilter::from_default_env();
    if let Ok(directive) = "venuedesk=info".parse() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path);

    match cli.command {
        Commands::Inquiry { command } => match command {
            InquiryCommands::Add(args) => run_inquiry_add(args, &db_path).await?,
            InquiryCommands::Status { id, status, value } => {
                run_inquiry_status(&id, status, value, &db_path).await?;
            }
        },
        Commands::Contact {
            command: ContactCommands::Add(args),
        } => run_contact_add(args, &db_path).await?,
        Commands::Booking {
            command: BookingCommands::Add(args),
        } => run_booking_add(args, &db_path).await?,
        Commands::Task { command } => match command {
            TaskCommands::Add(args) => run_task_add(args, &db_path).await?,
            TaskCommands::Done { id, undo } => run_task_done(&id, undo, &db_path).await?,
        },
        Commands::Delete { kind, id } => run_delete(kind.into(), &id, &db_path).await?,
        Commands::List {
            kind,
            unlinked,
            limit,
            json,
        } => run_list(kind.into(), unlinked, limit, json, &db_path).await?,
        Commands::Sync {
            command: Some(SyncCommands::History { limit, json }),
            ..
        } => run_sync_history(limit, json, &db_path).await?,
        Commands::Sync {
            command: None,
            watch,
            interval,
        } => run_sync(watch, interval, &db_path).await?,
        Commands::Completions { shell, output } => {
            run_completions(shell, output.as_deref())?;
        }
    }

    Ok(())
}

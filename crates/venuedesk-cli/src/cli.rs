use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use rust_decimal::Decimal;
use venuedesk_core::models::{BookingStatus, OpportunityStatus, TaskPriority};
use venuedesk_core::EntityKind;

#[derive(Parser)]
#[command(name = "venuedesk")]
#[command(about = "Manage venue inquiries, bookings and tasks synced with your CRM")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sales inquiries (CRM opportunities)
    Inquiry {
        #[command(subcommand)]
        command: InquiryCommands,
    },
    /// Contacts
    Contact {
        #[command(subcommand)]
        command: ContactCommands,
    },
    /// Calendar bookings
    Booking {
        #[command(subcommand)]
        command: BookingCommands,
    },
    /// Follow-up tasks
    Task {
        #[command(subcommand)]
        command: TaskCommands,
    },
    /// Delete a record locally and, when linked, in the CRM
    Delete {
        #[arg(value_enum)]
        kind: KindArg,
        /// Record ID or unique ID prefix
        id: String,
    },
    /// List local records
    List {
        #[arg(value_enum)]
        kind: KindArg,
        /// Only records not yet linked to the CRM
        #[arg(long)]
        unlinked: bool,
        /// Number of records to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Reconcile the local store with the CRM
    Sync {
        #[command(subcommand)]
        command: Option<SyncCommands>,
        /// Keep running on a fixed interval until interrupted
        #[arg(long)]
        watch: bool,
        /// Seconds between runs in watch mode
        #[arg(long, value_name = "SECS", requires = "watch")]
        interval: Option<u64>,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum KindArg {
    Contact,
    #[value(alias = "opportunity")]
    Inquiry,
    #[value(alias = "event")]
    Booking,
    Task,
}

impl From<KindArg> for EntityKind {
    fn from(value: KindArg) -> Self {
        match value {
            KindArg::Contact => Self::Contact,
            KindArg::Inquiry => Self::Opportunity,
            KindArg::Booking => Self::CalendarEvent,
            KindArg::Task => Self::Task,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

#[derive(Subcommand)]
pub enum InquiryCommands {
    /// Record a new inquiry
    Add(InquiryAddArgs),
    /// Move an inquiry through the pipeline
    Status {
        /// Inquiry ID or unique ID prefix
        id: String,
        /// open, won, lost or abandoned
        status: OpportunityStatus,
        /// Updated deal value
        #[arg(long)]
        value: Option<Decimal>,
    },
}

#[derive(Args, Debug, Clone)]
pub struct InquiryAddArgs {
    #[arg(long)]
    pub title: String,
    /// Estimated deal value
    #[arg(long)]
    pub value: Option<Decimal>,
    /// Preferred event date (YYYY-MM-DD)
    #[arg(long)]
    pub date: Option<NaiveDate>,
    #[arg(long)]
    pub guests: Option<u32>,
    #[arg(long)]
    pub event_type: Option<String>,
    #[arg(long, value_name = "ID")]
    pub contact_remote_id: Option<String>,
    #[arg(long)]
    pub source: Option<String>,
    #[arg(long)]
    pub notes: Option<String>,
}

#[derive(Subcommand)]
pub enum ContactCommands {
    /// Add a contact
    Add(ContactAddArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ContactAddArgs {
    #[arg(long)]
    pub first_name: Option<String>,
    #[arg(long)]
    pub last_name: Option<String>,
    #[arg(long)]
    pub email: Option<String>,
    #[arg(long)]
    pub phone: Option<String>,
    #[arg(long)]
    pub company: Option<String>,
    #[arg(long)]
    pub source: Option<String>,
    /// Tag to attach (repeatable)
    #[arg(long = "tag", value_name = "TAG")]
    pub tags: Vec<String>,
}

#[derive(Subcommand)]
pub enum BookingCommands {
    /// Add a booking
    Add(BookingAddArgs),
}

#[derive(Args, Debug, Clone)]
pub struct BookingAddArgs {
    #[arg(long)]
    pub title: String,
    /// Start time (RFC 3339)
    #[arg(long)]
    pub start: DateTime<Utc>,
    /// End time (RFC 3339)
    #[arg(long)]
    pub end: DateTime<Utc>,
    /// new, confirmed, cancelled, showed or noshow
    #[arg(long, default_value = "new")]
    pub status: BookingStatus,
    /// Room or space within the venue
    #[arg(long)]
    pub space: Option<String>,
    #[arg(long, value_name = "ID")]
    pub contact_remote_id: Option<String>,
    #[arg(long)]
    pub notes: Option<String>,
}

#[derive(Subcommand)]
pub enum TaskCommands {
    /// Add a task
    Add(TaskAddArgs),
    /// Mark a task as done
    Done {
        /// Task ID or unique ID prefix
        id: String,
        /// Reopen instead
        #[arg(long)]
        undo: bool,
    },
}

#[derive(Args, Debug, Clone)]
pub struct TaskAddArgs {
    #[arg(long)]
    pub title: String,
    #[arg(long)]
    pub body: Option<String>,
    /// Due time (RFC 3339)
    #[arg(long)]
    pub due: Option<DateTime<Utc>>,
    /// low, medium or high
    #[arg(long, default_value = "medium")]
    pub priority: TaskPriority,
    #[arg(long)]
    pub assigned_to: Option<String>,
    #[arg(long, value_name = "ID")]
    pub contact_remote_id: Option<String>,
}

#[derive(Subcommand)]
pub enum SyncCommands {
    /// Show recent reconciliation runs
    History {
        /// Number of runs to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

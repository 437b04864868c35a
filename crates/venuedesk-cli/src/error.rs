use std::io;

use thiserror::Error;
use venuedesk_core::EntityKind;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] venuedesk_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Record ID cannot be empty")]
    EmptyId,
    #[error("{kind} not found for id/prefix: {query}")]
    RecordNotFound { kind: EntityKind, query: String },
    #[error("{0}")]
    AmbiguousId(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

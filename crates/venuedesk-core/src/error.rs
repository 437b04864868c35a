//! Error types for venuedesk-core

use thiserror::Error;

use crate::config::ConfigError;
use crate::models::EntityKind;
use crate::remote::RemoteError;

/// Result type alias using venuedesk-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in venuedesk-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Record not found
    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: String },

    /// Another local row already holds this remote link
    #[error("{kind} remote id {remote_id} is already linked to another record")]
    RemoteIdTaken { kind: EntityKind, remote_id: String },

    /// A reconciliation run is already holding the lease
    #[error("Reconciliation already in progress (held by {0})")]
    RunInProgress(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Remote CRM error
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

impl Error {
    pub fn not_found(kind: EntityKind, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Whether the underlying database reported a UNIQUE constraint violation.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            Self::LibSql(error) => error
                .to_string()
                .to_ascii_lowercase()
                .contains("unique constraint failed"),
            Self::Database(message) => message
                .to_ascii_lowercase()
                .contains("unique constraint failed"),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_violation_is_detected_from_message() {
        let error = Error::Database(
            "SQLite failure: UNIQUE constraint failed: opportunities.remote_id".to_string(),
        );
        assert!(error.is_unique_violation());
        assert!(!Error::InvalidInput("title".to_string()).is_unique_violation());
    }

    #[test]
    fn not_found_names_the_kind() {
        let error = Error::not_found(EntityKind::Opportunity, "abc");
        assert_eq!(error.to_string(), "opportunity not found: abc");
    }
}

//! Typed failures returned by the CRM client.

use thiserror::Error;

use crate::util::clip_message;

/// Retry policy class for remote failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiRetryClass {
    Retryable,
    Permanent,
    ReauthRequired,
}

/// Failure of a single remote call.
///
/// Rejections (the CRM answered with a non-2xx status) are kept apart from
/// transport problems so callers can choose to suppress or surface them.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The remote system answered but refused the request
    #[error("CRM rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The per-call deadline elapsed
    #[error("CRM request timed out")]
    Timeout,

    /// The remote system could not be reached
    #[error("CRM transport error: {0}")]
    Transport(#[source] reqwest::Error),

    /// The response body (or a page of records) was malformed
    #[error("CRM response could not be decoded: {0}")]
    Decode(String),
}

impl RemoteError {
    pub fn rejected(status: u16, message: impl AsRef<str>) -> Self {
        Self::Rejected {
            status,
            message: clip_message(message.as_ref()),
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode(message.into())
    }

    /// Build from a reqwest error, separating elapsed deadlines.
    pub fn from_reqwest(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else if error.is_decode() {
            Self::Decode(error.to_string())
        } else {
            Self::Transport(error)
        }
    }

    pub const fn status_code(&self) -> Option<u16> {
        match self {
            Self::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub const fn is_rejection(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }

    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Timeout | Self::Transport(_))
    }

    /// Short class name used in run summaries.
    pub const fn class_name(&self) -> &'static str {
        match self {
            Self::Rejected { .. } => "rejected",
            Self::Timeout => "timeout",
            Self::Transport(_) => "transport",
            Self::Decode(_) => "decode",
        }
    }

    /// Classify error for retry policy.
    pub const fn retry_class(&self) -> ApiRetryClass {
        match self {
            Self::Rejected { status, .. } => match *status {
                401 | 403 => ApiRetryClass::ReauthRequired,
                408 | 409 | 423 | 425 | 429 | 500..=599 => ApiRetryClass::Retryable,
                _ => ApiRetryClass::Permanent,
            },
            Self::Timeout | Self::Transport(_) => ApiRetryClass::Retryable,
            Self::Decode(_) => ApiRetryClass::Permanent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_class_for_auth_error_is_reauth() {
        let err = RemoteError::rejected(401, "unauthorized");
        assert_eq!(err.retry_class(), ApiRetryClass::ReauthRequired);
    }

    #[test]
    fn rate_limits_and_server_errors_are_retryable() {
        assert_eq!(
            RemoteError::rejected(429, "slow down").retry_class(),
            ApiRetryClass::Retryable
        );
        assert_eq!(
            RemoteError::rejected(503, "unavailable").retry_class(),
            ApiRetryClass::Retryable
        );
        assert_eq!(RemoteError::Timeout.retry_class(), ApiRetryClass::Retryable);
    }

    #[test]
    fn validation_failures_are_permanent() {
        let err = RemoteError::rejected(422, "name is required");
        assert_eq!(err.retry_class(), ApiRetryClass::Permanent);
        assert!(err.is_rejection());
        assert!(!err.is_transport());
        assert_eq!(err.class_name(), "rejected");
    }

    #[test]
    fn rejection_message_is_compacted() {
        let err = RemoteError::rejected(400, "x".repeat(1000));
        let RemoteError::Rejected { message, .. } = err else {
            panic!("expected rejection");
        };
        assert_eq!(message.len(), 180);
    }
}

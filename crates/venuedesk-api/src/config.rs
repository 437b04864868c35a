use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

const MIN_TRIGGER_SECRET_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Clone)]
pub struct ApiConfig {
    pub bind_addr: String,
    /// Shared secret expected as the bearer token on trigger calls.
    pub trigger_secret: String,
    pub db_path: PathBuf,
}

impl fmt::Debug for ApiConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ApiConfig")
            .field("bind_addr", &self.bind_addr)
            .field("trigger_secret", &"[REDACTED]")
            .field("db_path", &self.db_path)
            .finish()
    }
}

impl ApiConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_addr = value_or_default(&lookup, "VENUEDESK_API_BIND_ADDR", "127.0.0.1:8080");

        let trigger_secret = required_trimmed(&lookup, "VENUEDESK_TRIGGER_SECRET")?;
        if trigger_secret.len() < MIN_TRIGGER_SECRET_LEN {
            return Err(ConfigError::Invalid(format!(
                "VENUEDESK_TRIGGER_SECRET must be at least {MIN_TRIGGER_SECRET_LEN} characters"
            )));
        }

        let db_path = PathBuf::from(value_or_default(
            &lookup,
            "VENUEDESK_DB_PATH",
            "venuedesk.db",
        ));

        Ok(Self {
            bind_addr,
            trigger_secret,
            db_path,
        })
    }
}

fn value_or_default(lookup: impl Fn(&str) -> Option<String>, name: &str, default: &str) -> String {
    optional_trimmed(lookup, name).unwrap_or_else(|| default.to_string())
}

fn required_trimmed(
    lookup: impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<String, ConfigError> {
    optional_trimmed(lookup, name).ok_or(ConfigError::MissingVar(name))
}

fn optional_trimmed(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

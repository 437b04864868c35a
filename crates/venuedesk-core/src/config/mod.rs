//! Runtime configuration for the CRM connection and the sync engine.
//!
//! Both [`RemoteConfig`] and [`SyncSettings`] are read from environment-style
//! lookups. Missing credentials are fatal: callers must resolve configuration
//! before any I/O so a run never partially syncs.

use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::util::{is_http_url, non_blank};

pub const ENV_API_KEY: &str = "CRM_API_KEY";
pub const ENV_LOCATION_ID: &str = "CRM_LOCATION_ID";
const ENV_BASE_URL: &str = "CRM_BASE_URL";
const ENV_API_VERSION: &str = "CRM_API_VERSION";
const ENV_TIMEOUT_SECS: &str = "CRM_TIMEOUT_SECS";
const ENV_PIPELINE_ID: &str = "CRM_PIPELINE_ID";
const ENV_PIPELINE_STAGE_ID: &str = "CRM_PIPELINE_STAGE_ID";
const ENV_CALENDAR_ID: &str = "CRM_CALENDAR_ID";

const DEFAULT_BASE_URL: &str = "https://services.leadconnectorhq.com";
const DEFAULT_API_VERSION: &str = "2021-07-28";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Credentials and endpoints for the remote CRM.
#[derive(Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    pub api_key: String,
    pub location_id: String,
    pub base_url: String,
    pub api_version: String,
    pub timeout: Duration,
    pub pipeline_id: Option<String>,
    pub pipeline_stage_id: Option<String>,
    pub calendar_id: Option<String>,
}

impl fmt::Debug for RemoteConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("RemoteConfig")
            .field("api_key", &"[REDACTED]")
            .field("location_id", &self.location_id)
            .field("base_url", &self.base_url)
            .field("api_version", &self.api_version)
            .field("timeout", &self.timeout)
            .field("pipeline_id", &self.pipeline_id)
            .field("pipeline_stage_id", &self.pipeline_stage_id)
            .field("calendar_id", &self.calendar_id)
            .finish()
    }
}

impl RemoteConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_key = required(&lookup, ENV_API_KEY)?;
        let location_id = required(&lookup, ENV_LOCATION_ID)?;

        let base_url = optional(&lookup, ENV_BASE_URL)
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        if !is_http_url(&base_url) {
            return Err(ConfigError::Invalid(format!(
                "{ENV_BASE_URL} must start with http:// or https://"
            )));
        }

        let api_version =
            optional(&lookup, ENV_API_VERSION).unwrap_or_else(|| DEFAULT_API_VERSION.to_string());
        let timeout_secs = parse_in_range(&lookup, ENV_TIMEOUT_SECS, 15, 1..=120)?;

        Ok(Self {
            api_key,
            location_id,
            base_url,
            api_version,
            timeout: Duration::from_secs(timeout_secs),
            pipeline_id: optional(&lookup, ENV_PIPELINE_ID),
            pipeline_stage_id: optional(&lookup, ENV_PIPELINE_STAGE_ID),
            calendar_id: optional(&lookup, ENV_CALENDAR_ID),
        })
    }
}

/// Tunables for reconciliation and push delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    /// Page size for local unbounded scans.
    pub local_page_size: usize,
    /// Records requested per remote list call.
    pub remote_page_limit: usize,
    /// Upper bound on remote pages per kind and run.
    pub max_pages: usize,
    /// Whether tasks take part in the pull phase.
    pub pull_tasks: bool,
    /// Expiry of the run lease.
    pub lease_ttl: Duration,
    /// Cadence for scheduled runs.
    pub interval: Duration,
    /// Delivery attempts per push event (1 = at most once).
    pub push_max_attempts: u32,
    /// Base backoff between push attempts.
    pub push_backoff: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            local_page_size: 1000,
            remote_page_limit: 100,
            max_pages: 500,
            pull_tasks: false,
            lease_ttl: Duration::from_secs(600),
            interval: Duration::from_secs(300),
            push_max_attempts: 1,
            push_backoff: Duration::from_millis(500),
        }
    }
}

impl SyncSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let pull_tasks = match optional(&lookup, "SYNC_PULL_TASKS") {
            None => defaults.pull_tasks,
            Some(value) => parse_flag(&value).ok_or_else(|| {
                ConfigError::Invalid("SYNC_PULL_TASKS must be true or false".to_string())
            })?,
        };

        Ok(Self {
            local_page_size: usize_in_range(&lookup, "SYNC_PAGE_SIZE", 1000, 10..=10_000)?,
            remote_page_limit: usize_in_range(&lookup, "SYNC_REMOTE_PAGE_LIMIT", 100, 1..=500)?,
            max_pages: usize_in_range(&lookup, "SYNC_MAX_PAGES", 500, 1..=100_000)?,
            pull_tasks,
            lease_ttl: Duration::from_secs(parse_in_range(
                &lookup,
                "SYNC_LEASE_TTL_SECS",
                600,
                30..=86_400,
            )?),
            interval: Duration::from_secs(parse_in_range(
                &lookup,
                "SYNC_INTERVAL_SECS",
                300,
                30..=86_400,
            )?),
            push_max_attempts: u32::try_from(parse_in_range(
                &lookup,
                "SYNC_PUSH_MAX_ATTEMPTS",
                1,
                1..=10,
            )?)
            .unwrap_or(1),
            push_backoff: Duration::from_millis(parse_in_range(
                &lookup,
                "SYNC_PUSH_BACKOFF_MS",
                500,
                10..=60_000,
            )?),
        })
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn usize_in_range(
    lookup: impl Fn(&str) -> Option<String>,
    name: &str,
    default: u64,
    range: std::ops::RangeInclusive<u64>,
) -> Result<usize, ConfigError> {
    let value = parse_in_range(lookup, name, default, range)?;
    usize::try_from(value).map_err(|_| ConfigError::Invalid(format!("{name} is too large")))
}

fn parse_in_range(
    lookup: impl Fn(&str) -> Option<String>,
    name: &str,
    default: u64,
    range: std::ops::RangeInclusive<u64>,
) -> Result<u64, ConfigError> {
    let Some(raw) = optional(lookup, name) else {
        return Ok(default);
    };
    let value = raw.parse::<u64>().map_err(|_| {
        ConfigError::Invalid(format!(
            "{name} must be an integer in [{}, {}]",
            range.start(),
            range.end()
        ))
    })?;
    if !range.contains(&value) {
        return Err(ConfigError::Invalid(format!(
            "{name} must be in [{}, {}]",
            range.start(),
            range.end()
        )));
    }
    Ok(value)
}

fn required(
    lookup: impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<String, ConfigError> {
    optional(lookup, name).ok_or(ConfigError::MissingVar(name))
}

fn optional(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    non_blank(lookup(name))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from<'a>(
        map: &'a HashMap<&'a str, &'a str>,
    ) -> impl Fn(&str) -> Option<String> + 'a {
        move |key| map.get(key).map(|value| (*value).to_string())
    }

    #[test]
    fn remote_config_requires_credentials() {
        let map = HashMap::from([(ENV_LOCATION_ID, "loc-1")]);
        let err = RemoteConfig::from_lookup(lookup_from(&map)).unwrap_err();
        assert!(err.to_string().contains(ENV_API_KEY));

        let map = HashMap::from([(ENV_API_KEY, "key")]);
        let err = RemoteConfig::from_lookup(lookup_from(&map)).unwrap_err();
        assert!(err.to_string().contains(ENV_LOCATION_ID));
    }

    #[test]
    fn remote_config_blank_key_counts_as_missing() {
        let map = HashMap::from([(ENV_API_KEY, "   "), (ENV_LOCATION_ID, "loc-1")]);
        let err = RemoteConfig::from_lookup(lookup_from(&map)).unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar(ENV_API_KEY)));
    }

    #[test]
    fn remote_config_applies_defaults_and_trims_base_url() {
        let map = HashMap::from([
            (ENV_API_KEY, "key"),
            (ENV_LOCATION_ID, "loc-1"),
            (ENV_BASE_URL, "https://crm.example.com/"),
        ]);
        let config = RemoteConfig::from_lookup(lookup_from(&map)).unwrap();
        assert_eq!(config.base_url, "https://crm.example.com");
        assert_eq!(config.api_version, DEFAULT_API_VERSION);
        assert_eq!(config.timeout, Duration::from_secs(15));
        assert_eq!(config.pipeline_id, None);
    }

    #[test]
    fn remote_config_rejects_out_of_range_timeout() {
        let map = HashMap::from([
            (ENV_API_KEY, "key"),
            (ENV_LOCATION_ID, "loc-1"),
            (ENV_TIMEOUT_SECS, "0"),
        ]);
        assert!(RemoteConfig::from_lookup(lookup_from(&map)).is_err());
    }

    #[test]
    fn remote_config_redacts_api_key() {
        let map = HashMap::from([(ENV_API_KEY, "sensitive-key"), (ENV_LOCATION_ID, "loc-1")]);
        let config = RemoteConfig::from_lookup(lookup_from(&map)).unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("sensitive-key"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn sync_settings_defaults_when_unset() {
        let map = HashMap::new();
        let settings = SyncSettings::from_lookup(lookup_from(&map)).unwrap();
        assert_eq!(settings, SyncSettings::default());
    }

    #[test]
    fn sync_settings_parse_overrides() {
        let map = HashMap::from([
            ("SYNC_PAGE_SIZE", "250"),
            ("SYNC_PULL_TASKS", "yes"),
            ("SYNC_PUSH_MAX_ATTEMPTS", "3"),
        ]);
        let settings = SyncSettings::from_lookup(lookup_from(&map)).unwrap();
        assert_eq!(settings.local_page_size, 250);
        assert!(settings.pull_tasks);
        assert_eq!(settings.push_max_attempts, 3);
    }

    #[test]
    fn sync_settings_reject_bad_flag() {
        let map = HashMap::from([("SYNC_PULL_TASKS", "maybe")]);
        assert!(SyncSettings::from_lookup(lookup_from(&map)).is_err());
    }
}

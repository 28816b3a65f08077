//! Watch settings loaded from environment variables.
//!
//! | Variable                   | Meaning                                  | Default |
//! |----------------------------|------------------------------------------|---------|
//! | `WATCH_NAMESPACE`          | Namespace to watch                       | all     |
//! | `LABEL_SELECTOR`           | Label selector                           | none    |
//! | `FIELD_SELECTOR`           | Field selector                           | none    |
//! | `WATCH_RESUME_TOKEN`       | Starting resume token                    | none    |
//! | `WATCH_TIMEOUT_SECONDS`    | Server-side watch timeout hint (1..=290) | 290     |
//! | `RECONNECT_BACKOFF_MS`     | Initial reconnect backoff                | 500     |
//! | `RECONNECT_BACKOFF_MAX_MS` | Reconnect backoff cap                    | 30000   |
//! | `PROBE_RETRY_ATTEMPTS`     | Attempts for the resume-token probe      | 3       |

use crate::backoff::ReconnectBackoff;
use crate::error::ConfigError;
use crate::retry::RetryPolicy;
use crate::scope::WatchScope;
use std::env;
use std::str::FromStr;
use std::time::Duration;

const MAX_TIMEOUT_SECONDS: u32 = 290;

/// Settings for one watch, as read from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchSettings {
    /// `WATCH_NAMESPACE`
    pub namespace: Option<String>,
    /// `LABEL_SELECTOR`
    pub label_selector: Option<String>,
    /// `FIELD_SELECTOR`
    pub field_selector: Option<String>,
    /// `WATCH_RESUME_TOKEN`
    pub resume_token: Option<String>,
    /// `WATCH_TIMEOUT_SECONDS`
    pub timeout_seconds: u32,
    /// `RECONNECT_BACKOFF_MS`
    pub backoff_initial: Duration,
    /// `RECONNECT_BACKOFF_MAX_MS`
    pub backoff_max: Duration,
    /// `PROBE_RETRY_ATTEMPTS`
    pub probe_attempts: u32,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            namespace: None,
            label_selector: None,
            field_selector: None,
            resume_token: None,
            timeout_seconds: MAX_TIMEOUT_SECONDS,
            backoff_initial: Duration::from_millis(500),
            backoff_max: Duration::from_secs(30),
            probe_attempts: 3,
        }
    }
}

impl WatchSettings {
    /// Load settings from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load settings through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let text = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let timeout_seconds =
            parse(&lookup, "WATCH_TIMEOUT_SECONDS")?.unwrap_or(defaults.timeout_seconds);
        if timeout_seconds == 0 || timeout_seconds > MAX_TIMEOUT_SECONDS {
            return Err(ConfigError::invalid(
                "WATCH_TIMEOUT_SECONDS",
                &timeout_seconds.to_string(),
                format!("must be between 1 and {MAX_TIMEOUT_SECONDS}"),
            ));
        }

        let backoff_initial = parse::<u64, _>(&lookup, "RECONNECT_BACKOFF_MS")?
            .map_or(defaults.backoff_initial, Duration::from_millis);
        let backoff_max = parse::<u64, _>(&lookup, "RECONNECT_BACKOFF_MAX_MS")?
            .map_or(defaults.backoff_max, Duration::from_millis);
        if backoff_max < backoff_initial {
            return Err(ConfigError::invalid(
                "RECONNECT_BACKOFF_MAX_MS",
                &backoff_max.as_millis().to_string(),
                "must not be less than RECONNECT_BACKOFF_MS",
            ));
        }

        let probe_attempts =
            parse(&lookup, "PROBE_RETRY_ATTEMPTS")?.unwrap_or(defaults.probe_attempts);
        if probe_attempts == 0 {
            return Err(ConfigError::invalid("PROBE_RETRY_ATTEMPTS", "0", "must be at least 1"));
        }

        Ok(Self {
            namespace: text("WATCH_NAMESPACE"),
            label_selector: text("LABEL_SELECTOR"),
            field_selector: text("FIELD_SELECTOR"),
            resume_token: text("WATCH_RESUME_TOKEN"),
            timeout_seconds,
            backoff_initial,
            backoff_max,
            probe_attempts,
        })
    }

    /// The watch scope these settings describe.
    pub fn scope(&self) -> WatchScope {
        let mut scope = match &self.namespace {
            Some(ns) => WatchScope::namespaced(ns.clone()),
            None => WatchScope::all(),
        };
        if let Some(labels) = &self.label_selector {
            scope = scope.labels(labels.clone());
        }
        if let Some(fields) = &self.field_selector {
            scope = scope.fields(fields.clone());
        }
        if let Some(token) = &self.resume_token {
            scope = scope.from_token(token.clone());
        }
        scope.timeout(self.timeout_seconds)
    }

    /// Reconnect backoff from the configured delays.
    pub fn backoff(&self) -> ReconnectBackoff {
        ReconnectBackoff::new(self.backoff_initial, self.backoff_max)
    }

    /// Retry policy for the resume-token probe.
    pub fn retry(&self) -> RetryPolicy {
        RetryPolicy::new(self.probe_attempts, Duration::from_millis(200), Duration::from_secs(5))
    }
}

fn parse<T, F>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).filter(|v| !v.trim().is_empty()) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::invalid(key, &raw, e.to_string())),
    }
}

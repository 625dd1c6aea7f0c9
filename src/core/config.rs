/*!
 * Supervisor Configuration
 * Runtime settings loaded from the environment
 *
 * Environment variables:
 * - SUPERVISOR_CORE_BUDGET: physical core budget (default: half the logical CPUs)
 * - SUPERVISOR_TERMINATE_GRACE_MS: wait before escalating to a forceful kill
 * - SUPERVISOR_TERMINATE_POLL_MS: liveness poll interval during that wait
 * - SUPERVISOR_CHANNEL_BASE: event channel base name
 * - SUPERVISOR_EVENT_CAPACITY: per-channel broadcast capacity
 * - SUPERVISOR_TRACE_JSON: JSON log output
 */

use super::limits::{
    detect_core_budget, DEFAULT_CHANNEL_BASE, DEFAULT_EVENT_CAPACITY, DEFAULT_TERMINATE_GRACE,
    DEFAULT_TERMINATE_POLL, MAX_TERMINATE_GRACE,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {value:?} ({reason})")]
    InvalidValue {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Supervisor settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct SupervisorConfig {
    pub core_budget: usize,
    pub terminate_grace_ms: u64,
    pub terminate_poll_ms: u64,
    pub channel_base: String,
    pub event_capacity: usize,
    pub trace_json: bool,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            core_budget: detect_core_budget(),
            terminate_grace_ms: DEFAULT_TERMINATE_GRACE.as_millis() as u64,
            terminate_poll_ms: DEFAULT_TERMINATE_POLL.as_millis() as u64,
            channel_base: DEFAULT_CHANNEL_BASE.to_string(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
            trace_json: false,
        }
    }
}

impl SupervisorConfig {
    /// Load configuration from process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup("SUPERVISOR_CORE_BUDGET") {
            config.core_budget = parse_positive("SUPERVISOR_CORE_BUDGET", &raw)? as usize;
        }
        if let Some(raw) = lookup("SUPERVISOR_TERMINATE_GRACE_MS") {
            let ms = parse_u64("SUPERVISOR_TERMINATE_GRACE_MS", &raw)?;
            if Duration::from_millis(ms) > MAX_TERMINATE_GRACE {
                return Err(ConfigError::InvalidValue {
                    var: "SUPERVISOR_TERMINATE_GRACE_MS",
                    value: raw,
                    reason: format!("exceeds {}ms", MAX_TERMINATE_GRACE.as_millis()),
                });
            }
            config.terminate_grace_ms = ms;
        }
        if let Some(raw) = lookup("SUPERVISOR_TERMINATE_POLL_MS") {
            config.terminate_poll_ms = parse_positive("SUPERVISOR_TERMINATE_POLL_MS", &raw)?;
        }
        if let Some(raw) = lookup("SUPERVISOR_CHANNEL_BASE") {
            config.channel_base = raw;
        }
        if let Some(raw) = lookup("SUPERVISOR_EVENT_CAPACITY") {
            config.event_capacity = parse_positive("SUPERVISOR_EVENT_CAPACITY", &raw)? as usize;
        }
        if let Some(raw) = lookup("SUPERVISOR_TRACE_JSON") {
            config.trace_json = raw == "1" || raw.eq_ignore_ascii_case("true");
        }

        Ok(config)
    }

    #[inline]
    pub fn terminate_grace(&self) -> Duration {
        Duration::from_millis(self.terminate_grace_ms)
    }

    #[inline]
    pub fn terminate_poll(&self) -> Duration {
        Duration::from_millis(self.terminate_poll_ms)
    }

    #[must_use]
    pub fn with_core_budget(mut self, budget: usize) -> Self {
        self.core_budget = budget;
        self
    }

    #[must_use]
    pub fn with_terminate_grace(mut self, grace: Duration) -> Self {
        self.terminate_grace_ms = grace.as_millis() as u64;
        self
    }

    #[must_use]
    pub fn with_terminate_poll(mut self, poll: Duration) -> Self {
        self.terminate_poll_ms = poll.as_millis() as u64;
        self
    }
}

fn parse_u64(var: &'static str, raw: &str) -> Result<u64, ConfigError> {
    raw.trim()
        .parse::<u64>()
        .map_err(|e| ConfigError::InvalidValue {
            var,
            value: raw.to_string(),
            reason: e.to_string(),
        })
}

fn parse_positive(var: &'static str, raw: &str) -> Result<u64, ConfigError> {
    match parse_u64(var, raw)? {
        0 => Err(ConfigError::InvalidValue {
            var,
            value: raw.to_string(),
            reason: "must be greater than zero".to_string(),
        }),
        n => Ok(n),
    }
}

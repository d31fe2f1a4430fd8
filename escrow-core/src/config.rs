//! Engine configuration
//!
//! Defaults, optionally overlaid by a TOML file and then by `ESCROW_*`
//! environment variables.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{MarketError, MarketResult};
use crate::events::DEFAULT_CHANNEL_CAPACITY;

/// Ten years
const MAX_RETENTION_HOURS: u64 = 24 * 365 * 10;

/// Tunables for the marketplace core
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Extra read-validate-write attempts after a version conflict
    pub max_cas_retries: u32,
    /// Background attempts for a reputation update that failed inline
    pub reputation_retry_attempts: u32,
    /// Initial backoff between reputation attempts; doubles each time
    pub reputation_retry_backoff_ms: u64,
    /// Broadcast capacity of the event bus
    pub event_channel_capacity: usize,
    /// How long reputation event keys stay on a user record. Older events
    /// are no longer applied inline; `recompute_all` covers them.
    pub applied_event_retention_hours: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_cas_retries: 5,
            reputation_retry_attempts: 5,
            reputation_retry_backoff_ms: 50,
            event_channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            applied_event_retention_hours: 168,
        }
    }
}

impl EngineConfig {
    /// Parse a TOML document; missing keys keep their defaults
    pub fn from_toml_str(raw: &str) -> MarketResult<Self> {
        let config: Self = toml::from_str(raw)
            .map_err(|e| MarketError::validation(format!("invalid engine config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn from_toml_file(path: impl AsRef<Path>) -> MarketResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            MarketError::validation(format!("cannot read config {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&raw)
    }

    /// Apply `ESCROW_*` environment overrides
    pub fn with_env_overrides(self) -> MarketResult<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> MarketResult<Self> {
        if let Some(v) = lookup("ESCROW_MAX_CAS_RETRIES") {
            self.max_cas_retries = parse_var("ESCROW_MAX_CAS_RETRIES", &v)?;
        }
        if let Some(v) = lookup("ESCROW_REPUTATION_RETRIES") {
            self.reputation_retry_attempts = parse_var("ESCROW_REPUTATION_RETRIES", &v)?;
        }
        if let Some(v) = lookup("ESCROW_REPUTATION_BACKOFF_MS") {
            self.reputation_retry_backoff_ms = parse_var("ESCROW_REPUTATION_BACKOFF_MS", &v)?;
        }
        if let Some(v) = lookup("ESCROW_EVENT_CAPACITY") {
            self.event_channel_capacity = parse_var("ESCROW_EVENT_CAPACITY", &v)?;
        }
        if let Some(v) = lookup("ESCROW_APPLIED_EVENT_RETENTION_HOURS") {
            self.applied_event_retention_hours =
                parse_var("ESCROW_APPLIED_EVENT_RETENTION_HOURS", &v)?;
        }
        self.validate()?;
        Ok(self)
    }

    /// Retention window for applied reputation event keys
    pub fn retention(&self) -> chrono::Duration {
        let hours = self.applied_event_retention_hours.min(MAX_RETENTION_HOURS);
        chrono::Duration::hours(hours as i64)
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> MarketResult<()> {
        if self.event_channel_capacity == 0 {
            return Err(MarketError::validation(
                "event_channel_capacity must be at least 1",
            ));
        }
        if !(1..=MAX_RETENTION_HOURS).contains(&self.applied_event_retention_hours) {
            return Err(MarketError::validation(format!(
                "applied_event_retention_hours must be between 1 and {}",
                MAX_RETENTION_HOURS
            )));
        }
        if self.max_cas_retries > 100 {
            return Err(MarketError::validation("max_cas_retries must be at most 100"));
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> MarketResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| MarketError::validation(format!("{} has invalid value '{}'", key, value)))
}

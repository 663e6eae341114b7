//! Coordinator configuration
//!
//! All durations are stored in milliseconds so the TOML form stays flat:
//!
//! ```toml
//! default_ttl_ms = 300000
//! sweep_interval_ms = 30000
//! refetch_throttle_ms = 2000
//! cache_capacity = 1024
//!
//! [timeouts]
//! default_ms = 15000
//! ai_insights_ms = 60000
//! monthly_ms = 15000
//! ```

use crate::error::ConfigError;
use dashsync_model::DomainKey;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Cache entry lifetime (5 minutes)
pub const DEFAULT_TTL_MS: u64 = 300_000;
/// Staleness sweep period
pub const DEFAULT_SWEEP_INTERVAL_MS: u64 = 30_000;
/// Window in which repeated manual refetches are dropped
pub const DEFAULT_REFETCH_THROTTLE_MS: u64 = 2_000;
/// Spreadsheet-backed reads
pub const DEFAULT_TIMEOUT_MS: u64 = 15_000;
/// Insight generation legitimately takes longer than a sheet read
pub const DEFAULT_AI_INSIGHTS_TIMEOUT_MS: u64 = 60_000;
/// Monthly index and snapshot lookups
pub const DEFAULT_MONTHLY_TIMEOUT_MS: u64 = 15_000;
/// Cache capacity backstop
pub const DEFAULT_CACHE_CAPACITY: u64 = dashsync_cache::DEFAULT_CAPACITY;

/// Per-domain fetch deadlines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutBudgets {
    /// Progress, manpower and risk
    pub default_ms: u64,
    /// AI insights
    pub ai_insights_ms: u64,
    /// Monthly index and snapshots
    pub monthly_ms: u64,
}

impl TimeoutBudgets {
    /// Deadline for a key
    #[must_use]
    pub fn for_key(&self, key: &DomainKey) -> Duration {
        let ms = match key {
            DomainKey::AiInsights => self.ai_insights_ms,
            k if k.is_monthly() => self.monthly_ms,
            _ => self.default_ms,
        };
        Duration::from_millis(ms)
    }
}

impl Default for TimeoutBudgets {
    fn default() -> Self {
        Self {
            default_ms: DEFAULT_TIMEOUT_MS,
            ai_insights_ms: DEFAULT_AI_INSIGHTS_TIMEOUT_MS,
            monthly_ms: DEFAULT_MONTHLY_TIMEOUT_MS,
        }
    }
}

/// Synchronization configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Cache entry lifetime
    pub default_ttl_ms: u64,
    /// Staleness sweep period
    pub sweep_interval_ms: u64,
    /// Manual refetch throttle window
    pub refetch_throttle_ms: u64,
    /// Cache capacity backstop
    pub cache_capacity: u64,
    /// Per-domain deadlines
    pub timeouts: TimeoutBudgets,
}

impl SyncConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With cache entry lifetime
    #[inline]
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl_ms = duration_ms(ttl);
        self
    }

    /// With sweep interval
    #[inline]
    #[must_use]
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval_ms = duration_ms(interval);
        self
    }

    /// With refetch throttle window
    #[inline]
    #[must_use]
    pub fn with_refetch_throttle(mut self, window: Duration) -> Self {
        self.refetch_throttle_ms = duration_ms(window);
        self
    }

    /// With per-domain deadlines
    #[inline]
    #[must_use]
    pub fn with_timeouts(mut self, timeouts: TimeoutBudgets) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Cache entry lifetime
    #[inline]
    #[must_use]
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.default_ttl_ms)
    }

    /// Sweep interval
    #[inline]
    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    /// Refetch throttle window
    #[inline]
    #[must_use]
    pub fn refetch_throttle(&self) -> Duration {
        Duration::from_millis(self.refetch_throttle_ms)
    }

    /// Parse and validate TOML
    ///
    /// # Errors
    /// `ConfigError::Parse` on malformed TOML, `ConfigError::Invalid` on
    /// out-of-range values
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    ///
    /// # Errors
    /// `ConfigError::Io` if the file cannot be read, otherwise as
    /// [`SyncConfig::from_toml_str`]
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::io_error(path, e))?;
        Self::from_toml_str(&raw)
    }

    /// Reject zero durations and capacities
    ///
    /// # Errors
    /// `ConfigError::Invalid` naming the first offending field
    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            ("default_ttl_ms", self.default_ttl_ms),
            ("sweep_interval_ms", self.sweep_interval_ms),
            ("cache_capacity", self.cache_capacity),
            ("timeouts.default_ms", self.timeouts.default_ms),
            ("timeouts.ai_insights_ms", self.timeouts.ai_insights_ms),
            ("timeouts.monthly_ms", self.timeouts.monthly_ms),
        ];
        for (field, value) in checks {
            if value == 0 {
                return Err(ConfigError::invalid(field, "must be greater than zero"));
            }
        }
        Ok(())
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            default_ttl_ms: DEFAULT_TTL_MS,
            sweep_interval_ms: DEFAULT_SWEEP_INTERVAL_MS,
            refetch_throttle_ms: DEFAULT_REFETCH_THROTTLE_MS,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            timeouts: TimeoutBudgets::default(),
        }
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

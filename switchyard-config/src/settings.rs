// Control plane settings tree

use crate::validation::{ConfigValidator, Validate};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Allowed health probe kinds
pub const PROBE_KINDS: &[&str] = &["http", "tcp"];

/// Allowed load balancing strategies
pub const STRATEGIES: &[&str] = &["round_robin", "random", "least_connections"];

/// Allowed log levels
pub const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Allowed log formats
pub const LOG_FORMATS: &[&str] = &["pretty", "compact", "json"];

/// Top-level settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub flags: FlagSettings,
    pub discovery: DiscoverySettings,
    pub log: LogSettings,
}

/// Flag engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlagSettings {
    /// Cache entry lifetime in seconds; unset keeps entries until invalidated
    pub cache_ttl_secs: Option<u64>,

    /// Deadline for each storage call
    pub storage_timeout_ms: u64,

    /// Upper bound on change callbacks running at once
    pub max_concurrent_callbacks: usize,
}

impl Default for FlagSettings {
    fn default() -> Self {
        Self {
            cache_ttl_secs: None,
            storage_timeout_ms: 5000,
            max_concurrent_callbacks: 32,
        }
    }
}

impl FlagSettings {
    pub fn cache_ttl(&self) -> Option<Duration> {
        self.cache_ttl_secs.map(Duration::from_secs)
    }

    pub fn storage_timeout(&self) -> Duration {
        Duration::from_millis(self.storage_timeout_ms)
    }
}

/// Registry, health checking and load balancing settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoverySettings {
    /// TTL applied to services registered without one
    pub default_ttl_secs: u64,

    pub health_check_interval_secs: u64,

    pub probe_timeout_secs: u64,

    /// Consecutive probe failures before an instance turns critical
    pub critical_threshold: u32,

    /// Cap on probes in flight; unset is unbounded
    pub max_concurrent_probes: Option<usize>,

    /// `http` or `tcp`
    pub probe: String,

    /// Path probed when an instance has no explicit health check URL
    pub health_path: String,

    pub load_balancing_strategy: String,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            default_ttl_secs: 30,
            health_check_interval_secs: 30,
            probe_timeout_secs: 5,
            critical_threshold: 3,
            max_concurrent_probes: None,
            probe: "http".to_string(),
            health_path: "/health".to_string(),
            load_balancing_strategy: "round_robin".to_string(),
        }
    }
}

impl DiscoverySettings {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub level: String,
    pub format: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "json".to_string(),
        }
    }
}

impl Validate for FlagSettings {
    fn validate(&self) -> Result<()> {
        ConfigValidator::positive(self.storage_timeout_ms, "flags.storage_timeout_ms")?;
        ConfigValidator::positive(
            self.max_concurrent_callbacks,
            "flags.max_concurrent_callbacks",
        )?;
        if let Some(ttl) = self.cache_ttl_secs {
            ConfigValidator::positive(ttl, "flags.cache_ttl_secs")?;
        }
        Ok(())
    }
}

impl Validate for DiscoverySettings {
    fn validate(&self) -> Result<()> {
        ConfigValidator::positive(self.default_ttl_secs, "discovery.default_ttl_secs")?;
        ConfigValidator::positive(
            self.health_check_interval_secs,
            "discovery.health_check_interval_secs",
        )?;
        ConfigValidator::in_range(
            self.probe_timeout_secs,
            1,
            self.health_check_interval_secs,
            "discovery.probe_timeout_secs",
        )?;
        ConfigValidator::positive(self.critical_threshold, "discovery.critical_threshold")?;
        if let Some(max) = self.max_concurrent_probes {
            ConfigValidator::positive(max, "discovery.max_concurrent_probes")?;
        }
        ConfigValidator::one_of(&self.probe, PROBE_KINDS, "discovery.probe")?;
        ConfigValidator::not_empty(&self.health_path, "discovery.health_path")?;
        ConfigValidator::one_of(
            &self.load_balancing_strategy.replace('-', "_"),
            STRATEGIES,
            "discovery.load_balancing_strategy",
        )?;
        Ok(())
    }
}

impl Validate for LogSettings {
    fn validate(&self) -> Result<()> {
        let level = if self.level.eq_ignore_ascii_case("warning") {
            "warn"
        } else {
            self.level.as_str()
        };
        ConfigValidator::one_of(level, LOG_LEVELS, "log.level")?;
        ConfigValidator::one_of(&self.format, LOG_FORMATS, "log.format")?;
        Ok(())
    }
}

impl Validate for Settings {
    fn validate(&self) -> Result<()> {
        self.flags.validate()?;
        self.discovery.validate()?;
        self.log.validate()?;
        Ok(())
    }
}

//! Service instances and their health

use crate::error::{DiscoveryError, Result};
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// Health state of a service instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Unhealthy,
    Critical,
}

impl HealthState {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthState::Healthy => "healthy",
            HealthState::Unhealthy => "unhealthy",
            HealthState::Critical => "critical",
        }
    }
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Health bookkeeping for one instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: HealthState,

    pub message: String,

    pub last_checked: DateTime<Utc>,

    /// Cumulative number of checks
    pub check_count: u64,

    /// Cumulative number of failed checks
    pub failure_count: u64,

    /// Failures since the last success or heartbeat
    #[serde(default)]
    pub consecutive_failures: u32,
}

impl HealthStatus {
    /// Fresh healthy status
    pub fn healthy(message: impl Into<String>) -> Self {
        Self {
            status: HealthState::Healthy,
            message: message.into(),
            last_checked: Utc::now(),
            check_count: 0,
            failure_count: 0,
            consecutive_failures: 0,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == HealthState::Healthy
    }

    /// Record a passing check.
    pub fn record_pass(&mut self, message: impl Into<String>) {
        self.check_count += 1;
        self.consecutive_failures = 0;
        self.status = HealthState::Healthy;
        self.message = message.into();
        self.last_checked = Utc::now();
    }

    /// Record a failing check.
    ///
    /// The instance becomes `unhealthy`, or `critical` once consecutive
    /// failures reach `critical_threshold`.
    pub fn record_failure(&mut self, message: impl Into<String>, critical_threshold: u32) -> HealthState {
        self.check_count += 1;
        self.failure_count += 1;
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.status = if self.consecutive_failures >= critical_threshold.max(1) {
            HealthState::Critical
        } else {
            HealthState::Unhealthy
        };
        self.message = message.into();
        self.last_checked = Utc::now();
        self.status
    }

    /// Set an explicit state reported from outside the checker.
    pub fn set(&mut self, status: HealthState, message: impl Into<String>) {
        self.check_count += 1;
        if status == HealthState::Healthy {
            self.consecutive_failures = 0;
        } else {
            self.failure_count += 1;
            self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        }
        self.status = status;
        self.message = message.into();
        self.last_checked = Utc::now();
    }

    /// Force the instance back to healthy after a heartbeat.
    ///
    /// Counters are left alone; a heartbeat is not a check.
    pub fn recover(&mut self) {
        self.status = HealthState::Healthy;
        self.consecutive_failures = 0;
        self.message = "recovered".to_string();
        self.last_checked = Utc::now();
    }
}

impl Default for HealthStatus {
    fn default() -> Self {
        Self::healthy("registered")
    }
}

/// Registered service instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    /// Instance ID; assigned by the registry when empty
    #[serde(default)]
    pub id: String,

    /// Service name shared by all instances
    pub name: String,

    /// Host/IP address
    pub address: String,

    pub port: u16,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub metadata: HashMap<String, String>,

    /// Explicit health check URL; probes fall back to address, port and path
    #[serde(default)]
    pub health_check_url: Option<String>,

    #[serde(default)]
    pub health: HealthStatus,

    pub registered_at: DateTime<Utc>,

    pub last_heartbeat: DateTime<Utc>,

    /// Heartbeat TTL; zero means "use the registry default"
    #[serde(default)]
    pub ttl: Duration,
}

impl Service {
    /// Create new service instance
    pub fn new(name: impl Into<String>, address: impl Into<String>, port: u16) -> Self {
        let now = Utc::now();
        Self {
            id: String::new(),
            name: name.into(),
            address: address.into(),
            port,
            tags: Vec::new(),
            metadata: HashMap::new(),
            health_check_url: None,
            health: HealthStatus::default(),
            registered_at: now,
            last_heartbeat: now,
            ttl: Duration::ZERO,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Add a tag
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Add metadata
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Set health check URL
    pub fn with_health_check(mut self, url: impl Into<String>) -> Self {
        self.health_check_url = Some(url.into());
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Get full service URL
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.address, self.port)
    }

    /// URL a health probe should hit
    pub fn health_url(&self, default_path: &str) -> String {
        match self.health_check_url {
            Some(ref url) => url.clone(),
            None => format!("{}{}", self.url(), default_path),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.health.is_healthy()
    }

    /// Whether the instance has been silent longer than its TTL at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        let ttl = TimeDelta::from_std(self.ttl).unwrap_or(TimeDelta::MAX);
        now.signed_duration_since(self.last_heartbeat) > ttl
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(DiscoveryError::InvalidService(
                "service name cannot be empty".to_string(),
            ));
        }
        if self.address.trim().is_empty() {
            return Err(DiscoveryError::InvalidService(format!(
                "service '{}' has no address",
                self.name
            )));
        }
        if self.port == 0 {
            return Err(DiscoveryError::InvalidService(format!(
                "service '{}' has port 0",
                self.name
            )));
        }
        Ok(())
    }
}

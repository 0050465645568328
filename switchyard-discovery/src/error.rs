//! Discovery and probe errors

use std::time::Duration;
use thiserror::Error;

/// Result type for registry and load-balancer operations.
pub type Result<T> = std::result::Result<T, DiscoveryError>;

/// Result type for a single health probe.
pub type ProbeResult<T> = std::result::Result<T, ProbeError>;

/// Service discovery errors
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("Service not found: {0}")]
    ServiceNotFound(String),

    /// Selection found no healthy instance. This is capacity exhaustion, not a
    /// registry fault.
    #[error("No healthy instance of service: {0}")]
    NoHealthyInstance(String),

    #[error("Invalid service: {0}")]
    InvalidService(String),

    #[error("Unknown load balancing strategy: {0}")]
    InvalidStrategy(String),
}

/// Health probe failures
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("Probe timed out after {0:?}")]
    Timeout(Duration),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Unhealthy status code: {0}")]
    UnhealthyStatus(u16),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

//! In-memory service registry
//!
//! The single writer of service and health records. Every operation takes the
//! table lock for its own duration only.

use crate::error::{DiscoveryError, Result};
use crate::service::{HealthState, HealthStatus, Service};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// TTL applied when a service registers without one
pub const DEFAULT_TTL: Duration = Duration::from_secs(30);

/// Service registry
#[derive(Clone)]
pub struct ServiceRegistry {
    services: Arc<RwLock<HashMap<String, Service>>>,
    default_ttl: Duration,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::with_default_ttl(DEFAULT_TTL)
    }

    /// Registry that applies `ttl` to services registered without one.
    pub fn with_default_ttl(ttl: Duration) -> Self {
        Self {
            services: Arc::new(RwLock::new(HashMap::new())),
            default_ttl: ttl,
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Register a service instance.
    ///
    /// Re-registering an existing identifier replaces the entry.
    pub async fn register(&self, mut service: Service) -> Result<Service> {
        service.validate()?;

        if service.id.trim().is_empty() {
            service.id = Uuid::new_v4().to_string();
        }
        if service.ttl.is_zero() {
            service.ttl = self.default_ttl;
        }

        let now = Utc::now();
        service.registered_at = now;
        service.last_heartbeat = now;
        service.health = HealthStatus::healthy("registered");

        let previous = self
            .services
            .write()
            .await
            .insert(service.id.clone(), service.clone());

        if previous.is_some() {
            info!(
                "Re-registered service {} ({}) at {}:{}",
                service.name, service.id, service.address, service.port
            );
        } else {
            info!(
                "Registered service {} ({}) at {}:{}",
                service.name, service.id, service.address, service.port
            );
        }

        Ok(service)
    }

    /// Remove a service instance.
    pub async fn deregister(&self, id: &str) -> Result<Service> {
        let service = self
            .services
            .write()
            .await
            .remove(id)
            .ok_or_else(|| DiscoveryError::ServiceNotFound(id.to_string()))?;

        info!("Deregistered service {} ({})", service.name, id);
        Ok(service)
    }

    /// Refresh an instance's liveness.
    ///
    /// An instance that is not healthy is forced back to healthy.
    pub async fn heartbeat(&self, id: &str) -> Result<()> {
        let mut services = self.services.write().await;
        let service = services
            .get_mut(id)
            .ok_or_else(|| DiscoveryError::ServiceNotFound(id.to_string()))?;

        service.last_heartbeat = Utc::now();

        if !service.health.is_healthy() {
            debug!(
                "Service {} recovered from {} on heartbeat",
                id, service.health.status
            );
            service.health.recover();
        }

        Ok(())
    }

    /// Set an instance's health explicitly.
    pub async fn update_health(
        &self,
        id: &str,
        status: HealthState,
        message: impl Into<String>,
    ) -> Result<()> {
        let mut services = self.services.write().await;
        let service = services
            .get_mut(id)
            .ok_or_else(|| DiscoveryError::ServiceNotFound(id.to_string()))?;

        service.health.set(status, message);
        Ok(())
    }

    /// Record the outcome of a health probe.
    ///
    /// Returns the state the instance ended up in.
    pub async fn record_check(
        &self,
        id: &str,
        outcome: std::result::Result<(), String>,
        critical_threshold: u32,
    ) -> Result<HealthState> {
        let mut services = self.services.write().await;
        let service = services
            .get_mut(id)
            .ok_or_else(|| DiscoveryError::ServiceNotFound(id.to_string()))?;

        let state = match outcome {
            Ok(()) => {
                service.health.record_pass("health check passed");
                HealthState::Healthy
            }
            Err(message) => service.health.record_failure(message, critical_threshold),
        };

        Ok(state)
    }

    /// Healthy instances of a service, ordered by identifier.
    ///
    /// An empty result means no capacity, not an error.
    pub async fn discover(&self, name: &str) -> Vec<Service> {
        let services = self.services.read().await;
        let mut healthy: Vec<Service> = services
            .values()
            .filter(|s| s.name == name && s.is_healthy())
            .cloned()
            .collect();

        healthy.sort_by(|a, b| a.id.cmp(&b.id));
        healthy
    }

    pub async fn get_service(&self, id: &str) -> Result<Service> {
        self.services
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| DiscoveryError::ServiceNotFound(id.to_string()))
    }

    /// Every registered instance regardless of health.
    pub async fn list_services(&self) -> Vec<Service> {
        let services = self.services.read().await;
        let mut all: Vec<Service> = services.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        all
    }

    /// Every instance of a service regardless of health.
    pub async fn services_by_name(&self, name: &str) -> Vec<Service> {
        let services = self.services.read().await;
        let mut matching: Vec<Service> = services
            .values()
            .filter(|s| s.name == name)
            .cloned()
            .collect();

        matching.sort_by(|a, b| a.id.cmp(&b.id));
        matching
    }

    /// Remove every instance whose heartbeat is older than its TTL.
    ///
    /// Returns the identifiers removed.
    pub async fn cleanup_expired_services(&self) -> Vec<String> {
        self.cleanup_expired_services_at(Utc::now()).await
    }

    /// [`cleanup_expired_services`](Self::cleanup_expired_services) against an explicit clock.
    pub async fn cleanup_expired_services_at(&self, now: DateTime<Utc>) -> Vec<String> {
        let mut services = self.services.write().await;
        let mut removed = Vec::new();

        services.retain(|id, service| {
            if service.is_expired_at(now) {
                warn!(
                    "Service {} ({}) expired, last heartbeat {}",
                    service.name, id, service.last_heartbeat
                );
                removed.push(id.clone());
                false
            } else {
                true
            }
        });

        removed
    }

    /// Get count of registered services
    pub async fn count(&self) -> usize {
        self.services.read().await.len()
    }

    /// Clear all registered services
    pub async fn clear(&self) {
        self.services.write().await.clear();
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

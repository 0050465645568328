//! Periodic health checking
//!
//! Each tick launches one probe per registered instance and then expires
//! instances whose heartbeat TTL has lapsed. Probes run as independent tasks
//! and never hold up the cleanup pass or the next tick.

use crate::error::ProbeError;
use crate::probe::HealthProbe;
use crate::registry::ServiceRegistry;
use crate::service::{HealthState, Service};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Semaphore, oneshot};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Health checker configuration.
#[derive(Debug, Clone)]
pub struct HealthCheckConfig {
    /// Time between ticks
    pub interval: Duration,

    /// Deadline for a single probe
    pub timeout: Duration,

    /// Consecutive failures before an instance is marked critical
    pub critical_threshold: u32,

    /// Cap on probes in flight at once; `None` is unbounded
    pub max_concurrent_probes: Option<usize>,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(5),
            critical_threshold: 3,
            max_concurrent_probes: None,
        }
    }
}

/// Background health checker.
#[derive(Clone)]
pub struct HealthChecker {
    registry: ServiceRegistry,
    probe: Arc<dyn HealthProbe>,
    config: HealthCheckConfig,
    permits: Option<Arc<Semaphore>>,
}

impl HealthChecker {
    /// Create a new checker with default configuration.
    pub fn new(registry: ServiceRegistry, probe: Arc<dyn HealthProbe>) -> Self {
        Self::with_config(registry, probe, HealthCheckConfig::default())
    }

    /// Create a new checker with custom configuration.
    pub fn with_config(
        registry: ServiceRegistry,
        probe: Arc<dyn HealthProbe>,
        config: HealthCheckConfig,
    ) -> Self {
        debug!(
            "Health checker config - interval: {:?}, timeout: {:?}, probe: {}",
            config.interval,
            config.timeout,
            probe.name()
        );
        let permits = config
            .max_concurrent_probes
            .map(|max| Arc::new(Semaphore::new(max.max(1))));

        Self {
            registry,
            probe,
            config,
            permits,
        }
    }

    pub fn config(&self) -> &HealthCheckConfig {
        &self.config
    }

    /// Spawn the control loop.
    ///
    /// The first tick runs immediately. Dropping the returned handle also
    /// stops the loop.
    pub fn start(&self) -> HealthCheckerHandle {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let checker = self.clone();
        let period = self.config.interval.max(Duration::from_millis(1));

        info!("Health checker started (interval {:?})", period);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => {
                        let launched = checker.tick().await;
                        debug!("Health check tick launched {} probes", launched);
                    }
                }
            }

            info!("Health checker stopped");
        });

        HealthCheckerHandle {
            shutdown: Some(shutdown_tx),
            task,
        }
    }

    /// Run one pass: launch probes without waiting for them, then expire
    /// stale instances.
    ///
    /// Returns the number of probes launched.
    pub async fn tick(&self) -> usize {
        let services = self.registry.list_services().await;
        let launched = services.len();

        let mut probes = JoinSet::new();
        for service in services {
            let checker = self.clone();
            probes.spawn(async move {
                checker.check_service(service).await;
            });
        }
        probes.detach_all();

        let expired = self.registry.cleanup_expired_services().await;
        if !expired.is_empty() {
            info!("Expired {} service instances", expired.len());
        }

        launched
    }

    /// Probe every registered instance and wait for all results.
    ///
    /// Results are ordered by instance identifier. Instances deregistered
    /// while their probe was in flight are omitted.
    pub async fn check_all(&self) -> Vec<(String, HealthState)> {
        let services = self.registry.list_services().await;

        let mut probes = JoinSet::new();
        for service in services {
            let checker = self.clone();
            probes.spawn(async move {
                let id = service.id.clone();
                checker.check_service(service).await.map(|state| (id, state))
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = probes.join_next().await {
            match joined {
                Ok(Some(result)) => results.push(result),
                Ok(None) => {}
                Err(e) => error!("Health probe task failed: {}", e),
            }
        }

        results.sort_by(|a, b| a.0.cmp(&b.0));
        results
    }

    async fn check_service(&self, service: Service) -> Option<HealthState> {
        let _permit = match self.permits {
            Some(ref permits) => permits.clone().acquire_owned().await.ok(),
            None => None,
        };

        let timeout = self.config.timeout;
        let outcome = tokio::time::timeout(timeout, self.probe.probe(&service))
            .await
            .unwrap_or_else(|_| Err(ProbeError::Timeout(timeout)));

        if let Err(ref e) = outcome {
            warn!(
                "Health check failed for {} ({}): {}",
                service.name, service.id, e
            );
        }

        let previous = service.health.status;
        match self
            .registry
            .record_check(
                &service.id,
                outcome.map_err(|e| e.to_string()),
                self.config.critical_threshold,
            )
            .await
        {
            Ok(state) => {
                if state != previous {
                    info!(
                        "Service {} ({}) is now {} (was {})",
                        service.name, service.id, state, previous
                    );
                }
                Some(state)
            }
            Err(_) => {
                debug!("Service {} deregistered during health check", service.id);
                None
            }
        }
    }
}

/// Handle to a running health checker loop.
pub struct HealthCheckerHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl HealthCheckerHandle {
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop the loop and wait for it to exit.
    ///
    /// Probes already launched finish on their own.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Err(e) = self.task.await {
            error!("Health checker loop failed: {}", e);
        }
    }
}

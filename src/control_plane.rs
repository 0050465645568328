//! Control plane wiring
//!
//! Builds every Switchyard component from one [`Settings`] tree and owns the
//! health checker's background loop.

use crate::{Error, Result};
use std::sync::Arc;
use switchyard_config::{ConfigError, LogSettings, Settings, Validate};
use switchyard_discovery::{
    HealthCheckConfig, HealthChecker, HealthCheckerHandle, HealthProbe, HttpProbe, LoadBalancer,
    LoadBalancingStrategy, ProbeKind, ServiceRegistry, TcpProbe,
};
use switchyard_flags::{FlagManager, FlagManagerConfig, FlagStorage};
use switchyard_log::{Format, Level, LogConfig};
use tokio::sync::Mutex;
use tracing::info;

/// Flag engine, registry, load balancer and health checker sharing one
/// configuration.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use switchyard::prelude::*;
///
/// # tokio_test::block_on(async {
/// let plane = ControlPlane::new(Settings::default(), Arc::new(InMemoryStorage::new())).unwrap();
///
/// plane
///     .registry()
///     .register(Service::new("checkout", "10.0.0.5", 8080).with_id("checkout-1"))
///     .await
///     .unwrap();
///
/// let selected = plane.balancer().select_service("checkout").await.unwrap();
/// assert_eq!(selected.id, "checkout-1");
/// # });
/// ```
pub struct ControlPlane {
    settings: Settings,
    flags: Arc<FlagManager>,
    registry: ServiceRegistry,
    balancer: Arc<LoadBalancer>,
    health: HealthChecker,
    handle: Mutex<Option<HealthCheckerHandle>>,
}

impl ControlPlane {
    /// Build a control plane, choosing the health probe from
    /// `settings.discovery.probe`.
    pub fn new(settings: Settings, storage: Arc<dyn FlagStorage>) -> Result<Self> {
        let probe = probe_from_settings(&settings)?;
        Self::with_probe(settings, storage, probe)
    }

    /// Build a control plane with an explicit health probe.
    pub fn with_probe(
        settings: Settings,
        storage: Arc<dyn FlagStorage>,
        probe: Arc<dyn HealthProbe>,
    ) -> Result<Self> {
        settings.validate()?;

        let flag_config = FlagManagerConfig {
            cache_ttl: settings.flags.cache_ttl(),
            storage_timeout: settings.flags.storage_timeout(),
            max_concurrent_callbacks: settings.flags.max_concurrent_callbacks,
        };
        let flags = Arc::new(FlagManager::with_config(storage, flag_config));

        let discovery = &settings.discovery;
        let registry = ServiceRegistry::with_default_ttl(discovery.default_ttl());

        let strategy: LoadBalancingStrategy = discovery.load_balancing_strategy.parse()?;
        let balancer = Arc::new(LoadBalancer::new(registry.clone(), strategy));

        let health_config = HealthCheckConfig {
            interval: discovery.health_check_interval(),
            timeout: discovery.probe_timeout(),
            critical_threshold: discovery.critical_threshold,
            max_concurrent_probes: discovery.max_concurrent_probes,
        };
        let health = HealthChecker::with_config(registry.clone(), probe, health_config);

        info!(
            strategy = %strategy,
            probe = %discovery.probe,
            "Control plane configured"
        );

        Ok(Self {
            settings,
            flags,
            registry,
            balancer,
            health,
            handle: Mutex::new(None),
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn flags(&self) -> &Arc<FlagManager> {
        &self.flags
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    pub fn balancer(&self) -> &Arc<LoadBalancer> {
        &self.balancer
    }

    pub fn health_checker(&self) -> &HealthChecker {
        &self.health
    }

    /// Launch the health check loop. Returns `false` if it is already running.
    pub async fn start(&self) -> bool {
        let mut handle = self.handle.lock().await;
        if handle.as_ref().is_some_and(|h| h.is_running()) {
            return false;
        }
        *handle = Some(self.health.start());
        true
    }

    pub async fn is_running(&self) -> bool {
        self.handle
            .lock()
            .await
            .as_ref()
            .is_some_and(|h| h.is_running())
    }

    /// Stop the health check loop and wait for it to exit.
    pub async fn shutdown(&self) {
        let handle = self.handle.lock().await.take();
        if let Some(handle) = handle {
            handle.shutdown().await;
            info!("Control plane stopped");
        }
    }
}

fn probe_from_settings(settings: &Settings) -> Result<Arc<dyn HealthProbe>> {
    let kind: ProbeKind = settings
        .discovery
        .probe
        .parse()
        .map_err(|e: String| Error::Config(ConfigError::ValidationError(e)))?;

    Ok(match kind {
        ProbeKind::Http => {
            Arc::new(HttpProbe::new().with_health_path(settings.discovery.health_path.clone()))
        }
        ProbeKind::Tcp => Arc::new(TcpProbe),
    })
}

/// Translate log settings into a [`LogConfig`], then apply the
/// `SWITCHYARD_LOG_*` environment overrides.
pub fn log_config(settings: &LogSettings) -> Result<LogConfig> {
    let level: Level = settings
        .level
        .parse()
        .map_err(|e: String| Error::Config(ConfigError::ValidationError(e)))?;
    let format: Format = settings
        .format
        .parse()
        .map_err(|e: String| Error::Config(ConfigError::ValidationError(e)))?;

    Ok(LogConfig::new(level, format).with_env_overrides())
}

/// Install the global subscriber described by `settings`.
pub fn init_logging(settings: &LogSettings) -> Result<()> {
    let config = log_config(settings)?;
    switchyard_log::try_init(&config)?;
    Ok(())
}

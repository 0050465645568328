//! Instance selection over the registry's healthy set

use crate::error::{DiscoveryError, Result};
use crate::registry::ServiceRegistry;
use crate::service::Service;
use dashmap::DashMap;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use tracing::{debug, info};

/// Load balancing strategy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadBalancingStrategy {
    /// Rotate through instances in identifier order
    #[default]
    RoundRobin,

    /// Uniform random selection
    Random,

    /// Instance with the fewest selections not yet released
    LeastConnections,
}

impl LoadBalancingStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadBalancingStrategy::RoundRobin => "round_robin",
            LoadBalancingStrategy::Random => "random",
            LoadBalancingStrategy::LeastConnections => "least_connections",
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            LoadBalancingStrategy::RoundRobin => 0,
            LoadBalancingStrategy::Random => 1,
            LoadBalancingStrategy::LeastConnections => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => LoadBalancingStrategy::Random,
            2 => LoadBalancingStrategy::LeastConnections,
            _ => LoadBalancingStrategy::RoundRobin,
        }
    }
}

impl fmt::Display for LoadBalancingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoadBalancingStrategy {
    type Err = DiscoveryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "round_robin" => Ok(LoadBalancingStrategy::RoundRobin),
            "random" => Ok(LoadBalancingStrategy::Random),
            "least_connections" => Ok(LoadBalancingStrategy::LeastConnections),
            _ => Err(DiscoveryError::InvalidStrategy(s.to_string())),
        }
    }
}

type ConnectionTable = Arc<DashMap<String, AtomicUsize>>;

fn acquire_in(connections: &ConnectionTable, id: &str) {
    connections
        .entry(id.to_string())
        .or_insert_with(|| AtomicUsize::new(0))
        .fetch_add(1, Ordering::SeqCst);
}

/// Decrement the count for `id`, dropping the entry once nothing is active.
fn release_in(connections: &ConnectionTable, id: &str) {
    let drained = match connections.get(id) {
        Some(count) => {
            let _ = count.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
            count.load(Ordering::SeqCst) == 0
        }
        None => return,
    };

    if drained {
        connections.remove_if(id, |_, count| count.load(Ordering::SeqCst) == 0);
    }
}

/// Load balancer over a [`ServiceRegistry`].
///
/// The active strategy can be switched at any time; selections in flight keep
/// whichever strategy they read.
pub struct LoadBalancer {
    registry: ServiceRegistry,
    strategy: AtomicU8,
    next: AtomicUsize,
    connections: ConnectionTable,
}

impl LoadBalancer {
    pub fn new(registry: ServiceRegistry, strategy: LoadBalancingStrategy) -> Self {
        Self {
            registry,
            strategy: AtomicU8::new(strategy.to_u8()),
            next: AtomicUsize::new(0),
            connections: Arc::new(DashMap::new()),
        }
    }

    pub fn strategy(&self) -> LoadBalancingStrategy {
        LoadBalancingStrategy::from_u8(self.strategy.load(Ordering::Relaxed))
    }

    /// Switch the active strategy.
    pub fn set_strategy(&self, strategy: LoadBalancingStrategy) {
        let previous = LoadBalancingStrategy::from_u8(
            self.strategy.swap(strategy.to_u8(), Ordering::Relaxed),
        );
        info!("Load balancing strategy changed from {} to {}", previous, strategy);
    }

    /// Select a healthy instance of `name`.
    ///
    /// Under least connections the chosen instance's active count is
    /// incremented; pair with [`release`](Self::release), or use
    /// [`lease`](Self::lease) instead. Other strategies track nothing.
    pub async fn select_service(&self, name: &str) -> Result<Service> {
        let (service, strategy) = self.pick(name).await?;
        if strategy == LoadBalancingStrategy::LeastConnections {
            acquire_in(&self.connections, &service.id);
        }
        Ok(service)
    }

    async fn pick(&self, name: &str) -> Result<(Service, LoadBalancingStrategy)> {
        let instances = self.registry.discover(name).await;

        if instances.is_empty() {
            return Err(DiscoveryError::NoHealthyInstance(name.to_string()));
        }

        let strategy = self.strategy();
        let index = match strategy {
            LoadBalancingStrategy::RoundRobin => {
                self.next.fetch_add(1, Ordering::Relaxed) % instances.len()
            }
            LoadBalancingStrategy::Random => rand::rng().random_range(0..instances.len()),
            LoadBalancingStrategy::LeastConnections => instances
                .iter()
                .enumerate()
                .min_by_key(|(_, s)| self.active_connections(&s.id))
                .map(|(i, _)| i)
                .unwrap_or(0),
        };

        let service = instances[index].clone();

        debug!(
            "Selected {} ({}) for {} via {}",
            service.url(),
            service.id,
            name,
            strategy
        );
        Ok((service, strategy))
    }

    /// Select an instance and release it automatically when the lease drops.
    ///
    /// Leases are counted whatever the active strategy, so a later switch to
    /// least connections sees the real load.
    pub async fn lease(&self, name: &str) -> Result<ServiceLease> {
        let (service, _) = self.pick(name).await?;
        acquire_in(&self.connections, &service.id);
        Ok(ServiceLease {
            service,
            connections: self.connections.clone(),
        })
    }

    /// Mark one selection of instance `id` as finished.
    pub fn release(&self, id: &str) {
        release_in(&self.connections, id);
    }

    /// Selections of instance `id` not yet released.
    pub fn active_connections(&self, id: &str) -> usize {
        self.connections
            .get(id)
            .map(|count| count.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// Number of instances with at least one active selection.
    pub fn tracked_instances(&self) -> usize {
        self.connections.len()
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }
}

/// A selected instance that counts as active until dropped.
pub struct ServiceLease {
    service: Service,
    connections: ConnectionTable,
}

impl ServiceLease {
    pub fn service(&self) -> &Service {
        &self.service
    }
}

impl Deref for ServiceLease {
    type Target = Service;

    fn deref(&self) -> &Service {
        &self.service
    }
}

impl Drop for ServiceLease {
    fn drop(&mut self) {
        release_in(&self.connections, &self.service.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::HealthState;
    use std::collections::HashSet;

    async fn registry_with(ids: &[&str]) -> ServiceRegistry {
        let registry = ServiceRegistry::new();
        for id in ids {
            registry
                .register(Service::new("svc-B", "localhost", 8080).with_id(*id))
                .await
                .unwrap();
        }
        registry
    }

    #[test]
    fn test_strategy_from_str() {
        assert_eq!(
            "round_robin".parse::<LoadBalancingStrategy>().unwrap(),
            LoadBalancingStrategy::RoundRobin
        );
        assert_eq!(
            "Least-Connections".parse::<LoadBalancingStrategy>().unwrap(),
            LoadBalancingStrategy::LeastConnections
        );
        assert!(matches!(
            "fastest".parse::<LoadBalancingStrategy>(),
            Err(DiscoveryError::InvalidStrategy(_))
        ));
    }

    #[tokio::test]
    async fn test_no_healthy_instance() {
        let registry = registry_with(&["a"]).await;
        registry
            .update_health("a", HealthState::Unhealthy, "down")
            .await
            .unwrap();
        let balancer = LoadBalancer::new(registry, LoadBalancingStrategy::RoundRobin);

        assert!(matches!(
            balancer.select_service("svc-B").await,
            Err(DiscoveryError::NoHealthyInstance(_))
        ));
        assert!(matches!(
            balancer.select_service("unknown").await,
            Err(DiscoveryError::NoHealthyInstance(_))
        ));
    }

    #[tokio::test]
    async fn test_round_robin_rotates() {
        let registry = registry_with(&["c", "a", "b"]).await;
        let balancer = LoadBalancer::new(registry, LoadBalancingStrategy::RoundRobin);

        let mut picks = Vec::new();
        for _ in 0..6 {
            picks.push(balancer.select_service("svc-B").await.unwrap().id);
        }
        assert_eq!(picks, vec!["a", "b", "c", "a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_random_covers_all_instances() {
        let registry = registry_with(&["a", "b", "c"]).await;
        let balancer = LoadBalancer::new(registry, LoadBalancingStrategy::Random);

        let mut seen = HashSet::new();
        for _ in 0..300 {
            let service = balancer.select_service("svc-B").await.unwrap();
            assert!(["a", "b", "c"].contains(&service.id.as_str()));
            seen.insert(service.id);
        }
        assert_eq!(seen.len(), 3);
    }

    #[tokio::test]
    async fn test_least_connections_tracks_load() {
        let registry = registry_with(&["a", "b"]).await;
        let balancer = LoadBalancer::new(registry, LoadBalancingStrategy::LeastConnections);

        let first = balancer.lease("svc-B").await.unwrap();
        let second = balancer.lease("svc-B").await.unwrap();
        assert_eq!(first.id, "a");
        assert_eq!(second.id, "b");
        assert_eq!(balancer.active_connections("a"), 1);

        drop(first);
        assert_eq!(balancer.active_connections("a"), 0);
        assert_eq!(balancer.select_service("svc-B").await.unwrap().id, "a");

        balancer.release("a");
        balancer.release("a");
        assert_eq!(balancer.active_connections("a"), 0);
    }

    #[tokio::test]
    async fn test_switch_strategy_at_runtime() {
        let registry = registry_with(&["a", "b"]).await;
        let balancer = LoadBalancer::new(registry, LoadBalancingStrategy::RoundRobin);
        assert_eq!(balancer.strategy(), LoadBalancingStrategy::RoundRobin);

        // plain round robin selections are not counted
        for _ in 0..10 {
            balancer.select_service("svc-B").await.unwrap();
        }
        assert_eq!(balancer.active_connections("a"), 0);
        assert_eq!(balancer.active_connections("b"), 0);

        // a lease taken under round robin still counts after the switch
        let held = balancer.lease("svc-B").await.unwrap();
        balancer.set_strategy(LoadBalancingStrategy::LeastConnections);
        assert_eq!(balancer.strategy(), LoadBalancingStrategy::LeastConnections);

        let other = if held.id == "a" { "b" } else { "a" };
        assert_eq!(balancer.select_service("svc-B").await.unwrap().id, other);
    }

    #[tokio::test]
    async fn test_connection_table_shrinks_with_churn() {
        let registry = ServiceRegistry::new();
        let balancer = LoadBalancer::new(registry.clone(), LoadBalancingStrategy::LeastConnections);

        for _ in 0..200 {
            let service = registry
                .register(Service::new("ephemeral", "localhost", 9000))
                .await
                .unwrap();

            let lease = balancer.lease("ephemeral").await.unwrap();
            let picked = balancer.select_service("ephemeral").await.unwrap();
            balancer.release(&picked.id);
            drop(lease);

            registry.deregister(&service.id).await.unwrap();
        }

        assert_eq!(balancer.tracked_instances(), 0);

        balancer.set_strategy(LoadBalancingStrategy::Random);
        registry
            .register(Service::new("ephemeral", "localhost", 9001).with_id("x"))
            .await
            .unwrap();
        for _ in 0..20 {
            balancer.select_service("ephemeral").await.unwrap();
        }
        assert_eq!(balancer.tracked_instances(), 0);
    }
}

//! Service Discovery for Switchyard
//!
//! This crate provides service registration, liveness tracking and instance
//! selection.
//!
//! ## Features
//!
//! - **Service Registration** - Register instances with a heartbeat TTL
//! - **Service Discovery** - Find healthy service instances
//! - **Health Checks** - Periodic HTTP or TCP probing with escalation to critical
//! - **Expiry** - Instances that stop heart-beating are removed
//! - **Load Balancing** - Round-robin, random, or least-connections
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use switchyard_discovery::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
//!     let registry = ServiceRegistry::new();
//!
//!     // Register a service
//!     let service = Service::new("api", "localhost", 8080)
//!         .with_tag("v1")
//!         .with_health_check("http://localhost:8080/health");
//!     let service = registry.register(service).await?;
//!
//!     // Keep it alive
//!     registry.heartbeat(&service.id).await?;
//!
//!     // Probe everything every 30 seconds
//!     let checker = HealthChecker::new(registry.clone(), Arc::new(HttpProbe::new()));
//!     let handle = checker.start();
//!
//!     // Pick an instance
//!     let balancer = LoadBalancer::new(registry, LoadBalancingStrategy::RoundRobin);
//!     let lease = balancer.lease("api").await?;
//!     println!("Routing to {}", lease.url());
//!
//!     handle.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod balancer;
pub mod error;
pub mod health;
pub mod probe;
pub mod registry;
pub mod service;

pub use balancer::{LoadBalancer, LoadBalancingStrategy, ServiceLease};
pub use error::{DiscoveryError, ProbeError, ProbeResult, Result};
pub use health::{HealthCheckConfig, HealthChecker, HealthCheckerHandle};
pub use probe::{HealthProbe, HttpProbe, ProbeKind, TcpProbe};
pub use registry::{DEFAULT_TTL, ServiceRegistry};
pub use service::{HealthState, HealthStatus, Service};

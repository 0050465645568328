// Switchyard - a control plane for multi-tenant services
//
// This library combines a feature flag engine (targeting rules, gradual
// rollout, audit trail) with a service registry, background health checking
// and client-side load balancing.

mod control_plane;
mod error;

pub use control_plane::{ControlPlane, init_logging, log_config};
pub use error::{Error, Result};

// Re-export member crates
pub use switchyard_config as config;
pub use switchyard_discovery as discovery;
pub use switchyard_flags as flags;
pub use switchyard_log as log;

// Prelude for common imports
pub mod prelude {
    pub use crate::{ControlPlane, Error, Result};

    pub use switchyard_config::{Settings, SettingsLoader, Validate};

    pub use switchyard_flags::{
        EvaluationContext, EvaluationReason, EvaluationResult, FeatureFlag, FlagError,
        FlagManager, FlagStorage, InMemoryStorage, Operator, RolloutConfig, RolloutStrategy,
        Rule,
    };

    pub use switchyard_discovery::{
        DiscoveryError, HealthChecker, HealthProbe, HealthState, LoadBalancer,
        LoadBalancingStrategy, Service, ServiceLease, ServiceRegistry,
    };

    pub use switchyard_log::{Format, Level, LogConfig};
}

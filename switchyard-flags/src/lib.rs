//! Feature Flags for Switchyard
//!
//! Tenant- and environment-scoped feature flags with targeting rules,
//! deterministic percentage rollout and a full audit trail.
//!
//! # Features
//!
//! - 🚀 **Feature Flags** - Toggle features at runtime per environment and tenant
//! - 🎯 **Targeting Rules** - Match on user, tenant, groups or custom attributes
//! - 🎲 **Gradual Rollout** - Stable SHA-256 bucketing, user groups, time windows
//! - 📜 **Auditing** - Every evaluation and every change is logged
//! - 🔔 **Callbacks** - Non-blocking notification of flag changes
//!
//! # Quick Start
//!
//! ```
//! use switchyard_flags::*;
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let manager = FlagManager::new(Arc::new(InMemoryStorage::new()));
//!
//! let flag = FeatureFlag::new("new-ui", "production", "acme")
//!     .with_rule(Rule::new("group", Operator::In, vec!["beta".to_string()]));
//! manager.create_flag(flag).await.unwrap();
//!
//! let context = EvaluationContext::new("user-123").with_group("beta");
//! let result = manager
//!     .evaluate_flag("new-ui", "production", "acme", &context)
//!     .await;
//!
//! assert!(result.enabled);
//! assert_eq!(result.reason, EvaluationReason::RuleMatched);
//! # });
//! ```
//!
//! # Gradual Rollout
//!
//! ```
//! use switchyard_flags::*;
//!
//! // Roll out to 25% of users
//! let flag = FeatureFlag::new("new-algorithm", "production", "acme")
//!     .with_rollout(RolloutConfig::percentage(25.0));
//!
//! let result = flag.evaluate(&EvaluationContext::new("user-123"));
//! assert_eq!(result.enabled, bucket::in_percentage("user-123", 25.0));
//! ```

pub mod bucket;
pub mod cache;
pub mod callback;
pub mod context;
pub mod error;
mod eval;
pub mod flag;
pub mod manager;
pub mod memory;
pub mod rollout;
pub mod rule;
pub mod storage;

pub use cache::FlagCache;
pub use callback::{CallbackDispatcher, FlagCallback};
pub use context::{EvaluationContext, EvaluationReason, EvaluationResult};
pub use error::{FlagError, FlagResult, StorageError, StorageResult};
pub use flag::{FeatureFlag, FlagKey, Operator, RolloutConfig, RolloutStrategy, Rule};
pub use manager::{FlagManager, FlagManagerConfig};
pub use memory::InMemoryStorage;
pub use rollout::RolloutEvaluator;
pub use rule::RuleEvaluator;
pub use storage::{ChangeAction, ChangeRecord, EvaluationRecord, FlagStorage};

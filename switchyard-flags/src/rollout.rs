//! Rollout evaluation
//!
//! The secondary gate applied to a positive rule outcome. Stateless.

use crate::bucket::in_percentage;
use crate::context::EvaluationContext;
use crate::flag::{RolloutConfig, RolloutStrategy};

/// Pure rollout gate.
pub struct RolloutEvaluator;

impl RolloutEvaluator {
    /// Whether `context` is included by `rollout`.
    pub fn includes(rollout: &RolloutConfig, context: &EvaluationContext) -> bool {
        match rollout.strategy {
            RolloutStrategy::Percentage => in_percentage(&context.user_id, rollout.percentage),
            RolloutStrategy::UserGroup => context
                .groups
                .iter()
                .any(|g| rollout.user_groups.contains(g)),
            RolloutStrategy::TimeBased => {
                let now = context.timestamp;
                let after_start = rollout.start_time.is_none_or(|start| now >= start);
                let before_end = rollout.end_time.is_none_or(|end| now <= end);
                after_start && before_end
            }
        }
    }
}

impl RolloutConfig {
    /// Convenience for [`RolloutEvaluator::includes`].
    pub fn includes(&self, context: &EvaluationContext) -> bool {
        RolloutEvaluator::includes(self, context)
    }
}

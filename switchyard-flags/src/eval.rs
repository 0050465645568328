//! Flag evaluation
//!
//! Disabled flags short-circuit. Otherwise the first enabled rule that matches
//! wins; rule `priority` is not consulted. A flag with no rules at all is on by
//! default. Any positive outcome then passes through the rollout gate.

use crate::context::{EvaluationContext, EvaluationReason, EvaluationResult};
use crate::flag::FeatureFlag;

impl FeatureFlag {
    /// Evaluate flag for a context
    pub fn evaluate(&self, context: &EvaluationContext) -> EvaluationResult {
        if !self.enabled {
            return self.result(false, EvaluationReason::FlagDisabled);
        }

        let matched = self
            .rules
            .iter()
            .filter(|rule| rule.enabled)
            .find(|rule| rule.matches(context));

        let mut result = match matched {
            Some(rule) => {
                let mut result = self.result(true, EvaluationReason::RuleMatched);
                result.rule_matched = Some(rule.id.clone());
                result
            }
            None if self.rules.is_empty() => self.result(true, EvaluationReason::DefaultEnabled),
            None => self.result(false, EvaluationReason::DefaultDisabled),
        };

        if result.enabled
            && let Some(ref rollout) = self.rollout
            && !rollout.includes(context)
        {
            result.enabled = false;
            result.reason = EvaluationReason::RolloutExcluded;
        }

        result
    }

    fn result(&self, enabled: bool, reason: EvaluationReason) -> EvaluationResult {
        let mut result = EvaluationResult::new(Some(self.id), enabled, reason);
        result
            .metadata
            .insert("flag_name".to_string(), self.name.clone());
        result
            .metadata
            .insert("environment".to_string(), self.environment.clone());
        result
    }
}

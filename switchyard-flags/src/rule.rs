//! Rule evaluation
//!
//! Matches a single targeting rule against an evaluation context. Stateless.

use crate::bucket::in_percentage;
use crate::context::{AttributeValue, EvaluationContext};
use crate::flag::{Operator, Rule};

/// Pure rule matcher.
pub struct RuleEvaluator;

impl RuleEvaluator {
    /// Whether `rule` matches `context`.
    ///
    /// Disabled rules are the caller's concern; this only checks the predicate.
    pub fn matches(rule: &Rule, context: &EvaluationContext) -> bool {
        if rule.operator == Operator::Percentage {
            return rule
                .effective_percentage()
                .map(|p| in_percentage(&context.user_id, p))
                .unwrap_or(false);
        }

        match context.resolve(&rule.attribute) {
            AttributeValue::Single(value) => Self::match_single(rule, value),
            AttributeValue::Groups(groups) => Self::match_groups(rule, groups),
            AttributeValue::Missing => {
                matches!(rule.operator, Operator::NotEquals | Operator::NotIn)
            }
        }
    }

    fn match_single(rule: &Rule, value: &str) -> bool {
        let member = rule.values.iter().any(|v| v == value);

        match rule.operator {
            Operator::Equals | Operator::In => member,
            Operator::NotEquals | Operator::NotIn => !member,
            Operator::Contains => rule.values.iter().any(|v| value.contains(v.as_str())),
            Operator::Percentage => false,
        }
    }

    fn match_groups(rule: &Rule, groups: &[String]) -> bool {
        let member = groups.iter().any(|g| rule.values.contains(g));

        match rule.operator {
            Operator::Equals | Operator::In => member,
            Operator::NotEquals | Operator::NotIn => !member,
            Operator::Contains => groups
                .iter()
                .any(|g| rule.values.iter().any(|v| g.contains(v.as_str()))),
            Operator::Percentage => false,
        }
    }
}

impl Rule {
    /// Convenience for [`RuleEvaluator::matches`].
    pub fn matches(&self, context: &EvaluationContext) -> bool {
        RuleEvaluator::matches(self, context)
    }
}

//! Evaluation inputs and outputs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Attributes of the caller a flag is evaluated for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationContext {
    #[serde(default)]
    pub user_id: String,

    #[serde(default)]
    pub tenant_id: String,

    #[serde(default)]
    pub groups: Vec<String>,

    #[serde(default)]
    pub metadata: HashMap<String, String>,

    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl Default for EvaluationContext {
    fn default() -> Self {
        Self {
            user_id: String::new(),
            tenant_id: String::new(),
            groups: Vec::new(),
            metadata: HashMap::new(),
            timestamp: Utc::now(),
        }
    }
}

impl EvaluationContext {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Self::default()
        }
    }

    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = tenant_id.into();
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.groups.push(group.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Resolve a rule's target attribute against this context.
    pub(crate) fn resolve(&self, attribute: &str) -> AttributeValue<'_> {
        match attribute {
            "user_id" => AttributeValue::Single(&self.user_id),
            "tenant_id" => AttributeValue::Single(&self.tenant_id),
            "group" | "groups" => AttributeValue::Groups(&self.groups),
            key => self
                .metadata
                .get(key)
                .map(|v| AttributeValue::Single(v.as_str()))
                .unwrap_or(AttributeValue::Missing),
        }
    }
}

/// A context attribute as seen by the rule evaluator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum AttributeValue<'a> {
    Single(&'a str),
    Groups(&'a [String]),
    Missing,
}

/// Why an evaluation produced its outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationReason {
    FlagNotFound,
    FlagDisabled,
    RuleMatched,
    RolloutExcluded,
    DefaultEnabled,
    DefaultDisabled,
}

impl EvaluationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvaluationReason::FlagNotFound => "flag_not_found",
            EvaluationReason::FlagDisabled => "flag_disabled",
            EvaluationReason::RuleMatched => "rule_matched",
            EvaluationReason::RolloutExcluded => "rollout_excluded",
            EvaluationReason::DefaultEnabled => "default_enabled",
            EvaluationReason::DefaultDisabled => "default_disabled",
        }
    }
}

impl std::fmt::Display for EvaluationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one flag evaluation. Written once to the evaluation log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    /// `None` when the flag could not be resolved
    pub flag_id: Option<Uuid>,

    pub enabled: bool,

    pub reason: EvaluationReason,

    /// Identifier of the rule that matched, if any
    pub rule_matched: Option<String>,

    #[serde(default)]
    pub metadata: HashMap<String, String>,

    pub timestamp: DateTime<Utc>,
}

impl EvaluationResult {
    pub(crate) fn new(flag_id: Option<Uuid>, enabled: bool, reason: EvaluationReason) -> Self {
        Self {
            flag_id,
            enabled,
            reason,
            rule_matched: None,
            metadata: HashMap::new(),
            timestamp: Utc::now(),
        }
    }
}

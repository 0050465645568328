//! Feature flag data model
//!
//! Defines flags, targeting rules, rollout configuration and the write-time
//! validation applied before anything reaches storage.

use crate::error::{FlagError, FlagResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Feature flag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureFlag {
    /// Server-assigned identifier
    pub id: Uuid,

    /// Flag name, unique per (environment, tenant)
    pub name: String,

    /// Human readable description
    #[serde(default)]
    pub description: String,

    /// Whether flag is enabled globally
    pub enabled: bool,

    /// Targeting rules, evaluated in stored order
    #[serde(default)]
    pub rules: Vec<Rule>,

    /// Secondary rollout gate
    #[serde(default)]
    pub rollout: Option<RolloutConfig>,

    /// Environment tag (e.g. "production")
    pub environment: String,

    /// Owning tenant
    #[serde(default)]
    pub tenant_id: String,

    /// Who created the flag
    #[serde(default)]
    pub created_by: String,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    /// Free-form metadata
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl FeatureFlag {
    /// Create a new enabled flag with no rules.
    ///
    /// The identifier and timestamps are placeholders until the flag is
    /// persisted through [`FlagManager::create_flag`](crate::FlagManager::create_flag).
    ///
    /// # Examples
    ///
    /// ```
    /// use switchyard_flags::FeatureFlag;
    ///
    /// let flag = FeatureFlag::new("new-ui", "production", "acme");
    /// assert!(flag.enabled);
    /// assert!(flag.rules.is_empty());
    /// ```
    pub fn new(
        name: impl Into<String>,
        environment: impl Into<String>,
        tenant_id: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::nil(),
            name: name.into(),
            description: String::new(),
            enabled: true,
            rules: Vec::new(),
            rollout: None,
            environment: environment.into(),
            tenant_id: tenant_id.into(),
            created_by: String::new(),
            created_at: now,
            updated_at: now,
            metadata: HashMap::new(),
        }
    }

    /// Set description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the global enabled switch
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Add targeting rule
    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Set rollout configuration
    pub fn with_rollout(mut self, rollout: RolloutConfig) -> Self {
        self.rollout = Some(rollout);
        self
    }

    /// Set creator
    pub fn with_created_by(mut self, actor: impl Into<String>) -> Self {
        self.created_by = actor.into();
        self
    }

    /// Add metadata
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// The (name, environment, tenant) triple that must be unique.
    pub fn scope_key(&self) -> FlagKey {
        FlagKey::new(&self.name, &self.environment, &self.tenant_id)
    }

    /// Reject malformed configuration before it is persisted.
    pub fn validate(&self) -> FlagResult<()> {
        if self.name.trim().is_empty() {
            return Err(FlagError::Validation("Flag name cannot be empty".to_string()));
        }
        if self.environment.trim().is_empty() {
            return Err(FlagError::Validation(
                "Flag environment cannot be empty".to_string(),
            ));
        }

        for rule in &self.rules {
            rule.validate()?;
        }

        if let Some(ref rollout) = self.rollout {
            rollout.validate()?;
        }

        Ok(())
    }

    /// Give every rule without an identifier a fresh one.
    pub(crate) fn assign_rule_ids(&mut self) {
        for rule in self.rules.iter_mut().filter(|r| r.id.is_empty()) {
            rule.id = Uuid::new_v4().to_string();
        }
    }
}

/// Lookup key for resolving a flag by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FlagKey {
    pub name: String,
    pub environment: String,
    pub tenant_id: String,
}

impl FlagKey {
    pub fn new(name: &str, environment: &str, tenant_id: &str) -> Self {
        Self {
            name: name.to_string(),
            environment: environment.to_string(),
            tenant_id: tenant_id.to_string(),
        }
    }
}

impl std::fmt::Display for FlagKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.tenant_id, self.environment, self.name)
    }
}

/// Targeting rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// Rule identifier (assigned on write when empty)
    #[serde(default)]
    pub id: String,

    /// Context attribute to check
    pub attribute: String,

    /// Comparison operator
    pub operator: Operator,

    /// Values to compare against
    #[serde(default)]
    pub values: Vec<String>,

    /// Inline percentage for [`Operator::Percentage`]
    #[serde(default)]
    pub percentage: Option<f64>,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Ordering hint. Stored and returned, but evaluation is first match in
    /// stored order.
    #[serde(default)]
    pub priority: i32,
}

fn default_true() -> bool {
    true
}

impl Rule {
    pub fn new(attribute: impl Into<String>, operator: Operator, values: Vec<String>) -> Self {
        Self {
            id: String::new(),
            attribute: attribute.into(),
            operator,
            values,
            percentage: None,
            enabled: true,
            priority: 0,
        }
    }

    /// Percentage rule bucketing on the caller identifier
    pub fn percentage(percentage: f64) -> Self {
        Self::new("user_id", Operator::Percentage, Vec::new()).with_percentage(percentage)
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_percentage(mut self, percentage: f64) -> Self {
        self.percentage = Some(percentage);
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Effective percentage: the inline value, or the first value parsed as a number.
    pub fn effective_percentage(&self) -> Option<f64> {
        self.percentage
            .or_else(|| self.values.first().and_then(|v| v.trim().parse().ok()))
    }

    pub fn validate(&self) -> FlagResult<()> {
        if self.attribute.trim().is_empty() {
            return Err(FlagError::Validation(format!(
                "Rule '{}' has an empty attribute",
                self.id
            )));
        }

        match self.operator {
            Operator::Percentage => match self.effective_percentage() {
                Some(p) if (0.0..=100.0).contains(&p) => Ok(()),
                Some(p) => Err(FlagError::Validation(format!(
                    "Rule '{}' percentage {} must be between 0 and 100",
                    self.id, p
                ))),
                None => Err(FlagError::Validation(format!(
                    "Rule '{}' uses the percentage operator without a percentage",
                    self.id
                ))),
            },
            _ if self.values.is_empty() => Err(FlagError::Validation(format!(
                "Rule '{}' operator '{}' requires at least one value",
                self.id,
                self.operator.as_str()
            ))),
            _ => Ok(()),
        }
    }
}

/// Comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Equals,
    NotEquals,
    In,
    NotIn,
    Contains,
    Percentage,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Equals => "equals",
            Operator::NotEquals => "not_equals",
            Operator::In => "in",
            Operator::NotIn => "not_in",
            Operator::Contains => "contains",
            Operator::Percentage => "percentage",
        }
    }
}

impl std::str::FromStr for Operator {
    type Err = FlagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "equals" => Ok(Operator::Equals),
            "not_equals" => Ok(Operator::NotEquals),
            "in" => Ok(Operator::In),
            "not_in" => Ok(Operator::NotIn),
            "contains" => Ok(Operator::Contains),
            "percentage" => Ok(Operator::Percentage),
            other => Err(FlagError::Validation(format!("Unknown operator '{}'", other))),
        }
    }
}

/// Rollout strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RolloutStrategy {
    Percentage,
    UserGroup,
    TimeBased,
}

/// Gradual rollout configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RolloutConfig {
    pub strategy: RolloutStrategy,

    /// Percentage (0-100)
    #[serde(default)]
    pub percentage: f64,

    #[serde(default)]
    pub user_groups: Vec<String>,

    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,

    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
}

impl RolloutConfig {
    /// Roll out to a percentage of callers
    pub fn percentage(percentage: f64) -> Self {
        Self {
            strategy: RolloutStrategy::Percentage,
            percentage,
            user_groups: Vec::new(),
            start_time: None,
            end_time: None,
        }
    }

    /// Roll out to members of any of the given groups
    pub fn user_groups(groups: Vec<String>) -> Self {
        Self {
            strategy: RolloutStrategy::UserGroup,
            percentage: 0.0,
            user_groups: groups,
            start_time: None,
            end_time: None,
        }
    }

    /// Roll out inside a time window; an absent bound is unconstrained
    pub fn time_window(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        Self {
            strategy: RolloutStrategy::TimeBased,
            percentage: 0.0,
            user_groups: Vec::new(),
            start_time: start,
            end_time: end,
        }
    }

    pub fn validate(&self) -> FlagResult<()> {
        match self.strategy {
            RolloutStrategy::Percentage => {
                if !(0.0..=100.0).contains(&self.percentage) {
                    return Err(FlagError::Validation(format!(
                        "Rollout percentage {} must be between 0 and 100",
                        self.percentage
                    )));
                }
            }
            RolloutStrategy::UserGroup => {
                if self.user_groups.is_empty() {
                    return Err(FlagError::Validation(
                        "user_group rollout requires at least one group".to_string(),
                    ));
                }
            }
            RolloutStrategy::TimeBased => match (self.start_time, self.end_time) {
                (None, None) => {
                    return Err(FlagError::Validation(
                        "time_based rollout requires a start or end time".to_string(),
                    ));
                }
                (Some(start), Some(end)) if start > end => {
                    return Err(FlagError::Validation(
                        "time_based rollout start must not be after end".to_string(),
                    ));
                }
                _ => {}
            },
        }
        Ok(())
    }
}

//! Storage capability consumed by the flag manager.
//!
//! Any persistence engine implementing [`FlagStorage`] can back a
//! [`FlagManager`](crate::FlagManager). [`InMemoryStorage`](crate::InMemoryStorage)
//! is the bundled reference engine.

use crate::context::{EvaluationContext, EvaluationResult};
use crate::error::StorageResult;
use crate::flag::FeatureFlag;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of change recorded in the change log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    Create,
    Update,
    Delete,
}

impl ChangeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeAction::Create => "create",
            ChangeAction::Update => "update",
            ChangeAction::Delete => "delete",
        }
    }
}

/// One append-only change log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub id: Uuid,
    pub flag_id: Uuid,
    pub action: ChangeAction,
    pub actor: String,
    pub before: Option<serde_json::Value>,
    pub after: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

/// One append-only evaluation log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub id: Uuid,
    pub result: EvaluationResult,
    pub context: EvaluationContext,
    pub recorded_at: DateTime<Utc>,
}

/// Persistence contract for flags and their audit trail.
#[async_trait]
pub trait FlagStorage: Send + Sync {
    /// Persist a new flag. Fails with `Conflict` if (name, environment, tenant) is taken.
    async fn create_flag(&self, flag: &FeatureFlag) -> StorageResult<()>;

    /// Load a flag by identifier.
    async fn get_flag(&self, id: Uuid) -> StorageResult<Option<FeatureFlag>>;

    /// Load a flag by its unique (name, environment, tenant) scope.
    async fn get_flag_by_name(
        &self,
        name: &str,
        environment: &str,
        tenant_id: &str,
    ) -> StorageResult<Option<FeatureFlag>>;

    /// Replace a stored flag.
    async fn update_flag(&self, flag: &FeatureFlag) -> StorageResult<()>;

    /// Remove a stored flag.
    async fn delete_flag(&self, id: Uuid) -> StorageResult<()>;

    /// List flags in an environment for a tenant.
    async fn list_flags(&self, environment: &str, tenant_id: &str)
    -> StorageResult<Vec<FeatureFlag>>;

    /// Append to the evaluation log.
    async fn log_evaluation(
        &self,
        result: &EvaluationResult,
        context: &EvaluationContext,
    ) -> StorageResult<()>;

    /// Append to the change log.
    async fn log_flag_change(
        &self,
        flag_id: Uuid,
        action: ChangeAction,
        actor: &str,
        before: Option<serde_json::Value>,
        after: Option<serde_json::Value>,
    ) -> StorageResult<()>;

    /// Evaluation history of a flag, newest first.
    async fn list_evaluations(
        &self,
        flag_id: Uuid,
        limit: usize,
    ) -> StorageResult<Vec<EvaluationRecord>>;

    /// Change history of a flag, newest first.
    async fn list_changes(&self, flag_id: Uuid, limit: usize) -> StorageResult<Vec<ChangeRecord>>;
}

//! In-memory flag storage

use crate::context::{EvaluationContext, EvaluationResult};
use crate::error::{StorageError, StorageResult};
use crate::flag::{FeatureFlag, FlagKey};
use crate::storage::{ChangeAction, ChangeRecord, EvaluationRecord, FlagStorage};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    flags: HashMap<Uuid, FeatureFlag>,
    evaluations: Vec<EvaluationRecord>,
    changes: Vec<ChangeRecord>,
}

/// In-memory storage engine (for testing/single-process deployments)
#[derive(Clone, Default)]
pub struct InMemoryStorage {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored flags
    pub async fn flag_count(&self) -> usize {
        self.tables.read().await.flags.len()
    }

    /// Number of evaluation log entries
    pub async fn evaluation_count(&self) -> usize {
        self.tables.read().await.evaluations.len()
    }

    fn conflicting(tables: &Tables, flag: &FeatureFlag) -> bool {
        let key = flag.scope_key();
        tables
            .flags
            .values()
            .any(|f| f.id != flag.id && f.scope_key() == key)
    }
}

#[async_trait]
impl FlagStorage for InMemoryStorage {
    async fn create_flag(&self, flag: &FeatureFlag) -> StorageResult<()> {
        let mut tables = self.tables.write().await;

        if tables.flags.contains_key(&flag.id) {
            return Err(StorageError::Conflict(format!("flag id {} exists", flag.id)));
        }
        if Self::conflicting(&tables, flag) {
            return Err(StorageError::Conflict(format!(
                "flag {} already exists",
                flag.scope_key()
            )));
        }

        tables.flags.insert(flag.id, flag.clone());
        Ok(())
    }

    async fn get_flag(&self, id: Uuid) -> StorageResult<Option<FeatureFlag>> {
        Ok(self.tables.read().await.flags.get(&id).cloned())
    }

    async fn get_flag_by_name(
        &self,
        name: &str,
        environment: &str,
        tenant_id: &str,
    ) -> StorageResult<Option<FeatureFlag>> {
        let key = FlagKey::new(name, environment, tenant_id);
        Ok(self
            .tables
            .read()
            .await
            .flags
            .values()
            .find(|f| f.scope_key() == key)
            .cloned())
    }

    async fn update_flag(&self, flag: &FeatureFlag) -> StorageResult<()> {
        let mut tables = self.tables.write().await;

        if !tables.flags.contains_key(&flag.id) {
            return Err(StorageError::NotFound(flag.id.to_string()));
        }
        if Self::conflicting(&tables, flag) {
            return Err(StorageError::Conflict(format!(
                "flag {} already exists",
                flag.scope_key()
            )));
        }

        tables.flags.insert(flag.id, flag.clone());
        Ok(())
    }

    async fn delete_flag(&self, id: Uuid) -> StorageResult<()> {
        self.tables
            .write()
            .await
            .flags
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(id.to_string()))
    }

    async fn list_flags(
        &self,
        environment: &str,
        tenant_id: &str,
    ) -> StorageResult<Vec<FeatureFlag>> {
        let tables = self.tables.read().await;
        let mut flags: Vec<FeatureFlag> = tables
            .flags
            .values()
            .filter(|f| f.environment == environment && f.tenant_id == tenant_id)
            .cloned()
            .collect();

        flags.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(flags)
    }

    async fn log_evaluation(
        &self,
        result: &EvaluationResult,
        context: &EvaluationContext,
    ) -> StorageResult<()> {
        self.tables.write().await.evaluations.push(EvaluationRecord {
            id: Uuid::new_v4(),
            result: result.clone(),
            context: context.clone(),
            recorded_at: Utc::now(),
        });
        Ok(())
    }

    async fn log_flag_change(
        &self,
        flag_id: Uuid,
        action: ChangeAction,
        actor: &str,
        before: Option<serde_json::Value>,
        after: Option<serde_json::Value>,
    ) -> StorageResult<()> {
        self.tables.write().await.changes.push(ChangeRecord {
            id: Uuid::new_v4(),
            flag_id,
            action,
            actor: actor.to_string(),
            before,
            after,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    async fn list_evaluations(
        &self,
        flag_id: Uuid,
        limit: usize,
    ) -> StorageResult<Vec<EvaluationRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .evaluations
            .iter()
            .rev()
            .filter(|r| r.result.flag_id == Some(flag_id))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn list_changes(&self, flag_id: Uuid, limit: usize) -> StorageResult<Vec<ChangeRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .changes
            .iter()
            .rev()
            .filter(|r| r.flag_id == flag_id)
            .take(limit)
            .cloned()
            .collect())
    }
}

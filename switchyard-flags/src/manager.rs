//! Flag manager
//!
//! Owns the cache, the storage handle and the change callbacks. Writes go to
//! storage first, then the cache, then callbacks and the change log. Reads
//! prefer the cache and fall through to storage on a miss.

use crate::cache::FlagCache;
use crate::callback::CallbackDispatcher;
use crate::context::{EvaluationContext, EvaluationReason, EvaluationResult};
use crate::error::{FlagError, FlagResult, StorageError, StorageResult};
use crate::flag::{FeatureFlag, FlagKey};
use crate::storage::{ChangeAction, ChangeRecord, EvaluationRecord, FlagStorage};
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Flag manager configuration
#[derive(Debug, Clone)]
pub struct FlagManagerConfig {
    /// Cache entry lifetime; `None` keeps entries until invalidated
    pub cache_ttl: Option<Duration>,

    /// Deadline applied to every storage call
    pub storage_timeout: Duration,

    /// Upper bound on change callbacks running at once
    pub max_concurrent_callbacks: usize,
}

impl Default for FlagManagerConfig {
    fn default() -> Self {
        Self {
            cache_ttl: None,
            storage_timeout: Duration::from_secs(5),
            max_concurrent_callbacks: 32,
        }
    }
}

impl FlagManagerConfig {
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    pub fn with_storage_timeout(mut self, timeout: Duration) -> Self {
        self.storage_timeout = timeout;
        self
    }

    pub fn with_max_concurrent_callbacks(mut self, max: usize) -> Self {
        self.max_concurrent_callbacks = max;
        self
    }
}

/// Feature flag manager
pub struct FlagManager {
    storage: Arc<dyn FlagStorage>,
    cache: FlagCache,
    callbacks: CallbackDispatcher,
    config: FlagManagerConfig,
}

impl FlagManager {
    /// Create a manager with default configuration.
    pub fn new(storage: Arc<dyn FlagStorage>) -> Self {
        Self::with_config(storage, FlagManagerConfig::default())
    }

    pub fn with_config(storage: Arc<dyn FlagStorage>, config: FlagManagerConfig) -> Self {
        Self {
            storage,
            cache: FlagCache::with_ttl(config.cache_ttl),
            callbacks: CallbackDispatcher::new(config.max_concurrent_callbacks),
            config,
        }
    }

    pub fn config(&self) -> &FlagManagerConfig {
        &self.config
    }

    /// Direct access to the cache, e.g. to force a reload after an
    /// out-of-band storage edit.
    pub fn cache(&self) -> &FlagCache {
        &self.cache
    }

    async fn with_deadline<T, F>(&self, op: F) -> StorageResult<T>
    where
        F: Future<Output = StorageResult<T>>,
    {
        tokio::time::timeout(self.config.storage_timeout, op)
            .await
            .map_err(|_| StorageError::Timeout)?
    }

    // ========== CRUD ==========

    /// Create a new flag.
    ///
    /// Assigns the identifier, timestamps and missing rule identifiers, then
    /// persists the flag. The caller's `created_by` is recorded as the actor.
    pub async fn create_flag(&self, mut flag: FeatureFlag) -> FlagResult<FeatureFlag> {
        flag.validate()?;

        let now = Utc::now();
        flag.id = Uuid::new_v4();
        flag.created_at = now;
        flag.updated_at = now;
        flag.assign_rule_ids();

        self.with_deadline(self.storage.create_flag(&flag)).await?;
        self.cache.insert(flag.clone()).await;

        info!(
            flag_id = %flag.id,
            flag = %flag.scope_key(),
            "Created feature flag"
        );

        self.callbacks.dispatch(&flag);
        self.record_change(
            flag.id,
            ChangeAction::Create,
            &flag.created_by,
            None,
            snapshot(&flag),
        )
        .await;

        Ok(flag)
    }

    /// Get a flag by identifier, populating the cache on a miss.
    pub async fn get_flag(&self, id: Uuid) -> FlagResult<FeatureFlag> {
        if let Some(flag) = self.cache.get(&id).await {
            return Ok(flag);
        }

        let epoch = self.cache.epoch().await;
        let flag = self
            .with_deadline(self.storage.get_flag(id))
            .await?
            .ok_or_else(|| FlagError::NotFound(id.to_string()))?;

        self.cache.fill(flag.clone(), epoch).await;
        Ok(flag)
    }

    /// Replace a flag's contents.
    ///
    /// `id`, `created_at` and `created_by` are kept from the stored flag; every
    /// other field comes from `new_state`.
    pub async fn update_flag(
        &self,
        id: Uuid,
        mut new_state: FeatureFlag,
        actor: &str,
    ) -> FlagResult<FeatureFlag> {
        let existing = self.get_flag(id).await?;
        new_state.validate()?;

        new_state.id = existing.id;
        new_state.created_at = existing.created_at;
        new_state.created_by = existing.created_by.clone();
        new_state.updated_at = Utc::now();
        new_state.assign_rule_ids();

        self.with_deadline(self.storage.update_flag(&new_state))
            .await?;
        self.cache.insert(new_state.clone()).await;

        info!(flag_id = %id, actor = actor, "Updated feature flag");

        self.callbacks.dispatch(&new_state);
        self.record_change(
            id,
            ChangeAction::Update,
            actor,
            snapshot(&existing),
            snapshot(&new_state),
        )
        .await;

        Ok(new_state)
    }

    /// Delete a flag. Callbacks are not invoked for deletions.
    pub async fn delete_flag(&self, id: Uuid, actor: &str) -> FlagResult<()> {
        let existing = self.get_flag(id).await?;

        self.with_deadline(self.storage.delete_flag(id)).await?;
        self.cache.invalidate(&id).await;
        self.callbacks.clear(&id);

        info!(flag_id = %id, actor = actor, "Deleted feature flag");

        self.record_change(id, ChangeAction::Delete, actor, snapshot(&existing), None)
            .await;

        Ok(())
    }

    /// List flags for an environment and tenant, warming the cache.
    pub async fn list_flags(&self, environment: &str, tenant_id: &str) -> FlagResult<Vec<FeatureFlag>> {
        let epoch = self.cache.epoch().await;
        let flags = self
            .with_deadline(self.storage.list_flags(environment, tenant_id))
            .await?;

        self.cache.fill_many(flags.clone(), epoch).await;
        Ok(flags)
    }

    // ========== Evaluation ==========

    /// Evaluate a flag by name for a context.
    ///
    /// Never fails: a lookup miss or storage failure yields
    /// [`EvaluationReason::FlagNotFound`]. Every result is written to the
    /// evaluation log on a best-effort basis.
    pub async fn evaluate_flag(
        &self,
        name: &str,
        environment: &str,
        tenant_id: &str,
        context: &EvaluationContext,
    ) -> EvaluationResult {
        let key = FlagKey::new(name, environment, tenant_id);

        let result = match self.resolve(&key).await {
            Ok(Some(flag)) => flag.evaluate(context),
            Ok(None) => not_found(&key),
            Err(e) => {
                error!("Failed to load flag {}: {}", key, e);
                let mut result = not_found(&key);
                result.metadata.insert("error".to_string(), e.to_string());
                result
            }
        };

        debug!(
            flag = %key,
            user_id = %context.user_id,
            enabled = result.enabled,
            reason = %result.reason,
            "Evaluated feature flag"
        );

        if let Err(e) = self
            .with_deadline(self.storage.log_evaluation(&result, context))
            .await
        {
            warn!("Failed to record evaluation of {}: {}", key, e);
        }

        result
    }

    async fn resolve(&self, key: &FlagKey) -> StorageResult<Option<FeatureFlag>> {
        if let Some(flag) = self.cache.get_by_key(key).await {
            return Ok(Some(flag));
        }

        let epoch = self.cache.epoch().await;
        let flag = self
            .with_deadline(
                self.storage
                    .get_flag_by_name(&key.name, &key.environment, &key.tenant_id),
            )
            .await?;

        if let Some(ref flag) = flag {
            if !self.cache.fill(flag.clone(), epoch).await {
                debug!(flag = %key, "Skipped caching flag changed during read");
            }
        }
        Ok(flag)
    }

    // ========== Callbacks ==========

    /// Register a callback invoked after every successful create or update
    /// of the flag. Callbacks never block the write that triggers them.
    pub fn register_callback<F, Fut>(&self, flag_id: Uuid, callback: F)
    where
        F: Fn(FeatureFlag) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.callbacks.register(flag_id, callback);
    }

    pub fn callback_count(&self, flag_id: &Uuid) -> usize {
        self.callbacks.callback_count(flag_id)
    }

    // ========== Audit ==========

    /// Recent evaluations of a flag, newest first.
    pub async fn evaluation_history(
        &self,
        flag_id: Uuid,
        limit: usize,
    ) -> FlagResult<Vec<EvaluationRecord>> {
        Ok(self
            .with_deadline(self.storage.list_evaluations(flag_id, limit))
            .await?)
    }

    /// Recent changes to a flag, newest first.
    pub async fn change_history(&self, flag_id: Uuid, limit: usize) -> FlagResult<Vec<ChangeRecord>> {
        Ok(self
            .with_deadline(self.storage.list_changes(flag_id, limit))
            .await?)
    }

    async fn record_change(
        &self,
        flag_id: Uuid,
        action: ChangeAction,
        actor: &str,
        before: Option<serde_json::Value>,
        after: Option<serde_json::Value>,
    ) {
        let write = self
            .storage
            .log_flag_change(flag_id, action, actor, before, after);

        if let Err(e) = self.with_deadline(write).await {
            warn!(
                "Failed to record {} of flag {}: {}",
                action.as_str(),
                flag_id,
                e
            );
        }
    }
}

fn snapshot(flag: &FeatureFlag) -> Option<serde_json::Value> {
    serde_json::to_value(flag).ok()
}

fn not_found(key: &FlagKey) -> EvaluationResult {
    let mut result = EvaluationResult::new(None, false, EvaluationReason::FlagNotFound);
    result
        .metadata
        .insert("flag_name".to_string(), key.name.clone());
    result
        .metadata
        .insert("environment".to_string(), key.environment.clone());
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flag::{Operator, RolloutConfig, Rule};
    use crate::memory::InMemoryStorage;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::sync::Notify;

    fn manager() -> (FlagManager, InMemoryStorage) {
        let storage = InMemoryStorage::new();
        (FlagManager::new(Arc::new(storage.clone())), storage)
    }

    fn flag(name: &str) -> FeatureFlag {
        FeatureFlag::new(name, "production", "acme").with_created_by("alice")
    }

    /// Storage that delegates to memory but can be told to fail or stall.
    ///
    /// With `hold_reads` set, name lookups read first and then park until
    /// `release_reads` is notified, signalling `read_paused` on the way in.
    struct FlakyStorage {
        inner: InMemoryStorage,
        fail_audit: AtomicBool,
        fail_writes: AtomicBool,
        stall_reads: AtomicBool,
        hold_reads: AtomicBool,
        read_paused: Notify,
        release_reads: Notify,
    }

    impl FlakyStorage {
        fn new() -> Self {
            Self {
                inner: InMemoryStorage::new(),
                fail_audit: AtomicBool::new(false),
                fail_writes: AtomicBool::new(false),
                stall_reads: AtomicBool::new(false),
                hold_reads: AtomicBool::new(false),
                read_paused: Notify::new(),
                release_reads: Notify::new(),
            }
        }

        fn check_writes(&self) -> StorageResult<()> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(StorageError::Backend("primary unavailable".to_string()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl FlagStorage for FlakyStorage {
        async fn create_flag(&self, flag: &FeatureFlag) -> StorageResult<()> {
            self.check_writes()?;
            self.inner.create_flag(flag).await
        }

        async fn get_flag(&self, id: Uuid) -> StorageResult<Option<FeatureFlag>> {
            self.inner.get_flag(id).await
        }

        async fn get_flag_by_name(
            &self,
            name: &str,
            environment: &str,
            tenant_id: &str,
        ) -> StorageResult<Option<FeatureFlag>> {
            if self.stall_reads.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            let flag = self.inner.get_flag_by_name(name, environment, tenant_id).await?;
            if self.hold_reads.load(Ordering::SeqCst) {
                self.read_paused.notify_one();
                self.release_reads.notified().await;
            }
            Ok(flag)
        }

        async fn update_flag(&self, flag: &FeatureFlag) -> StorageResult<()> {
            self.check_writes()?;
            self.inner.update_flag(flag).await
        }

        async fn delete_flag(&self, id: Uuid) -> StorageResult<()> {
            self.inner.delete_flag(id).await
        }

        async fn list_flags(
            &self,
            environment: &str,
            tenant_id: &str,
        ) -> StorageResult<Vec<FeatureFlag>> {
            self.inner.list_flags(environment, tenant_id).await
        }

        async fn log_evaluation(
            &self,
            result: &EvaluationResult,
            context: &EvaluationContext,
        ) -> StorageResult<()> {
            if self.fail_audit.load(Ordering::SeqCst) {
                return Err(StorageError::Backend("audit table offline".to_string()));
            }
            self.inner.log_evaluation(result, context).await
        }

        async fn log_flag_change(
            &self,
            flag_id: Uuid,
            action: ChangeAction,
            actor: &str,
            before: Option<serde_json::Value>,
            after: Option<serde_json::Value>,
        ) -> StorageResult<()> {
            if self.fail_audit.load(Ordering::SeqCst) {
                return Err(StorageError::Backend("audit table offline".to_string()));
            }
            self.inner
                .log_flag_change(flag_id, action, actor, before, after)
                .await
        }

        async fn list_evaluations(
            &self,
            flag_id: Uuid,
            limit: usize,
        ) -> StorageResult<Vec<EvaluationRecord>> {
            self.inner.list_evaluations(flag_id, limit).await
        }

        async fn list_changes(
            &self,
            flag_id: Uuid,
            limit: usize,
        ) -> StorageResult<Vec<ChangeRecord>> {
            self.inner.list_changes(flag_id, limit).await
        }
    }

    #[tokio::test]
    async fn test_create_assigns_identity() {
        let (manager, storage) = manager();

        let created = manager
            .create_flag(flag("search").with_rule(Rule::new(
                "user_id",
                Operator::Equals,
                vec!["u1".to_string()],
            )))
            .await
            .unwrap();

        assert!(!created.id.is_nil());
        assert_eq!(created.created_at, created.updated_at);
        assert!(!created.rules[0].id.is_empty());
        assert_eq!(storage.flag_count().await, 1);
        assert_eq!(manager.get_flag(created.id).await.unwrap(), created);
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_flag() {
        let (manager, storage) = manager();

        let result = manager
            .create_flag(flag("bad").with_rule(Rule::percentage(150.0)))
            .await;

        assert!(matches!(result, Err(FlagError::Validation(_))));
        assert_eq!(storage.flag_count().await, 0);
    }

    #[tokio::test]
    async fn test_duplicate_name_conflicts() {
        let (manager, _) = manager();
        manager.create_flag(flag("dup")).await.unwrap();

        let result = manager.create_flag(flag("dup")).await;
        assert!(matches!(
            result,
            Err(FlagError::Storage(StorageError::Conflict(_)))
        ));
    }

    #[tokio::test]
    async fn test_update_preserves_identity_and_audits() {
        let (manager, _) = manager();
        let created = manager.create_flag(flag("checkout")).await.unwrap();

        let updated = manager
            .update_flag(
                created.id,
                flag("checkout").with_enabled(false).with_created_by("mallory"),
                "bob",
            )
            .await
            .unwrap();

        assert_eq!(updated.id, created.id);
        assert_eq!(updated.created_at, created.created_at);
        assert_eq!(updated.created_by, "alice");
        assert!(updated.updated_at >= created.updated_at);
        assert!(!updated.enabled);

        let changes = manager.change_history(created.id, 10).await.unwrap();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].action, ChangeAction::Update);
        assert_eq!(changes[0].actor, "bob");
        assert_eq!(changes[0].before.as_ref().unwrap()["enabled"], true);
        assert_eq!(changes[0].after.as_ref().unwrap()["enabled"], false);
        assert_eq!(changes[1].action, ChangeAction::Create);
        assert_eq!(changes[1].actor, "alice");
    }

    #[tokio::test]
    async fn test_update_missing_flag() {
        let (manager, _) = manager();
        let result = manager.update_flag(Uuid::new_v4(), flag("x"), "bob").await;
        assert!(result.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_delete_removes_and_audits() {
        let (manager, storage) = manager();
        let created = manager.create_flag(flag("old")).await.unwrap();

        manager.delete_flag(created.id, "carol").await.unwrap();

        assert_eq!(storage.flag_count().await, 0);
        assert!(manager.get_flag(created.id).await.unwrap_err().is_not_found());

        let changes = manager.change_history(created.id, 1).await.unwrap();
        assert_eq!(changes[0].action, ChangeAction::Delete);
        assert!(changes[0].after.is_none());

        let result = manager
            .evaluate_flag("old", "production", "acme", &EvaluationContext::new("u"))
            .await;
        assert_eq!(result.reason, EvaluationReason::FlagNotFound);
    }

    #[tokio::test]
    async fn test_list_warms_cache() {
        let storage = InMemoryStorage::new();
        let mut direct = flag("direct");
        direct.id = Uuid::new_v4();
        storage.create_flag(&direct).await.unwrap();

        let manager = FlagManager::new(Arc::new(storage));
        assert!(manager.cache().is_empty().await);

        let flags = manager.list_flags("production", "acme").await.unwrap();
        assert_eq!(flags.len(), 1);
        assert_eq!(manager.cache().len().await, 1);
    }

    #[tokio::test]
    async fn test_evaluate_unknown_flag() {
        let (manager, storage) = manager();

        let result = manager
            .evaluate_flag("missing", "production", "acme", &EvaluationContext::new("u"))
            .await;

        assert!(!result.enabled);
        assert_eq!(result.reason, EvaluationReason::FlagNotFound);
        assert!(result.flag_id.is_none());
        assert_eq!(storage.evaluation_count().await, 1);
    }

    #[tokio::test]
    async fn test_evaluate_records_history() {
        let (manager, _) = manager();
        let created = manager
            .create_flag(flag("gated").with_rollout(RolloutConfig::percentage(0.0)))
            .await
            .unwrap();

        for user in ["a", "b", "c"] {
            let result = manager
                .evaluate_flag("gated", "production", "acme", &EvaluationContext::new(user))
                .await;
            assert_eq!(result.reason, EvaluationReason::RolloutExcluded);
        }

        let history = manager.evaluation_history(created.id, 2).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].context.user_id, "c");
    }

    #[tokio::test]
    async fn test_audit_failure_is_not_fatal() {
        let storage = Arc::new(FlakyStorage::new());
        storage.fail_audit.store(true, Ordering::SeqCst);
        let manager = FlagManager::new(storage.clone());

        let created = manager.create_flag(flag("resilient")).await.unwrap();
        let result = manager
            .evaluate_flag("resilient", "production", "acme", &EvaluationContext::new("u"))
            .await;

        assert!(result.enabled);
        assert_eq!(result.flag_id, Some(created.id));
        assert!(manager.change_history(created.id, 10).await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_storage_timeout_yields_not_found() {
        let storage = Arc::new(FlakyStorage::new());
        storage.stall_reads.store(true, Ordering::SeqCst);
        let manager = FlagManager::with_config(
            storage,
            FlagManagerConfig::default().with_storage_timeout(Duration::from_millis(100)),
        );

        let result = manager
            .evaluate_flag("slow", "production", "acme", &EvaluationContext::new("u"))
            .await;

        assert_eq!(result.reason, EvaluationReason::FlagNotFound);
        assert!(result.metadata.contains_key("error"));
    }

    #[tokio::test]
    async fn test_callbacks_fire_on_update_not_delete() {
        let (manager, _) = manager();
        let created = manager.create_flag(flag("watched")).await.unwrap();
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = hits.clone();
        manager.register_callback(created.id, move |flag| {
            let counter = counter.clone();
            async move {
                assert_eq!(flag.name, "watched");
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });
        assert_eq!(manager.callback_count(&created.id), 1);

        manager
            .update_flag(created.id, flag("watched").with_enabled(false), "bob")
            .await
            .unwrap();

        for _ in 0..50 {
            if hits.load(Ordering::SeqCst) == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        manager.delete_flag(created.id, "bob").await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(manager.callback_count(&created.id), 0);
    }

    #[tokio::test]
    async fn test_failed_write_leaves_state_untouched() {
        let storage = Arc::new(FlakyStorage::new());
        let manager = FlagManager::new(storage.clone());
        let created = manager.create_flag(flag("stable")).await.unwrap();

        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        manager.register_callback(created.id, move |_| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        storage.fail_writes.store(true, Ordering::SeqCst);

        let result = manager
            .update_flag(created.id, flag("stable").with_enabled(false), "bob")
            .await;
        assert!(matches!(
            result,
            Err(FlagError::Storage(StorageError::Backend(_)))
        ));

        assert_eq!(manager.cache().get(&created.id).await, Some(created.clone()));
        assert_eq!(manager.get_flag(created.id).await.unwrap(), created);
        let result = manager
            .evaluate_flag("stable", "production", "acme", &EvaluationContext::new("u"))
            .await;
        assert!(result.enabled);
        assert_eq!(result.reason, EvaluationReason::DefaultEnabled);

        let cached = manager.cache().len().await;
        assert!(manager.create_flag(flag("never")).await.is_err());
        assert_eq!(manager.cache().len().await, cached);
        let result = manager
            .evaluate_flag("never", "production", "acme", &EvaluationContext::new("u"))
            .await;
        assert_eq!(result.reason, EvaluationReason::FlagNotFound);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        let changes = manager.change_history(created.id, 10).await.unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].action, ChangeAction::Create);
    }

    #[tokio::test]
    async fn test_conflicting_rename_leaves_state_untouched() {
        let (manager, _) = manager();
        let a = manager.create_flag(flag("a")).await.unwrap();
        let b = manager.create_flag(flag("b")).await.unwrap();

        let result = manager.update_flag(b.id, flag("a"), "bob").await;
        assert!(matches!(
            result,
            Err(FlagError::Storage(StorageError::Conflict(_)))
        ));

        assert_eq!(manager.cache().get(&b.id).await, Some(b.clone()));
        assert_eq!(manager.cache().get(&a.id).await, Some(a.clone()));

        let context = EvaluationContext::new("u");
        let result = manager.evaluate_flag("a", "production", "acme", &context).await;
        assert_eq!(result.flag_id, Some(a.id));
        let result = manager.evaluate_flag("b", "production", "acme", &context).await;
        assert_eq!(result.flag_id, Some(b.id));

        let changes = manager.change_history(b.id, 10).await.unwrap();
        assert_eq!(changes.len(), 1);
        assert!(changes.iter().all(|c| c.action != ChangeAction::Update));
    }

    #[tokio::test]
    async fn test_slow_read_does_not_resurrect_deleted_flag() {
        let storage = Arc::new(FlakyStorage::new());
        let manager = Arc::new(FlagManager::new(storage.clone()));
        let created = manager.create_flag(flag("kill")).await.unwrap();
        manager.cache().clear().await;

        storage.hold_reads.store(true, Ordering::SeqCst);
        let reader = {
            let manager = manager.clone();
            tokio::spawn(async move {
                manager
                    .evaluate_flag("kill", "production", "acme", &EvaluationContext::new("u"))
                    .await
            })
        };
        storage.read_paused.notified().await;
        storage.hold_reads.store(false, Ordering::SeqCst);

        manager.delete_flag(created.id, "carol").await.unwrap();
        storage.release_reads.notify_one();
        reader.await.unwrap();

        assert!(manager.cache().get(&created.id).await.is_none());
        let result = manager
            .evaluate_flag("kill", "production", "acme", &EvaluationContext::new("u"))
            .await;
        assert_eq!(result.reason, EvaluationReason::FlagNotFound);
    }

    #[tokio::test]
    async fn test_slow_read_does_not_overwrite_update() {
        let storage = Arc::new(FlakyStorage::new());
        let manager = Arc::new(FlagManager::new(storage.clone()));
        let created = manager.create_flag(flag("dark-launch")).await.unwrap();
        manager.cache().clear().await;

        storage.hold_reads.store(true, Ordering::SeqCst);
        let reader = {
            let manager = manager.clone();
            tokio::spawn(async move {
                manager
                    .evaluate_flag("dark-launch", "production", "acme", &EvaluationContext::new("u"))
                    .await
            })
        };
        storage.read_paused.notified().await;
        storage.hold_reads.store(false, Ordering::SeqCst);

        manager
            .update_flag(created.id, flag("dark-launch").with_enabled(false), "bob")
            .await
            .unwrap();
        storage.release_reads.notify_one();
        reader.await.unwrap();

        assert!(!manager.cache().get(&created.id).await.unwrap().enabled);
        let result = manager
            .evaluate_flag("dark-launch", "production", "acme", &EvaluationContext::new("u"))
            .await;
        assert!(!result.enabled);
        assert_eq!(result.reason, EvaluationReason::FlagDisabled);
    }
}

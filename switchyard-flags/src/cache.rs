//! In-process flag cache
//!
//! Holds flags by identifier plus a (name, environment, tenant) index, both
//! behind one reader-writer lock so the two views never disagree.
//!
//! Writes made by the manager after a successful mutation bump a write epoch.
//! Read-through fills carry the epoch observed before their storage read and
//! are dropped if any write landed in between, so a slow read can never
//! resurrect a deleted flag or overwrite a newer version.

use crate::flag::{FeatureFlag, FlagKey};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use uuid::Uuid;

struct CacheEntry {
    flag: FeatureFlag,
    cached_at: Instant,
}

#[derive(Default)]
struct CacheState {
    by_id: HashMap<Uuid, CacheEntry>,
    by_key: HashMap<FlagKey, Uuid>,
    epoch: u64,
}

impl CacheState {
    fn put(&mut self, flag: FeatureFlag, cached_at: Instant) {
        self.remove(&flag.id);
        self.by_key.insert(flag.scope_key(), flag.id);
        self.by_id.insert(flag.id, CacheEntry { flag, cached_at });
    }

    fn remove(&mut self, id: &Uuid) -> Option<FeatureFlag> {
        let entry = self.by_id.remove(id)?;
        let key = entry.flag.scope_key();
        if self.by_key.get(&key) == Some(id) {
            self.by_key.remove(&key);
        }
        Some(entry.flag)
    }
}

/// Read-through/write-through cache owned by the flag manager
pub struct FlagCache {
    state: RwLock<CacheState>,
    ttl: Option<Duration>,
}

impl FlagCache {
    /// Cache whose entries never expire
    pub fn new() -> Self {
        Self::with_ttl(None)
    }

    /// Cache whose entries are treated as misses once older than `ttl`
    pub fn with_ttl(ttl: Option<Duration>) -> Self {
        Self {
            state: RwLock::new(CacheState::default()),
            ttl,
        }
    }

    fn fresh(&self, entry: &CacheEntry) -> bool {
        self.ttl.is_none_or(|ttl| entry.cached_at.elapsed() <= ttl)
    }

    pub async fn get(&self, id: &Uuid) -> Option<FeatureFlag> {
        let state = self.state.read().await;
        state
            .by_id
            .get(id)
            .filter(|entry| self.fresh(entry))
            .map(|entry| entry.flag.clone())
    }

    pub async fn get_by_key(&self, key: &FlagKey) -> Option<FeatureFlag> {
        let state = self.state.read().await;
        state
            .by_key
            .get(key)
            .and_then(|id| state.by_id.get(id))
            .filter(|entry| self.fresh(entry))
            .map(|entry| entry.flag.clone())
    }

    /// Current write epoch. Capture it before a storage read and hand it to
    /// [`fill`](Self::fill) afterwards.
    pub async fn epoch(&self) -> u64 {
        self.state.read().await.epoch
    }

    /// Insert or replace a flag, re-indexing it if its name moved.
    pub async fn insert(&self, flag: FeatureFlag) {
        let mut state = self.state.write().await;
        state.epoch += 1;
        state.put(flag, Instant::now());
    }

    /// Cache a flag read from storage, unless a write happened since `epoch`.
    ///
    /// Returns whether the flag was cached.
    pub async fn fill(&self, flag: FeatureFlag, epoch: u64) -> bool {
        let mut state = self.state.write().await;
        if state.epoch != epoch {
            return false;
        }
        state.put(flag, Instant::now());
        true
    }

    /// Batch form of [`fill`](Self::fill).
    pub async fn fill_many(&self, flags: Vec<FeatureFlag>, epoch: u64) -> bool {
        let mut state = self.state.write().await;
        if state.epoch != epoch {
            return false;
        }

        let now = Instant::now();
        for flag in flags {
            state.put(flag, now);
        }
        true
    }

    /// Drop a flag from the cache
    pub async fn invalidate(&self, id: &Uuid) -> Option<FeatureFlag> {
        let mut state = self.state.write().await;
        state.epoch += 1;
        state.remove(id)
    }

    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        state.epoch += 1;
        state.by_id.clear();
        state.by_key.clear();
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.by_id.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for FlagCache {
    fn default() -> Self {
        Self::new()
    }
}

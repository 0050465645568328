//! Flag change callbacks
//!
//! Callbacks are fire-and-forget: the write that triggers them never waits.
//! Each dispatch gets one driver task that takes a permit from a shared
//! semaphore before spawning each callback, so callbacks still waiting for a
//! slot never exist as tasks. A callback that panics only takes down its own
//! task.

use crate::flag::FeatureFlag;
use dashmap::DashMap;
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error};
use uuid::Uuid;

/// Type-erased change callback
pub type FlagCallback = Arc<dyn Fn(FeatureFlag) -> BoxFuture<'static, ()> + Send + Sync>;

/// Per-flag callback table with bounded dispatch
pub struct CallbackDispatcher {
    callbacks: DashMap<Uuid, Vec<FlagCallback>>,
    permits: Arc<Semaphore>,
}

impl CallbackDispatcher {
    /// Create a dispatcher running at most `max_concurrent` callbacks at a time.
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            callbacks: DashMap::new(),
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Register a callback for a flag.
    pub fn register<F, Fut>(&self, flag_id: Uuid, callback: F)
    where
        F: Fn(FeatureFlag) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let callback: FlagCallback =
            Arc::new(move |flag: FeatureFlag| -> BoxFuture<'static, ()> { Box::pin(callback(flag)) });
        self.callbacks.entry(flag_id).or_default().push(callback);
        debug!("Registered change callback for flag {}", flag_id);
    }

    /// Drop every callback registered for a flag.
    pub fn clear(&self, flag_id: &Uuid) {
        self.callbacks.remove(flag_id);
    }

    pub fn callback_count(&self, flag_id: &Uuid) -> usize {
        self.callbacks.get(flag_id).map(|c| c.len()).unwrap_or(0)
    }

    /// Invoke every callback registered for `flag` without waiting.
    ///
    /// The returned handle completes once all callbacks have finished; callers
    /// on the write path simply drop it.
    pub fn dispatch(&self, flag: &FeatureFlag) -> Option<JoinHandle<()>> {
        let callbacks = self.callbacks.get(&flag.id).map(|c| c.value().clone())?;
        if callbacks.is_empty() {
            return None;
        }

        let permits = self.permits.clone();
        let flag = flag.clone();

        Some(tokio::spawn(async move {
            let mut tasks = Vec::with_capacity(callbacks.len());

            for callback in callbacks {
                let Ok(permit) = permits.clone().acquire_owned().await else {
                    break;
                };
                let flag = flag.clone();
                tasks.push(tokio::spawn(async move {
                    let _permit = permit;
                    callback(flag).await;
                }));
            }

            for task in tasks {
                if let Err(e) = task.await {
                    error!("Change callback for flag {} panicked: {}", flag.id, e);
                }
            }
        }))
    }
}

impl Default for CallbackDispatcher {
    fn default() -> Self {
        Self::new(32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn flag() -> FeatureFlag {
        let mut flag = FeatureFlag::new("cb", "dev", "t");
        flag.id = Uuid::new_v4();
        flag
    }

    #[tokio::test]
    async fn test_all_callbacks_invoked() {
        let dispatcher = CallbackDispatcher::new(4);
        let f = flag();
        let hits = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let hits = hits.clone();
            dispatcher.register(f.id, move |_flag| {
                let hits = hits.clone();
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                }
            });
        }

        assert_eq!(dispatcher.callback_count(&f.id), 3);
        dispatcher.dispatch(&f).unwrap().await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_no_callbacks_no_task() {
        let dispatcher = CallbackDispatcher::default();
        assert!(dispatcher.dispatch(&flag()).is_none());
    }

    #[tokio::test]
    async fn test_panicking_callback_is_isolated() {
        let dispatcher = CallbackDispatcher::new(2);
        let f = flag();
        let hits = Arc::new(AtomicUsize::new(0));

        dispatcher.register(f.id, |flag| async move {
            assert!(flag.name.is_empty(), "subscriber bug");
        });
        let counter = hits.clone();
        dispatcher.register(f.id, move |_flag| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        dispatcher.dispatch(&f).unwrap().await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let dispatcher = CallbackDispatcher::new(2);
        let f = flag();
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        for _ in 0..8 {
            let running = running.clone();
            let peak = peak.clone();
            dispatcher.register(f.id, move |_flag| {
                let running = running.clone();
                let peak = peak.clone();
                async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                }
            });
        }

        dispatcher.dispatch(&f).unwrap().await.unwrap();
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_waiting_callbacks_are_not_spawned() {
        let dispatcher = CallbackDispatcher::new(1);
        let f = flag();
        let gate = Arc::new(Semaphore::new(0));
        let hits = Arc::new(AtomicUsize::new(0));

        for _ in 0..20 {
            let gate = gate.clone();
            let hits = hits.clone();
            dispatcher.register(f.id, move |_flag| {
                let gate = gate.clone();
                let hits = hits.clone();
                async move {
                    let _ = gate.acquire().await;
                    hits.fetch_add(1, Ordering::SeqCst);
                }
            });
        }

        let handle = dispatcher.dispatch(&f).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        // the driver plus the one callback holding the only permit
        let alive = tokio::runtime::Handle::current().metrics().num_alive_tasks();
        assert!(alive <= 2, "{} tasks alive", alive);
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        gate.add_permits(1);
        handle.await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 20);
    }
}

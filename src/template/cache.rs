//! Compile cache with single-flight first compiles.
//!
//! Every name maps to one slot. A slot is initialised by exactly one
//! compile; concurrent callers for the same name wait on that compile and
//! observe its result. A failed compile is remembered as failed until the
//! slot is replaced by an explicit recompile.

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::OnceCell;

use super::CompiledUnit;

type Slot = Arc<OnceCell<Option<Arc<CompiledUnit>>>>;

#[derive(Default)]
pub struct CompileCache {
    slots: DashMap<String, Slot>,
}

impl CompileCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The compiled unit for `name`, if a compile succeeded
    pub fn get(&self, name: &str) -> Option<Arc<CompiledUnit>> {
        // Clone the slot first so no map guard is held while reading it
        let slot = self.slots.get(name).map(|slot| slot.clone())?;
        slot.get().cloned().flatten()
    }

    /// Return the cached unit or run `compile` once for `name`.
    ///
    /// Callers racing on an uncompiled name share a single `compile`
    /// invocation.
    pub async fn get_or_compile<F, Fut>(&self, name: &str, compile: F) -> Option<Arc<CompiledUnit>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Option<CompiledUnit>>,
    {
        let slot = self.slots.entry(name.to_string()).or_default().clone();

        slot.get_or_init(|| async { compile().await.map(Arc::new) })
            .await
            .clone()
    }

    /// Store a freshly compiled unit, replacing any previous slot for
    /// `name`.
    pub fn replace(&self, name: &str, unit: CompiledUnit) -> Arc<CompiledUnit> {
        let unit = Arc::new(unit);
        let slot = Arc::new(OnceCell::new_with(Some(Some(unit.clone()))));
        self.slots.insert(name.to_string(), slot);
        unit
    }

    /// Record a failed explicit compile. A name that already has a slot
    /// keeps it, so a working unit survives a broken recompile.
    pub fn mark_failed(&self, name: &str) {
        self.slots
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new_with(Some(None))));
    }

    /// Forget `name` so the next `get_or_compile` compiles again
    pub fn invalidate(&self, name: &str) {
        self.slots.remove(name);
    }

    /// Whether a first compile for `name` was attempted and failed
    pub fn is_failed(&self, name: &str) -> bool {
        self.slots
            .get(name)
            .map(|slot| matches!(slot.get(), Some(None)))
            .unwrap_or(false)
    }

    /// Number of successfully compiled units
    pub fn len(&self) -> usize {
        self.slots
            .iter()
            .filter(|entry| matches!(entry.value().get(), Some(Some(_))))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::engine::{CompileOptions, Helpers, MiniJinjaEngine, TemplateEngine};

    fn unit(name: &str, source: &str) -> CompiledUnit {
        let template = MiniJinjaEngine::new()
            .compile_template(name, source, CompileOptions::default())
            .unwrap();
        CompiledUnit::new(name, template, Helpers::new(), None)
    }

    #[tokio::test]
    async fn test_get_or_compile_compiles_once() {
        let cache = CompileCache::new();
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let result = cache
                .get_or_compile("t", || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Some(unit("t", "hello"))
                })
                .await;
            assert!(result.is_some());
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_first_compile_is_single_flight() {
        let cache = Arc::new(CompileCache::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                let calls = calls.clone();
                tokio::spawn(async move {
                    cache
                        .get_or_compile("t", || async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            Some(unit("t", "hello"))
                        })
                        .await
                })
            })
            .collect();

        for handle in handles {
            assert!(handle.await.unwrap().is_some());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_is_sticky_until_replaced() {
        let cache = CompileCache::new();

        assert!(cache.get_or_compile("t", || async { None }).await.is_none());
        assert!(cache.is_failed("t"));
        assert!(cache.get("t").is_none());
        assert!(cache.is_empty());

        // No second attempt without an explicit recompile
        let retried = cache
            .get_or_compile("t", || async { Some(unit("t", "late")) })
            .await;
        assert!(retried.is_none());

        cache.replace("t", unit("t", "fixed"));
        assert!(!cache.is_failed("t"));
        assert!(cache.get("t").is_some());
    }

    #[tokio::test]
    async fn test_replace_last_compile_wins() {
        let cache = CompileCache::new();

        let first = cache.replace("t", unit("t", "one"));
        let second = cache.replace("t", unit("t", "two"));

        let current = cache.get("t").unwrap();
        assert!(Arc::ptr_eq(&current, &second));
        assert!(!Arc::ptr_eq(&current, &first));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_invalidate_allows_recompile() {
        let cache = CompileCache::new();
        cache.get_or_compile("t", || async { None }).await;

        cache.invalidate("t");
        let unit = cache
            .get_or_compile("t", || async { Some(unit("t", "again")) })
            .await;
        assert!(unit.is_some());
    }

    #[tokio::test]
    async fn test_mark_failed_keeps_existing_unit() {
        let cache = CompileCache::new();
        let good = cache.replace("t", unit("t", "good"));

        cache.mark_failed("t");
        let current = cache.get("t").unwrap();
        assert!(Arc::ptr_eq(&current, &good));
        assert!(!cache.is_failed("t"));

        cache.mark_failed("u");
        assert!(cache.is_failed("u"));
        assert!(cache.get("u").is_none());
    }
}

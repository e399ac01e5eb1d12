//! Runtime cache - compiled programs keyed by integration key.
//!
//! No TTL and no eviction: entries live until `invalidate` or `replace`.
//! Concurrent misses for one key compile once.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::OnceCell;

use crate::dsl::{compile, CompileError, Program};

/// A compiled program plus what was derived from it at compile time.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledRuntime {
    pub key: String,
    pub program: Program,
    /// Capability ids referenced anywhere in the program.
    pub capabilities: Vec<String>,
    pub compiled_at: DateTime<Utc>,
}

impl CompiledRuntime {
    fn build(key: &str, program: Program) -> Self {
        let mut capabilities: Vec<String> = Vec::new();
        for block in &program.blocks {
            for cap in block.declared_capabilities() {
                if !capabilities.contains(&cap) {
                    capabilities.push(cap);
                }
            }
        }
        Self {
            key: key.to_string(),
            program,
            capabilities,
            compiled_at: Utc::now(),
        }
    }
}

type Slot = Arc<OnceCell<Arc<CompiledRuntime>>>;

#[derive(Default)]
pub struct RuntimeCache {
    entries: Mutex<HashMap<String, Slot>>,
    compiles: AtomicUsize,
}

impl RuntimeCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Cached runtime for `key`, compiling `source` on a miss. Failed
    /// compilations are not cached.
    pub async fn get_or_compile(
        &self,
        key: &str,
        source: &str,
    ) -> Result<Arc<CompiledRuntime>, CompileError> {
        let slot = self.entries().entry(key.to_string()).or_default().clone();

        if let Some(hit) = slot.get() {
            tracing::debug!("[Cache] hit for {}", key);
            return Ok(hit.clone());
        }

        let result = slot
            .get_or_try_init(|| async {
                self.compiles.fetch_add(1, Ordering::SeqCst);
                tracing::info!("[Cache] compiling program for {}", key);
                compile(source).map(|program| Arc::new(CompiledRuntime::build(key, program)))
            })
            .await
            .cloned();

        if result.is_err() {
            let mut entries = self.entries();
            let stale = entries
                .get(key)
                .is_some_and(|current| Arc::ptr_eq(current, &slot) && !current.initialized());
            if stale {
                entries.remove(key);
            }
        }
        result
    }

    pub fn get(&self, key: &str) -> Option<Arc<CompiledRuntime>> {
        self.entries().get(key).and_then(|slot| slot.get().cloned())
    }

    /// Drop the entry for `key`. Returns whether a compiled entry existed.
    pub fn invalidate(&self, key: &str) -> bool {
        let removed = self.entries().remove(key);
        removed.is_some_and(|slot| slot.initialized())
    }

    /// Compile `source` and install it under `key`, replacing any entry.
    /// On a compile error the existing entry is left untouched.
    pub async fn replace(
        &self,
        key: &str,
        source: &str,
    ) -> Result<Arc<CompiledRuntime>, CompileError> {
        self.compiles.fetch_add(1, Ordering::SeqCst);
        let runtime = Arc::new(CompiledRuntime::build(key, compile(source)?));
        let slot = Arc::new(OnceCell::new_with(Some(runtime.clone())));
        self.entries().insert(key.to_string(), slot);
        tracing::info!("[Cache] replaced program for {}", key);
        Ok(runtime)
    }

    /// Number of compiled entries.
    pub fn len(&self) -> usize {
        self.entries().values().filter(|s| s.initialized()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// How many compilations this cache has performed.
    pub fn compile_count(&self) -> usize {
        self.compiles.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = "bot Greeter\n  on start\n    call llm prompt=\"hi\"\n  end\nend\n";

    #[tokio::test]
    async fn test_compiles_once_per_key() {
        let cache = RuntimeCache::new();
        let first = cache.get_or_compile("acme", SOURCE).await.unwrap();
        let second = cache.get_or_compile("acme", SOURCE).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.compile_count(), 1);
        assert_eq!(first.capabilities, vec!["llm".to_string()]);
    }

    #[tokio::test]
    async fn test_errors_are_not_cached() {
        let cache = RuntimeCache::new();
        assert!(cache.get_or_compile("k", "bot Broken\n").await.is_err());
        assert!(cache.get("k").is_none());
        assert!(cache.is_empty());
        assert!(cache.entries().is_empty());
        cache.get_or_compile("k", SOURCE).await.unwrap();
        assert_eq!(cache.compile_count(), 2);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_invalidate_and_replace() {
        let cache = RuntimeCache::new();
        cache.get_or_compile("k", SOURCE).await.unwrap();
        assert!(cache.invalidate("k"));
        assert!(!cache.invalidate("k"));

        let replaced = cache
            .replace("k", "bot Other\nend\n")
            .await
            .unwrap();
        assert_eq!(replaced.program.blocks[0].name, "Other");
        assert!(cache.replace("k", "end").await.is_err());
        assert_eq!(cache.get("k").unwrap().program.blocks[0].name, "Other");
    }

    #[tokio::test]
    async fn test_concurrent_misses_compile_once() {
        let cache = Arc::new(RuntimeCache::new());
        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.get_or_compile("shared", SOURCE).await.is_ok() })
            })
            .collect();
        for t in tasks {
            assert!(t.await.unwrap());
        }
        assert_eq!(cache.compile_count(), 1);
    }
}

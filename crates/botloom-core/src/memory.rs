//! Shared memory - a key/value scratchpad visible to every capability
//! invocation of one run or workforce session.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;

/// Concurrent key/value map. Cloning shares the underlying storage.
#[derive(Clone, Default)]
pub struct SharedMemory {
    inner: Arc<RwLock<HashMap<String, Value>>>,
}

impl SharedMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, key: &str) -> Option<Value> {
        self.inner.read().await.get(key).cloned()
    }

    /// Store `value`, returning the previous value if any.
    pub async fn set(&self, key: &str, value: Value) -> Option<Value> {
        self.inner.write().await.insert(key.to_string(), value)
    }

    /// Append to the list stored under `key` and return the new length.
    ///
    /// Absent keys start a new list; any other non-list value, `null`
    /// included, becomes the first element. Runs under one write lock so
    /// concurrent appends never lose an element.
    pub async fn append(&self, key: &str, value: Value) -> usize {
        let mut map = self.inner.write().await;
        match map.get_mut(key) {
            None => {
                map.insert(key.to_string(), Value::Array(vec![value]));
                1
            }
            Some(Value::Array(items)) => {
                items.push(value);
                items.len()
            }
            Some(slot) => {
                *slot = Value::Array(vec![slot.take(), value]);
                2
            }
        }
    }

    pub async fn remove(&self, key: &str) -> Option<Value> {
        self.inner.write().await.remove(key)
    }

    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.inner.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// A point-in-time copy of every entry.
    pub async fn snapshot(&self) -> HashMap<String, Value> {
        self.inner.read().await.clone()
    }
}

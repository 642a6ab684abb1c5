//! Process-local store.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{KeyValueStore, StoreError};

/// In-memory [`KeyValueStore`].
///
/// Nothing survives the process; used for tests and throwaway sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with `entries`.
    #[must_use]
    pub fn with_entries<'a>(entries: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let entries = entries
            .into_iter()
            .map(|(key, value)| (key.to_owned(), value.to_owned()))
            .collect();
        Self {
            entries: RwLock::new(entries),
        }
    }

    /// Number of stored keys.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the store holds no keys.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries
            .write()
            .await
            .insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn set_many(&self, entries: &[(&str, &str)]) -> Result<(), StoreError> {
        let mut map = self.entries.write().await;
        for (key, value) in entries {
            map.insert((*key).to_owned(), (*value).to_owned());
        }
        Ok(())
    }

    async fn remove_many(&self, keys: &[&str]) -> Result<(), StoreError> {
        let mut map = self.entries.write().await;
        for key in keys {
            map.remove(*key);
        }
        Ok(())
    }
}

//! In-memory secret storage implementation.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

use super::{SecretStore, StoreError};

/// In-memory secret store.
///
/// Not persistent; data is lost when the process exits. Used by tests and by
/// extension hosts that cannot reach the platform keyring.
pub struct MemoryStore {
    data: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
        }
    }

    /// Create a memory store with initial data.
    pub fn with_data(data: HashMap<String, Vec<u8>>) -> Self {
        Self {
            data: RwLock::new(data),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("keys_count", &self.data.read().len())
            .finish()
    }
}

#[async_trait]
impl SecretStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.data.read().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.data.write().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.data.write().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_set_get() {
        let store = MemoryStore::new();

        store.set("test-key", b"test-value").await.unwrap();
        let retrieved = store.get("test-key").await.unwrap();

        assert_eq!(retrieved, Some(b"test-value".to_vec()));
    }

    #[tokio::test]
    async fn test_memory_store_get_nonexistent() {
        let store = MemoryStore::new();
        let result = store.get("nonexistent").await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_memory_store_delete_is_idempotent() {
        let store = MemoryStore::new();

        store.set("test-key", b"test-value").await.unwrap();
        store.delete("test-key").await.unwrap();
        store.delete("test-key").await.unwrap();

        assert!(store.get("test-key").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_store_exists() {
        let store = MemoryStore::with_data(HashMap::from([(
            "seeded".to_string(),
            vec![1, 2, 3],
        )]));

        assert!(store.exists("seeded").await.unwrap());
        assert!(!store.exists("other").await.unwrap());
    }
}

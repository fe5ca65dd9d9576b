//! Session Store Adapter.
//!
//! Sessions live in a remote, strongly-consistent key-value store. The core
//! only ever needs `get`, `put` and `delete` by key, so that is all the
//! [`KvStore`] trait exposes. Values are stored as JSON text.
//!
//! Implementations:
//! - [`RedisStore`] for deployments
//! - [`MemoryStore`] for tests and local runs
//!
//! [`Namespaced`] applies a fixed key prefix so session keys never collide
//! with unrelated data in the same store.

pub mod memory;
pub mod redis_store;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

use async_trait::async_trait;
use std::sync::Arc;

/// Store-level failures. Absence of a key is never an error.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store connection failed: {0}")]
    Connection(String),

    #[error("Store command failed: {0}")]
    Command(String),
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_connection_refusal() || err.is_connection_dropped() || err.is_timeout() {
            StoreError::Connection(err.to_string())
        } else {
            StoreError::Command(err.to_string())
        }
    }
}

/// Minimal key-value interface over the session store.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read a key. `Ok(None)` when the key does not exist.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a key, replacing any previous value.
    async fn put(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Remove a key. Removing an absent key succeeds.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

#[async_trait]
impl<S> KvStore for Arc<S>
where
    S: KvStore + ?Sized,
{
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).get(key).await
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        (**self).put(key, value).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        (**self).delete(key).await
    }
}

/// Wraps a store so that every key is placed under `prefix`.
#[derive(Debug, Clone)]
pub struct Namespaced<S> {
    inner: S,
    prefix: String,
}

impl<S> Namespaced<S> {
    pub fn new(inner: S, prefix: impl Into<String>) -> Self {
        Self {
            inner,
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }
}

#[async_trait]
impl<S> KvStore for Namespaced<S>
where
    S: KvStore,
{
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.inner.get(&self.key(key)).await
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.inner.put(&self.key(key), value).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.inner.delete(&self.key(key)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_namespaced_prefixes_keys() {
        let backing = Arc::new(MemoryStore::new());
        let sessions = Namespaced::new(backing.clone(), "sessions/");

        sessions.put("abc", "{}").await.unwrap();

        assert_eq!(backing.get("sessions/abc").await.unwrap().as_deref(), Some("{}"));
        assert_eq!(backing.get("abc").await.unwrap(), None);
        assert_eq!(sessions.get("abc").await.unwrap().as_deref(), Some("{}"));
    }

    #[tokio::test]
    async fn test_namespaced_isolates_unrelated_keys() {
        let backing = Arc::new(MemoryStore::new());
        backing.put("abc", "unrelated").await.unwrap();

        let sessions = Namespaced::new(backing.clone(), "sessions/");
        assert_eq!(sessions.get("abc").await.unwrap(), None);

        sessions.delete("abc").await.unwrap();
        assert_eq!(backing.get("abc").await.unwrap().as_deref(), Some("unrelated"));
    }

    #[test]
    fn test_redis_connection_errors_classified() {
        let err = redis::RedisError::from(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "refused",
        ));
        assert!(matches!(StoreError::from(err), StoreError::Connection(_)));

        let err = redis::RedisError::from((
            redis::ErrorKind::TypeError,
            "test context",
            "wrong type".to_string(),
        ));
        assert!(matches!(StoreError::from(err), StoreError::Command(_)));
    }
}

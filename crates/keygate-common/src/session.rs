use async_trait::async_trait;
use miette::Diagnostic;
use std::collections::HashMap;
use std::error::Error as StdError;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Errors emitted by session stores.
#[derive(Debug, thiserror::Error, Diagnostic)]
pub enum SessionStoreError {
    /// Filesystem or I/O error
    #[error("I/O error: {0}")]
    #[diagnostic(code(keygate::session_store::io))]
    Io(#[from] std::io::Error),
    /// Serialization error (e.g., JSON)
    #[error("serialization error: {0}")]
    #[diagnostic(code(keygate::session_store::serde))]
    Serde(#[from] serde_json::Error),
    /// Any other error from a backend implementation
    #[error(transparent)]
    #[diagnostic(code(keygate::session_store::other))]
    Other(#[from] Box<dyn StdError + Send + Sync>),
}

/// Pluggable storage for per-user session records.
///
/// The host application owns the session; keygate only reads and writes the
/// handful of keys it needs (pending CSRF state and the current token).
#[async_trait]
pub trait SessionStore<K, T>: Send + Sync
where
    K: Eq + Hash,
    T: Clone,
{
    /// Get the stored value if present.
    async fn get(&self, key: &K) -> Option<T>;
    /// Persist the given value.
    async fn set(&self, key: K, value: T) -> Result<(), SessionStoreError>;
    /// Delete the given key. Deleting an absent key is not an error.
    async fn del(&self, key: &K) -> Result<(), SessionStoreError>;
}

#[async_trait]
impl<K, T, S> SessionStore<K, T> for Arc<S>
where
    K: Eq + Hash + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
    S: SessionStore<K, T> + ?Sized,
{
    async fn get(&self, key: &K) -> Option<T> {
        self.as_ref().get(key).await
    }
    async fn set(&self, key: K, value: T) -> Result<(), SessionStoreError> {
        self.as_ref().set(key, value).await
    }
    async fn del(&self, key: &K) -> Result<(), SessionStoreError> {
        self.as_ref().del(key).await
    }
}

/// In-memory session store suitable for short-lived sessions and tests.
#[derive(Clone)]
pub struct MemorySessionStore<K, T>(Arc<RwLock<HashMap<K, T>>>);

impl<K, T> Default for MemorySessionStore<K, T> {
    fn default() -> Self {
        Self(Arc::new(RwLock::new(HashMap::new())))
    }
}

impl<K, T> MemorySessionStore<K, T>
where
    K: Eq + Hash,
{
    /// Number of keys currently held.
    pub async fn len(&self) -> usize {
        self.0.read().await.len()
    }

    /// Whether the store holds no keys at all.
    pub async fn is_empty(&self) -> bool {
        self.0.read().await.is_empty()
    }
}

#[async_trait]
impl<K, T> SessionStore<K, T> for MemorySessionStore<K, T>
where
    K: Eq + Hash + Send + Sync,
    T: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &K) -> Option<T> {
        self.0.read().await.get(key).cloned()
    }
    async fn set(&self, key: K, value: T) -> Result<(), SessionStoreError> {
        self.0.write().await.insert(key, value);
        Ok(())
    }
    async fn del(&self, key: &K) -> Result<(), SessionStoreError> {
        self.0.write().await.remove(key);
        Ok(())
    }
}

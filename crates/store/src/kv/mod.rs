//! Persistent key-value substrate underneath the cache.
//!
//! The substrate is unordered and shared: callers are expected to namespace
//! their keys. Prefix operations exist so a namespace can be enumerated or
//! cleared without touching anyone else's keys.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use companion_crypto::error::CryptoError;

pub use memory::MemoryKvStore;
pub use sqlite::SqliteKvStore;

/// Errors from a KV substrate.
#[derive(Debug, thiserror::Error)]
pub enum KvError {
    /// Underlying database failure.
    #[error("kv storage error: {0}")]
    Storage(String),

    /// The substrate could not be opened or unlocked.
    #[error("kv store unavailable: {0}")]
    Unavailable(String),
}

impl From<rusqlite::Error> for KvError {
    fn from(err: rusqlite::Error) -> Self {
        KvError::Storage(err.to_string())
    }
}

impl From<CryptoError> for KvError {
    fn from(err: CryptoError) -> Self {
        KvError::Unavailable(err.to_string())
    }
}

/// String-keyed, string-valued persistent store.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError>;

    /// Insert or overwrite.
    async fn set(&self, key: &str, value: &str) -> Result<(), KvError>;

    /// Remove a key. Removing an absent key succeeds.
    async fn remove(&self, key: &str) -> Result<(), KvError>;

    /// Remove every key starting with `prefix`, returning how many were removed.
    async fn remove_prefix(&self, prefix: &str) -> Result<usize, KvError>;
}

//! Persistent key-value storage for session state.
//!
//! The session manager is the only writer of the three session keys. Values
//! are plain strings; the cached user profile is stored as JSON.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use thiserror::Error;

/// Key holding the current access token.
pub const ACCESS_TOKEN_KEY: &str = "accessToken";
/// Key holding the current refresh token.
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";
/// Key holding the cached user profile (JSON).
pub const USER_KEY: &str = "user";

/// Every key owned by the session.
pub const SESSION_KEYS: [&str; 3] = [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, USER_KEY];

/// Errors raised by a [`KeyValueStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored data could not be decoded.
    #[error("corrupt store: {0}")]
    Corrupt(#[from] serde_json::Error),

    /// The store was written by an incompatible version.
    #[error("unsupported store format version {found} (expected {expected})")]
    UnsupportedVersion {
        /// Version found on disk.
        found: u32,
        /// Version this build reads and writes.
        expected: u32,
    },
}

/// Asynchronous, string-keyed store.
///
/// Implementations must make each call durable before returning. The batched
/// operations default to one call per key; stores that can apply a batch
/// atomically should override them.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a value.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a value, replacing any previous one.
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Delete a value. Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// Write several values.
    async fn set_many(&self, entries: &[(&str, &str)]) -> Result<(), StoreError> {
        for (key, value) in entries {
            self.set(key, value).await?;
        }
        Ok(())
    }

    /// Delete several values.
    async fn remove_many(&self, keys: &[&str]) -> Result<(), StoreError> {
        for key in keys {
            self.remove(key).await?;
        }
        Ok(())
    }
}

mod memory;

use async_trait::async_trait;
use std::time::Duration;

use crate::errors::BackendError;

pub use memory::MemoryBackend;

/// Key-value store with per-key expiry that secrets are written to.
#[async_trait]
pub trait SecretBackend: Send + Sync {
    /// Stores `value` under `key` for `ttl`, unless a live entry already holds
    /// the key. Returns whether the value was written.
    async fn set_with_expiry(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Duration,
    ) -> Result<bool, BackendError>;

    /// Removes the entry and returns its value as one atomic step. Expired
    /// entries are never returned.
    async fn get_and_delete(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError>;

    async fn ping(&self) -> Result<(), BackendError>;
}

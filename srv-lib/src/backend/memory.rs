use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

use super::SecretBackend;
use crate::errors::BackendError;

struct Entry {
    value: Vec<u8>,
    expires_at: Instant,
}

/// In-process backend for development and tests. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, Entry>>, BackendError> {
        self.entries
            .lock()
            .map_err(|_| BackendError("memory backend lock poisoned".to_string()))
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.lock()
            .map(|entries| entries.values().filter(|e| e.expires_at > now).count())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[cfg(test)]
    pub(crate) fn raw_value(&self, key: &str) -> Option<Vec<u8>> {
        self.lock().ok()?.get(key).map(|e| e.value.clone())
    }

    #[cfg(test)]
    pub(crate) fn replace_raw_value(&self, key: &str, value: Vec<u8>) {
        if let Ok(mut entries) = self.lock() {
            if let Some(entry) = entries.get_mut(key) {
                entry.value = value;
            }
        }
    }
}

#[async_trait]
impl SecretBackend for MemoryBackend {
    async fn set_with_expiry(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Duration,
    ) -> Result<bool, BackendError> {
        let now = Instant::now();
        let expires_at = now
            .checked_add(ttl)
            .ok_or_else(|| BackendError(format!("ttl of {ttl:?} is out of range")))?;
        let mut entries = self.lock()?;
        entries.retain(|_, e| e.expires_at > now);

        if entries.contains_key(key) {
            return Ok(false);
        }

        entries.insert(
            key.to_string(),
            Entry { value, expires_at },
        );
        Ok(true)
    }

    async fn get_and_delete(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError> {
        let entry = self.lock()?.remove(key);
        Ok(entry
            .filter(|e| e.expires_at > Instant::now())
            .map(|e| e.value))
    }

    async fn ping(&self) -> Result<(), BackendError> {
        self.lock().map(|_| ())
    }
}

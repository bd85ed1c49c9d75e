use log::{error, info, warn};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use vanish_core::{Cipher, CryptoError, FileContent, SecretContent, SecretId, StoredRecord};

use crate::backend::SecretBackend;
use crate::errors::{BackendError, ServerError};

/// Fresh ids tried before giving up on a create. A second attempt already
/// means a 122 bit collision, so this only guards against a broken RNG.
const MAX_ID_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Copy)]
pub struct StoreSettings {
    pub max_ttl: Duration,
    pub backend_timeout: Duration,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            max_ttl: Duration::from_secs(60 * 60 * 24 * 30),
            backend_timeout: Duration::from_secs(5),
        }
    }
}

/// Creates and consumes one-time secrets.
///
/// Holds no state of its own beyond the shared backend and cipher, so clones
/// can be handed to every worker.
#[derive(Clone)]
pub struct SecretStore {
    backend: Arc<dyn SecretBackend>,
    cipher: Arc<Cipher>,
    settings: StoreSettings,
}

impl SecretStore {
    pub fn new(
        backend: Arc<dyn SecretBackend>,
        cipher: Arc<Cipher>,
        settings: StoreSettings,
    ) -> Self {
        Self {
            backend,
            cipher,
            settings,
        }
    }

    pub async fn create(
        &self,
        message: Option<String>,
        file: Option<FileContent>,
        ttl_seconds: u64,
    ) -> Result<SecretId, ServerError> {
        let content = SecretContent::new(message, file);
        if content.is_empty() {
            return Err(ServerError::InvalidInput("Must provide message or file"));
        }

        if ttl_seconds == 0 || ttl_seconds > self.settings.max_ttl.as_secs() {
            return Err(ServerError::InvalidInput(
                "Invalid ttl. It must be a positive number of seconds within the allowed maximum",
            ));
        }
        let ttl = Duration::from_secs(ttl_seconds);

        // The id is the only credential needed to read the secret, so it is
        // never written to the log.
        for _ in 0..MAX_ID_ATTEMPTS {
            let id = SecretId::generate();

            let blob = StoredRecord::seal(&content, &id, &self.cipher)?
                .to_bytes()
                .map_err(|e| {
                    error!("Failed to encode secret record: {e}");
                    ServerError::Encryption(CryptoError::Encryption)
                })?;
            let size = blob.len();

            let written = self
                .with_timeout(self.backend.set_with_expiry(&id.to_string(), blob, ttl))
                .await?;

            if written {
                info!("Created secret ({size} bytes stored, ttl: {ttl_seconds}s)");
                return Ok(id);
            }
            warn!("Generated secret id is already in use, retrying");
        }

        Err(ServerError::BackendUnavailable(
            "could not allocate an unused secret id".to_string(),
        ))
    }

    /// Returns the secret and deletes it in the same backend operation.
    ///
    /// Unknown, expired and already consumed ids all look the same to the
    /// caller.
    ///
    /// A `BackendUnavailable` from this call is not always safe to retry: the
    /// backend may have committed the delete before the timeout fired or the
    /// connection dropped, in which case the secret is gone and a retry
    /// yields `NotFound`.
    pub async fn consume(&self, id: &str) -> Result<SecretContent, ServerError> {
        let Some(id) = SecretId::parse(id) else {
            return Err(ServerError::NotFound);
        };

        let blob = match self
            .with_timeout(self.backend.get_and_delete(&id.to_string()))
            .await
        {
            Ok(Some(blob)) => blob,
            Ok(None) => return Err(ServerError::NotFound),
            Err(e) => {
                warn!(
                    "Consume did not complete, the secret may already have been deleted by the backing store"
                );
                return Err(e);
            }
        };

        let content = StoredRecord::from_bytes(&blob)
            .and_then(|record| record.open(&id, &self.cipher))
            .map_err(|e| {
                error!("A consumed secret could not be opened: {e}");
                ServerError::CorruptRecord(e)
            })?;

        info!("Consumed a secret");
        Ok(content)
    }

    pub async fn ping(&self) -> Result<(), ServerError> {
        self.with_timeout(self.backend.ping()).await
    }

    async fn with_timeout<T>(
        &self,
        call: impl Future<Output = Result<T, BackendError>>,
    ) -> Result<T, ServerError> {
        match tokio::time::timeout(self.settings.backend_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                error!("Backing store error: {e}");
                Err(e.into())
            }
            Err(_) => {
                error!(
                    "Backing store did not answer within {:?}",
                    self.settings.backend_timeout
                );
                Err(ServerError::BackendUnavailable("timed out".to_string()))
            }
        }
    }
}

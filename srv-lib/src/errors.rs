use thiserror::Error;
use vanish_core::{CryptoError, RecordError};

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("{0}")]
    InvalidInput(&'static str),
    #[error("Secret not found or expired")]
    NotFound,
    #[error("Stored secret is corrupt: {0}")]
    CorruptRecord(#[from] RecordError),
    #[error("Failed to encrypt secret: {0}")]
    Encryption(#[from] CryptoError),
    #[error("Backing store unavailable: {0}")]
    BackendUnavailable(String),
}

/// Raw failure reported by a backing store. Only ever logged, never shown to
/// clients.
#[derive(Error, Debug)]
#[error("{0}")]
pub struct BackendError(pub String);

impl From<BackendError> for ServerError {
    fn from(e: BackendError) -> Self {
        Self::BackendUnavailable(e.0)
    }
}

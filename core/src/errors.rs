use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Invalid encryption key: {0}")]
    InvalidKey(&'static str),
    #[error("Encryption failed")]
    Encryption,
    #[error("Decryption failed (invalid key or corrupted data)")]
    Decryption,
}

#[derive(Error, Debug)]
pub enum RecordError {
    #[error("Failed to decode stored record: {0}")]
    Codec(#[from] postcard::Error),
    #[error("Unsupported record version {0}")]
    UnsupportedVersion(u8),
    #[error(transparent)]
    Decryption(#[from] CryptoError),
    #[error("Decrypted message is not valid UTF-8")]
    InvalidUtf8,
}

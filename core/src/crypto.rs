use base64::Engine as _;
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
use chacha20poly1305::XNonce;
use chacha20poly1305::aead::{Aead, AeadCore, KeyInit, OsRng, Payload};
use chacha20poly1305::{Key, XChaCha20Poly1305};
use std::fmt;

use crate::errors::CryptoError;

pub const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 24;

/// Authenticated cipher over the single process-wide key.
///
/// Every call to [`Cipher::encrypt`] draws a fresh 24 byte nonce and stores it
/// in front of the ciphertext, so the output is `nonce || ciphertext || tag`.
#[derive(Clone)]
pub struct Cipher {
    inner: XChaCha20Poly1305,
}

impl Cipher {
    #[must_use]
    pub fn new(key_bytes: &[u8; KEY_LEN]) -> Self {
        let key = Key::from_slice(key_bytes);
        Self {
            inner: XChaCha20Poly1305::new(key),
        }
    }

    /// Builds the cipher from a base64 encoded 32 byte key.
    ///
    /// Both the URL-safe and the standard alphabet are accepted, with or
    /// without padding.
    pub fn from_encoded_key(encoded: &str) -> Result<Self, CryptoError> {
        let encoded = encoded.trim();
        if encoded.is_empty() {
            return Err(CryptoError::InvalidKey("key is empty"));
        }

        let decoded = [URL_SAFE, URL_SAFE_NO_PAD, STANDARD, STANDARD_NO_PAD]
            .iter()
            .find_map(|engine| engine.decode(encoded).ok())
            .ok_or(CryptoError::InvalidKey("key is not valid base64"))?;

        let key_bytes: &[u8; KEY_LEN] = decoded
            .as_slice()
            .try_into()
            .map_err(|_| CryptoError::InvalidKey("key must decode to exactly 32 bytes"))?;

        Ok(Self::new(key_bytes))
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.encrypt_with_aad(plaintext, &[])
    }

    pub fn decrypt(&self, encrypted_blob: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.decrypt_with_aad(encrypted_blob, &[])
    }

    /// Encrypts `plaintext` and authenticates `aad` alongside it. The same
    /// `aad` must be given to [`Cipher::decrypt_with_aad`].
    pub fn encrypt_with_aad(&self, plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);

        let ciphertext = self
            .inner
            .encrypt(
                &nonce,
                Payload {
                    msg: plaintext,
                    aad,
                },
            )
            .map_err(|_| CryptoError::Encryption)?;

        let mut storage = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        storage.extend_from_slice(&nonce);
        storage.extend_from_slice(&ciphertext);

        Ok(storage)
    }

    pub fn decrypt_with_aad(
        &self,
        encrypted_blob: &[u8],
        aad: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        if encrypted_blob.len() < NONCE_LEN {
            return Err(CryptoError::Decryption);
        }

        let (nonce_bytes, ciphertext) = encrypted_blob.split_at(NONCE_LEN);
        let nonce = XNonce::from_slice(nonce_bytes);

        self.inner
            .decrypt(
                nonce,
                Payload {
                    msg: ciphertext,
                    aad,
                },
            )
            .map_err(|_| CryptoError::Decryption)
    }
}

impl fmt::Debug for Cipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Cipher { key: <redacted> }")
    }
}

/// Generates a random key in the format [`Cipher::from_encoded_key`] expects.
#[must_use]
pub fn generate_encoded_key() -> String {
    let key = XChaCha20Poly1305::generate_key(&mut OsRng);
    URL_SAFE.encode(key)
}

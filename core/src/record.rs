use serde::{Deserialize, Serialize};

use crate::content::{FileContent, SecretContent};
use crate::crypto::Cipher;
use crate::errors::{CryptoError, RecordError};
use crate::id::SecretId;

const RECORD_VERSION: u8 = 1;

/// The blob handed to the backing store.
///
/// Message and file bytes are only ever held here as ciphertext. The record
/// is postcard encoded, so decoding it can only ever produce this struct.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct StoredRecord {
    pub version: u8,
    pub message: Option<Vec<u8>>,
    pub file: Option<StoredFile>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct StoredFile {
    pub ciphertext: Vec<u8>,
    pub file_name: String,
    pub mime_type: String,
}

impl StoredRecord {
    /// Encrypts each present part of `content` independently.
    ///
    /// Every ciphertext is bound to `id`, to the part it belongs to, and for
    /// files to the name and MIME type, so none of them can be moved or
    /// relabelled without [`StoredRecord::open`] failing.
    pub fn seal(
        content: &SecretContent,
        id: &SecretId,
        cipher: &Cipher,
    ) -> Result<Self, CryptoError> {
        let message = content
            .message
            .as_ref()
            .map(|text| cipher.encrypt_with_aad(text.as_bytes(), &message_aad(id)))
            .transpose()?;

        let file = content
            .file
            .as_ref()
            .map(|file| {
                let aad = file_aad(id, &file.file_name, &file.mime_type);
                Ok::<_, CryptoError>(StoredFile {
                    ciphertext: cipher.encrypt_with_aad(&file.bytes, &aad)?,
                    file_name: file.file_name.clone(),
                    mime_type: file.mime_type.clone(),
                })
            })
            .transpose()?;

        Ok(Self {
            version: RECORD_VERSION,
            message,
            file,
        })
    }

    pub fn open(self, id: &SecretId, cipher: &Cipher) -> Result<SecretContent, RecordError> {
        let message = self
            .message
            .map(|ciphertext| {
                let plaintext = cipher.decrypt_with_aad(&ciphertext, &message_aad(id))?;
                String::from_utf8(plaintext).map_err(|_| RecordError::InvalidUtf8)
            })
            .transpose()?;

        let file = self
            .file
            .map(|file| {
                let aad = file_aad(id, &file.file_name, &file.mime_type);
                Ok::<_, RecordError>(FileContent {
                    bytes: cipher.decrypt_with_aad(&file.ciphertext, &aad)?,
                    file_name: file.file_name,
                    mime_type: file.mime_type,
                })
            })
            .transpose()?;

        Ok(SecretContent { message, file })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, postcard::Error> {
        postcard::to_stdvec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, RecordError> {
        let record: Self = postcard::from_bytes(bytes)?;
        if record.version != RECORD_VERSION {
            return Err(RecordError::UnsupportedVersion(record.version));
        }
        Ok(record)
    }
}

const MESSAGE_TAG: &[u8] = b"message";
const FILE_TAG: &[u8] = b"file";

fn message_aad(id: &SecretId) -> Vec<u8> {
    aad(id, MESSAGE_TAG, &[])
}

fn file_aad(id: &SecretId, file_name: &str, mime_type: &str) -> Vec<u8> {
    aad(id, FILE_TAG, &[file_name.as_bytes(), mime_type.as_bytes()])
}

/// Length-prefixed `version || id || tag || fields`, unambiguous for any
/// field contents.
fn aad(id: &SecretId, tag: &[u8], fields: &[&[u8]]) -> Vec<u8> {
    let id = id.to_string();
    let mut out = vec![RECORD_VERSION];
    for part in [id.as_bytes(), tag].into_iter().chain(fields.iter().copied()) {
        out.extend_from_slice(&(part.len() as u32).to_be_bytes());
        out.extend_from_slice(part);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KEY_LEN;

    fn cipher() -> Cipher {
        Cipher::new(&[3u8; KEY_LEN])
    }

    fn full_content() -> SecretContent {
        SecretContent {
            message: Some("the password is hunter2".to_string()),
            file: Some(FileContent {
                bytes: vec![0, 159, 146, 150, 255],
                file_name: "keys.bin".to_string(),
                mime_type: "application/octet-stream".to_string(),
            }),
        }
    }

    #[test]
    fn test_seal_open_through_bytes() {
        let cipher = cipher();
        let id = SecretId::generate();
        let content = full_content();

        let bytes = StoredRecord::seal(&content, &id, &cipher)
            .unwrap()
            .to_bytes()
            .unwrap();
        let opened = StoredRecord::from_bytes(&bytes)
            .unwrap()
            .open(&id, &cipher)
            .unwrap();

        assert_eq!(opened, content);
    }

    #[test]
    fn test_absent_parts_stay_absent() {
        let cipher = cipher();
        let id = SecretId::generate();
        let content = SecretContent {
            message: Some("only text".to_string()),
            file: None,
        };

        let record = StoredRecord::seal(&content, &id, &cipher).unwrap();
        assert!(record.file.is_none());
        assert_eq!(record.open(&id, &cipher).unwrap(), content);
    }

    #[test]
    fn test_plaintext_not_in_bytes() {
        let content = full_content();
        let bytes = StoredRecord::seal(&content, &SecretId::generate(), &cipher())
            .unwrap()
            .to_bytes()
            .unwrap();

        let needle = b"hunter2";
        assert!(!bytes.windows(needle.len()).any(|w| w == needle));
    }

    #[test]
    fn test_unknown_version_rejected() {
        let mut record =
            StoredRecord::seal(&full_content(), &SecretId::generate(), &cipher()).unwrap();
        record.version = 9;
        let bytes = record.to_bytes().unwrap();

        assert!(matches!(
            StoredRecord::from_bytes(&bytes),
            Err(RecordError::UnsupportedVersion(9))
        ));
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(matches!(
            StoredRecord::from_bytes(&[]),
            Err(RecordError::Codec(_))
        ));
    }

    #[test]
    fn test_tampered_message_rejected() {
        let cipher = cipher();
        let id = SecretId::generate();
        let mut record = StoredRecord::seal(&full_content(), &id, &cipher).unwrap();
        if let Some(message) = record.message.as_mut() {
            message[30] ^= 0x80;
        }

        assert!(matches!(
            record.open(&id, &cipher),
            Err(RecordError::Decryption(CryptoError::Decryption))
        ));
    }

    #[test]
    fn test_relabelled_file_rejected() {
        let cipher = cipher();
        let id = SecretId::generate();
        let record = StoredRecord::seal(&full_content(), &id, &cipher).unwrap();

        let mut renamed = record.clone();
        if let Some(file) = renamed.file.as_mut() {
            file.file_name = "invoice.html".to_string();
        }
        assert!(matches!(
            renamed.open(&id, &cipher),
            Err(RecordError::Decryption(_))
        ));

        let mut retyped = record;
        if let Some(file) = retyped.file.as_mut() {
            file.mime_type = "text/html".to_string();
        }
        assert!(matches!(
            retyped.open(&id, &cipher),
            Err(RecordError::Decryption(_))
        ));
    }

    #[test]
    fn test_record_bound_to_its_id() {
        let cipher = cipher();
        let id = SecretId::generate();
        let record = StoredRecord::seal(&full_content(), &id, &cipher).unwrap();

        assert!(matches!(
            record.open(&SecretId::generate(), &cipher),
            Err(RecordError::Decryption(_))
        ));
    }

    #[test]
    fn test_ciphertexts_cannot_be_moved() {
        let cipher = cipher();
        let first_id = SecretId::generate();
        let second_id = SecretId::generate();
        let first = StoredRecord::seal(&full_content(), &first_id, &cipher).unwrap();
        let second = StoredRecord::seal(&full_content(), &second_id, &cipher).unwrap();

        // Message ciphertext transplanted from another record.
        let mut swapped = second.clone();
        swapped.message = first.message.clone();
        assert!(swapped.open(&second_id, &cipher).is_err());

        // File bytes presented as the message of the same record.
        let mut crossed = first.clone();
        crossed.message = first.file.as_ref().map(|f| f.ciphertext.clone());
        crossed.file = None;
        assert!(crossed.open(&first_id, &cipher).is_err());
    }

    #[test]
    fn test_non_utf8_message_rejected() {
        let cipher = cipher();
        let id = SecretId::generate();
        let record = StoredRecord {
            version: RECORD_VERSION,
            message: Some(cipher.encrypt_with_aad(&[0xff, 0xfe], &message_aad(&id)).unwrap()),
            file: None,
        };

        assert!(matches!(
            record.open(&id, &cipher),
            Err(RecordError::InvalidUtf8)
        ));
    }
}

pub mod content;
pub mod crypto;
pub mod errors;
pub mod id;
pub mod record;

pub use content::{FileContent, SecretContent};
pub use crypto::Cipher;
pub use errors::{CryptoError, RecordError};
pub use id::SecretId;
pub use record::StoredRecord;

pub mod backend;
pub mod config;
pub mod db;
pub mod errors;
pub mod schema;
pub mod store;

pub use backend::{MemoryBackend, SecretBackend};
pub use config::{BackendKind, ConfigError, ServerConfig};
pub use errors::{BackendError, ServerError};
pub use store::{SecretStore, StoreSettings};

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Random identifier of a stored secret. Knowing it is the only credential
/// needed to read the secret, so it is always a v4 UUID drawn from the OS
/// random source.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SecretId(Uuid);

impl SecretId {
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns `None` for anything that could not have been produced by
    /// [`SecretId::generate`].
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let uuid = Uuid::try_parse(value).ok()?;
        (uuid.get_version_num() == 4).then_some(Self(uuid))
    }
}

impl fmt::Display for SecretId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

/// A file attached to a secret.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileContent {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub mime_type: String,
}

/// Plaintext content of a secret, as given to `create` and handed back by
/// `consume`. Either part may be missing, but a stored secret always has at
/// least one.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SecretContent {
    pub message: Option<String>,
    pub file: Option<FileContent>,
}

impl SecretContent {
    /// Drops empty parts: an empty message or a file without bytes counts as
    /// not provided.
    #[must_use]
    pub fn new(message: Option<String>, file: Option<FileContent>) -> Self {
        Self {
            message: message.filter(|m| !m.is_empty()),
            file: file.filter(|f| !f.bytes.is_empty()),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.message.is_none() && self.file.is_none()
    }
}

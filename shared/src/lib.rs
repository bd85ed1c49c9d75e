use serde::{Deserialize, Serialize};
use std::path::{Component, Path};

/// Returned by the server when creating a new secret
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct SecretLink {
    pub url: String,
}

impl SecretLink {
    #[must_use]
    pub fn for_id(id: &str) -> Self {
        Self {
            url: format!("/secrets/{id}"),
        }
    }

    /// The id is always the last path segment of the link.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.url.rsplit('/').next().filter(|id| !id.is_empty())
    }
}

/// Returned by the server when a secret is consumed.
///
/// `file_data` carries the file bytes as standard base64. Parts that were not
/// part of the secret serialize as `null`.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct SecretResponse {
    pub message: Option<String>,
    pub file_data: Option<String>,
    pub file_name: Option<String>,
    pub file_mime: Option<String>,
}

/// Body of every non-2xx JSON response
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct ErrorDetail {
    pub detail: String,
}

impl ErrorDetail {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct HealthStatus {
    pub status: String,
}

impl HealthStatus {
    #[must_use]
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }
}

/// Helper function to sanitize a filename from potentially unsafe characters
///
/// Only a single plain path component is accepted, so the result can be
/// joined onto a directory without escaping it.
pub fn sanitize_filename(name: &str) -> Result<String, &'static str> {
    let name = name.trim();

    if name.contains(['/', '\\']) {
        return Err("Invalid filename (must not contain path separators)");
    }

    if name.chars().any(char::is_control) {
        return Err("Invalid filename (must not contain control characters)");
    }

    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(file_name)), None) => file_name
            .to_str()
            .map(str::to_string)
            .ok_or("Filename is not valid UTF-8"),
        _ => Err("Invalid filename"),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SecretError {
    #[error("no key available for vault id {0:?}")]
    KeyNotFound(String),
    #[error("malformed vault payload for key {key_id:?}: {reason}")]
    Malformed { key_id: String, reason: String },
    #[error("vault integrity check failed for key {key_id:?} (wrong key or tampered ciphertext)")]
    IntegrityCheckFailed { key_id: String },
    #[error("key source error for {key_id:?}: {message}")]
    KeySource { key_id: String, message: String },
}

impl SecretError {
    pub fn key_source(key_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::KeySource {
            key_id: key_id.into(),
            message: message.into(),
        }
    }

    pub fn malformed(key_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Malformed {
            key_id: key_id.into(),
            reason: reason.into(),
        }
    }

    pub fn key_id(&self) -> &str {
        match self {
            SecretError::KeyNotFound(k) => k,
            SecretError::Malformed { key_id, .. }
            | SecretError::IntegrityCheckFailed { key_id }
            | SecretError::KeySource { key_id, .. } => key_id,
        }
    }
}

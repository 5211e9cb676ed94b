//! Error types for vpnsync

use std::io;
use thiserror::Error;

/// Failure to turn a raw profile representation into a canonical profile
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The document could not be parsed at all
    #[error("Malformed profile: {0}")]
    Malformed(String),
    /// The profile carries no usable name
    #[error("Profile name is missing or empty")]
    MissingName,
}

/// Failure to apply one queued mutation through the profile store
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApplyError {
    /// Platform busy or locked, retry next cycle
    #[error("Transient failure: {0}")]
    Transient(String),
    /// The platform structurally rejected the request
    #[error("Rejected by platform: {0}")]
    PlatformRejected(String),
    /// The apply was cancelled before it completed
    #[error("Apply cancelled")]
    Cancelled,
}

impl ApplyError {
    /// Whether the queue entry should stay queued for the next cycle
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ApplyError::PlatformRejected(_))
    }
}

#[derive(Debug, Error)]
pub enum VpnsyncError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
    /// Profile could not be decoded
    #[error(transparent)]
    Decode(#[from] DecodeError),
    /// Profile could not be applied
    #[error(transparent)]
    Apply(#[from] ApplyError),
    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
    /// Not found
    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<serde_json::Error> for VpnsyncError {
    fn from(error: serde_json::Error) -> Self {
        VpnsyncError::Config(error.to_string())
    }
}

impl From<toml::de::Error> for VpnsyncError {
    fn from(error: toml::de::Error) -> Self {
        VpnsyncError::Config(format!("Invalid TOML: {}", error))
    }
}

pub type VpnsyncResult<T> = Result<T, VpnsyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_error_retryable() {
        assert!(ApplyError::Transient("locked".into()).is_retryable());
        assert!(ApplyError::Cancelled.is_retryable());
        assert!(!ApplyError::PlatformRejected("bad xml".into()).is_retryable());
    }

    #[test]
    fn test_decode_error_wraps() {
        let err: VpnsyncError = DecodeError::MissingName.into();
        assert_eq!(err.to_string(), "Profile name is missing or empty");
    }
}

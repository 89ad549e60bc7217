use std::sync::Arc;

use thiserror::Error;

/// Edge container image error types.
///
/// Errors are `Clone` so a finished transform can report the same terminal
/// state to every later call on it.
#[derive(Error, Debug, Clone)]
pub enum EciError {
    /// Malformed gzip or tar input
    #[error("{transform} decode failed: {message}")]
    Decode { transform: String, message: String },

    /// The sink below a transform rejected decoded bytes
    #[error("Downstream write failed: {0}")]
    Downstream(#[source] Box<EciError>),

    /// Write or commit after the writer was closed
    #[error("Writer already closed")]
    AlreadyClosed,

    /// Ingestion was cancelled
    #[error("Operation cancelled")]
    Cancelled,

    /// Timeout error
    #[error("Timeout: {0}")]
    TimeoutError(String),

    /// Committed content does not match the expected digest
    #[error("Digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    /// Committed content does not match the expected size
    #[error("Size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    /// Content is already present in the store
    #[error("Content already exists: {0}")]
    AlreadyExists(String),

    /// Another writer holds the ingest slot for this content
    #[error("Content unavailable: {0}")]
    Unavailable(String),

    /// Content not found
    #[error("Content not found: {0}")]
    NotFound(String),

    /// Invalid digest string
    #[error("Invalid digest: {0}")]
    InvalidDigest(String),

    /// Invalid image reference
    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    /// Container registry error
    #[error("Registry error: {registry} - {message}")]
    RegistryError { registry: String, message: String },

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] Arc<std::io::Error>),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl EciError {
    /// Build a decode error for the named transform.
    pub fn decode(transform: &str, message: impl std::fmt::Display) -> Self {
        EciError::Decode {
            transform: transform.to_string(),
            message: message.to_string(),
        }
    }

    /// Whether this error (or the downstream error it wraps) is a cancellation.
    pub fn is_cancelled(&self) -> bool {
        match self {
            EciError::Cancelled => true,
            EciError::Downstream(inner) => inner.is_cancelled(),
            _ => false,
        }
    }
}

impl From<std::io::Error> for EciError {
    fn from(err: std::io::Error) -> Self {
        EciError::IoError(Arc::new(err))
    }
}

impl From<serde_json::Error> for EciError {
    fn from(err: serde_json::Error) -> Self {
        EciError::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for EciError {
    fn from(err: serde_yaml::Error) -> Self {
        EciError::SerializationError(err.to_string())
    }
}

/// Result type alias for edge container image operations
pub type Result<T> = std::result::Result<T, EciError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_decode_error_display() {
        let error = EciError::decode("gunzip", "invalid gzip header");
        assert_eq!(error.to_string(), "gunzip decode failed: invalid gzip header");
    }

    #[test]
    fn test_downstream_error_keeps_source() {
        let error = EciError::Downstream(Box::new(EciError::Other("disk full".to_string())));
        assert_eq!(error.to_string(), "Downstream write failed: disk full");
        assert_eq!(error.source().unwrap().to_string(), "disk full");
    }

    #[test]
    fn test_digest_mismatch_display() {
        let error = EciError::DigestMismatch {
            expected: "sha256:aaa".to_string(),
            actual: "sha256:bbb".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Digest mismatch: expected sha256:aaa, got sha256:bbb"
        );
    }

    #[test]
    fn test_size_mismatch_display() {
        let error = EciError::SizeMismatch {
            expected: 10,
            actual: 7,
        };
        assert_eq!(error.to_string(), "Size mismatch: expected 10 bytes, got 7");
    }

    #[test]
    fn test_registry_error_display() {
        let error = EciError::RegistryError {
            registry: "ghcr.io".to_string(),
            message: "Authentication failed".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Registry error: ghcr.io - Authentication failed"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let error: EciError = io_error.into();
        assert!(matches!(error, EciError::IoError(_)));
        assert!(error.to_string().contains("file not found"));
    }

    #[test]
    fn test_errors_are_cloneable() {
        let error: EciError = std::io::Error::new(std::io::ErrorKind::Other, "boom").into();
        let copy = error.clone();
        assert_eq!(error.to_string(), copy.to_string());
    }

    #[test]
    fn test_is_cancelled_through_downstream() {
        assert!(EciError::Cancelled.is_cancelled());
        assert!(EciError::Downstream(Box::new(EciError::Cancelled)).is_cancelled());
        assert!(!EciError::AlreadyClosed.is_cancelled());
    }

    #[test]
    fn test_serde_json_error_conversion() {
        let result: std::result::Result<serde_json::Value, _> = serde_json::from_str("{ nope }");
        let error: EciError = result.unwrap_err().into();
        assert!(matches!(error, EciError::SerializationError(_)));
    }

    #[test]
    fn test_serde_yaml_error_conversion() {
        let result: std::result::Result<serde_yaml::Value, _> =
            serde_yaml::from_str("invalid: yaml: content:");
        let error: EciError = result.unwrap_err().into();
        assert!(matches!(error, EciError::SerializationError(_)));
    }
}

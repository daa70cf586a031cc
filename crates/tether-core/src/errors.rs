//! Error types for the protocol model
//!
//! A single error enum covers registry lookups, request validation and wire
//! decoding. `SchemaError` is kept as its own struct so callers further up
//! can surface the offending field path verbatim.

use serde::{Deserialize, Serialize};

/// A request failed structural validation before it was sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("Schema error at `{field}`: {reason}")]
pub struct SchemaError {
    /// Dotted path to the offending field (`@type` for the object itself)
    pub field: String,
    /// What was wrong with it
    pub reason: String,
}

impl SchemaError {
    /// Create a schema error for the given field path
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Unified error type for protocol model operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum CoreError {
    /// Tag has no registry entry
    #[error("Unknown tag: {tag}")]
    NotFound {
        /// The tag that failed to resolve
        tag: String,
    },

    /// Request does not match its declared shape
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// Frame could not be encoded or decoded
    #[error("Codec error: {message}")]
    Codec {
        /// Error message describing the framing failure
        message: String,
    },

    /// Registry construction failed (duplicate, dangling or undeclared tags)
    #[error("Registry error: {message}")]
    Registry {
        /// Error message describing the inconsistency
        message: String,
    },
}

impl CoreError {
    /// Create a not found error
    pub fn not_found(tag: impl Into<String>) -> Self {
        Self::NotFound { tag: tag.into() }
    }

    /// Create a schema error
    pub fn schema(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Schema(SchemaError::new(field, reason))
    }

    /// Create a codec error
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }

    /// Create a registry error
    pub fn registry(message: impl Into<String>) -> Self {
        Self::Registry {
            message: message.into(),
        }
    }
}

/// Standard Result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::codec(err.to_string())
    }
}

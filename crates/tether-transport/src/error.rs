//! Transport errors

/// Failure at the engine boundary
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The engine side of the connection is gone
    #[error("Transport disconnected")]
    Disconnected,

    /// The inbound stream has already been handed to a reader
    #[error("Inbound stream already taken")]
    InboundTaken,

    /// The transport does not implement the requested operation
    #[error("Operation not supported by transport: {operation}")]
    Unsupported {
        /// Name of the operation
        operation: String,
    },

    /// A frame could not be handed to the engine
    #[error("Send failed: {message}")]
    Send {
        /// Error message describing the failure
        message: String,
    },
}

impl TransportError {
    /// Create an unsupported-operation error
    pub fn unsupported(operation: impl Into<String>) -> Self {
        Self::Unsupported {
            operation: operation.into(),
        }
    }

    /// Create a send error
    pub fn send(message: impl Into<String>) -> Self {
        Self::Send {
            message: message.into(),
        }
    }
}

/// Result alias for transport operations
pub type TransportResult<T> = std::result::Result<T, TransportError>;

//! Caller-visible error taxonomy
//!
//! Every call resolves to exactly one typed result or one of these. Schema,
//! state, unknown-tag and capacity errors are raised before the transport is
//! touched; see [`ClientError::is_pre_send`].

use std::time::Duration;
use tether_core::{AuthorizationState, CoreError, EngineFailure, SchemaError};
use tether_transport::TransportError;

/// Client runtime error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// Tag has no registry entry
    #[error("Unknown tag: {tag}")]
    UnknownTag {
        /// The unresolved tag
        tag: String,
    },

    /// Request does not match its declared shape
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// Tag is not admissible in the observed authorization state
    #[error("`{tag}` is not allowed in state {}", state_label(.state))]
    State {
        /// Rejected tag
        tag: String,
        /// Observed state at the time of the call
        state: Option<AuthorizationState>,
    },

    /// Engine answered with an `error` object
    #[error("Engine error {code}: {message}")]
    Engine {
        /// Engine error code
        code: i32,
        /// Engine error message
        message: String,
    },

    /// No response before the deadline
    #[error("`{tag}` timed out after {after:?}")]
    Timeout {
        /// Tag of the expired call
        tag: String,
        /// Deadline that elapsed
        after: Duration,
    },

    /// Caller withdrew the call
    #[error("`{tag}` was cancelled")]
    Cancelled {
        /// Tag of the cancelled call
        tag: String,
    },

    /// Transport terminated; the client is unusable
    #[error("Connection to the engine was lost")]
    ConnectionLost,

    /// The pending-call table is full
    #[error("Too many pending calls (limit {limit})")]
    TooManyPending {
        /// Configured maximum
        limit: usize,
    },

    /// Engine answered with an object of the wrong shape
    #[error("`{tag}` expected `{expected}`, engine returned `{actual}`")]
    UnexpectedResult {
        /// Tag of the call
        tag: String,
        /// Declared result type
        expected: String,
        /// Tag the engine returned
        actual: String,
    },

    /// A frame or typed value could not be converted
    #[error("Decode error: {message}")]
    Decode {
        /// Error message describing the failure
        message: String,
    },

    /// `execute` was used for a tag that needs a round trip
    #[error("`{tag}` cannot be executed locally")]
    NotSynchronous {
        /// Tag of the request
        tag: String,
    },

    /// Invalid configuration or construction context
    #[error("Configuration error: {message}")]
    Config {
        /// Error message describing the problem
        message: String,
    },

    /// Transport refused a frame
    #[error("Transport error: {message}")]
    Transport {
        /// Error message from the transport
        message: String,
    },
}

fn state_label(state: &Option<AuthorizationState>) -> &'static str {
    state.map_or("unknown", AuthorizationState::tag)
}

impl ClientError {
    /// Create a decode error
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Whether the error was raised before anything reached the transport
    pub fn is_pre_send(&self) -> bool {
        matches!(
            self,
            Self::UnknownTag { .. }
                | Self::Schema(_)
                | Self::State { .. }
                | Self::TooManyPending { .. }
                | Self::NotSynchronous { .. }
        )
    }
}

/// Standard Result type for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

impl From<CoreError> for ClientError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::NotFound { tag } => Self::UnknownTag { tag },
            CoreError::Schema(err) => Self::Schema(err),
            CoreError::Codec { message } => Self::Decode { message },
            CoreError::Registry { message } => Self::Config { message },
        }
    }
}

impl From<TransportError> for ClientError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Disconnected => Self::ConnectionLost,
            other => Self::Transport {
                message: other.to_string(),
            },
        }
    }
}

impl From<EngineFailure> for ClientError {
    fn from(failure: EngineFailure) -> Self {
        Self::Engine {
            code: failure.code,
            message: failure.message,
        }
    }
}

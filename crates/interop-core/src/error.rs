//! Error types for the interop broker.
//!
//! Two families live here. [`InteropError`] covers the connection lifecycle
//! (spawning, handshakes, acceptance policy) and is what the lifecycle manager
//! returns. [`InvocationError`] and [`MarshalError`] are local to a single
//! streaming invocation and travel through a channel's `error` signal.
//!
//! Every type is `Clone`: one spawn outcome is handed to each waiter of a
//! generation, so errors carry messages rather than boxed sources.

use std::time::Duration;
use thiserror::Error;

/// Main error type for broker lifecycle operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InteropError {
    // Spawn errors
    #[error("Application launch failed for {app}: {message}")]
    LaunchFailed { app: String, message: String },

    #[error("No connection from {app} accepted within {timeout:?}")]
    HandshakeTimeout { app: String, timeout: Duration },

    #[error("Spawn for {app} ended without an outcome")]
    SpawnAbandoned { app: String },

    // Acceptance policy errors
    #[error("Application already connected: {app}")]
    AlreadyConnected { app: String },

    #[error("No pending connection attempt for {app}")]
    UnknownPending { app: String },

    // Transport errors
    #[error("Transport error: {message}")]
    Transport { message: String },

    // Validation errors
    #[error("Invalid application ID: {0:?}")]
    InvalidApplicationId(String),

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json { message: String },

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias for broker operations.
pub type Result<T> = std::result::Result<T, InteropError>;

impl From<serde_json::Error> for InteropError {
    fn from(err: serde_json::Error) -> Self {
        InteropError::Json {
            message: err.to_string(),
        }
    }
}

impl InteropError {
    /// Whether this error settled a spawn generation (the cell reverted to absent).
    pub fn is_spawn_failure(&self) -> bool {
        matches!(
            self,
            InteropError::LaunchFailed { .. }
                | InteropError::HandshakeTimeout { .. }
                | InteropError::SpawnAbandoned { .. }
        )
    }

    /// Check if a caller could reasonably retry the operation.
    ///
    /// The broker itself never retries; this only informs caller policy.
    pub fn is_retryable(&self) -> bool {
        self.is_spawn_failure() || matches!(self, InteropError::Transport { .. })
    }

    /// Convert to a JSON-RPC error code.
    ///
    /// Application-defined codes (-32000 to -32099):
    /// - -32010: Launch failed
    /// - -32011: Handshake timeout / abandoned spawn
    /// - -32012: Already connected
    /// - -32013: Unknown pending connection
    /// - -32014: Transport error
    /// - -32005: Validation error
    pub fn to_rpc_error_code(&self) -> i32 {
        match self {
            InteropError::LaunchFailed { .. } => -32010,
            InteropError::HandshakeTimeout { .. } | InteropError::SpawnAbandoned { .. } => -32011,
            InteropError::AlreadyConnected { .. } => -32012,
            InteropError::UnknownPending { .. } => -32013,
            InteropError::Transport { .. } => -32014,
            InteropError::InvalidApplicationId(_) | InteropError::Config { .. } => -32005,
            InteropError::Json { .. } => -32700,
            InteropError::Other(_) => -32603,
        }
    }
}

/// Failure converting between a structured value and one of its representations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MarshalError {
    /// Wire bytes could not be decoded into a structured value.
    #[error("Failed to decode frame: {message}")]
    Decode { message: String },

    /// A structured value could not be encoded to wire bytes.
    #[error("Failed to encode value: {message}")]
    Encode { message: String },

    /// The external (payload) representation could not be parsed or rendered.
    #[error("Malformed payload: {message}")]
    Payload { message: String },
}

impl MarshalError {
    pub fn decode(message: impl Into<String>) -> Self {
        MarshalError::Decode {
            message: message.into(),
        }
    }

    pub fn encode(message: impl Into<String>) -> Self {
        MarshalError::Encode {
            message: message.into(),
        }
    }

    pub fn payload(message: impl Into<String>) -> Self {
        MarshalError::Payload {
            message: message.into(),
        }
    }
}

/// Error carried by an invocation channel's `error` signal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvocationError {
    #[error(transparent)]
    Marshal(#[from] MarshalError),

    /// Error raised by the remote side of the invocation.
    #[error("Remote error: {message}")]
    Remote { message: String },

    /// Error raised by a local handler.
    #[error("Handler error: {message}")]
    Handler { message: String },

    #[error("Transport error: {message}")]
    Transport { message: String },

    /// A signal was issued after the channel reached a terminal state.
    #[error("Invocation channel already terminated")]
    Closed,

    #[error("Invocation cancelled")]
    Cancelled,
}

impl InvocationError {
    pub fn remote(message: impl Into<String>) -> Self {
        InvocationError::Remote {
            message: message.into(),
        }
    }

    pub fn handler(message: impl Into<String>) -> Self {
        InvocationError::Handler {
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        InvocationError::Transport {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = InteropError::AlreadyConnected {
            app: "calc-service".into(),
        };
        assert_eq!(err.to_string(), "Application already connected: calc-service");

        let err = InteropError::HandshakeTimeout {
            app: "calc-service".into(),
            timeout: Duration::from_secs(5),
        };
        assert_eq!(
            err.to_string(),
            "No connection from calc-service accepted within 5s"
        );
    }

    #[test]
    fn test_rpc_error_codes() {
        assert_eq!(
            InteropError::LaunchFailed {
                app: "a".into(),
                message: "boom".into()
            }
            .to_rpc_error_code(),
            -32010
        );
        assert_eq!(
            InteropError::UnknownPending { app: "a".into() }.to_rpc_error_code(),
            -32013
        );
        assert_eq!(InteropError::Other("x".into()).to_rpc_error_code(), -32603);
    }

    #[test]
    fn test_spawn_failures_are_retryable() {
        let timeout = InteropError::HandshakeTimeout {
            app: "a".into(),
            timeout: Duration::from_millis(10),
        };
        assert!(timeout.is_spawn_failure());
        assert!(timeout.is_retryable());

        let policy = InteropError::AlreadyConnected { app: "a".into() };
        assert!(!policy.is_spawn_failure());
        assert!(!policy.is_retryable());
    }

    #[test]
    fn test_marshal_error_wraps_into_invocation_error() {
        let err: InvocationError = MarshalError::decode("unexpected end of input").into();
        assert_eq!(
            err.to_string(),
            "Failed to decode frame: unexpected end of input"
        );
        assert!(matches!(err, InvocationError::Marshal(MarshalError::Decode { .. })));
    }

    #[test]
    fn test_json_error_conversion() {
        let parse = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: InteropError = parse.into();
        assert!(matches!(err, InteropError::Json { .. }));
        assert_eq!(err.to_rpc_error_code(), -32700);
    }
}

use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required field was not provided.
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// A field has an invalid value and reason.
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    /// Filesystem read error.
    #[error("IO error reading config: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parse error.
    #[error("TOML parse error: {0}")]
    Toml(String),
}

/// Gateway errors
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The RPC listener could not be bound.
    #[error("Failed to bind {addr}: {reason}")]
    Bind { addr: String, reason: String },

    /// The accept loop hit a non-recoverable error.
    #[error("Accept error: {0}")]
    Accept(String),

    /// Network/connection-level failure.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The byte stream did not contain a decodable frame.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// No handler is registered for the requested method.
    #[error("Unknown method: {0}")]
    UnknownMethod(String),

    /// The call argument could not be decoded for the method.
    #[error("Invalid params for {method}: {reason}")]
    InvalidParams { method: String, reason: String },
}

/// Failure reported by the push collaborator.
///
/// `connections` carries whatever subset of the requested connections is still
/// meaningful for the caller (for example the ones that did receive a message).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct PushError {
    /// Connections affected before the failure.
    pub connections: Vec<String>,
    /// Human-readable failure text returned to the caller.
    pub message: String,
}

impl PushError {
    /// Creates a failure with no affected connections.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            connections: Vec::new(),
            message: message.into(),
        }
    }

    /// Creates a failure that still reports a partial result.
    pub fn partial(connections: Vec<String>, message: impl Into<String>) -> Self {
        Self {
            connections,
            message: message.into(),
        }
    }
}

/// Internal proto errors
#[derive(Debug, Error)]
pub enum ProtoError {
    /// A JSON value does not have the shape of an RPC frame.
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// Generic serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

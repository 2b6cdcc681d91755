//! Uniform success/failure payload returned by every RPC method.

use serde::{Deserialize, Serialize};

use crate::error::{ProtoError, PushError};
use crate::message::null_as_default;

/// Error text returned when the presented token does not match.
pub const ERROR_TOKEN: &str = "error token";

/// Response payload: affected connections plus an error string (`""` on success).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    /// Affected connection identifiers. Serialized as `[]` when empty, never `null`.
    #[serde(default, deserialize_with = "null_as_default")]
    pub connections: Vec<String>,
    /// Failure text, empty on success.
    #[serde(default, deserialize_with = "null_as_default")]
    pub error: String,
}

impl ResponseEnvelope {
    /// Successful result naming the affected connections.
    pub fn success(connections: Vec<String>) -> Self {
        Self {
            connections,
            error: String::new(),
        }
    }

    /// Failed result with whatever connections are meaningful for the failure.
    pub fn failure(connections: Vec<String>, error: impl Into<String>) -> Self {
        Self {
            connections,
            error: error.into(),
        }
    }

    /// Envelope returned by the authentication gate on a token mismatch.
    pub fn token_rejected() -> Self {
        Self::failure(Vec::new(), ERROR_TOKEN)
    }

    /// Maps a collaborator outcome onto the envelope.
    pub fn from_outcome(outcome: Result<Vec<String>, PushError>) -> Self {
        match outcome {
            Ok(connections) => Self::success(connections),
            Err(PushError {
                connections,
                message,
            }) => Self::failure(connections, message),
        }
    }

    /// Whether the envelope reports success.
    pub fn is_success(&self) -> bool {
        self.error.is_empty()
    }

    /// Serializes the envelope into the textual RPC result.
    pub fn encode(&self) -> Result<String, ProtoError> {
        serde_json::to_string(self).map_err(|e| ProtoError::Serialization(e.to_string()))
    }

    /// Parses an RPC result string back into an envelope.
    pub fn decode(text: &str) -> Result<Self, ProtoError> {
        serde_json::from_str(text).map_err(|e| ProtoError::Serialization(e.to_string()))
    }
}

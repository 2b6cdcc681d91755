//! Shared-secret token check applied before every RPC method.

use std::sync::Arc;

use proto::{GatewayIdentity, ResponseEnvelope};
use tracing::warn;

/// Compares presented tokens against the node's configured token.
#[derive(Debug, Clone)]
pub struct TokenGate {
    identity: Arc<GatewayIdentity>,
}

impl TokenGate {
    /// Creates a gate reading the token from `identity`.
    pub fn new(identity: Arc<GatewayIdentity>) -> Self {
        Self { identity }
    }

    /// Identity the gate checks against.
    pub fn identity(&self) -> &GatewayIdentity {
        &self.identity
    }

    /// Returns `Ok(())` when `presented` equals the configured token, otherwise the
    /// envelope to answer the call with. Missing and wrong tokens are not told apart.
    pub fn check_token(&self, presented: &str) -> Result<(), ResponseEnvelope> {
        if safe_equal(presented, self.identity.auth_token()) {
            Ok(())
        } else {
            warn!(node_id = %self.identity.node_id(), "rejected call with invalid token");
            Err(ResponseEnvelope::token_rejected())
        }
    }
}

/// Constant-time string comparison (prevents timing attacks).
fn safe_equal(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let diff = a
        .as_bytes()
        .iter()
        .zip(b.as_bytes())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y));
    diff == 0
}

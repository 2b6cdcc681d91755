//! Push capability consumed by the RPC methods.

use async_trait::async_trait;
use proto::PushError;

/// Affected connections on success, or the collaborator's failure.
pub type PushOutcome = Result<Vec<String>, PushError>;

/// Component that owns live client connections and delivers messages to them.
///
/// Shared by every serving task without an outer lock, so implementations must
/// be safe for concurrent use.
#[async_trait]
pub trait PushServer: Send + Sync {
    /// Deliver `msg` to each named connection; returns the ones that received it.
    async fn send_to_connections(&self, connections: Vec<String>, msg: String) -> PushOutcome;

    /// Disconnect the named connections; returns the ones that were removed.
    async fn kick_connections(&self, connections: Vec<String>) -> PushOutcome;

    /// Disconnect every connection on this node; returns the removed ones.
    async fn kick_all_connections(&self) -> PushOutcome;

    /// Returns the subset of `connections` that is currently online.
    async fn check_connections_online(&self, connections: Vec<String>) -> PushOutcome;

    /// Returns every connection currently online on this node.
    async fn get_all_connections(&self) -> PushOutcome;
}

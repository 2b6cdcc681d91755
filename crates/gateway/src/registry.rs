use async_trait::async_trait;
use dashmap::DashMap;
use proto::PushError;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use crate::pusher::{PushOutcome, PushServer};

/// In-memory table of live client connections on this node.
pub struct ConnectionRegistry {
    /// connection_id -> outbound message queue
    connections: DashMap<String, mpsc::Sender<String>>,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
        }
    }

    /// Register a client connection and its outbound queue
    pub fn register(&self, connection_id: impl Into<String>, tx: mpsc::Sender<String>) {
        let connection_id = connection_id.into();
        debug!("Registering connection: {connection_id}");
        self.connections.insert(connection_id, tx);
    }

    /// Deregister a client connection, closing its queue
    pub fn deregister(&self, connection_id: &str) -> bool {
        debug!("Deregistering connection: {connection_id}");
        self.connections.remove(connection_id).is_some()
    }

    /// Whether a connection is registered
    pub fn contains(&self, connection_id: &str) -> bool {
        self.connections.contains_key(connection_id)
    }

    /// Number of registered connections
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Removes `connection_id` only while it still maps to the closed queue `tx`,
    /// leaving a re-registered connection in place.
    fn drop_closed(&self, connection_id: &str, tx: &mpsc::Sender<String>) -> bool {
        self.connections
            .remove_if(connection_id, |_, current| current.same_channel(tx))
            .is_some()
    }

    fn sorted_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.connections.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }
}

#[async_trait]
impl PushServer for ConnectionRegistry {
    async fn send_to_connections(&self, connections: Vec<String>, msg: String) -> PushOutcome {
        let mut delivered = Vec::with_capacity(connections.len());
        for connection_id in &connections {
            // Clone the sender so no map guard is held while sending.
            let Some(tx) = self.connections.get(connection_id).map(|v| v.clone()) else {
                debug!("No connection registered for: {connection_id}");
                continue;
            };
            match tx.try_send(msg.clone()) {
                Ok(()) => delivered.push(connection_id.clone()),
                Err(TrySendError::Full(_)) => {
                    warn!("Outbound queue full, skipping connection: {connection_id}");
                }
                Err(TrySendError::Closed(_)) => {
                    warn!("Outbound queue closed, dropping connection: {connection_id}");
                    self.drop_closed(connection_id, &tx);
                }
            }
        }

        if delivered.is_empty() && !connections.is_empty() {
            return Err(PushError::new("no connections reachable"));
        }
        Ok(delivered)
    }

    async fn kick_connections(&self, connections: Vec<String>) -> PushOutcome {
        Ok(connections
            .into_iter()
            .filter(|connection_id| self.deregister(connection_id))
            .collect())
    }

    async fn kick_all_connections(&self) -> PushOutcome {
        let kicked: Vec<String> = self
            .sorted_ids()
            .into_iter()
            .filter(|connection_id| self.connections.remove(connection_id).is_some())
            .collect();
        debug!(count = kicked.len(), "Kicked all connections");
        Ok(kicked)
    }

    async fn check_connections_online(&self, connections: Vec<String>) -> PushOutcome {
        Ok(connections
            .into_iter()
            .filter(|connection_id| self.contains(connection_id))
            .collect())
    }

    async fn get_all_connections(&self) -> PushOutcome {
        Ok(self.sorted_ids())
    }
}

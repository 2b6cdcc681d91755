use serde::{Deserialize, Deserializer, Serialize};

/// Identity of this gateway node: node id and the shared API token.
///
/// Built once at startup and shared read-only with every serving task.
#[derive(Clone, PartialEq, Eq)]
pub struct GatewayIdentity {
    node_id: String,
    auth_token: String,
}

impl GatewayIdentity {
    /// Creates the identity from configured values.
    pub fn new(node_id: impl Into<String>, auth_token: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            auth_token: auth_token.into(),
        }
    }

    /// Returns the node identifier.
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Returns the configured API token.
    pub fn auth_token(&self) -> &str {
        &self.auth_token
    }
}

// Keeps the token out of logs.
impl std::fmt::Debug for GatewayIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayIdentity")
            .field("node_id", &self.node_id)
            .field("auth_token", &"<redacted>")
            .finish()
    }
}

/// Call argument carrying only the caller's credential.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMessage {
    /// Shared-secret token presented by the caller.
    #[serde(default, deserialize_with = "null_as_default")]
    pub token: String,
}

impl TokenMessage {
    /// Creates a token-only argument.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

/// Call argument naming a set of client connections.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionsMessage {
    /// Target connection identifiers, in caller order. Duplicates are kept.
    #[serde(default, deserialize_with = "null_as_default")]
    pub connections: Vec<String>,
    /// Shared-secret token presented by the caller.
    #[serde(default, deserialize_with = "null_as_default")]
    pub token: String,
}

impl ConnectionsMessage {
    /// Creates a connection-set argument.
    pub fn new<I, S>(connections: I, token: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            connections: connections.into_iter().map(Into::into).collect(),
            token: token.into(),
        }
    }
}

/// Call argument for delivering `msg` to a set of connections.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushMessage {
    /// Target connection identifiers, in caller order.
    #[serde(default, deserialize_with = "null_as_default")]
    pub connections: Vec<String>,
    /// Shared-secret token presented by the caller.
    #[serde(default, deserialize_with = "null_as_default")]
    pub token: String,
    /// Message payload handed to the collaborator unchanged.
    #[serde(default, deserialize_with = "null_as_default")]
    pub msg: String,
}

impl PushMessage {
    /// Creates a push argument.
    pub fn new<I, S>(connections: I, token: impl Into<String>, msg: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            connections: connections.into_iter().map(Into::into).collect(),
            token: token.into(),
            msg: msg.into(),
        }
    }
}

/// Decodes `null` the same as an absent field.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

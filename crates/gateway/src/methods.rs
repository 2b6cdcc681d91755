use std::{collections::HashMap, future::Future, pin::Pin, sync::Arc, time::Duration};

use proto::{
    ConnectionsMessage, GatewayError, PushError, PushMessage, ResponseEnvelope, TokenMessage,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::auth::TokenGate;
use crate::pusher::{PushOutcome, PushServer};

// ── Types ────────────────────────────────────────────────────────────────────

pub const PUSH: &str = "Server.Push";
pub const KICK_CONNECTIONS: &str = "Server.KickConnections";
pub const KICK_ALL_CONNECTIONS: &str = "Server.KickAllConnections";
pub const CHECK_CONNECTIONS_ONLINE: &str = "Server.CheckConnectionsOnline";
pub const GET_ALL_CONNECTIONS: &str = "Server.GetAllConnections";

/// Shared state handed to every method handler.
#[derive(Clone)]
pub struct MethodContext {
    pub gate: TokenGate,
    pub pusher: Arc<dyn PushServer>,
    /// Upper bound for a delegated call; `None` waits indefinitely.
    pub call_timeout: Option<Duration>,
}

impl MethodContext {
    pub fn new(gate: TokenGate, pusher: Arc<dyn PushServer>) -> Self {
        Self {
            gate,
            pusher,
            call_timeout: None,
        }
    }

    pub fn with_call_timeout(mut self, call_timeout: Option<Duration>) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// Awaits a collaborator call and wraps its outcome in an envelope.
    async fn delegate(&self, call: impl Future<Output = PushOutcome>) -> ResponseEnvelope {
        let outcome = match self.call_timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(outcome) => outcome,
                Err(_) => Err(PushError::new(format!("call timed out after {limit:?}"))),
            },
            None => call.await,
        };
        ResponseEnvelope::from_outcome(outcome)
    }
}

/// The result a method handler produces.
pub type MethodResult = Result<ResponseEnvelope, GatewayError>;

/// A boxed async method handler taking the decoded call argument.
pub type HandlerFn = Box<
    dyn Fn(Value, MethodContext) -> Pin<Box<dyn Future<Output = MethodResult> + Send>>
        + Send
        + Sync,
>;

fn decode_argument<T: DeserializeOwned>(method: &str, argument: Value) -> Result<T, GatewayError> {
    serde_json::from_value(argument).map_err(|e| GatewayError::InvalidParams {
        method: method.to_string(),
        reason: e.to_string(),
    })
}

// ── Method registry ──────────────────────────────────────────────────────────

pub struct MethodRegistry {
    handlers: HashMap<String, HandlerFn>,
}

impl Default for MethodRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MethodRegistry {
    pub fn new() -> Self {
        let mut reg = Self {
            handlers: HashMap::new(),
        };
        reg.register_defaults();
        reg
    }

    pub fn register(&mut self, method: impl Into<String>, handler: HandlerFn) {
        self.handlers.insert(method.into(), handler);
    }

    /// Runs `method` with the call's argument.
    ///
    /// Token and collaborator failures come back as envelopes; only an unknown
    /// method or an undecodable argument is an `Err`.
    pub async fn dispatch(
        &self,
        method: &str,
        argument: Option<Value>,
        ctx: MethodContext,
    ) -> MethodResult {
        let Some(handler) = self.handlers.get(method) else {
            warn!(method, "unknown method");
            return Err(GatewayError::UnknownMethod(method.to_string()));
        };
        let Some(argument) = argument else {
            warn!(method, "call without params");
            return Err(GatewayError::InvalidParams {
                method: method.to_string(),
                reason: "missing params".to_string(),
            });
        };

        debug!(method, "dispatching method");
        let result = handler(argument, ctx).await;
        match &result {
            Ok(envelope) if envelope.is_success() => {
                debug!(method, connections = envelope.connections.len(), "method ok");
            }
            Ok(envelope) => debug!(method, error = %envelope.error, "method failed"),
            Err(err) => warn!(method, %err, "method error"),
        }
        result
    }

    pub fn method_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    fn register_defaults(&mut self) {
        self.register(
            PUSH,
            Box::new(|argument, ctx| {
                Box::pin(async move {
                    let msg: PushMessage = decode_argument(PUSH, argument)?;
                    if let Err(rejected) = ctx.gate.check_token(&msg.token) {
                        return Ok(rejected);
                    }
                    Ok(ctx
                        .delegate(ctx.pusher.send_to_connections(msg.connections, msg.msg))
                        .await)
                })
            }),
        );

        self.register(
            KICK_CONNECTIONS,
            Box::new(|argument, ctx| {
                Box::pin(async move {
                    let msg: ConnectionsMessage = decode_argument(KICK_CONNECTIONS, argument)?;
                    if let Err(rejected) = ctx.gate.check_token(&msg.token) {
                        return Ok(rejected);
                    }
                    Ok(ctx
                        .delegate(ctx.pusher.kick_connections(msg.connections))
                        .await)
                })
            }),
        );

        self.register(
            KICK_ALL_CONNECTIONS,
            Box::new(|argument, ctx| {
                Box::pin(async move {
                    let msg: TokenMessage = decode_argument(KICK_ALL_CONNECTIONS, argument)?;
                    if let Err(rejected) = ctx.gate.check_token(&msg.token) {
                        return Ok(rejected);
                    }
                    Ok(ctx.delegate(ctx.pusher.kick_all_connections()).await)
                })
            }),
        );

        self.register(
            CHECK_CONNECTIONS_ONLINE,
            Box::new(|argument, ctx| {
                Box::pin(async move {
                    let msg: ConnectionsMessage =
                        decode_argument(CHECK_CONNECTIONS_ONLINE, argument)?;
                    if let Err(rejected) = ctx.gate.check_token(&msg.token) {
                        return Ok(rejected);
                    }
                    Ok(ctx
                        .delegate(ctx.pusher.check_connections_online(msg.connections))
                        .await)
                })
            }),
        );

        self.register(
            GET_ALL_CONNECTIONS,
            Box::new(|argument, ctx| {
                Box::pin(async move {
                    let msg: TokenMessage = decode_argument(GET_ALL_CONNECTIONS, argument)?;
                    if let Err(rejected) = ctx.gate.check_token(&msg.token) {
                        return Ok(rejected);
                    }
                    Ok(ctx.delegate(ctx.pusher.get_all_connections()).await)
                })
            }),
        );
    }
}

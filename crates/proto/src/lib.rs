//! Shared protocol types for the push gateway control plane.
//!
//! This crate defines the gateway identity, RPC call arguments, the response
//! envelope, JSON-RPC frames and strongly-typed error enums shared across the
//! workspace.

pub mod envelope;
pub mod error;
pub mod message;
pub mod rpc;

/// Re-export of the response envelope and its fixed token error text.
pub use envelope::{ERROR_TOKEN, ResponseEnvelope};
/// Re-export of all protocol error types.
pub use error::*;
/// Re-export of gateway identity and call argument types.
pub use message::{ConnectionsMessage, GatewayIdentity, PushMessage, TokenMessage};
/// Re-export of JSON-RPC frame types.
pub use rpc::{RpcRequest, RpcResponse};

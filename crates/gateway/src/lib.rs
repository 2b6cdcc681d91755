//! RPC front door of the push gateway: token gate, method table and TCP transport.

pub mod auth;
pub mod codec;
pub mod methods;
pub mod pusher;
pub mod registry;
pub mod server;
pub mod session;

/// Shared-secret token check.
pub use auth::TokenGate;
/// Method table and handler context.
pub use methods::{MethodContext, MethodRegistry};
/// Push capability consumed by the RPC methods.
pub use pusher::{PushOutcome, PushServer};
/// In-memory connection table implementing [`PushServer`].
pub use registry::ConnectionRegistry;
/// TCP listener and accept loop.
pub use server::{RpcServer, normalize_listen_addr};
/// Per-connection RPC session.
pub use session::RpcSession;

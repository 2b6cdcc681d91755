//! TCP listener bootstrap and accept loop for the RPC front door.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use proto::{GatewayError, GatewayIdentity};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::auth::TokenGate;
use crate::methods::{MethodContext, MethodRegistry};
use crate::pusher::PushServer;
use crate::session::RpcSession;

/// Pause after a transient accept failure before accepting again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// How long shutdown waits for in-flight calls before aborting their sessions.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

// ENFILE / EMFILE: descriptor tables full, clears once sessions close.
const TRANSIENT_OS_ERRORS: &[i32] = &[23, 24];

/// RPC server that accepts caller connections and spawns a session for each
pub struct RpcServer {
    listener: TcpListener,
    methods: Arc<MethodRegistry>,
    ctx: MethodContext,
    shutdown_grace: Duration,
}

impl RpcServer {
    /// Binds the listener. A failure here is fatal for the caller.
    pub async fn bind(
        addr: &str,
        identity: Arc<GatewayIdentity>,
        pusher: Arc<dyn PushServer>,
    ) -> Result<Self, GatewayError> {
        let addr = normalize_listen_addr(addr);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| GatewayError::Bind {
                addr: addr.clone(),
                reason: e.to_string(),
            })?;

        let methods = MethodRegistry::new();
        info!(
            node_id = %identity.node_id(),
            methods = ?methods.method_names(),
            "RPC server listening on {addr}"
        );
        let ctx = MethodContext::new(TokenGate::new(identity), pusher);
        Ok(Self {
            listener,
            methods: Arc::new(methods),
            ctx,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        })
    }

    /// Bounds every delegated collaborator call; `None` leaves calls unbounded.
    pub fn with_call_timeout(mut self, call_timeout: Option<Duration>) -> Self {
        self.ctx = self.ctx.with_call_timeout(call_timeout);
        self
    }

    /// Bounds how long `run_until` waits for in-flight calls after shutdown.
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Local address the server is bound to
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Identity served by this listener.
    pub fn identity(&self) -> &GatewayIdentity {
        self.ctx.gate.identity()
    }

    /// Accept loop: runs until a non-recoverable accept error.
    pub async fn run(self) -> Result<(), GatewayError> {
        self.run_until(std::future::pending()).await
    }

    /// Accept loop that also stops once `shutdown` resolves.
    ///
    /// On shutdown the listener stops accepting, idle sessions are closed and
    /// calls already in flight are answered, waiting at most the shutdown grace
    /// before the remaining sessions are aborted.
    pub async fn run_until(self, shutdown: impl Future<Output = ()>) -> Result<(), GatewayError> {
        info!("RPC server accept loop started");
        tokio::pin!(shutdown);
        let (stop_tx, stop_rx) = watch::channel(false);
        let mut sessions = JoinSet::new();

        let result = loop {
            tokio::select! {
                _ = &mut shutdown => break Ok(()),
                Some(joined) = sessions.join_next(), if !sessions.is_empty() => {
                    if let Err(e) = joined {
                        warn!("Session task failed: {e}");
                    }
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        self.spawn_session(&mut sessions, stream, peer, stop_rx.clone());
                    }
                    Err(e) if is_transient_accept_error(&e) => {
                        warn!("Transient accept error: {e}");
                        if backoff_or_shutdown(shutdown.as_mut()).await {
                            break Ok(());
                        }
                    }
                    Err(e) => {
                        error!("Accept loop failed: {e}");
                        break Err(GatewayError::Accept(e.to_string()));
                    }
                }
            }
        };

        info!(sessions = sessions.len(), "RPC server accept loop stopped");
        let _ = stop_tx.send(true);
        drain_sessions(sessions, self.shutdown_grace).await;
        result
    }

    fn spawn_session(
        &self,
        sessions: &mut JoinSet<()>,
        stream: TcpStream,
        peer: SocketAddr,
        shutdown: watch::Receiver<bool>,
    ) {
        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY for {peer}: {e}");
        }
        let session = RpcSession::new(
            stream,
            peer.to_string(),
            self.methods.clone(),
            self.ctx.clone(),
        )
        .with_shutdown(shutdown);
        sessions.spawn(async move {
            if let Err(e) = session.run().await {
                warn!("Session error from {peer}: {e}");
            }
        });
    }
}

/// Sleeps for the accept backoff; returns `true` if shutdown fired meanwhile.
async fn backoff_or_shutdown(shutdown: Pin<&mut impl Future<Output = ()>>) -> bool {
    tokio::select! {
        _ = shutdown => true,
        _ = tokio::time::sleep(ACCEPT_BACKOFF) => false,
    }
}

/// Waits for sessions to finish, aborting whatever is left after `grace`.
async fn drain_sessions(mut sessions: JoinSet<()>, grace: Duration) {
    if sessions.is_empty() {
        return;
    }
    let drained = tokio::time::timeout(grace, async {
        while sessions.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        warn!(
            remaining = sessions.len(),
            "Shutdown grace elapsed, aborting sessions"
        );
        sessions.shutdown().await;
    }
}

/// Accepts Go-style `:PORT` as "all interfaces".
pub fn normalize_listen_addr(addr: &str) -> String {
    let addr = addr.trim();
    if addr.starts_with(':') {
        format!("0.0.0.0{addr}")
    } else {
        addr.to_string()
    }
}

/// Classifies accept failures that should not stop the listener.
fn is_transient_accept_error(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
            | io::ErrorKind::OutOfMemory
    ) || err
        .raw_os_error()
        .is_some_and(|code| TRANSIENT_OS_ERRORS.contains(&code))
}

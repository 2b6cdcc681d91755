//! Per-connection RPC session handling.

use std::sync::Arc;

use proto::{GatewayError, RpcRequest, RpcResponse};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::codec::{FrameReader, write_response};
use crate::methods::{MethodContext, MethodRegistry};

/// Serves sequential RPC calls on a single caller connection
pub struct RpcSession<S> {
    stream: S,
    peer: String,
    methods: Arc<MethodRegistry>,
    ctx: MethodContext,
    shutdown: Option<watch::Receiver<bool>>,
}

impl<S> RpcSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Creates a session for an accepted stream.
    pub fn new(
        stream: S,
        peer: impl Into<String>,
        methods: Arc<MethodRegistry>,
        ctx: MethodContext,
    ) -> Self {
        Self {
            stream,
            peer: peer.into(),
            methods,
            ctx,
            shutdown: None,
        }
    }

    /// Stops reading new calls once `shutdown` flips to `true`. A call already
    /// being served is answered first.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Run the session: read call → dispatch → write reply, until the caller
    /// closes the stream, sends something that is not JSON, or shutdown begins.
    pub async fn run(self) -> Result<(), GatewayError> {
        let Self {
            stream,
            peer,
            methods,
            ctx,
            mut shutdown,
        } = self;
        info!("RpcSession started for {peer}");

        let (read_half, mut write_half) = tokio::io::split(stream);
        let mut frames = FrameReader::new(read_half);
        let mut calls: u64 = 0;

        loop {
            let frame = tokio::select! {
                biased;
                _ = shutdown_requested(&mut shutdown) => {
                    info!(calls, "Closing connection from {peer} for shutdown");
                    return Ok(());
                }
                frame = frames.next_frame() => frame?,
            };
            let Some(frame) = frame else { break };
            let response = handle_frame(&methods, &ctx, frame).await?;
            write_response(&mut write_half, &response).await?;
            calls += 1;
        }

        info!(calls, "Connection closed by caller {peer}");
        Ok(())
    }
}

/// Resolves once shutdown is signalled or the signalling side is gone.
async fn shutdown_requested(shutdown: &mut Option<watch::Receiver<bool>>) {
    match shutdown {
        Some(rx) => {
            let _ = rx.wait_for(|stop| *stop).await;
        }
        None => std::future::pending().await,
    }
}

/// Answers a single decoded frame.
///
/// Only an envelope that cannot be serialized is returned as `Err`; every
/// other problem is reported to the caller inside the response.
async fn handle_frame(
    methods: &MethodRegistry,
    ctx: &MethodContext,
    frame: Value,
) -> Result<RpcResponse, GatewayError> {
    let request = match RpcRequest::from_frame(frame) {
        Ok(request) => request,
        Err((id, err)) => {
            warn!("Rejected ill-formed request: {err}");
            return Ok(RpcResponse::err(id, err.to_string()));
        }
    };

    debug!(method = %request.method, id = %request.id, "Received call");
    let argument = request.argument().cloned();
    match methods
        .dispatch(&request.method, argument, ctx.clone())
        .await
    {
        Ok(envelope) => {
            let text = envelope.encode().map_err(|e| {
                error!("Failed to encode response envelope: {e}");
                GatewayError::Protocol(e.to_string())
            })?;
            Ok(RpcResponse::ok(request.id, text))
        }
        Err(err) => Ok(RpcResponse::err(request.id, err.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenGate;
    use crate::registry::ConnectionRegistry;
    use proto::{GatewayIdentity, ResponseEnvelope};
    use serde_json::json;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::sync::mpsc;

    fn context(registry: Arc<ConnectionRegistry>) -> MethodContext {
        let gate = TokenGate::new(Arc::new(GatewayIdentity::new("node-1", "secret")));
        MethodContext::new(gate, registry)
    }

    async fn reply_for(frame: Value) -> RpcResponse {
        let registry = Arc::new(ConnectionRegistry::new());
        handle_frame(&MethodRegistry::new(), &context(registry), frame)
            .await
            .expect("frame handled")
    }

    #[tokio::test]
    async fn handle_frame_wraps_envelope_as_result_string() {
        let response = reply_for(json!({
            "method": "Server.GetAllConnections",
            "params": [{"token": "secret"}],
            "id": 4
        }))
        .await;
        assert_eq!(response.id, json!(4));
        assert_eq!(response.error, None);
        let envelope =
            ResponseEnvelope::decode(response.result.as_deref().expect("result")).expect("decode");
        assert_eq!(envelope, ResponseEnvelope::success(Vec::new()));
    }

    #[tokio::test]
    async fn handle_frame_reports_ill_formed_request() {
        let response = reply_for(json!({"params": [], "id": "x"})).await;
        assert_eq!(response.id, json!("x"));
        assert_eq!(response.result, None);
        assert!(response.error.expect("error").contains("missing method"));
    }

    #[tokio::test]
    async fn handle_frame_reports_unknown_method() {
        let response = reply_for(json!({"method": "Server.Nope", "params": [{}], "id": 1})).await;
        assert_eq!(response.error.as_deref(), Some("Unknown method: Server.Nope"));
    }

    #[tokio::test]
    async fn session_serves_calls_in_order_until_eof() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (tx, mut rx) = mpsc::channel(4);
        registry.register("c1", tx);

        let (client, server) = tokio::io::duplex(4096);
        let session = RpcSession::new(
            server,
            "test",
            Arc::new(MethodRegistry::new()),
            context(registry),
        );
        let handle = tokio::spawn(session.run());

        let (read_half, mut write_half) = tokio::io::split(client);
        let mut lines = BufReader::new(read_half).lines();

        write_half
            .write_all(
                b"{\"method\":\"Server.Push\",\"params\":[{\"connections\":[\"c1\"],\"token\":\"secret\",\"msg\":\"m1\"}],\"id\":1}\n\
                  {\"method\":\"Server.Push\",\"params\":[{\"connections\":[\"c1\"],\"token\":\"bad\",\"msg\":\"m2\"}],\"id\":2}\n",
            )
            .await
            .expect("write calls");

        let first: RpcResponse =
            serde_json::from_str(&lines.next_line().await.expect("read").expect("line"))
                .expect("json");
        let second: RpcResponse =
            serde_json::from_str(&lines.next_line().await.expect("read").expect("line"))
                .expect("json");
        assert_eq!(first.id, json!(1));
        assert_eq!(
            first.result.as_deref(),
            Some(r#"{"connections":["c1"],"error":""}"#)
        );
        assert_eq!(second.id, json!(2));
        assert_eq!(
            second.result.as_deref(),
            Some(r#"{"connections":[],"error":"error token"}"#)
        );
        assert_eq!(rx.recv().await.as_deref(), Some("m1"));

        write_half.shutdown().await.expect("shutdown");
        handle.await.expect("join").expect("session ends cleanly");
    }

    #[tokio::test]
    async fn idle_session_closes_when_shutdown_is_signalled() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (stop_tx, stop_rx) = watch::channel(false);
        let (mut client, server) = tokio::io::duplex(1024);
        let session = RpcSession::new(
            server,
            "test",
            Arc::new(MethodRegistry::new()),
            context(registry),
        )
        .with_shutdown(stop_rx);
        let handle = tokio::spawn(session.run());

        stop_tx.send(true).expect("signal");
        handle.await.expect("join").expect("clean close");

        let mut buf = Vec::new();
        let n = tokio::io::AsyncReadExt::read_to_end(&mut client, &mut buf)
            .await
            .expect("read");
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn session_ends_with_error_on_malformed_json() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (mut client, server) = tokio::io::duplex(1024);
        let session = RpcSession::new(
            server,
            "test",
            Arc::new(MethodRegistry::new()),
            context(registry),
        );

        client.write_all(b"{oops}\n").await.expect("write");
        let err = session.run().await.expect_err("malformed frame");
        assert!(matches!(err, GatewayError::Protocol(_)));
    }
}

//! Websocket listener exposing the orchestrator's own tool catalog, so
//! other hosts can drive it over the tool-RPC dialect.

use std::sync::Arc;

use fabric::WsTransport;
use switchboard::{orchestrator_tool_server, Orchestrator};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Accepts connections until `cancel` fires; each connection gets its own
/// tool-server instance sharing the orchestrator.
pub async fn run_rpc_on_listener(
    listener: TcpListener,
    orchestrator: Arc<Orchestrator>,
    cancel: CancellationToken,
) -> Result<(), std::io::Error> {
    let addr = listener.local_addr()?;
    info!("tool-rpc listening on ws://{}", addr);

    loop {
        let accepted = tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => accepted,
        };
        let (stream, peer) = match accepted {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "accept failed");
                continue;
            }
        };
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move {
            match WsTransport::accept(stream).await {
                Ok(transport) => {
                    let server = orchestrator_tool_server(&orchestrator);
                    if let Err(e) = server.serve(Arc::new(transport)).await {
                        warn!(%peer, error = %e, "rpc connection ended with error");
                    }
                }
                Err(e) => warn!(%peer, error = %e, "websocket handshake failed"),
            }
        });
    }
    Ok(())
}

//! HTTP front-end for the orchestrator (axum), plus the websocket listener
//! exposing the orchestrator's own tool catalog.
//!
//! **Public API**: [`run_http_on_listener`], [`run_rpc_on_listener`].

mod app;
mod rpc;

use std::sync::Arc;

use switchboard::Orchestrator;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub use rpc::run_rpc_on_listener;

pub(crate) struct AppState {
    pub(crate) orchestrator: Arc<Orchestrator>,
}

/// Serves the front-end HTTP API on an existing listener until `cancel`
/// fires. Tests bind to `127.0.0.1:0` and pass the listener in.
pub async fn run_http_on_listener(
    listener: TcpListener,
    orchestrator: Arc<Orchestrator>,
    cancel: CancellationToken,
) -> Result<(), std::io::Error> {
    let addr = listener.local_addr()?;
    info!("http api listening on http://{}", addr);

    let state = Arc::new(AppState { orchestrator });
    let router = app::router(state);
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
}

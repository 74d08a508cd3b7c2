//! The switchboard binary: environment layering, tracing, service
//! registration, background maintenance, HTTP + tool-RPC listeners, clean
//! SIGINT shutdown.

use std::sync::Arc;

use config::Settings;
use switchboard::{Orchestrator, ServiceInfo, ServiceKind};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Deployment's service catalog: `SWITCHBOARD_SERVICES` (a JSON array of
/// service declarations) when set, else the default mesh.
fn service_catalog() -> Result<Vec<ServiceInfo>, serde_json::Error> {
    if let Ok(raw) = std::env::var("SWITCHBOARD_SERVICES") {
        return serde_json::from_str(&raw);
    }
    Ok(vec![
        ServiceInfo::new(
            "audio-assistant",
            "localhost",
            8082,
            vec![
                "audio".into(),
                "music".into(),
                "voice".into(),
                "volume".into(),
                "playback".into(),
            ],
            ServiceKind::Http,
        ),
        ServiceInfo::new(
            "platform-core",
            "localhost",
            8083,
            vec![
                "system".into(),
                "process".into(),
                "file".into(),
                "application".into(),
            ],
            ServiceKind::Http,
        ),
        ServiceInfo::new(
            "hardware-bridge",
            "localhost",
            8084,
            vec![
                "gpio".into(),
                "sensor".into(),
                "actuator".into(),
                "pwm".into(),
            ],
            ServiceKind::Rpc,
        ),
        ServiceInfo::new(
            "home-automation",
            "localhost",
            8085,
            vec![
                "lights".into(),
                "temperature".into(),
                "security".into(),
                "automation".into(),
            ],
            ServiceKind::Http,
        ),
    ])
}

async fn run() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let _ = config::load_and_apply("switchboard", None);
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = Settings::from_env()?;
    info!(?settings, "starting switchboard");

    // Fatal conditions: persistence directory and listener binds.
    let orchestrator = Orchestrator::new(settings.clone())?;
    let http_listener = TcpListener::bind(&settings.http_addr).await?;
    let rpc_listener = TcpListener::bind(&settings.rpc_addr).await?;

    for service in service_catalog()? {
        orchestrator.register_service(service).await;
    }
    orchestrator.start_maintenance();

    let cancel = CancellationToken::new();

    let rpc_task = tokio::spawn(serve::run_rpc_on_listener(
        rpc_listener,
        orchestrator.clone(),
        cancel.clone(),
    ));
    let http_task = tokio::spawn(serve::run_http_on_listener(
        http_listener,
        orchestrator.clone(),
        cancel.clone(),
    ));

    tokio::signal::ctrl_c().await?;
    info!("SIGINT received, shutting down");
    cancel.cancel();

    let _ = http_task.await;
    let _ = rpc_task.await;
    orchestrator.shutdown().await;
    info!("bye");
    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!(error = %e, "fatal");
        eprintln!("fatal: {}", e);
        std::process::exit(1);
    }
}

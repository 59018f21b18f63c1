mod api;
mod control;
mod hardware;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::sync::{watch, Mutex};
use tracing::{info, warn};

use hvac_common::{epoch_ms, ControllerConfig, OverrideManager, TransitionGuard};

use crate::api::AppState;
use crate::control::ControlLoop;
use crate::hardware::{LoggingRelayBank, SensorReader, SimSensor};
use crate::state::StateCell;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut config = load_config().await?;
    config.sanitize();
    if config.thresholds_inverted() {
        warn!(
            "cool threshold {} <= heat threshold {}; ties resolve in favor of cooling",
            config.thresholds.cool_f, config.thresholds.heat_f
        );
    }
    if config.api_key.is_empty() {
        warn!("api_key is empty; every /override request will be rejected");
    }
    let config = Arc::new(config);

    let cell = Arc::new(StateCell::new());
    let overrides = Arc::new(Mutex::new(OverrideManager::new()));
    let guard = Arc::new(Mutex::new(TransitionGuard::new(
        config.min_idle_ms,
        epoch_ms(),
    )));

    let relays = Box::new(LoggingRelayBank::new(config.pins));
    let reader: Arc<Mutex<Box<dyn SensorReader>>> =
        Arc::new(Mutex::new(Box::new(SimSensor::new())));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    let control = ControlLoop::new(
        Arc::clone(&config),
        Arc::clone(&guard),
        Arc::clone(&overrides),
        Arc::clone(&cell),
        relays,
    );
    let loop_task = tokio::spawn(control.run(reader, shutdown_rx.clone()));

    let app = api::router(AppState {
        config: Arc::clone(&config),
        cell,
        overrides,
        guard,
    });

    let addr: SocketAddr = ([0, 0, 0, 0], config.http_port).into();
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind controller server at {addr}"))?;
    info!("controller listening on http://{addr}");

    let mut serve_shutdown = shutdown_rx;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = serve_shutdown.changed().await;
        })
        .await?;

    // Let the loop finish its tick and drop the relays before exiting.
    if let Err(err) = loop_task.await {
        warn!("control loop task failed: {err}");
    }
    info!("controller stopped");
    Ok(())
}

/// `HVAC_CONFIG` names a JSON config file. A file that is set but
/// unreadable or malformed is fatal; an unset variable falls back to
/// built-in defaults.
async fn load_config() -> anyhow::Result<ControllerConfig> {
    match std::env::var("HVAC_CONFIG") {
        Ok(path) => {
            let raw = tokio::fs::read(&path)
                .await
                .with_context(|| format!("failed to read config file {path}"))?;
            serde_json::from_slice(&raw)
                .with_context(|| format!("failed to parse config file {path}"))
        }
        Err(_) => {
            warn!("HVAC_CONFIG not set; using built-in defaults");
            Ok(ControllerConfig::default())
        }
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(err) => {
                warn!("failed to install SIGTERM handler: {err}");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

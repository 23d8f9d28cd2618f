use std::sync::Arc;

use anyhow::Context;
use perp_scalper_bitget::BitgetGateway;
use perp_scalper_core::{ConfigLoader, ExchangeGateway};
use perp_scalper_engine::{BracketManager, ControlLoop, LifecycleController, StateStore};
use perp_scalper_signals::EmaRsiSignal;
use perp_scalper_web_api::ApiServer;
use tokio::sync::watch;

/// Boots the full daemon: state store, exchange gateway, signal source,
/// control loop and the operator API, then runs until Ctrl-C.
pub async fn run_controller(config_path: &str) -> anyhow::Result<()> {
    tracing::info!("Starting controller with config: {}", config_path);

    let config = ConfigLoader::load_path(config_path)?;

    let store = Arc::new(StateStore::new(&config.trading.state_path));
    // Fail fast on a corrupt record rather than trading blind.
    let state = store.load().context("position record unreadable at startup")?;
    tracing::info!(
        is_open = state.is_open,
        paused = state.paused,
        "position record loaded"
    );

    let gateway: Arc<dyn ExchangeGateway> = Arc::new(BitgetGateway::new(&config.exchange)?);
    let signal_source = Box::new(EmaRsiSignal::new(config.signal.clone()));

    let brackets = BracketManager::new(gateway.clone(), config.trading.clone());
    let controller = LifecycleController::new(
        store.clone(),
        gateway.clone(),
        brackets,
        config.trading.clone(),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let control_loop = ControlLoop::new(
        store.clone(),
        gateway,
        signal_source,
        controller,
        &config.trading,
        shutdown_rx,
    );

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let api = ApiServer::new(store);
    let mut api_task = tokio::spawn(async move { api.serve(&addr).await });
    let mut loop_task = tokio::spawn(control_loop.run());

    tokio::select! {
        res = &mut loop_task => {
            res.context("control loop task panicked")??;
            anyhow::bail!("control loop exited unexpectedly");
        }
        res = &mut api_task => {
            res.context("API task panicked")??;
            anyhow::bail!("operator API exited unexpectedly");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Ctrl-C received, shutting down");
            let _ = shutdown_tx.send(true);
            loop_task.await.context("control loop task panicked")??;
            api_task.abort();
        }
    }

    Ok(())
}

/// Fetches and pretty-prints the position record from a running daemon.
pub async fn show_status(addr: &str) -> anyhow::Result<()> {
    let body: serde_json::Value = reqwest::get(format!("{addr}/api/state"))
        .await?
        .error_for_status()?
        .json()
        .await?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

/// Flips the pause switch on a running daemon.
pub async fn set_paused(addr: &str, paused: bool) -> anyhow::Result<()> {
    let endpoint = if paused { "pause" } else { "resume" };
    let body: serde_json::Value = reqwest::Client::new()
        .put(format!("{addr}/api/{endpoint}"))
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

//! Streambox - live capture appliance controller.
//!
//! Supervises the encoder process, toggles the stream from a debounced
//! hardware button and fans status messages out to WebSocket clients.

pub mod broadcast;
pub mod hardware;
pub mod library;
pub mod orchestrator;
pub mod server;
pub mod stream;
pub mod utils;

use anyhow::Context;
use broadcast::BroadcastHub;
use clap::Parser;
use hardware::SysfsPin;
use library::VideoLibrary;
use orchestrator::Orchestrator;
use server::AppState;
use std::future::Future;
use std::sync::Arc;
use stream::StreamSupervisor;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utils::AppConfig;

/// Initialize logging, parse the command line and run until signalled
pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "streambox=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting streambox v{}", env!("CARGO_PKG_VERSION"));

    run_with_config(AppConfig::parse()).await
}

/// Run the appliance with an explicit configuration
pub async fn run_with_config(config: AppConfig) -> anyhow::Result<()> {
    std::fs::create_dir_all(&config.hls_dir)
        .with_context(|| format!("Failed to create {}", config.hls_dir.display()))?;
    std::fs::create_dir_all(&config.video_dir)
        .with_context(|| format!("Failed to create {}", config.video_dir.display()))?;

    let supervisor = StreamSupervisor::new(config.encoder_settings().command(&config.hls_dir))
        .with_stop_grace(config.stop_grace());
    let orchestrator = Arc::new(Orchestrator::new(
        supervisor,
        BroadcastHub::with_capacity(config.subscriber_queue),
        VideoLibrary::new(&config.video_dir),
    ));

    let shutdown = CancellationToken::new();
    let forwarder = orchestrator.forward_process_exits(shutdown.clone());

    let button = if config.no_button {
        tracing::info!("Button monitoring disabled");
        None
    } else {
        let pin = SysfsPin::open(config.button_pin).with_context(|| {
            format!(
                "Failed to initialize GPIO {} (use --no-button to run without it)",
                config.button_pin
            )
        })?;
        Some(orchestrator.spawn_button_monitor(pin, config.debounce_settings(), shutdown.clone()))
    };

    let listener = TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind))?;
    tracing::info!("Server is running on {}", listener.local_addr()?);

    let mut server = tokio::spawn(server::serve(
        listener,
        AppState {
            orchestrator: Arc::clone(&orchestrator),
            shutdown: shutdown.clone(),
        },
    ));

    let outcome = wait_for_stop(&mut server, server::wait_for_shutdown_signal()).await;
    if let Err(e) = &outcome {
        tracing::error!("{:#}", e);
    }
    tracing::info!("Shutting down server...");
    shutdown.cancel();

    if !server.is_finished() {
        match tokio::time::timeout(config.shutdown_timeout(), &mut server).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => tracing::error!("Server error during shutdown: {}", e),
            Ok(Err(e)) => tracing::error!("Server task failed: {}", e),
            Err(_) => {
                tracing::warn!("Server did not drain in time, aborting");
                server.abort();
            }
        }
    }

    orchestrator.shutdown(config.shutdown_timeout()).await;

    if let Some(button) = button {
        match button.await {
            Ok(presses) => tracing::info!("Button monitor stopped after {} presses", presses),
            Err(e) => tracing::error!("Button monitor failed: {}", e),
        }
    }
    if let Err(e) = forwarder.await {
        tracing::error!("Exit forwarder failed: {}", e);
    }

    if outcome.is_ok() {
        tracing::info!("Server exited gracefully");
    }
    outcome
}

/// Wait for a shutdown signal; the server finishing first is an error
async fn wait_for_stop<F>(
    server: &mut JoinHandle<std::io::Result<()>>,
    signal: F,
) -> anyhow::Result<()>
where
    F: Future<Output = std::io::Result<()>>,
{
    tokio::select! {
        signal = signal => signal.context("Failed to listen for shutdown signals"),
        result = server => match result {
            Ok(Ok(())) => Err(anyhow::anyhow!("Server stopped unexpectedly")),
            Ok(Err(e)) => Err(anyhow::Error::new(e).context("Server failed")),
            Err(e) => Err(anyhow::Error::new(e).context("Server task failed")),
        },
    }
}

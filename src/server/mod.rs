//! HTTP server
//!
//! Exposes the orchestrator over HTTP: stream control, recordings, the
//! live HLS directory and a WebSocket feed of status messages.

pub mod routes;
pub mod shutdown;
pub mod ws;

pub use routes::{build_router, AppState};
pub use shutdown::wait_for_shutdown_signal;

use tokio::net::TcpListener;

/// Serve until the state's shutdown token is cancelled
pub async fn serve(listener: TcpListener, state: AppState) -> std::io::Result<()> {
    let shutdown = state.shutdown.clone();
    let router = build_router(state);

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

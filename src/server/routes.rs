//! HTTP routes
//!
//! Success responses are JSON payloads; failures go through `AppError`,
//! which maps missing recordings to 404 and everything else to 500.

use super::ws::ws_handler;
use crate::orchestrator::Orchestrator;
use crate::utils::AppResult;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// Shared application state passed to handlers
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    /// Application lifetime; also the scope the encoder is bound to
    pub shutdown: CancellationToken,
}

/// Body of stream control responses
#[derive(Debug, Serialize, Deserialize)]
pub struct ActionResponse {
    pub status: String,
}

/// Body of `/status`
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub streaming: bool,
    pub pid: Option<u32>,
    pub subscribers: usize,
    pub playlist: PathBuf,
}

/// Body of `/list-videos`
#[derive(Debug, Serialize, Deserialize)]
pub struct VideosResponse {
    pub videos: Vec<String>,
}

/// Build the router with all routes
pub fn build_router(state: AppState) -> Router {
    let live_dir = state.orchestrator.live_dir();

    Router::new()
        .route("/start-stream", get(start_stream))
        .route("/stop-stream", get(stop_stream))
        .route("/status", get(stream_status))
        .route("/list-videos", get(list_videos))
        .route("/videos/{filename}", get(serve_video))
        .route("/ws", get(ws_handler))
        .nest_service("/hls", ServeDir::new(live_dir))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn start_stream(State(state): State<AppState>) -> AppResult<Json<ActionResponse>> {
    state.orchestrator.request_start(&state.shutdown).await?;
    Ok(Json(ActionResponse {
        status: "Stream started".to_string(),
    }))
}

async fn stop_stream(State(state): State<AppState>) -> AppResult<Json<ActionResponse>> {
    state.orchestrator.request_stop()?;
    Ok(Json(ActionResponse {
        status: "Stream stopped".to_string(),
    }))
}

async fn stream_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let status = state.orchestrator.stream_status();
    Json(StatusResponse {
        streaming: status.running,
        pid: status.pid,
        subscribers: state.orchestrator.subscriber_count(),
        playlist: status.playlist,
    })
}

async fn list_videos(State(state): State<AppState>) -> AppResult<Json<VideosResponse>> {
    let videos = state.orchestrator.list_videos()?;
    Ok(Json(VideosResponse { videos }))
}

async fn serve_video(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> AppResult<Response> {
    let file = state.orchestrator.open_video(&filename).await?;
    let length = file.metadata().await?.len();

    let headers = [
        (header::CONTENT_TYPE, content_type(&filename).to_string()),
        (header::CONTENT_LENGTH, length.to_string()),
    ];
    Ok((headers, Body::from_stream(ReaderStream::new(file))).into_response())
}

/// MIME type for a recording
fn content_type(filename: &str) -> &'static str {
    let ext = std::path::Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match ext.as_deref() {
        Some("mp4") => "video/mp4",
        Some("mkv") => "video/x-matroska",
        Some("flv") => "video/x-flv",
        Some("avi") => "video/x-msvideo",
        _ => "application/octet-stream",
    }
}

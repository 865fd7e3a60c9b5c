//! WebSocket status feed
//!
//! Every connection is one hub subscription. Status messages go out as
//! text frames; anything the client sends is ignored.

use super::routes::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let mut subscription = state.orchestrator.subscribe();
    let id = subscription.id();
    tracing::info!("New WebSocket client connected: {}", id);

    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => {
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
            outgoing = subscription.recv() => match outgoing {
                Some(text) => {
                    if let Err(e) = sink.send(Message::Text(text.into())).await {
                        tracing::debug!("Failed to send to client {}: {}", id, e);
                        break;
                    }
                }
                None => {
                    // Dropped by the hub after a failed delivery
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            },
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!("WebSocket error from client {}: {}", id, e);
                    break;
                }
            },
        }
    }

    state.orchestrator.unsubscribe(&id);
    tracing::info!("WebSocket client disconnected: {}", id);
}

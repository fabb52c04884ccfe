//! WebSocket fan-out of change events. Each client gets its own broadcast
//! subscription; slow or gone clients just stop receiving.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;

use super::AppState;

pub async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let mut rx = state.events.subscribe();

    loop {
        match rx.recv().await {
            Ok(event) => {
                if socket.send(Message::Text(event)).await.is_err() {
                    break;
                }
            }
            Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "websocket client lagged behind the event stream");
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }
}

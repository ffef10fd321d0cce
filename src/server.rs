use crate::app_state::AppState;
use crate::signal::{ClientMessage, ServerMessage};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use tower_http::services::ServeDir;
use tracing::{debug, info, warn};

pub fn router(state: AppState) -> Router {
    let assets = ServeDir::new(&state.config.static_dir);
    Router::new()
        .route("/ws", get(ws_handler))
        .fallback_service(assets)
        .with_state(state)
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let relay = state.relay.clone();
    let (client_id, mut rx) = relay.connect().await;
    info!("Client {} connected", client_id.short());

    let (mut sender, mut receiver) = socket.split();

    // Outbound queue -> socket
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let text = match msg.to_json() {
                Ok(text) => text,
                Err(e) => {
                    warn!("Failed to encode outbound frame: {}", e);
                    continue;
                }
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
        let _ = sender.close().await;
    });

    let recv_relay = relay.clone();
    let recv_id = client_id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(frame) = receiver.next().await {
            let text = match frame {
                Ok(Message::Text(text)) => text,
                Ok(Message::Close(_)) => break,
                Ok(_) => continue,
                Err(e) => {
                    debug!("Socket error from {}: {}", recv_id.short(), e);
                    break;
                }
            };

            match serde_json::from_str::<ClientMessage>(&text) {
                Ok(msg) => recv_relay.dispatch(&recv_id, msg).await,
                Err(e) => {
                    warn!("Malformed frame from {}: {}", recv_id.short(), e);
                    recv_relay
                        .notify(
                            &recv_id,
                            ServerMessage::Error {
                                message: format!("malformed message: {}", e),
                            },
                        )
                        .await;
                }
            }
        }
    });

    // Whichever side finishes first ends the session
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => (),
    }

    relay.disconnect(&client_id).await;
    info!("Client {} disconnected", client_id.short());
}

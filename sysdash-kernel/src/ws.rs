//! WebSocket subscription channel
//!
//! One hub subscription per socket. The first frame is the `all` snapshot
//! the hub queued at subscribe time; after that every published update is
//! forwarded as `{"type": ..., "data": ...}`. A client may send `refresh`
//! (plain text or `{"action":"refresh"}`) to run the on-demand cycle.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::select;

use crate::http::AppState;
use crate::models::Update;

#[derive(Deserialize)]
struct ClientCommand {
    action: String,
}

/// Whether a client text frame asks for an on-demand refresh.
fn is_refresh_request(text: &str) -> bool {
    let text = text.trim();
    if text.eq_ignore_ascii_case("refresh") {
        return true;
    }
    serde_json::from_str::<ClientCommand>(text)
        .map(|cmd| cmd.action.eq_ignore_ascii_case("refresh"))
        .unwrap_or(false)
}

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let mut subscription = state.store.subscribe();
    tracing::info!("subscriber {} connected", subscription.id());

    loop {
        select! {
            update = subscription.recv() => {
                let Some(update) = update else {
                    // dropped by the hub (queue overflow); the client reconnects
                    tracing::warn!("subscriber {} fell behind, closing", subscription.id());
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                };
                match serde_json::to_string(&*update) {
                    Ok(json) => {
                        if sender.send(Message::Text(json.into())).await.is_err() {
                            tracing::debug!("subscriber {} disconnected", subscription.id());
                            break;
                        }
                    }
                    Err(e) => tracing::error!("failed to serialize update: {}", e),
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if !is_refresh_request(text.as_str()) {
                            tracing::debug!("ignoring client message: {}", text.as_str());
                            continue;
                        }
                        let outcome = state.scheduler.refresh().await;
                        tracing::debug!("refresh requested by subscriber {}: {:?}", subscription.id(), outcome);
                        let reply = Update::All(state.store.client_snapshot());
                        match serde_json::to_string(&reply) {
                            Ok(json) => {
                                if sender.send(Message::Text(json.into())).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => tracing::error!("failed to serialize snapshot: {}", e),
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!("websocket error: {}", e);
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    tracing::info!("subscriber {} disconnected", subscription.id());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_commands() {
        assert!(is_refresh_request("refresh"));
        assert!(is_refresh_request(" REFRESH\n"));
        assert!(is_refresh_request(r#"{"action":"refresh"}"#));
        assert!(!is_refresh_request(r#"{"action":"clear"}"#));
        assert!(!is_refresh_request("hello"));
        assert!(!is_refresh_request("{"));
    }
}

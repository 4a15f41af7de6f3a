use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::services::{FeedUpdate, PriceFeed};
use crate::types::{ClientMessage, ServerMessage};
use crate::websocket::RoomManager;
use crate::AppState;

/// WebSocket upgrade handler.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    // Create a channel for sending messages to this client
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let client_id = state.room_manager.register(tx);
    info!("WebSocket client connected: {}", client_id);

    // Forward queued messages to the socket
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(Message::Text(msg)).await.is_err() {
                break;
            }
        }
    });

    send_message(
        &state,
        client_id,
        &ServerMessage::StreamStatus {
            status: state.price_feed.stream_status(),
        },
    );

    while let Some(result) = receiver.next().await {
        match result {
            Ok(Message::Text(text)) => {
                debug!("Received message from {}: {}", client_id, text);
                handle_message(&state, client_id, &text);
            }
            Ok(Message::Close(_)) => {
                info!("WebSocket client disconnecting: {}", client_id);
                break;
            }
            Ok(Message::Ping(_)) => {
                // Pong is handled automatically by axum
                debug!("Received ping from {}", client_id);
            }
            Err(e) => {
                error!("WebSocket error for {}: {}", client_id, e);
                break;
            }
            _ => {}
        }
    }

    // Clean up
    let symbols = state.room_manager.unregister(client_id);
    state.price_feed.unwatch(&symbols);
    send_task.abort();
    info!("WebSocket client disconnected: {}", client_id);
}

fn handle_message(state: &AppState, client_id: Uuid, text: &str) {
    let msg: ClientMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            send_error(state, client_id, &format!("Invalid message: {}", e));
            return;
        }
    };

    match msg {
        ClientMessage::Subscribe { symbols } => {
            let subscribed = state.room_manager.subscribe(client_id, &symbols);
            debug!("Client {} subscribed to: {:?}", client_id, subscribed);

            state.price_feed.watch(&subscribed);

            send_message(
                state,
                client_id,
                &ServerMessage::Subscribed {
                    symbols: subscribed.clone(),
                },
            );

            // Latest known prices so the client does not wait for the next tick
            for snapshot in state.price_feed.snapshot(&subscribed) {
                send_message(
                    state,
                    client_id,
                    &ServerMessage::PriceUpdate {
                        data: crate::types::PriceUpdateData {
                            symbol: snapshot.symbol,
                            price: snapshot.price,
                            previous_price: None,
                            timestamp: snapshot.timestamp,
                            source: snapshot.source,
                        },
                    },
                );
            }
        }
        ClientMessage::Unsubscribe { symbols } => {
            let unsubscribed = state.room_manager.unsubscribe(client_id, &symbols);
            debug!("Client {} unsubscribed from: {:?}", client_id, unsubscribed);

            state.price_feed.unwatch(&unsubscribed);

            send_message(
                state,
                client_id,
                &ServerMessage::Unsubscribed {
                    symbols: unsubscribed,
                },
            );
        }
    }
}

/// Forward feed updates to subscribed clients: prices to the symbol's room,
/// stream status to everyone.
pub fn spawn_fanout(feed: &PriceFeed, rooms: Arc<RoomManager>) -> tokio::task::JoinHandle<()> {
    let mut updates = feed.subscribe();
    tokio::spawn(async move {
        loop {
            match updates.recv().await {
                Ok(FeedUpdate::Price(data)) => {
                    let symbol = data.symbol.clone();
                    if let Ok(json) = serde_json::to_string(&ServerMessage::PriceUpdate { data }) {
                        rooms.broadcast(&symbol, &json);
                    }
                }
                Ok(FeedUpdate::Status(status)) => {
                    if let Ok(json) = serde_json::to_string(&ServerMessage::StreamStatus { status }) {
                        rooms.broadcast_all(&json);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("WebSocket fan-out lagged, dropped {} updates", n);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

fn send_message(state: &AppState, client_id: Uuid, msg: &ServerMessage) {
    if let Ok(json) = serde_json::to_string(msg) {
        state.room_manager.send_to(client_id, &json);
    }
}

fn send_error(state: &AppState, client_id: Uuid, error: &str) {
    let msg = ServerMessage::Error {
        error: error.to_string(),
    };
    send_message(state, client_id, &msg);
}

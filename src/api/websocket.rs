//! Real-time auction channel.
//!
//! One socket per caller; the caller joins deal rooms to receive their
//! `auction:*` announcements and may place bids over the socket. Joining
//! only subscribes to announcements; auction operations stay gated in
//! the engine. Bid failures go back on the offending socket alone as
//! `auction:error`; admitted bids reach the whole room through the
//! regular broadcast.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::IntoResponse,
};
use futures_util::sink::SinkExt;
use futures_util::stream::{SplitSink, StreamExt};
use rust_decimal::Decimal;
use serde::Deserialize;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::api::state::AppState;
use crate::engine::AuctionEvent;
use crate::error::AuctionError;

type SocketSink = Arc<Mutex<SplitSink<WebSocket, Message>>>;

/// Messages a client may send over the socket
#[derive(Debug, Deserialize)]
#[serde(tag = "event")]
pub enum ClientMessage {
    #[serde(rename = "auction:join", rename_all = "camelCase")]
    Join { auction_deal_room_id: String },
    #[serde(rename = "auction:bid", rename_all = "camelCase")]
    Bid { auction_id: String, amount: Decimal },
    #[serde(rename = "auction:leave", rename_all = "camelCase")]
    Leave { auction_deal_room_id: String },
}

#[derive(Deserialize)]
pub struct WsIdentity {
    caller: Option<String>,
}

/// WebSocket handler; the caller identifies via the `?caller=` query param.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Query(identity): Query<WsIdentity>,
    State(state): State<AppState>,
) -> std::result::Result<impl IntoResponse, StatusCode> {
    match identity.caller {
        Some(caller) if !caller.trim().is_empty() => {
            let caller = caller.trim().to_string();
            Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, caller)))
        }
        _ => {
            warn!("websocket connection rejected: missing caller identity");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}

async fn handle_socket(socket: WebSocket, state: AppState, caller_id: String) {
    let (sender, mut receiver) = socket.split();
    let sender: SocketSink = Arc::new(Mutex::new(sender));

    // One forward task per joined room, aborted on leave or disconnect
    let mut joined: HashMap<String, JoinHandle<()>> = HashMap::new();

    info!(caller = %caller_id, "websocket connected");

    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Text(text) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(ClientMessage::Join {
                    auction_deal_room_id,
                }) => {
                    if joined.contains_key(&auction_deal_room_id) {
                        continue;
                    }
                    match state.engine.subscribe_room(&auction_deal_room_id).await {
                        Ok(rx) => {
                            let task = tokio::spawn(forward_room_events(rx, sender.clone()));
                            debug!(caller = %caller_id, room = %auction_deal_room_id, "joined auction room");
                            joined.insert(auction_deal_room_id, task);
                        }
                        Err(err) => {
                            send_error(&sender, &err.to_string()).await;
                        }
                    }
                }
                Ok(ClientMessage::Bid { auction_id, amount }) => {
                    let outcome = match Uuid::parse_str(&auction_id) {
                        Ok(id) => state
                            .engine
                            .place_bid(id, &caller_id, amount)
                            .await
                            .map(|_| ()),
                        Err(_) => Err(AuctionError::AuctionNotFound { id: auction_id }),
                    };
                    // An admitted bid reaches the room via the broadcast;
                    // only failures come back on this socket
                    if let Err(err) = outcome {
                        send_error(&sender, &err.to_string()).await;
                    }
                }
                Ok(ClientMessage::Leave {
                    auction_deal_room_id,
                }) => {
                    if let Some(task) = joined.remove(&auction_deal_room_id) {
                        task.abort();
                        debug!(caller = %caller_id, room = %auction_deal_room_id, "left auction room");
                    }
                }
                Err(e) => {
                    send_error(&sender, &format!("unrecognized message: {e}")).await;
                }
            },
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) => {
                // Axum handles ping/pong automatically
            }
            _ => {}
        }
    }

    for task in joined.into_values() {
        task.abort();
    }
    info!(caller = %caller_id, "websocket connection closed");
}

async fn forward_room_events(mut rx: broadcast::Receiver<AuctionEvent>, sender: SocketSink) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                let json = match serde_json::to_string(&event) {
                    Ok(json) => json,
                    Err(e) => {
                        error!(error = %e, "failed to serialize auction event");
                        continue;
                    }
                };
                let mut guard = sender.lock().await;
                if guard.send(Message::Text(json)).await.is_err() {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "websocket subscriber lagged, events dropped");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn send_error(sender: &SocketSink, message: &str) {
    let event = AuctionEvent::Error {
        error: message.to_string(),
    };
    let Ok(json) = serde_json::to_string(&event) else {
        return;
    };
    let mut guard = sender.lock().await;
    let _ = guard.send(Message::Text(json)).await;
}

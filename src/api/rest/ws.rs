use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::SinkExt;
use futures::StreamExt;
use serde::Deserialize;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::geo::GeoPoint;
use crate::relay::{DriverLocation, RelayEvent};
use crate::state::AppState;

/// Frames a client may send. Anything else is logged and ignored.
#[derive(Debug, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    #[serde(alias = "joinOrder")]
    JoinOrderRoom {
        #[serde(rename = "orderId")]
        order_id: String,
    },
    LeaveOrderRoom {
        #[serde(rename = "orderId")]
        order_id: String,
    },
    DriverLocationUpdate {
        #[serde(rename = "orderId")]
        order_id: String,
        location: GeoPoint,
    },
}

type Rooms = StreamMap<String, BroadcastStream<RelayEvent>>;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// One loop per connection owns the sink, so writes to a client never
/// interleave.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut rooms: Rooms = StreamMap::new();

    state.metrics.relay_connections.inc();
    info!("websocket client connected");

    loop {
        tokio::select! {
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => handle_client_message(&state, &mut rooms, &text),
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        warn!(error = %err, "websocket receive failed");
                        break;
                    }
                }
            }
            Some((room, event)) = rooms.next(), if !rooms.is_empty() => {
                match event {
                    Ok(event) => {
                        let json = match serde_json::to_string(&event) {
                            Ok(json) => json,
                            Err(err) => {
                                warn!(error = %err, room = %room, "failed to serialize relay event for ws");
                                continue;
                            }
                        };

                        if sender.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        warn!(room = %room, skipped, "ws client lagging; events dropped");
                    }
                }
            }
        }
    }

    leave_all(&state, rooms);

    state.metrics.relay_connections.dec();
    info!("websocket client disconnected");
}

fn handle_client_message(state: &AppState, rooms: &mut Rooms, text: &str) {
    let message: ClientMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(err) => {
            warn!(error = %err, "ignoring malformed ws frame");
            return;
        }
    };

    match message {
        ClientMessage::JoinOrderRoom { order_id } => {
            let Some(room) = room_key(&order_id) else {
                warn!("ignoring join with empty order id");
                return;
            };
            if !rooms.contains_key(&room) {
                let stream = BroadcastStream::new(state.relay.join(&room));
                rooms.insert(room.clone(), stream);
            }
            debug!(room = %room, "ws client joined order room");
        }
        ClientMessage::LeaveOrderRoom { order_id } => {
            let Some(room) = room_key(&order_id) else {
                return;
            };
            rooms.remove(&room);
            state.relay.prune(&room);
            debug!(room = %room, "ws client left order room");
        }
        ClientMessage::DriverLocationUpdate { order_id, location } => {
            let Some(room) = room_key(&order_id) else {
                return;
            };
            if let Err(err) = location.validate() {
                warn!(room = %room, error = %err, "ignoring driver location with bad coordinates");
                return;
            }
            state.relay.publish(
                &room,
                RelayEvent::DriverLocationUpdate(DriverLocation {
                    order_id: room.clone(),
                    location,
                }),
            );
        }
    }
}

/// Drops every subscription a connection holds and removes rooms left empty.
fn leave_all(state: &AppState, rooms: Rooms) {
    let joined: Vec<String> = rooms.keys().cloned().collect();
    drop(rooms);
    for room in joined {
        state.relay.prune(&room);
    }
}

/// Order ids are matched in their canonical uuid form; other ids are used
/// as given.
fn room_key(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    match Uuid::parse_str(trimmed) {
        Ok(id) => Some(id.to_string()),
        Err(_) => Some(trimmed.to_string()),
    }
}

use std::sync::atomic::{AtomicUsize, Ordering};

use async_channel::Sender;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Extension,
    },
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use futures::{stream, SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::User;
use crate::entities::{Coordinates, LocationEvent, ParticipantRole};
use crate::error::{Error, ErrorKind};
use crate::relay::ConnectionId;
use crate::server::DynAPI;

static ACTIVE_CONNECTIONS: AtomicUsize = AtomicUsize::new(0);

const MAX_CONNECTIONS: usize = 1000;

/// Reports queued per socket before new ones are dropped for it.
const OUTBOX_CAPACITY: usize = 64;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Join {
        ride_id: Uuid,
    },
    Leave {
        ride_id: Uuid,
    },
    Publish {
        ride_id: Uuid,
        role: ParticipantRole,
        lat: f64,
        lng: f64,
        timestamp: Option<DateTime<Utc>>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Joined {
        ride_id: Uuid,
        role: ParticipantRole,
    },
    Location(LocationEvent),
    Error {
        ride_id: Option<Uuid>,
        code: i32,
        error: String,
    },
}

impl ServerMessage {
    fn error(ride_id: Option<Uuid>, err: Error) -> Self {
        let error = match err.kind() {
            ErrorKind::Internal => "Internal Server Error".to_string(),
            _ => err.message,
        };

        Self::Error {
            ride_id,
            code: err.code,
            error,
        }
    }
}

impl From<LocationEvent> for ServerMessage {
    fn from(event: LocationEvent) -> Self {
        Self::Location(event)
    }
}

#[axum_macros::debug_handler]
pub async fn connect(
    ws: WebSocketUpgrade,
    Extension(api): Extension<DynAPI>,
    user: User,
) -> Response {
    let slot = match ConnectionSlot::reserve(&ACTIVE_CONNECTIONS, MAX_CONNECTIONS) {
        Some(slot) => slot,
        None => {
            tracing::warn!("tracking connection limit reached");
            return Error::unavailable_error().into_response();
        }
    };

    ws.on_upgrade(move |socket| handle_socket(socket, api, user, slot))
}

/// A claimed place under the connection cap, taken before the upgrade so
/// concurrent handshakes cannot overshoot it. Released on drop, which also
/// covers an upgrade that never completes.
struct ConnectionSlot {
    active: &'static AtomicUsize,
    count: usize,
}

impl ConnectionSlot {
    fn reserve(active: &'static AtomicUsize, max: usize) -> Option<Self> {
        let previous = active.fetch_add(1, Ordering::AcqRel);

        if previous >= max {
            active.fetch_sub(1, Ordering::AcqRel);
            return None;
        }

        Some(Self {
            active,
            count: previous + 1,
        })
    }
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::AcqRel);
    }
}

#[tracing::instrument(skip_all, fields(user_id = %user.id))]
async fn handle_socket(socket: WebSocket, api: DynAPI, user: User, slot: ConnectionSlot) {
    let connection_id: ConnectionId = Uuid::new_v4();
    tracing::info!(%connection_id, connections = slot.count, "tracking socket opened");

    let (mut sink, mut incoming) = socket.split();
    let (outbox, inbox) = async_channel::bounded::<LocationEvent>(OUTBOX_CAPACITY);
    let (replies, replies_rx) = async_channel::unbounded::<ServerMessage>();

    let mut writer = tokio::spawn(async move {
        let outgoing = stream::select(inbox.map(ServerMessage::from), replies_rx);
        futures::pin_mut!(outgoing);

        while let Some(message) = outgoing.next().await {
            let text = match serde_json::to_string(&message) {
                Ok(text) => text,
                Err(err) => {
                    tracing::warn!(error = %err, "unable to encode message");
                    continue;
                }
            };

            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            message = incoming.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    let reply = handle_message(&api, &user, connection_id, &outbox, &text).await;
                    if let Some(reply) = reply {
                        if replies.send(reply).await.is_err() {
                            break;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    tracing::debug!(error = %err, "tracking socket errored");
                    break;
                }
            },
            _ = &mut writer => break,
        }
    }

    api.disconnect(connection_id).await;
    writer.abort();

    drop(slot);
    tracing::info!(
        %connection_id,
        connections = ACTIVE_CONNECTIONS.load(Ordering::Acquire),
        "tracking socket closed"
    );
}

async fn handle_message(
    api: &DynAPI,
    user: &User,
    connection_id: ConnectionId,
    outbox: &Sender<LocationEvent>,
    text: &str,
) -> Option<ServerMessage> {
    let message: ClientMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(err) => {
            tracing::debug!(error = %err, "malformed tracking message");
            return Some(ServerMessage::error(None, Error::invalid_input_error()));
        }
    };

    match message {
        ClientMessage::Join { ride_id } => {
            match api
                .join_ride(user.clone(), ride_id, connection_id, outbox.clone())
                .await
            {
                Ok(role) => Some(ServerMessage::Joined { ride_id, role }),
                Err(err) => Some(ServerMessage::error(Some(ride_id), err)),
            }
        }
        ClientMessage::Leave { ride_id } => api
            .leave_ride(ride_id, connection_id)
            .await
            .err()
            .map(|err| ServerMessage::error(Some(ride_id), err)),
        ClientMessage::Publish {
            ride_id,
            role,
            lat,
            lng,
            timestamp,
        } => api
            .publish_location(
                ride_id,
                connection_id,
                role,
                Coordinates::new(lng, lat),
                timestamp,
            )
            .await
            .err()
            .map(|err| ServerMessage::error(Some(ride_id), err)),
    }
}

#[test]
fn client_message_test() {
    let ride_id = Uuid::new_v4();

    let text = format!(
        r#"{{"type":"publish","ride_id":"{}","role":"driver","lat":17.385,"lng":78.4867}}"#,
        ride_id
    );
    match serde_json::from_str::<ClientMessage>(&text).unwrap() {
        ClientMessage::Publish {
            role, lat, lng, timestamp, ..
        } => {
            assert_eq!(role, ParticipantRole::Driver);
            assert_eq!(Coordinates::new(lng, lat), Coordinates::new(78.4867, 17.385));
            assert!(timestamp.is_none());
        }
        other => panic!("unexpected message {:?}", other),
    }

    let text = format!(r#"{{"type":"join","ride_id":"{}"}}"#, ride_id);
    assert!(matches!(
        serde_json::from_str::<ClientMessage>(&text).unwrap(),
        ClientMessage::Join { .. }
    ));

    assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"teleport"}"#).is_err());
}

#[test]
fn server_message_test() {
    let value = serde_json::to_value(ServerMessage::error(None, Error::invalid_state_error())).unwrap();
    assert_eq!(value["type"], "error");
    assert_eq!(value["code"], 100);

    let value = serde_json::to_value(ServerMessage::error(None, Error::database_error())).unwrap();
    assert_eq!(value["error"], "Internal Server Error");

    let event = LocationEvent {
        ride_id: Uuid::new_v4(),
        role: ParticipantRole::Passenger,
        user_id: Uuid::new_v4(),
        coordinates: Coordinates::new(78.4867, 17.385),
        timestamp: Utc::now(),
    };
    let value = serde_json::to_value(ServerMessage::from(event)).unwrap();
    assert_eq!(value["type"], "location");
    assert_eq!(value["role"], "passenger");
    assert_eq!(value["coordinates"]["lng"], 78.4867);
}

#[test]
fn connection_cap_test() {
    static ACTIVE: AtomicUsize = AtomicUsize::new(0);

    let first = ConnectionSlot::reserve(&ACTIVE, 2).unwrap();
    let second = ConnectionSlot::reserve(&ACTIVE, 2).unwrap();
    assert_eq!((first.count, second.count), (1, 2));

    // a rejected handshake gives its claim back
    assert!(ConnectionSlot::reserve(&ACTIVE, 2).is_none());
    assert_eq!(ACTIVE.load(Ordering::Acquire), 2);

    drop(first);
    assert_eq!(ACTIVE.load(Ordering::Acquire), 1);

    let third = ConnectionSlot::reserve(&ACTIVE, 2).unwrap();
    assert_eq!(third.count, 2);

    drop(second);
    drop(third);
    assert_eq!(ACTIVE.load(Ordering::Acquire), 0);
}

//! # Notification Hub
//!
//! Fans committed domain events out to every connected WebSocket client.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  SaleLedger ── emit(DomainEvent) ──► NotificationHub                    │
//! │                                          │ broadcast::Sender            │
//! │                          ┌───────────────┼───────────────┐              │
//! │                          ▼               ▼               ▼              │
//! │                     /ws client      /ws client      /ws client          │
//! │                                                                         │
//! │  No subscribers → the event is dropped.                                │
//! │  Slow subscriber → it skips what it missed (Lagged) and carries on.    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::time::{interval, Duration};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::AppState;
use stockroom_core::{DomainEvent, EventSink};

/// Events buffered per subscriber before it starts lagging.
const CHANNEL_CAPACITY: usize = 256;

/// Ping interval to keep connections alive.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// What a WebSocket client receives for each event.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub id: Uuid,
    pub title: String,
    pub occurred_at: DateTime<Utc>,
    #[serde(flatten)]
    pub event: DomainEvent,
}

impl Notification {
    fn new(event: DomainEvent) -> Self {
        Notification {
            id: Uuid::new_v4(),
            title: event.title(),
            occurred_at: Utc::now(),
            event,
        }
    }
}

/// Broadcast hub. Cheap to clone.
#[derive(Debug, Clone)]
pub struct NotificationHub {
    tx: broadcast::Sender<Notification>,
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationHub {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        NotificationHub { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    /// Returns the number of connected subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl EventSink for NotificationHub {
    fn emit(&self, event: DomainEvent) {
        let notification = Notification::new(event);
        debug!(title = %notification.title, "Broadcasting notification");
        // Err only means nobody is listening.
        let _ = self.tx.send(notification);
    }
}

// =============================================================================
// WebSocket Handler
// =============================================================================

/// `GET /ws/notifications`
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let rx = state.hub.subscribe();
    ws.on_upgrade(move |socket| handle_socket(socket, rx))
}

async fn handle_socket(socket: WebSocket, mut rx: broadcast::Receiver<Notification>) {
    let (mut sender, mut receiver) = socket.split();
    let mut ping = interval(PING_INTERVAL);
    info!("Notification client connected");

    loop {
        tokio::select! {
            received = rx.recv() => match received {
                Ok(notification) => {
                    let Ok(json) = serde_json::to_string(&notification) else {
                        continue;
                    };
                    if sender.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Notification receiver lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(?e, "WebSocket error");
                    break;
                }
            },
            _ = ping.tick() => {
                if sender.send(Message::Ping(axum::body::Bytes::new())).await.is_err() {
                    break;
                }
            }
        }
    }

    info!("Notification client disconnected");
}

//! WebSocket support for real-time session updates.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use mp4forge_core::progress::spawn_smoother;
use mp4forge_core::SessionSnapshot;

use crate::metrics::{WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_LAG_EVENTS, WS_MESSAGES_SENT};
use crate::state::{AppState, Session};

/// WebSocket message sent to clients for real-time updates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsMessage {
    /// The session changed state.
    SessionState {
        state: String,
        /// User-facing error, if any.
        error: Option<String>,
    },
    /// Conversion progress.
    Progress {
        run: u64,
        /// True percentage reported by the engine.
        percent: u8,
        /// Smoothed value for display.
        display: u8,
    },
}

impl WsMessage {
    fn kind(&self) -> &'static str {
        match self {
            WsMessage::SessionState { .. } => "session_state",
            WsMessage::Progress { .. } => "progress",
        }
    }
}

/// Broadcaster for WebSocket messages using tokio broadcast channel.
#[derive(Debug, Clone)]
pub struct WsBroadcaster {
    sender: broadcast::Sender<WsMessage>,
}

impl WsBroadcaster {
    /// Create a new broadcaster with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Broadcast a message to all connected clients.
    pub fn broadcast(&self, msg: WsMessage) {
        // Send errors just mean no one is listening
        let _ = self.sender.send(msg);
    }

    /// Subscribe to receive messages.
    pub fn subscribe(&self) -> broadcast::Receiver<WsMessage> {
        self.sender.subscribe()
    }

    /// Broadcast the state carried by a snapshot.
    pub fn session_changed(&self, snapshot: &SessionSnapshot) {
        self.broadcast(state_message(snapshot));
    }

    pub fn progress(&self, run: u64, percent: u8, display: u8) {
        self.broadcast(WsMessage::Progress {
            run,
            percent,
            display,
        });
    }
}

impl Default for WsBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}

fn state_message(snapshot: &SessionSnapshot) -> WsMessage {
    WsMessage::SessionState {
        state: snapshot.state.as_str().to_string(),
        error: snapshot.error.clone(),
    }
}

/// Forwards session progress to WebSocket clients.
///
/// The true percentage is smoothed at `tick` and each change of the display
/// value is broadcast. The task ends when the session is disposed. Returns
/// `None` if the session is already disposed.
pub async fn spawn_progress_forwarder(
    session: Arc<Session>,
    broadcaster: WsBroadcaster,
    tick: Duration,
) -> Option<JoinHandle<()>> {
    let source = session.subscribe_progress().await?;
    drop(session);

    Some(tokio::spawn(async move {
        let (mut display, smoother) = spawn_smoother(source.clone(), tick);

        while display.changed().await.is_ok() {
            let shown = *display.borrow_and_update();
            let current = *source.borrow();
            debug!("Progress run {}: {}% (display {}%)", current.run, current.percent, shown);
            broadcaster.progress(current.run, current.percent, shown);
        }

        let _ = smoother.await;
        debug!("Progress forwarder stopped");
    }))
}

/// WebSocket upgrade handler.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Handle a single WebSocket connection.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    // Subscribe before reading the snapshot so no change is missed in between
    let mut rx = state.ws_broadcaster().subscribe();
    let initial = state_message(&state.session().snapshot().await);

    WS_CONNECTIONS_TOTAL.inc();
    WS_CONNECTIONS_ACTIVE.inc();

    info!("WebSocket client connected");

    let send_task = tokio::spawn(async move {
        if !send_message(&mut sender, &initial).await {
            return;
        }

        loop {
            match rx.recv().await {
                Ok(msg) => {
                    if !send_message(&mut sender, &msg).await {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("WebSocket client lagged, skipped {} messages", n);
                    WS_LAG_EVENTS.inc();
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Broadcast channel closed");
                    break;
                }
            }
        }
    });

    // Handle incoming messages from client (ping/pong, close)
    while let Some(result) = receiver.next().await {
        match result {
            Ok(Message::Close(_)) => {
                debug!("WebSocket client requested close");
                break;
            }
            Ok(Message::Text(text)) => {
                debug!("Received text message: {}", text);
            }
            Ok(_) => {}
            Err(e) => {
                warn!("WebSocket receive error: {}", e);
                break;
            }
        }
    }

    send_task.abort();
    WS_CONNECTIONS_ACTIVE.dec();
    info!("WebSocket client disconnected");
}

/// Sends one message. Returns false once the client is gone.
async fn send_message(
    sender: &mut futures::stream::SplitSink<WebSocket, Message>,
    msg: &WsMessage,
) -> bool {
    WS_MESSAGES_SENT.with_label_values(&[msg.kind()]).inc();

    match serde_json::to_string(msg) {
        Ok(json) => {
            if sender.send(Message::Text(json.into())).await.is_err() {
                debug!("WebSocket send failed, client disconnected");
                return false;
            }
            true
        }
        Err(e) => {
            error!("Failed to serialize WsMessage: {}", e);
            true
        }
    }
}

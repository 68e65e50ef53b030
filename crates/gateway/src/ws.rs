//! Websocket adapter: the two client-facing endpoints.
//!
//! `/ws/marketData` decodes subscribe/unsubscribe control frames and
//! delegates to the SymbolManager. `/ws/orderEvents` registers a session
//! with the hub and pushes binary JSON frames of order events; its read
//! loop exists solely to detect peer close. Every exit path releases the
//! connection's registrations.

use crate::contracts::{ClientCommand, FrameSink, Method, SinkError};
use crate::hub::{OrderEventsHub, Session};
use crate::shutdown::ShutdownSignal;
use crate::symbol_manager::{ClientSocket, SymbolManager};
use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{FromRequestParts, State};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Shared handles for the websocket handlers.
#[derive(Clone)]
pub struct AppState {
    pub symbols: Arc<SymbolManager>,
    pub hub: Arc<OrderEventsHub>,
    pub shutdown: ShutdownSignal,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ws/marketData", get(market_data_handler))
        .route("/ws/orderEvents", get(order_events_handler))
        .with_state(state)
}

/// Verified user identity for `/ws/orderEvents`. Authentication is handled
/// by the fronting layer, which injects the id as `x-user-id`; a request
/// without it never upgrades.
#[derive(Debug, Clone, Copy)]
pub struct AuthedUser(pub u64);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthedUser
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get("x-user-id")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<u64>().ok())
            .map(AuthedUser)
            .ok_or(StatusCode::UNAUTHORIZED)
    }
}

async fn market_data_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| market_data_session(socket, state))
}

async fn market_data_session(socket: WebSocket, state: AppState) {
    let (sink, mut inbound) = socket.split();
    let client = ClientSocket::new(Box::new(WsFrameSink { sink }));
    debug!(socket = client.id(), "market-data connection established");

    loop {
        let frame = tokio::select! {
            () = state.shutdown.wait() => break,
            maybe = inbound.next() => match maybe {
                Some(Ok(frame)) => frame,
                Some(Err(e)) => {
                    debug!(socket = client.id(), error = %e, "market-data read failed");
                    break;
                }
                None => break,
            },
        };

        let text = match frame {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        let command: ClientCommand = match serde_json::from_str(&text) {
            Ok(command) => command,
            Err(e) => {
                debug!(socket = client.id(), error = %e, "ignoring malformed control frame");
                continue;
            }
        };
        let Some(stream) = command.params.first() else {
            continue;
        };
        match command.method {
            Method::Subscribe => state.symbols.subscribe(stream, Arc::clone(&client)).await,
            Method::Unsubscribe => state.symbols.unsubscribe(stream, &client).await,
        }
    }

    state.symbols.cleanup_connection(&client).await;
    debug!(socket = client.id(), "market-data connection closed");
}

async fn order_events_handler(
    ws: WebSocketUpgrade,
    AuthedUser(user_id): AuthedUser,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| order_events_session(socket, state, user_id))
}

async fn order_events_session(socket: WebSocket, state: AppState, user_id: u64) {
    let (sink, mut inbound) = socket.split();
    let (session, outbound_rx) = Session::new(user_id);

    state.hub.register(Arc::clone(&session)).await;
    info!(user_id, session = session.id(), "order-events session registered");

    let pump = tokio::spawn(write_pump(sink, outbound_rx, Arc::clone(&session)));

    // Read loop: nothing inbound is expected; it only detects close.
    loop {
        tokio::select! {
            () = state.shutdown.wait() => break,
            maybe = inbound.next() => match maybe {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    state.hub.unregister(Arc::clone(&session)).await;
    session.kill();
    let _ = pump.await;
    info!(user_id, session = session.id(), "order-events session closed");
}

/// Drains the session's outbound queue onto the socket until the session is
/// killed, the queue closes, or a write fails.
async fn write_pump(
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<Vec<u8>>,
    session: Arc<Session>,
) {
    loop {
        tokio::select! {
            () = session.killed() => break,
            maybe = outbound.recv() => match maybe {
                None => break,
                Some(frame) => {
                    if let Err(e) = sink.send(Message::Binary(frame)).await {
                        debug!(session = session.id(), error = %e, "order-events write failed");
                        break;
                    }
                }
            },
        }
    }
    let _ = sink.send(Message::Close(None)).await;
}

/// Websocket half behind the SymbolManager's per-socket sink seam.
struct WsFrameSink {
    sink: SplitSink<WebSocket, Message>,
}

#[async_trait]
impl FrameSink for WsFrameSink {
    async fn send_text(&mut self, frame: &str) -> Result<(), SinkError> {
        self.sink
            .send(Message::Text(frame.to_owned()))
            .await
            .map_err(|e| SinkError::Transport(e.to_string()))
    }
}

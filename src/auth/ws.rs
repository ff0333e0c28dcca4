//! WebSocket feed of session state and sign-out for one bearer token.

use std::sync::Arc;

use axum::{
    Router,
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::get,
};
use serde::Deserialize;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::model::{Identity, SessionEvent};
use super::provider::AuthProvider;

/// Build the router for `/ws/session`.
pub fn session_ws_routes(auth: Arc<dyn AuthProvider>) -> Router {
    Router::new()
        .route("/ws/session", get(ws_handler))
        .with_state(auth)
}

#[derive(Debug, Deserialize)]
struct SessionQuery {
    #[serde(default)]
    token: Option<String>,
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(auth): State<Arc<dyn AuthProvider>>,
    Query(query): Query<SessionQuery>,
) -> impl IntoResponse {
    debug!("Session WebSocket client connecting");
    ws.on_upgrade(move |socket| handle_socket(socket, auth, query.token.unwrap_or_default()))
}

async fn send_event(socket: &mut WebSocket, event: &SessionEvent) -> bool {
    match serde_json::to_string(event) {
        Ok(json) => socket.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            warn!(error = %e, "Failed to serialize session event");
            true
        }
    }
}

async fn current_state(auth: &dyn AuthProvider, token: &str) -> (Option<Identity>, SessionEvent) {
    let user = auth.current_user(token).await;
    (user.clone(), SessionEvent::SessionState { user })
}

async fn handle_socket(mut socket: WebSocket, auth: Arc<dyn AuthProvider>, token: String) {
    // Subscribe before the initial state so nothing slips in between.
    let mut rx = auth.subscribe();

    let (mut user, state) = current_state(auth.as_ref(), &token).await;
    if !send_event(&mut socket, &state).await {
        warn!("Failed to send initial session state, client disconnected");
        return;
    }
    info!(signed_in = user.is_some(), "Session WebSocket client connected");

    // Only notices about this socket's own session are forwarded; other
    // sessions of the same user signing out leave this one valid.
    let own_key = auth.session_key(&token);

    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(notice) => {
                        if token.is_empty() || notice.session_key != own_key {
                            continue;
                        }
                        if let SessionEvent::SignedOut { .. } = notice.event {
                            user = None;
                        }
                        if !send_event(&mut socket, &notice.event).await {
                            debug!("Client disconnected during send");
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(missed = n, "Session WS client lagged behind broadcast");
                        let (now, state) = current_state(auth.as_ref(), &token).await;
                        user = now;
                        if !send_event(&mut socket, &state).await {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("Session broadcast channel closed");
                        break;
                    }
                }
            }

            result = socket.recv() => {
                match result {
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        warn!(error = %e, "Session WebSocket error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    info!(signed_in = user.is_some(), "Session WebSocket connection closed");
}

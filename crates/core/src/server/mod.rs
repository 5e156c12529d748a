//! The control-protocol WebSocket server: one `/ws` route, bearer-token
//! gated, speaking [`crate::protocol::ClientMessage`]/[`ServerMessage`] as
//! JSON text frames. Disabled entirely when the `server` feature is off, so
//! an embedder that wires its own transport doesn't pay for `axum`.

mod ws;

use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;

use crate::auth::AuthGate;
use crate::runtime::Runtime;

/// Shared app state handed to every connection.
#[derive(Clone)]
pub struct AppState {
    pub runtime: Arc<Runtime>,
    pub auth: Arc<AuthGate>,
    pub server_work_language: String,
    pub supported_language_codes: Vec<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(websocket_handler))
        .with_state(state)
}

/// Extracts whichever credential the client presented — the `dominds-auth.`
/// subprotocol token takes precedence since it is visible during the
/// handshake itself, before any message has been exchanged.
fn extract_credential(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get("sec-websocket-protocol").and_then(|v| v.to_str().ok()) {
        for token in value.split(',').map(str::trim) {
            if let Some(key) = crate::auth::extract_ws_subprotocol(token) {
                return Some(key.to_string());
            }
        }
    }
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(crate::auth::extract_bearer_header)
        .map(str::to_string)
}

async fn websocket_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let offered_subprotocol = headers
        .get("sec-websocket-protocol")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(',').next().unwrap_or(v).trim().to_string());
    let credential = extract_credential(&headers);
    let authorized = match &credential {
        Some(token) => state.auth.verify(token),
        None => matches!(*state.auth, AuthGate::Disabled),
    };

    let mut upgrade = ws;
    if let Some(protocol) = offered_subprotocol {
        upgrade = upgrade.protocols([protocol]);
    }
    upgrade.on_upgrade(move |socket| async move {
        if authorized {
            ws::handle_connection(socket, state).await;
        } else {
            ws::reject_unauthorized(socket).await;
        }
    })
}

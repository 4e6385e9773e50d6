use std::sync::Arc;

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::response::{IntoResponse, Response};
use futures::SinkExt;
use futures::StreamExt;
use serde::Deserialize;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};

use crate::error::AppError;
use crate::events::subscriptions::{ClientMessage, ServerMessage};
use crate::integrations::identity::bearer_token;
use crate::models::identity::Actor;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct WsAuthQuery {
    pub token: Option<String>,
}

/// Authenticates before upgrading; browsers cannot set headers on a
/// websocket handshake, so `?token=` is accepted as well.
pub async fn ws_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<WsAuthQuery>,
    headers: HeaderMap,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let actor = match authenticate(&state, query, &headers) {
        Ok(actor) => actor,
        Err(err) => return err.into_response(),
    };

    match ws {
        Ok(ws) => ws.on_upgrade(move |socket| handle_socket(socket, state, actor)),
        Err(rejection) => rejection.into_response(),
    }
}

fn authenticate(state: &AppState, query: WsAuthQuery, headers: &HeaderMap) -> Result<Actor, AppError> {
    let token = query
        .token
        .or_else(|| {
            headers
                .get(AUTHORIZATION)
                .and_then(|value| value.to_str().ok())
                .and_then(bearer_token)
                .map(str::to_string)
        })
        .ok_or_else(|| AppError::Unauthorized("missing token".to_string()))?;

    state.identity.verify(&token)
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, actor: Actor) {
    let (mut sender, mut receiver) = socket.split();
    let (connection_id, outbound) = state.rooms.connect(actor);

    info!(connection_id, user_id = %actor.user_id, role = ?actor.role, "websocket client connected");

    let mut send_task = tokio::spawn(async move {
        let mut outbound = ReceiverStream::new(outbound);
        while let Some(payload) = outbound.next().await {
            if sender.send(Message::Text(payload.to_string())).await.is_err() {
                break;
            }
        }
    });

    let recv_state = Arc::clone(&state);
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            let text = match message {
                Message::Text(text) => text,
                Message::Close(_) => break,
                _ => continue,
            };

            let reply = match serde_json::from_str::<ClientMessage>(&text) {
                Ok(message) => recv_state
                    .subscriptions
                    .handle(connection_id, &actor, message),
                Err(err) => Some(ServerMessage::error(format!("unrecognised message: {err}"))),
            };

            let Some(reply) = reply else {
                continue;
            };
            match serde_json::to_string(&reply) {
                Ok(json) => {
                    recv_state.rooms.send_to(connection_id, json.into());
                }
                Err(err) => warn!(error = %err, "failed to serialize ws reply"),
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.rooms.disconnect(connection_id);
    info!(connection_id, "websocket client disconnected");
}

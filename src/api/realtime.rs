use crate::api::AppState;
use crate::domain::auth::Claims;
use crate::domain::realtime::RealtimeEvent;
use crate::error::AppError;
use crate::services::realtime::event_stream;
use axum::{
    extract::{
        Path, Query, State,
        ws::{CloseFrame, Message as WsMessage, WebSocket, WebSocketUpgrade, close_code},
    },
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::Instrument;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    token: String,
}

/// Control frames sent alongside events.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ControlFrame {
    /// Events were dropped; the client must reload through the list endpoints.
    Lagged { missed: u64 },
}

fn authenticate(params: &WsParams, state: &AppState) -> Result<Uuid, AppError> {
    Claims::decode(&params.token, &state.config.auth.jwt_secret, &state.config.auth.jwt_audience)
        .map(|claims| claims.sub)
        .inspect_err(|_| tracing::warn!("WebSocket handshake failed: invalid token"))
}

pub async fn conversation_messages(
    ws: WebSocketUpgrade,
    Path(conversation_id): Path<Uuid>,
    Query(params): Query<WsParams>,
    State(state): State<AppState>,
) -> Response {
    let user_id = match authenticate(&params, &state) {
        Ok(id) => id,
        Err(e) => return e.into_response(),
    };
    let events = match state.conversation_service.subscribe_messages(conversation_id, user_id).await {
        Ok(rx) => rx,
        Err(e) => return e.into_response(),
    };

    let span = tracing::info_span!("realtime_session", %user_id, topic = "conversation", %conversation_id);
    ws.on_upgrade(move |socket| forward_events(socket, events, state.shutdown_rx).instrument(span))
}

pub async fn user_conversations(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    State(state): State<AppState>,
) -> Response {
    let user_id = match authenticate(&params, &state) {
        Ok(id) => id,
        Err(e) => return e.into_response(),
    };
    let events = state.conversation_service.subscribe_conversations(user_id);

    let span = tracing::info_span!("realtime_session", %user_id, topic = "user_conversations");
    ws.on_upgrade(move |socket| forward_events(socket, events, state.shutdown_rx).instrument(span))
}

pub async fn notifications(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    State(state): State<AppState>,
) -> Response {
    let user_id = match authenticate(&params, &state) {
        Ok(id) => id,
        Err(e) => return e.into_response(),
    };
    let events = state.notification_service.subscribe(user_id);

    let span = tracing::info_span!("realtime_session", %user_id, topic = "notifications");
    ws.on_upgrade(move |socket| forward_events(socket, events, state.shutdown_rx).instrument(span))
}

/// Pushes every event of the subscription to the socket as a JSON text frame until
/// either side closes or the server shuts down. Inbound frames are ignored.
async fn forward_events(
    socket: WebSocket,
    events: broadcast::Receiver<RealtimeEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    let (mut sink, mut inbound) = socket.split();
    let mut events = event_stream(events);
    tracing::debug!("Realtime session opened");

    loop {
        let frame = tokio::select! {
            _ = shutdown.changed() => {
                let frame = CloseFrame { code: close_code::AWAY, reason: "Server shutting down".into() };
                let _ = sink.send(WsMessage::Close(Some(frame))).await;
                break;
            }
            incoming = inbound.next() => match incoming {
                Some(Ok(WsMessage::Close(_)) | Err(_)) | None => break,
                Some(Ok(_)) => continue,
            },
            event = events.next() => match event {
                Some(Ok(event)) => serde_json::to_string(&event),
                Some(Err(BroadcastStreamRecvError::Lagged(missed))) => {
                    tracing::warn!(missed, "Realtime session lagged");
                    serde_json::to_string(&ControlFrame::Lagged { missed })
                }
                None => break,
            },
        };

        match frame {
            Ok(text) => {
                if sink.send(WsMessage::Text(text.into())).await.is_err() {
                    break;
                }
            }
            Err(e) => tracing::error!(error = %e, "Failed to encode realtime frame"),
        }
    }

    tracing::debug!("Realtime session closed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lagged_frame_shape() {
        let value = serde_json::to_value(ControlFrame::Lagged { missed: 3 }).expect("serialize");
        assert_eq!(value, serde_json::json!({ "type": "lagged", "missed": 3 }));
    }
}

//! Live conversation stream over WebSocket.
//!
//! GET /ws/conversations/:id?token=...
//!
//! When `AUTH_TOKEN` is configured the viewer must present it, either as the
//! `X-WS-Token` header (preferred) or the `?token=` query parameter. Browsers
//! cannot set headers on a WebSocket handshake, hence the query fallback.
//! Rejection happens before the upgrade, so no socket or subscription is
//! ever created for an unauthorized viewer.

use async_trait::async_trait;
use axum::{
    extract::{
        ws::{
            rejection::WebSocketUpgradeRejection, CloseFrame, Message, WebSocket, WebSocketUpgrade,
        },
        Extension, Path, Query,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::common::{ConversationId, TransportError};
use crate::domains::conversations::events::Event;
use crate::kernel::{viewer_credential, TransportSink, TransportSource};
use crate::server::app::AxumAppState;
use crate::server::error::ApiError;

#[derive(Deserialize)]
pub struct LiveQuery {
    token: Option<String>,
}

/// WebSocket upgrade handler.
pub async fn live_handler(
    Extension(state): Extension<AxumAppState>,
    Path(id): Path<String>,
    Query(query): Query<LiveQuery>,
    headers: HeaderMap,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let Ok(conversation_id) = ConversationId::parse(id.trim()) else {
        return ApiError::bad_request(format!("invalid conversation id: {}", id)).into_response();
    };

    let header = headers.get("x-ws-token").and_then(|v| v.to_str().ok());
    if state
        .live
        .authorize(viewer_credential(header, query.token.as_deref()))
        .is_err()
    {
        debug!(conversation_id = %conversation_id, "viewer rejected");
        return (StatusCode::UNAUTHORIZED, "unauthorized").into_response();
    }

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    let live = state.live.clone();
    let cancel = state.shutdown.child_token();
    ws.on_upgrade(move |socket| async move {
        let (sink, stream) = socket.split();
        if let Err(e) = live
            .run(conversation_id, WsSink(sink), WsSource(stream), cancel)
            .await
        {
            warn!(conversation_id = %conversation_id, error = %e, "live stream failed to start");
        }
    })
}

/// Outgoing half: events as JSON text frames.
pub struct WsSink(SplitSink<WebSocket, Message>);

#[async_trait]
impl TransportSink for WsSink {
    async fn send_event(&mut self, event: &Event) -> Result<(), TransportError> {
        let text = serde_json::to_string(event)?;
        self.0
            .send(Message::Text(text))
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }

    async fn close(&mut self, code: u16, reason: &str) -> Result<(), TransportError> {
        self.0
            .send(Message::Close(Some(CloseFrame {
                code,
                reason: reason.to_string().into(),
            })))
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }
}

/// Incoming half. Control frames are handled by axum; text that is not JSON
/// comes through as a JSON string.
pub struct WsSource(SplitStream<WebSocket>);

#[async_trait]
impl TransportSource for WsSource {
    async fn next_frame(&mut self) -> Result<Option<serde_json::Value>, TransportError> {
        loop {
            let frame = match self.0.next().await {
                None | Some(Ok(Message::Close(_))) => return Ok(None),
                Some(Err(e)) => return Err(TransportError::Io(e.to_string())),
                Some(Ok(frame)) => frame,
            };

            match frame {
                Message::Text(text) => {
                    let value = serde_json::from_str(&text)
                        .unwrap_or(serde_json::Value::String(text));
                    return Ok(Some(value));
                }
                Message::Binary(bytes) => {
                    return Ok(Some(
                        serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null),
                    ))
                }
                Message::Ping(_) | Message::Pong(_) | Message::Close(_) => continue,
            }
        }
    }
}

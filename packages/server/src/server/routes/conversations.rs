use axum::{
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::common::{ConversationId, MessageId};
use crate::domains::conversations::actions::{
    create_conversation, handle_user_message, start_debate, DEFAULT_CONVERSATION_TITLE,
    DEFAULT_USER_ID,
};
use crate::domains::conversations::models::Conversation;
use crate::server::app::AxumAppState;
use crate::server::error::{ApiError, ApiResult};

/// How many conversations the list endpoint returns.
const RECENT_CONVERSATIONS: i64 = 100;

#[derive(Deserialize, Default)]
pub struct CreateConversationRequest {
    pub title: Option<String>,
}

#[derive(Deserialize)]
pub struct StartDebateRequest {
    pub participants: Vec<String>,
    #[serde(default)]
    pub rounds: i64,
}

#[derive(Serialize)]
pub struct AcceptedResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<MessageId>,
    pub status: &'static str,
}

fn parse_conversation_id(raw: &str) -> ApiResult<ConversationId> {
    ConversationId::parse(raw.trim())
        .map_err(|_| ApiError::bad_request(format!("invalid conversation id: {}", raw)))
}

/// POST /api/v1/conversations
pub async fn create_conversation_handler(
    Extension(state): Extension<AxumAppState>,
    payload: Option<Json<CreateConversationRequest>>,
) -> ApiResult<(StatusCode, Json<Conversation>)> {
    let title = payload
        .and_then(|Json(p)| p.title)
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_CONVERSATION_TITLE.to_string());

    let conversation = create_conversation(&title, &state.deps).await?;
    Ok((StatusCode::CREATED, Json(conversation)))
}

/// GET /api/v1/conversations - most recent first
pub async fn list_conversations_handler(
    Extension(state): Extension<AxumAppState>,
) -> ApiResult<Json<Vec<Conversation>>> {
    Ok(Json(
        state
            .deps
            .store
            .list_conversations(RECENT_CONVERSATIONS)
            .await?,
    ))
}

/// POST /api/v1/conversations/:id/messages
///
/// The raw body is the message content; `X-User-Id` names the sender.
pub async fn post_message_handler(
    Extension(state): Extension<AxumAppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: String,
) -> ApiResult<(StatusCode, Json<AcceptedResponse>)> {
    let conversation_id = parse_conversation_id(&id)?;
    let user_id = headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or(DEFAULT_USER_ID);

    let accepted = handle_user_message(conversation_id, user_id, &body, &state.deps).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(AcceptedResponse {
            message_id: Some(accepted.message.id),
            status: "accepted",
        }),
    ))
}

/// POST /api/v1/conversations/:id/debate
pub async fn start_debate_handler(
    Extension(state): Extension<AxumAppState>,
    Path(id): Path<String>,
    Json(payload): Json<StartDebateRequest>,
) -> ApiResult<(StatusCode, Json<AcceptedResponse>)> {
    let conversation_id = parse_conversation_id(&id)?;

    // The debate keeps running after the response; its handle is not needed.
    let _debate = start_debate(
        conversation_id,
        &payload.participants,
        payload.rounds,
        &state.deps,
    )
    .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(AcceptedResponse {
            message_id: None,
            status: "accepted",
        }),
    ))
}

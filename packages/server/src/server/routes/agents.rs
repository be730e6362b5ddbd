use axum::{extract::Extension, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::common::AgentId;
use crate::domains::agents::Agent;
use crate::server::app::AxumAppState;
use crate::server::error::{ApiError, ApiResult};
use crate::server::middleware::AdminUser;

#[derive(Deserialize)]
pub struct CreateAgentRequest {
    pub name: String,
    #[serde(default)]
    pub persona: String,
    #[serde(default)]
    pub behavior_profile: Option<serde_json::Value>,
}

#[derive(Serialize)]
pub struct CreatedAgent {
    pub id: AgentId,
}

/// GET /api/v1/agents - the roster in roster order
pub async fn list_agents_handler(
    Extension(state): Extension<AxumAppState>,
) -> ApiResult<Json<Vec<Agent>>> {
    Ok(Json(state.deps.store.list_agents().await?))
}

/// POST /api/v1/agents - admin only
pub async fn create_agent_handler(
    Extension(state): Extension<AxumAppState>,
    Extension(admin): Extension<AdminUser>,
    Json(payload): Json<CreateAgentRequest>,
) -> ApiResult<(StatusCode, Json<CreatedAgent>)> {
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(ApiError::bad_request("agent name must not be empty"));
    }

    let profile = payload
        .behavior_profile
        .unwrap_or_else(|| serde_json::json!({}));
    let agent = state
        .deps
        .store
        .create_agent(name, payload.persona.trim(), profile)
        .await?;

    info!(agent_id = %agent.id, created_by = %admin.subject, "agent created");
    Ok((StatusCode::CREATED, Json(CreatedAgent { id: agent.id })))
}

use axum::{extract::Extension, http::StatusCode, Json};
use serde::Serialize;

use crate::server::app::AxumAppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    store: StoreHealth,
    event_bus: String,
    background_tasks: usize,
}

#[derive(Serialize)]
pub struct StoreHealth {
    backend: &'static str,
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Health check endpoint
///
/// Checks:
/// - Store connectivity and responsiveness
/// - Which event bus back-end is wired in
///
/// Returns 200 OK if the store answers, 503 Service Unavailable otherwise.
pub async fn health_handler(
    Extension(state): Extension<AxumAppState>,
) -> (StatusCode, Json<HealthResponse>) {
    let store_health = match tokio::time::timeout(
        std::time::Duration::from_secs(5),
        state.deps.store.list_conversations(1),
    )
    .await
    {
        Ok(Ok(_)) => StoreHealth {
            backend: state.backends.store,
            status: "ok".to_string(),
            error: None,
        },
        Ok(Err(e)) => StoreHealth {
            backend: state.backends.store,
            status: "error".to_string(),
            error: Some(format!("Query failed: {}", e)),
        },
        Err(_) => StoreHealth {
            backend: state.backends.store,
            status: "error".to_string(),
            error: Some("Query timeout (>5s)".to_string()),
        },
    };

    let is_healthy = store_health.status == "ok";
    let status_code = if is_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status_code,
        Json(HealthResponse {
            status: if is_healthy { "healthy" } else { "unhealthy" }.to_string(),
            store: store_health,
            event_bus: state.backends.bus.to_string(),
            background_tasks: state.deps.supervisor.active(),
        }),
    )
}

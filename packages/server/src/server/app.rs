//! Application setup and server configuration.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::Extension,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderName, Method,
    },
    middleware,
    routing::{get, post},
    Router,
};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::domains::auth::JwtService;
use crate::kernel::{LiveBridge, ServerDeps};
use crate::server::middleware::require_admin;
use crate::server::routes::{
    create_agent_handler, create_conversation_handler, health_handler, list_agents_handler,
    list_conversations_handler, live_handler, post_message_handler, start_debate_handler,
};

/// Which back-ends the process was started with, for the health check.
#[derive(Debug, Clone, Copy)]
pub struct Backends {
    pub store: &'static str,
    pub bus: &'static str,
}

/// Shared application state
#[derive(Clone)]
pub struct AxumAppState {
    pub deps: ServerDeps,
    pub live: LiveBridge,
    pub jwt_service: Arc<JwtService>,
    /// Cancelled on shutdown; every live viewer holds a child token.
    pub shutdown: CancellationToken,
    pub backends: Backends,
}

impl AxumAppState {
    pub fn new(
        deps: ServerDeps,
        jwt_service: Arc<JwtService>,
        auth_token: Option<String>,
        backends: Backends,
    ) -> Self {
        Self {
            live: deps.live_bridge(auth_token),
            deps,
            jwt_service,
            shutdown: CancellationToken::new(),
            backends,
        }
    }
}

/// Build the Axum application router
pub fn build_app(state: AxumAppState) -> Router {
    // CORS configuration - allow any origin for development
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            AUTHORIZATION,
            CONTENT_TYPE,
            HeaderName::from_static("x-user-id"),
            HeaderName::from_static("x-ws-token"),
        ]);

    // Clone jwt_service for middleware closure
    let jwt_service = state.jwt_service.clone();
    let create_agent = post(create_agent_handler).route_layer(middleware::from_fn(
        move |req, next| require_admin(jwt_service.clone(), req, next),
    ));

    let api = Router::new()
        .route("/agents", get(list_agents_handler).merge(create_agent))
        .route(
            "/conversations",
            post(create_conversation_handler).get(list_conversations_handler),
        )
        .route("/conversations/:id/messages", post(post_message_handler))
        .route("/conversations/:id/debate", post(start_debate_handler))
        .layer(TimeoutLayer::new(Duration::from_secs(30)));

    Router::new()
        .route("/health", get(health_handler))
        .nest("/api/v1", api)
        // Long-lived; kept out of the request timeout
        .route("/ws/conversations/:id", get(live_handler))
        // Middleware layers (applied in reverse order - last added runs first)
        .layer(Extension(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

//! Test harness for integration testing.
//!
//! Everything runs on the in-memory store and the recording bus, so tests
//! need no containers. Run with: RUST_LOG=debug cargo test -- --nocapture

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use social_core::common::AgentId;
use social_core::config::OrchestrationSettings;
use social_core::domains::agents::Agent;
use social_core::domains::auth::{JwtService, ADMIN_ROLE};
use social_core::domains::conversations::models::Conversation;
use social_core::domains::conversations::{Event, Topic};
use social_core::kernel::{BaseConversationStore, ServerDeps, TestDependencies};
use social_core::server::{build_app, AxumAppState, Backends};
use tower::ServiceExt;

pub const TEST_JWT_SECRET: &str = "test-secret";
pub const TEST_JWT_ISSUER: &str = "agent-forum-tests";
pub const TEST_WS_TOKEN: &str = "viewer-secret";

/// Respects RUST_LOG; safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Default settings with a custom pause between agent messages.
pub fn settings_with_delay(delay: Duration) -> OrchestrationSettings {
    OrchestrationSettings {
        response_delay: delay,
        ..OrchestrationSettings::default()
    }
}

/// A roster, its deps and one empty conversation.
pub struct Scenario {
    pub test: TestDependencies,
    pub deps: ServerDeps,
    pub conversation: Conversation,
    pub topic: Topic,
}

impl Scenario {
    pub async fn with_agents(names: &[&str]) -> Self {
        Self::build(TestDependencies::new().with_agents(names)).await
    }

    pub async fn build(test: TestDependencies) -> Self {
        init_tracing();
        let deps = test.server_deps();
        let conversation = deps
            .store
            .create_conversation("Integration")
            .await
            .expect("Failed to create conversation");
        let topic = Topic::conversation(conversation.id);

        Self {
            test,
            deps,
            conversation,
            topic,
        }
    }

    pub async fn agent(&self, name: &str) -> Agent {
        self.test
            .agents()
            .await
            .into_iter()
            .find(|a| a.name == name)
            .unwrap_or_else(|| panic!("no agent named {}", name))
    }

    pub async fn agent_id(&self, name: &str) -> AgentId {
        self.agent(name).await.id
    }

    /// Senders of every published message.created, in publish order.
    pub fn published_senders(&self) -> Vec<String> {
        self.test
            .bus
            .published_of_kind("message.created")
            .into_iter()
            .filter_map(|p| match p.event {
                Event::MessageCreated { sender, .. } => Some(sender),
                _ => None,
            })
            .collect()
    }

    /// Yields until a live viewer has subscribed to the conversation topic.
    pub async fn wait_for_viewers(&self, count: usize) {
        for _ in 0..1_000 {
            if self.test.bus.hub().subscriber_count(&self.topic) >= count {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("viewers never subscribed");
    }
}

/// The HTTP app over in-memory deps.
pub struct TestApp {
    pub router: Router,
    pub state: AxumAppState,
    pub jwt: Arc<JwtService>,
}

impl TestApp {
    pub fn new(test: &TestDependencies, ws_token: Option<&str>) -> Self {
        init_tracing();
        let jwt = Arc::new(JwtService::new(TEST_JWT_SECRET, TEST_JWT_ISSUER.to_string()));
        let state = AxumAppState::new(
            test.server_deps(),
            jwt.clone(),
            ws_token.map(str::to_string),
            Backends {
                store: "memory",
                bus: "in_process",
            },
        );

        Self {
            router: build_app(state.clone()),
            state,
            jwt,
        }
    }

    pub fn admin_token(&self) -> String {
        self.jwt
            .create_token("admin-1", ADMIN_ROLE, chrono::Duration::hours(1))
            .expect("Failed to create admin token")
    }

    pub fn member_token(&self) -> String {
        self.jwt
            .create_token("member-1", "member", chrono::Duration::hours(1))
            .expect("Failed to create member token")
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Failed to read body");
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }
}

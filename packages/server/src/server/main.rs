// Main entry point for the conversation server

use std::sync::Arc;

use anyhow::{Context, Result};
use social_core::domains::agents::SimpleDecider;
use social_core::domains::auth::JwtService;
use social_core::kernel::{
    BaseConversationStore, BaseEventBus, InMemoryStore, NatsEventBus, PostgresStore, ServerDeps,
    StreamHub,
};
use social_core::server::{build_app, AxumAppState, Backends};
use social_core::Config;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,social_core=debug,sqlx=warn".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_line_number(true),
        )
        .init();

    tracing::info!("Starting conversation server");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!("Configuration loaded");

    let (store, store_backend): (Arc<dyn BaseConversationStore>, &'static str) =
        match &config.database_url {
            Some(url) => {
                tracing::info!("Connecting to database...");
                let pool = PgPoolOptions::new()
                    .max_connections(10)
                    .connect(url)
                    .await
                    .context("Failed to connect to database")?;
                tracing::info!("Database connected");

                tracing::info!("Running database migrations...");
                sqlx::migrate!("./migrations")
                    .run(&pool)
                    .await
                    .context("Failed to run migrations")?;
                tracing::info!("Migrations complete");

                (Arc::new(PostgresStore::new(pool)), "postgres")
            }
            None => {
                tracing::warn!("DATABASE_URL not set, conversations live in memory only");
                (Arc::new(InMemoryStore::new()), "memory")
            }
        };

    let (bus, bus_backend): (Arc<dyn BaseEventBus>, &'static str) = match &config.nats_url {
        Some(url) => {
            tracing::info!("Connecting to NATS...");
            let bus = NatsEventBus::connect(url, config.subscription_capacity)
                .await
                .context("Failed to connect to NATS")?;
            tracing::info!("NATS connected");
            (Arc::new(bus), "nats")
        }
        None => {
            tracing::info!("NATS_URL not set, using the in-process event bus");
            (
                Arc::new(StreamHub::with_capacity(config.subscription_capacity)),
                "in_process",
            )
        }
    };

    let deps = ServerDeps::new(
        store,
        bus,
        Arc::new(SimpleDecider),
        config.orchestration(),
    );
    let jwt_service = Arc::new(JwtService::new(
        &config.jwt_secret,
        config.jwt_issuer.clone(),
    ));
    let state = AxumAppState::new(
        deps.clone(),
        jwt_service,
        config.auth_token.clone(),
        Backends {
            store: store_backend,
            bus: bus_backend,
        },
    );
    if !state.live.requires_auth() {
        tracing::warn!("AUTH_TOKEN not set, live viewers are not authenticated");
    }
    let shutdown = state.shutdown.clone();
    let app = build_app(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("Starting server on {}", addr);
    tracing::info!("Health check: http://localhost:{}/health", config.port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
            // Live viewers get a going-away close before the listener drains
            shutdown.cancel();
        })
        .await
        .context("Server error")?;

    tracing::info!("Waiting for background rounds to stop...");
    deps.supervisor.shutdown().await;
    tracing::info!("Shutdown complete");

    Ok(())
}

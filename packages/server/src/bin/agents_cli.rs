//! CLI for roster administration
//!
//! Seeds agents into the configured database and mints admin tokens for the
//! HTTP API. Output is JSON so scripts can parse it.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use social_core::config::Config;
use social_core::domains::auth::{JwtService, ADMIN_ROLE};
use social_core::kernel::{BaseConversationStore, PostgresStore};
use sqlx::postgres::PgPoolOptions;

#[derive(Parser)]
#[command(name = "agents_cli")]
#[command(about = "Agent roster and token administration")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add an agent to the roster
    CreateAgent {
        name: String,
        #[arg(long, default_value = "")]
        persona: String,
        /// Behavior profile as a JSON object
        #[arg(long)]
        profile: Option<String>,
    },

    /// List the roster in roster order
    ListAgents,

    /// Mint a signed token for the HTTP API
    GenToken {
        subject: String,
        #[arg(long, default_value_t = 30)]
        days: i64,
        #[arg(long, default_value = ADMIN_ROLE)]
        role: String,
    },
}

#[derive(Serialize)]
struct TokenOutput {
    subject: String,
    role: String,
    token: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env().context("Failed to load configuration")?;

    match cli.command {
        Commands::CreateAgent {
            name,
            persona,
            profile,
        } => {
            if name.trim().is_empty() {
                bail!("agent name must not be empty");
            }
            let profile = match profile {
                Some(raw) => serde_json::from_str(&raw).context("--profile is not valid JSON")?,
                None => serde_json::json!({}),
            };

            let store = connect(&config).await?;
            let agent = store
                .create_agent(name.trim(), persona.trim(), profile)
                .await
                .context("Failed to create agent")?;
            println!("{}", serde_json::to_string_pretty(&agent)?);
        }
        Commands::ListAgents => {
            let store = connect(&config).await?;
            let agents = store.list_agents().await.context("Failed to list agents")?;
            println!("{}", serde_json::to_string_pretty(&agents)?);
        }
        Commands::GenToken {
            subject,
            days,
            role,
        } => {
            let jwt = JwtService::new(&config.jwt_secret, config.jwt_issuer.clone());
            let token = jwt.create_token(&subject, &role, chrono::Duration::days(days))?;
            println!(
                "{}",
                serde_json::to_string_pretty(&TokenOutput {
                    subject,
                    role,
                    token,
                })?
            );
        }
    }

    Ok(())
}

/// The roster only persists in Postgres; an in-memory server starts empty.
async fn connect(config: &Config) -> Result<PostgresStore> {
    let Some(url) = &config.database_url else {
        bail!("DATABASE_URL must be set; the in-memory store does not outlive the server process");
    };

    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(url)
        .await
        .context("Failed to connect to database")?;
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;

    Ok(PostgresStore::new(pool))
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::PgPool;

use crate::common::{AgentId, StoreError};

/// A persona that takes part in conversations.
///
/// The orchestration core only reads agents; the roster is owned by the
/// store. `behavior_profile` is opaque here and only interpreted by a
/// decision policy.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Agent {
    pub id: AgentId,
    pub name: String,
    pub persona: String,
    pub behavior_profile: Json<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl Agent {
    /// Builds an agent that has not been persisted yet.
    pub fn new(name: impl Into<String>, persona: impl Into<String>) -> Self {
        Self {
            id: AgentId::new(),
            name: name.into(),
            persona: persona.into(),
            behavior_profile: Json(serde_json::Value::Object(Default::default())),
            created_at: Utc::now(),
        }
    }

    pub fn with_behavior_profile(mut self, profile: serde_json::Value) -> Self {
        self.behavior_profile = Json(profile);
        self
    }

    /// Full roster in roster order (creation order).
    pub async fn find_all(pool: &PgPool) -> Result<Vec<Self>, StoreError> {
        let agents = sqlx::query_as::<_, Agent>(
            "SELECT id, name, persona, behavior_profile, created_at FROM agents ORDER BY created_at ASC, id ASC",
        )
        .fetch_all(pool)
        .await?;
        Ok(agents)
    }

    pub async fn create(
        name: &str,
        persona: &str,
        behavior_profile: serde_json::Value,
        pool: &PgPool,
    ) -> Result<Self, StoreError> {
        let agent = sqlx::query_as::<_, Agent>(
            r#"
            INSERT INTO agents (id, name, persona, behavior_profile)
            VALUES ($1, $2, $3, $4)
            RETURNING id, name, persona, behavior_profile, created_at
            "#,
        )
        .bind(AgentId::new())
        .bind(name)
        .bind(persona)
        .bind(Json(behavior_profile))
        .fetch_one(pool)
        .await?;
        Ok(agent)
    }
}

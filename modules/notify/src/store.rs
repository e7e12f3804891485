//! The message store owned by the ingress.

use crate::error::StoreError;
use crate::models::Message;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;

/// Store contract for the ingress: one operation, one uniqueness rule.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Insert `msg` under the `(tenant_id, message_key)` uniqueness
    /// constraint. On conflict the existing record is returned with
    /// `duplicate = true`; the caller must not enqueue in that case.
    async fn create_message(&self, msg: Message) -> Result<(Message, bool), StoreError>;
}

const INSERT_MESSAGE: &str = r#"
INSERT INTO messages (id, tenant_id, message_key, channel, payload, template_id, status, created_at)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
ON CONFLICT (tenant_id, message_key) DO NOTHING
RETURNING id, tenant_id, message_key, channel, payload, template_id, status, created_at
"#;

const SELECT_MESSAGE: &str = r#"
SELECT id, tenant_id, message_key, channel, payload, template_id, status, created_at
FROM messages
WHERE tenant_id = $1 AND message_key = $2
"#;

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: String,
    tenant_id: String,
    message_key: String,
    channel: String,
    payload: serde_json::Value,
    template_id: String,
    status: String,
    created_at: DateTime<Utc>,
}

impl From<MessageRow> for Message {
    fn from(row: MessageRow) -> Self {
        Self {
            id: row.id,
            tenant_id: row.tenant_id,
            message_key: row.message_key,
            channel: row.channel,
            payload: row.payload,
            template_id: row.template_id,
            status: row.status,
            created_at: row.created_at,
        }
    }
}

pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect and apply migrations.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .idle_timeout(Some(Duration::from_secs(300)))
            .max_lifetime(Some(Duration::from_secs(1800)))
            .acquire_timeout(Duration::from_secs(10))
            .connect(database_url)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self::new(pool))
    }
}

#[async_trait]
impl MessageStore for PostgresStore {
    async fn create_message(&self, msg: Message) -> Result<(Message, bool), StoreError> {
        let inserted: Option<MessageRow> = sqlx::query_as(INSERT_MESSAGE)
            .bind(&msg.id)
            .bind(&msg.tenant_id)
            .bind(&msg.message_key)
            .bind(&msg.channel)
            .bind(&msg.payload)
            .bind(&msg.template_id)
            .bind(&msg.status)
            .bind(msg.created_at)
            .fetch_optional(&self.pool)
            .await?;

        match inserted {
            Some(row) => Ok((row.into(), false)),
            None => {
                // The constraint swallowed the insert: read the original back.
                let existing: MessageRow = sqlx::query_as(SELECT_MESSAGE)
                    .bind(&msg.tenant_id)
                    .bind(&msg.message_key)
                    .fetch_one(&self.pool)
                    .await?;
                Ok((existing.into(), true))
            }
        }
    }
}

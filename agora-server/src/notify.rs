use agora_api::{DeleteCommentRelations, Error as ApiError, Notifier};

/// Publishes messages as PostgreSQL notifications on a fixed channel
pub struct PgNotifier {
    pool: sqlx::PgPool,
    channel: String,
}

impl PgNotifier {
    pub fn new(pool: sqlx::PgPool, channel: String) -> PgNotifier {
        PgNotifier { pool, channel }
    }
}

#[async_trait::async_trait]
impl Notifier for PgNotifier {
    async fn publish(&self, msg: &DeleteCommentRelations) -> Result<(), ApiError> {
        let payload = serde_json::to_string(msg)
            .map_err(|e| ApiError::PublishFailure(format!("serializing message: {e}")))?;
        sqlx::query("SELECT pg_notify($1, $2)")
            .bind(self.channel.as_str())
            .bind(payload)
            .execute(&self.pool)
            .await
            .map_err(|e| ApiError::PublishFailure(e.to_string()))?;
        tracing::debug!(channel = %self.channel, ?msg, "published message");
        Ok(())
    }
}

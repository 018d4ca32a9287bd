use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;

use zapys_core::domain::BusinessId;

use super::{RepositoryError, SettingsRepository};
use crate::DbPool;

/// Generic per-business key-value settings (`ai_provider`, `ai_base_url`,
/// `ai_model`, `ai_disabled`). Consumers cache reads; see the agent crate.
pub struct SqlSettingsRepository {
    pool: DbPool,
}

impl SqlSettingsRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SettingsRepository for SqlSettingsRepository {
    async fn get(
        &self,
        business_id: &BusinessId,
        key: &str,
    ) -> Result<Option<String>, RepositoryError> {
        let row = sqlx::query(
            "SELECT value FROM business_settings WHERE business_id = ? AND key = ? LIMIT 1",
        )
        .bind(&business_id.0)
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|value| value.get("value")))
    }

    async fn set(
        &self,
        business_id: &BusinessId,
        key: &str,
        value: &str,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO business_settings (business_id, key, value, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(business_id, key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&business_id.0)
        .bind(key)
        .bind(value)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use zapys_core::domain::conversation::{Turn, TurnMetadata, TurnRole};
use zapys_core::domain::BusinessId;

use super::{ConversationRepository, RepositoryError};
use crate::DbPool;

pub struct SqlConversationRepository {
    pool: DbPool,
}

impl SqlConversationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConversationRepository for SqlConversationRepository {
    async fn append(&self, turn: Turn) -> Result<(), RepositoryError> {
        let metadata = serde_json::to_string(&turn.metadata)
            .map_err(|error| RepositoryError::Decode(error.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO conversation_turns (
                business_id, session_id, role, message, metadata, created_at
            ) VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&turn.business_id.0)
        .bind(&turn.session_id)
        .bind(turn.role.as_str())
        .bind(&turn.message)
        .bind(&metadata)
        .bind(turn.metadata.timestamp.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn last_turns(
        &self,
        business_id: &BusinessId,
        session_id: &str,
        limit: i64,
    ) -> Result<Vec<Turn>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM conversation_turns
            WHERE business_id = ? AND session_id = ?
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(&business_id.0)
        .bind(session_id)
        .bind(limit.max(1))
        .fetch_all(&self.pool)
        .await?;

        let mut turns =
            rows.iter().map(turn_from_row).collect::<Result<Vec<_>, RepositoryError>>()?;
        turns.reverse();
        Ok(turns)
    }
}

fn turn_from_row(row: &SqliteRow) -> Result<Turn, RepositoryError> {
    let role_raw = row.get::<String, _>("role");
    let role = TurnRole::parse(&role_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown role `{role_raw}`")))?;
    let metadata: TurnMetadata = serde_json::from_str(&row.get::<String, _>("metadata"))
        .map_err(|error| RepositoryError::Decode(error.to_string()))?;

    Ok(Turn {
        business_id: BusinessId(row.get("business_id")),
        session_id: row.get("session_id"),
        role,
        message: row.get("message"),
        metadata,
    })
}

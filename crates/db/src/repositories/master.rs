use std::collections::BTreeMap;

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use zapys_core::domain::master::{DayOverride, Master, MasterId, WorkingHours};
use zapys_core::domain::BusinessId;

use super::client::parse_timestamp;
use super::{MasterRepository, RepositoryError};
use crate::DbPool;

pub struct SqlMasterRepository {
    pool: DbPool,
}

impl SqlMasterRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn fetch(
        &self,
        business_id: &BusinessId,
        id: &MasterId,
    ) -> Result<Option<Master>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM masters WHERE business_id = ? AND id = ? LIMIT 1")
            .bind(&business_id.0)
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|value| master_from_row(&value)).transpose()
    }

    async fn store_overrides(
        &self,
        business_id: &BusinessId,
        id: &MasterId,
        overrides: &BTreeMap<String, DayOverride>,
    ) -> Result<(), RepositoryError> {
        let encoded = serde_json::to_string(overrides)
            .map_err(|error| RepositoryError::Decode(error.to_string()))?;
        sqlx::query("UPDATE masters SET schedule_overrides = ? WHERE business_id = ? AND id = ?")
            .bind(&encoded)
            .bind(&business_id.0)
            .bind(&id.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl MasterRepository for SqlMasterRepository {
    async fn create(&self, master: Master) -> Result<Master, RepositoryError> {
        let working_hours = serde_json::to_string(&master.working_hours)
            .map_err(|error| RepositoryError::Decode(error.to_string()))?;
        let overrides = serde_json::to_string(&master.schedule_overrides)
            .map_err(|error| RepositoryError::Decode(error.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO masters (
                id, business_id, name, bio, working_hours,
                schedule_overrides, is_active, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&master.id.0)
        .bind(&master.business_id.0)
        .bind(&master.name)
        .bind(master.bio.as_deref())
        .bind(&working_hours)
        .bind(&overrides)
        .bind(i64::from(master.is_active))
        .bind(master.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(master)
    }

    async fn find_by_id(
        &self,
        business_id: &BusinessId,
        id: &MasterId,
    ) -> Result<Option<Master>, RepositoryError> {
        self.fetch(business_id, id).await
    }

    async fn find_by_name_fragment(
        &self,
        business_id: &BusinessId,
        fragment: &str,
    ) -> Result<Option<Master>, RepositoryError> {
        let pattern = format!("%{}%", fragment.trim());
        let row = sqlx::query(
            r#"
            SELECT * FROM masters
            WHERE business_id = ? AND is_active = 1 AND name LIKE ? COLLATE NOCASE
            ORDER BY created_at ASC, id ASC
            LIMIT 1
            "#,
        )
        .bind(&business_id.0)
        .bind(&pattern)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|value| master_from_row(&value)).transpose()
    }

    async fn update_profile(
        &self,
        business_id: &BusinessId,
        id: &MasterId,
        name: Option<String>,
        bio: Option<String>,
    ) -> Result<Option<Master>, RepositoryError> {
        sqlx::query(
            "UPDATE masters SET name = COALESCE(?, name), bio = COALESCE(?, bio) \
             WHERE business_id = ? AND id = ?",
        )
        .bind(name.as_deref())
        .bind(bio.as_deref())
        .bind(&business_id.0)
        .bind(&id.0)
        .execute(&self.pool)
        .await?;

        self.fetch(business_id, id).await
    }

    async fn set_working_hours(
        &self,
        business_id: &BusinessId,
        id: &MasterId,
        hours: WorkingHours,
    ) -> Result<Option<Master>, RepositoryError> {
        let encoded = serde_json::to_string(&hours)
            .map_err(|error| RepositoryError::Decode(error.to_string()))?;
        sqlx::query("UPDATE masters SET working_hours = ? WHERE business_id = ? AND id = ?")
            .bind(&encoded)
            .bind(&business_id.0)
            .bind(&id.0)
            .execute(&self.pool)
            .await?;

        self.fetch(business_id, id).await
    }

    async fn set_override(
        &self,
        business_id: &BusinessId,
        id: &MasterId,
        date: &str,
        day: DayOverride,
    ) -> Result<Option<Master>, RepositoryError> {
        let Some(mut master) = self.fetch(business_id, id).await? else {
            return Ok(None);
        };
        master.schedule_overrides.insert(date.to_string(), day);
        self.store_overrides(business_id, id, &master.schedule_overrides).await?;
        Ok(Some(master))
    }

    async fn clear_override(
        &self,
        business_id: &BusinessId,
        id: &MasterId,
        date: &str,
    ) -> Result<Option<Master>, RepositoryError> {
        let Some(mut master) = self.fetch(business_id, id).await? else {
            return Ok(None);
        };
        master.schedule_overrides.remove(date);
        self.store_overrides(business_id, id, &master.schedule_overrides).await?;
        Ok(Some(master))
    }

    async fn deactivate(
        &self,
        business_id: &BusinessId,
        id: &MasterId,
    ) -> Result<Option<Master>, RepositoryError> {
        sqlx::query("UPDATE masters SET is_active = 0 WHERE business_id = ? AND id = ?")
            .bind(&business_id.0)
            .bind(&id.0)
            .execute(&self.pool)
            .await?;

        self.fetch(business_id, id).await
    }

    async fn list_active(&self, business_id: &BusinessId) -> Result<Vec<Master>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM masters WHERE business_id = ? AND is_active = 1 \
             ORDER BY created_at ASC",
        )
        .bind(&business_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(master_from_row).collect()
    }
}

fn master_from_row(row: &SqliteRow) -> Result<Master, RepositoryError> {
    let working_hours: WorkingHours =
        serde_json::from_str(&row.get::<String, _>("working_hours"))
            .map_err(|error| RepositoryError::Decode(error.to_string()))?;
    let schedule_overrides: BTreeMap<String, DayOverride> =
        serde_json::from_str(&row.get::<String, _>("schedule_overrides"))
            .map_err(|error| RepositoryError::Decode(error.to_string()))?;

    Ok(Master {
        id: MasterId(row.get("id")),
        business_id: BusinessId(row.get("business_id")),
        name: row.get("name"),
        bio: row.get("bio"),
        working_hours,
        schedule_overrides,
        is_active: row.get::<i64, _>("is_active") != 0,
        created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
    })
}

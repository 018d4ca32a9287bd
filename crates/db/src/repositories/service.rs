use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use zapys_core::domain::service::{Service, ServiceId};
use zapys_core::domain::BusinessId;

use super::client::parse_timestamp;
use super::{RepositoryError, ServiceRepository};
use crate::DbPool;

pub struct SqlServiceRepository {
    pool: DbPool,
}

impl SqlServiceRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn fetch_by_exact_name(
        &self,
        business_id: &BusinessId,
        name: &str,
    ) -> Result<Option<Service>, RepositoryError> {
        let row = sqlx::query(
            "SELECT * FROM services WHERE business_id = ? AND lower(name) = lower(?) LIMIT 1",
        )
        .bind(&business_id.0)
        .bind(name.trim())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|value| service_from_row(&value)).transpose()
    }
}

#[async_trait]
impl ServiceRepository for SqlServiceRepository {
    async fn upsert_by_name(&self, service: Service) -> Result<Service, RepositoryError> {
        match self.fetch_by_exact_name(&service.business_id, &service.name).await? {
            Some(existing) => {
                sqlx::query(
                    "UPDATE services SET price = ?, duration_minutes = ?, \
                     category = COALESCE(?, category), is_active = 1 \
                     WHERE business_id = ? AND id = ?",
                )
                .bind(service.price)
                .bind(service.duration_minutes)
                .bind(service.category.as_deref())
                .bind(&service.business_id.0)
                .bind(&existing.id.0)
                .execute(&self.pool)
                .await?;

                self.fetch_by_exact_name(&service.business_id, &service.name).await?.ok_or_else(
                    || RepositoryError::Decode("updated service row is missing".to_string()),
                )
            }
            None => {
                sqlx::query(
                    r#"
                    INSERT INTO services (
                        id, business_id, name, price, duration_minutes,
                        category, is_active, created_at
                    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(&service.id.0)
                .bind(&service.business_id.0)
                .bind(&service.name)
                .bind(service.price)
                .bind(service.duration_minutes)
                .bind(service.category.as_deref())
                .bind(i64::from(service.is_active))
                .bind(service.created_at.to_rfc3339())
                .execute(&self.pool)
                .await?;

                Ok(service)
            }
        }
    }

    async fn find_by_name_fragment(
        &self,
        business_id: &BusinessId,
        fragment: &str,
    ) -> Result<Option<Service>, RepositoryError> {
        let pattern = format!("%{}%", fragment.trim());
        let row = sqlx::query(
            r#"
            SELECT * FROM services
            WHERE business_id = ? AND is_active = 1 AND name LIKE ? COLLATE NOCASE
            ORDER BY created_at ASC, id ASC
            LIMIT 1
            "#,
        )
        .bind(&business_id.0)
        .bind(&pattern)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|value| service_from_row(&value)).transpose()
    }

    async fn find_by_id(
        &self,
        business_id: &BusinessId,
        id: &ServiceId,
    ) -> Result<Option<Service>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM services WHERE business_id = ? AND id = ? LIMIT 1")
            .bind(&business_id.0)
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|value| service_from_row(&value)).transpose()
    }

    async fn deactivate(
        &self,
        business_id: &BusinessId,
        name: &str,
    ) -> Result<Option<Service>, RepositoryError> {
        sqlx::query(
            "UPDATE services SET is_active = 0 WHERE business_id = ? AND lower(name) = lower(?)",
        )
        .bind(&business_id.0)
        .bind(name.trim())
        .execute(&self.pool)
        .await?;

        self.fetch_by_exact_name(business_id, name).await
    }

    async fn list_active(
        &self,
        business_id: &BusinessId,
    ) -> Result<Vec<Service>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM services WHERE business_id = ? AND is_active = 1 \
             ORDER BY created_at ASC",
        )
        .bind(&business_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(service_from_row).collect()
    }
}

fn service_from_row(row: &SqliteRow) -> Result<Service, RepositoryError> {
    Ok(Service {
        id: ServiceId(row.get("id")),
        business_id: BusinessId(row.get("business_id")),
        name: row.get("name"),
        price: row.get("price"),
        duration_minutes: row.get("duration_minutes"),
        category: row.get("category"),
        is_active: row.get::<i64, _>("is_active") != 0,
        created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
    })
}

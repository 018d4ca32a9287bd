use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use zapys_core::domain::client::{Client, ClientId};
use zapys_core::domain::BusinessId;

use super::{ClientRepository, RepositoryError};
use crate::DbPool;

pub struct SqlClientRepository {
    pool: DbPool,
}

impl SqlClientRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn fetch_by_phone(
        &self,
        business_id: &BusinessId,
        phone: &str,
    ) -> Result<Option<Client>, RepositoryError> {
        let row = sqlx::query(
            "SELECT * FROM clients WHERE business_id = ? AND phone = ? LIMIT 1",
        )
        .bind(&business_id.0)
        .bind(phone)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|value| client_from_row(&value)).transpose()
    }
}

#[async_trait]
impl ClientRepository for SqlClientRepository {
    async fn upsert_by_phone(&self, client: Client) -> Result<Client, RepositoryError> {
        let tags = serde_json::to_string(&client.tags)
            .map_err(|error| RepositoryError::Decode(error.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO clients (
                id, business_id, name, phone, email, notes, tags,
                total_spent, total_appointments, last_appointment_date,
                status, is_active, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(business_id, phone) DO UPDATE SET
                name = excluded.name,
                email = COALESCE(excluded.email, clients.email),
                notes = COALESCE(excluded.notes, clients.notes),
                is_active = 1,
                status = 'active'
            "#,
        )
        .bind(&client.id.0)
        .bind(&client.business_id.0)
        .bind(&client.name)
        .bind(&client.phone)
        .bind(client.email.as_deref())
        .bind(client.notes.as_deref())
        .bind(&tags)
        .bind(client.total_spent)
        .bind(client.total_appointments)
        .bind(client.last_appointment_date.map(|value| value.to_rfc3339()))
        .bind(&client.status)
        .bind(i64::from(client.is_active))
        .bind(client.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        self.fetch_by_phone(&client.business_id, &client.phone).await?.ok_or_else(|| {
            RepositoryError::Decode("upserted client row is missing".to_string())
        })
    }

    async fn find_by_id(
        &self,
        business_id: &BusinessId,
        id: &ClientId,
    ) -> Result<Option<Client>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM clients WHERE business_id = ? AND id = ? LIMIT 1")
            .bind(&business_id.0)
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|value| client_from_row(&value)).transpose()
    }

    async fn find_by_phone(
        &self,
        business_id: &BusinessId,
        phone: &str,
    ) -> Result<Option<Client>, RepositoryError> {
        self.fetch_by_phone(business_id, phone).await
    }

    async fn search(
        &self,
        business_id: &BusinessId,
        query: &str,
        limit: i64,
    ) -> Result<Vec<Client>, RepositoryError> {
        let pattern = format!("%{}%", query.trim());
        let rows = sqlx::query(
            r#"
            SELECT * FROM clients
            WHERE business_id = ? AND is_active = 1
              AND (name LIKE ? COLLATE NOCASE OR phone LIKE ?)
            ORDER BY name
            LIMIT ?
            "#,
        )
        .bind(&business_id.0)
        .bind(&pattern)
        .bind(&pattern)
        .bind(limit.max(1))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(client_from_row).collect()
    }

    async fn append_tag(
        &self,
        business_id: &BusinessId,
        phone: &str,
        tag: &str,
    ) -> Result<Option<Client>, RepositoryError> {
        let Some(mut client) = self.fetch_by_phone(business_id, phone).await? else {
            return Ok(None);
        };

        if !client.tags.iter().any(|existing| existing == tag) {
            client.tags.push(tag.to_string());
            let tags = serde_json::to_string(&client.tags)
                .map_err(|error| RepositoryError::Decode(error.to_string()))?;
            sqlx::query("UPDATE clients SET tags = ? WHERE business_id = ? AND id = ?")
                .bind(&tags)
                .bind(&business_id.0)
                .bind(&client.id.0)
                .execute(&self.pool)
                .await?;
        }

        Ok(Some(client))
    }

    async fn deactivate(
        &self,
        business_id: &BusinessId,
        phone: &str,
    ) -> Result<Option<Client>, RepositoryError> {
        sqlx::query(
            "UPDATE clients SET is_active = 0, status = 'inactive' \
             WHERE business_id = ? AND phone = ?",
        )
        .bind(&business_id.0)
        .bind(phone)
        .execute(&self.pool)
        .await?;

        self.fetch_by_phone(business_id, phone).await
    }

    async fn list_recent(
        &self,
        business_id: &BusinessId,
        limit: i64,
    ) -> Result<Vec<Client>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM clients WHERE business_id = ? AND is_active = 1 \
             ORDER BY created_at DESC LIMIT ?",
        )
        .bind(&business_id.0)
        .bind(limit.max(1))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(client_from_row).collect()
    }

    async fn count_active(&self, business_id: &BusinessId) -> Result<i64, RepositoryError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM clients WHERE business_id = ? AND is_active = 1",
        )
        .bind(&business_id.0)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("bad timestamp `{raw}`: {error}")))
}

fn client_from_row(row: &SqliteRow) -> Result<Client, RepositoryError> {
    let tags: Vec<String> = serde_json::from_str(&row.get::<String, _>("tags"))
        .map_err(|error| RepositoryError::Decode(error.to_string()))?;
    let last_appointment_date = row
        .get::<Option<String>, _>("last_appointment_date")
        .map(|raw| parse_timestamp(&raw))
        .transpose()?;

    Ok(Client {
        id: ClientId(row.get("id")),
        business_id: BusinessId(row.get("business_id")),
        name: row.get("name"),
        phone: row.get("phone"),
        email: row.get("email"),
        notes: row.get("notes"),
        tags,
        total_spent: row.get("total_spent"),
        total_appointments: row.get("total_appointments"),
        last_appointment_date,
        status: row.get("status"),
        is_active: row.get::<i64, _>("is_active") != 0,
        created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
    })
}

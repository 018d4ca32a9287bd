use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use zapys_core::domain::appointment::{Appointment, AppointmentId, AppointmentStatus};
use zapys_core::domain::client::ClientId;
use zapys_core::domain::master::MasterId;
use zapys_core::domain::service::ServiceId;
use zapys_core::domain::BusinessId;

use super::client::parse_timestamp;
use super::{AppointmentRepository, RepositoryError};
use crate::DbPool;

pub struct SqlAppointmentRepository {
    pool: DbPool,
}

impl SqlAppointmentRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn fetch(
        &self,
        business_id: &BusinessId,
        id: &AppointmentId,
    ) -> Result<Option<Appointment>, RepositoryError> {
        let row =
            sqlx::query("SELECT * FROM appointments WHERE business_id = ? AND id = ? LIMIT 1")
                .bind(&business_id.0)
                .bind(&id.0)
                .fetch_optional(&self.pool)
                .await?;

        row.map(|value| appointment_from_row(&value)).transpose()
    }
}

#[async_trait]
impl AppointmentRepository for SqlAppointmentRepository {
    async fn create(&self, appointment: Appointment) -> Result<Appointment, RepositoryError> {
        let service_ids: Vec<&str> =
            appointment.service_ids.iter().map(|id| id.0.as_str()).collect();
        let encoded = serde_json::to_string(&service_ids)
            .map_err(|error| RepositoryError::Decode(error.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO appointments (
                id, business_id, master_id, client_id, client_name, client_phone,
                start_time, end_time, status, service_ids, notes, source, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&appointment.id.0)
        .bind(&appointment.business_id.0)
        .bind(&appointment.master_id.0)
        .bind(&appointment.client_id.0)
        .bind(&appointment.client_name)
        .bind(&appointment.client_phone)
        .bind(appointment.start_time.to_rfc3339())
        .bind(appointment.end_time.to_rfc3339())
        .bind(appointment.status.as_str())
        .bind(&encoded)
        .bind(appointment.notes.as_deref())
        .bind(&appointment.source)
        .bind(appointment.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(appointment)
    }

    async fn find_by_id(
        &self,
        business_id: &BusinessId,
        id: &AppointmentId,
    ) -> Result<Option<Appointment>, RepositoryError> {
        self.fetch(business_id, id).await
    }

    async fn set_status(
        &self,
        business_id: &BusinessId,
        id: &AppointmentId,
        status: AppointmentStatus,
    ) -> Result<Option<Appointment>, RepositoryError> {
        sqlx::query("UPDATE appointments SET status = ? WHERE business_id = ? AND id = ?")
            .bind(status.as_str())
            .bind(&business_id.0)
            .bind(&id.0)
            .execute(&self.pool)
            .await?;

        self.fetch(business_id, id).await
    }

    async fn reschedule(
        &self,
        business_id: &BusinessId,
        id: &AppointmentId,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Result<Option<Appointment>, RepositoryError> {
        sqlx::query(
            "UPDATE appointments SET start_time = ?, end_time = ? \
             WHERE business_id = ? AND id = ?",
        )
        .bind(start_time.to_rfc3339())
        .bind(end_time.to_rfc3339())
        .bind(&business_id.0)
        .bind(&id.0)
        .execute(&self.pool)
        .await?;

        self.fetch(business_id, id).await
    }

    async fn find_conflicts(
        &self,
        business_id: &BusinessId,
        master_id: &MasterId,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        exclude: Option<&AppointmentId>,
    ) -> Result<Vec<Appointment>, RepositoryError> {
        // RFC3339 UTC strings compare lexicographically in time order, so the
        // half-open overlap test works directly on the TEXT columns.
        let rows = sqlx::query(
            r#"
            SELECT * FROM appointments
            WHERE business_id = ? AND master_id = ?
              AND status != 'cancelled'
              AND start_time < ? AND ? < end_time
              AND id != ?
            ORDER BY start_time ASC
            "#,
        )
        .bind(&business_id.0)
        .bind(&master_id.0)
        .bind(end_time.to_rfc3339())
        .bind(start_time.to_rfc3339())
        .bind(exclude.map(|id| id.0.as_str()).unwrap_or(""))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(appointment_from_row).collect()
    }

    async fn find_by_phone_and_start(
        &self,
        business_id: &BusinessId,
        phone: &str,
        start_time: DateTime<Utc>,
    ) -> Result<Option<Appointment>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT * FROM appointments
            WHERE business_id = ? AND client_phone = ? AND start_time = ?
              AND status != 'cancelled'
            LIMIT 1
            "#,
        )
        .bind(&business_id.0)
        .bind(phone)
        .bind(start_time.to_rfc3339())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|value| appointment_from_row(&value)).transpose()
    }

    async fn next_upcoming_by_phone(
        &self,
        business_id: &BusinessId,
        phone: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Appointment>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT * FROM appointments
            WHERE business_id = ? AND client_phone = ? AND start_time >= ?
              AND status != 'cancelled'
            ORDER BY start_time ASC
            LIMIT 1
            "#,
        )
        .bind(&business_id.0)
        .bind(phone)
        .bind(now.to_rfc3339())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|value| appointment_from_row(&value)).transpose()
    }

    async fn next_upcoming_by_name(
        &self,
        business_id: &BusinessId,
        fragment: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Appointment>, RepositoryError> {
        let pattern = format!("%{}%", fragment.trim());
        let row = sqlx::query(
            r#"
            SELECT * FROM appointments
            WHERE business_id = ? AND client_name LIKE ? COLLATE NOCASE
              AND start_time >= ? AND status != 'cancelled'
            ORDER BY start_time ASC
            LIMIT 1
            "#,
        )
        .bind(&business_id.0)
        .bind(&pattern)
        .bind(now.to_rfc3339())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|value| appointment_from_row(&value)).transpose()
    }

    async fn list_between(
        &self,
        business_id: &BusinessId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Appointment>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM appointments
            WHERE business_id = ? AND start_time >= ? AND start_time < ?
            ORDER BY start_time ASC
            LIMIT ?
            "#,
        )
        .bind(&business_id.0)
        .bind(from.to_rfc3339())
        .bind(to.to_rfc3339())
        .bind(limit.max(1))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(appointment_from_row).collect()
    }

    async fn list_for_master_between(
        &self,
        business_id: &BusinessId,
        master_id: &MasterId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM appointments
            WHERE business_id = ? AND master_id = ?
              AND start_time >= ? AND start_time < ? AND status != 'cancelled'
            ORDER BY start_time ASC
            "#,
        )
        .bind(&business_id.0)
        .bind(&master_id.0)
        .bind(from.to_rfc3339())
        .bind(to.to_rfc3339())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(appointment_from_row).collect()
    }
}

fn appointment_from_row(row: &SqliteRow) -> Result<Appointment, RepositoryError> {
    let status_raw = row.get::<String, _>("status");
    let status = AppointmentStatus::parse(&status_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown status `{status_raw}`")))?;
    let service_ids: Vec<String> = serde_json::from_str(&row.get::<String, _>("service_ids"))
        .map_err(|error| RepositoryError::Decode(error.to_string()))?;

    Ok(Appointment {
        id: AppointmentId(row.get("id")),
        business_id: BusinessId(row.get("business_id")),
        master_id: MasterId(row.get("master_id")),
        client_id: ClientId(row.get("client_id")),
        client_name: row.get("client_name"),
        client_phone: row.get("client_phone"),
        start_time: parse_timestamp(&row.get::<String, _>("start_time"))?,
        end_time: parse_timestamp(&row.get::<String, _>("end_time"))?,
        status,
        service_ids: service_ids.into_iter().map(ServiceId).collect(),
        notes: row.get("notes"),
        source: row.get("source"),
        created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
    })
}

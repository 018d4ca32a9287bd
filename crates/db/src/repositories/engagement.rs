use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use zapys_core::domain::client::ClientId;
use zapys_core::domain::engagement::{
    Note, NoteId, Reminder, ReminderId, ReminderStatus, ReminderTarget, Segment, SegmentId, SmsId,
    SmsMessage,
};
use zapys_core::domain::BusinessId;

use super::client::parse_timestamp;
use super::{
    NoteRepository, ReminderRepository, RepositoryError, SegmentRepository, SmsRepository,
};
use crate::DbPool;

pub struct SqlNoteRepository {
    pool: DbPool,
}

impl SqlNoteRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NoteRepository for SqlNoteRepository {
    async fn create(&self, note: Note) -> Result<Note, RepositoryError> {
        sqlx::query(
            "INSERT INTO notes (id, business_id, text, date, completed, created_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&note.id.0)
        .bind(&note.business_id.0)
        .bind(&note.text)
        .bind(note.date.format("%Y-%m-%d").to_string())
        .bind(i64::from(note.completed))
        .bind(note.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(note)
    }

    async fn list_recent(
        &self,
        business_id: &BusinessId,
        limit: i64,
    ) -> Result<Vec<Note>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM notes WHERE business_id = ? ORDER BY date DESC, created_at DESC LIMIT ?",
        )
        .bind(&business_id.0)
        .bind(limit.max(1))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(note_from_row).collect()
    }

    async fn complete_matching(
        &self,
        business_id: &BusinessId,
        fragment: &str,
    ) -> Result<Option<Note>, RepositoryError> {
        let pattern = format!("%{}%", fragment.trim());
        let row = sqlx::query(
            r#"
            SELECT * FROM notes
            WHERE business_id = ? AND completed = 0 AND text LIKE ? COLLATE NOCASE
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(&business_id.0)
        .bind(&pattern)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut note = note_from_row(&row)?;

        sqlx::query("UPDATE notes SET completed = 1 WHERE business_id = ? AND id = ?")
            .bind(&business_id.0)
            .bind(&note.id.0)
            .execute(&self.pool)
            .await?;
        note.completed = true;
        Ok(Some(note))
    }
}

fn note_from_row(row: &SqliteRow) -> Result<Note, RepositoryError> {
    let date_raw = row.get::<String, _>("date");
    let date = NaiveDate::parse_from_str(&date_raw, "%Y-%m-%d")
        .map_err(|error| RepositoryError::Decode(format!("bad date `{date_raw}`: {error}")))?;

    Ok(Note {
        id: NoteId(row.get("id")),
        business_id: BusinessId(row.get("business_id")),
        text: row.get("text"),
        date,
        completed: row.get::<i64, _>("completed") != 0,
        created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
    })
}

pub struct SqlReminderRepository {
    pool: DbPool,
}

impl SqlReminderRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReminderRepository for SqlReminderRepository {
    async fn create(&self, reminder: Reminder) -> Result<Reminder, RepositoryError> {
        let (target_type, client_id) = match &reminder.target {
            ReminderTarget::All => ("all", None),
            ReminderTarget::Client(id) => ("client", Some(id.0.as_str())),
        };

        sqlx::query(
            r#"
            INSERT INTO reminders (
                id, business_id, message, target_type, client_id,
                scheduled_at, status, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&reminder.id.0)
        .bind(&reminder.business_id.0)
        .bind(&reminder.message)
        .bind(target_type)
        .bind(client_id)
        .bind(reminder.scheduled_at.to_rfc3339())
        .bind(reminder.status.as_str())
        .bind(reminder.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(reminder)
    }

    async fn list_upcoming(
        &self,
        business_id: &BusinessId,
        limit: i64,
    ) -> Result<Vec<Reminder>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM reminders WHERE business_id = ? AND status = 'pending' \
             ORDER BY scheduled_at ASC LIMIT ?",
        )
        .bind(&business_id.0)
        .bind(limit.max(1))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(reminder_from_row).collect()
    }

    async fn cancel_matching(
        &self,
        business_id: &BusinessId,
        fragment: &str,
    ) -> Result<Option<Reminder>, RepositoryError> {
        let pattern = format!("%{}%", fragment.trim());
        let row = sqlx::query(
            r#"
            SELECT * FROM reminders
            WHERE business_id = ? AND status = 'pending' AND message LIKE ? COLLATE NOCASE
            ORDER BY scheduled_at ASC
            LIMIT 1
            "#,
        )
        .bind(&business_id.0)
        .bind(&pattern)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut reminder = reminder_from_row(&row)?;

        sqlx::query("UPDATE reminders SET status = 'cancelled' WHERE business_id = ? AND id = ?")
            .bind(&business_id.0)
            .bind(&reminder.id.0)
            .execute(&self.pool)
            .await?;
        reminder.status = ReminderStatus::Cancelled;
        Ok(Some(reminder))
    }
}

fn reminder_from_row(row: &SqliteRow) -> Result<Reminder, RepositoryError> {
    let status_raw = row.get::<String, _>("status");
    let status = ReminderStatus::parse(&status_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown status `{status_raw}`")))?;
    let target = match row.get::<String, _>("target_type").as_str() {
        "client" => {
            let client_id = row.get::<Option<String>, _>("client_id").ok_or_else(|| {
                RepositoryError::Decode("client reminder without client_id".to_string())
            })?;
            ReminderTarget::Client(ClientId(client_id))
        }
        _ => ReminderTarget::All,
    };

    Ok(Reminder {
        id: ReminderId(row.get("id")),
        business_id: BusinessId(row.get("business_id")),
        message: row.get("message"),
        target,
        scheduled_at: parse_timestamp(&row.get::<String, _>("scheduled_at"))?,
        status,
        created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
    })
}

pub struct SqlSegmentRepository {
    pool: DbPool,
}

impl SqlSegmentRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SegmentRepository for SqlSegmentRepository {
    async fn create(&self, segment: Segment) -> Result<Segment, RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO segments (
                id, business_id, name, criteria, auto_update, client_count, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&segment.id.0)
        .bind(&segment.business_id.0)
        .bind(&segment.name)
        .bind(&segment.criteria)
        .bind(i64::from(segment.auto_update))
        .bind(segment.client_count)
        .bind(segment.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(segment)
    }

    async fn list(&self, business_id: &BusinessId) -> Result<Vec<Segment>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM segments WHERE business_id = ? ORDER BY name")
            .bind(&business_id.0)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(segment_from_row).collect()
    }

    async fn delete_by_name(
        &self,
        business_id: &BusinessId,
        name: &str,
    ) -> Result<Option<Segment>, RepositoryError> {
        let row = sqlx::query(
            "SELECT * FROM segments WHERE business_id = ? AND lower(name) = lower(?) LIMIT 1",
        )
        .bind(&business_id.0)
        .bind(name.trim())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let segment = segment_from_row(&row)?;

        sqlx::query("DELETE FROM segments WHERE business_id = ? AND id = ?")
            .bind(&business_id.0)
            .bind(&segment.id.0)
            .execute(&self.pool)
            .await?;

        Ok(Some(segment))
    }
}

fn segment_from_row(row: &SqliteRow) -> Result<Segment, RepositoryError> {
    Ok(Segment {
        id: SegmentId(row.get("id")),
        business_id: BusinessId(row.get("business_id")),
        name: row.get("name"),
        criteria: row.get("criteria"),
        auto_update: row.get::<i64, _>("auto_update") != 0,
        client_count: row.get("client_count"),
        created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
    })
}

pub struct SqlSmsRepository {
    pool: DbPool,
}

impl SqlSmsRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SmsRepository for SqlSmsRepository {
    async fn record(&self, sms: SmsMessage) -> Result<SmsMessage, RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO sms_messages (
                id, business_id, phone, text, status, provider_message_id, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&sms.id.0)
        .bind(&sms.business_id.0)
        .bind(&sms.phone)
        .bind(&sms.text)
        .bind(&sms.status)
        .bind(sms.provider_message_id.as_deref())
        .bind(sms.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(sms)
    }

    async fn list_recent(
        &self,
        business_id: &BusinessId,
        limit: i64,
    ) -> Result<Vec<SmsMessage>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM sms_messages WHERE business_id = ? ORDER BY created_at DESC LIMIT ?",
        )
        .bind(&business_id.0)
        .bind(limit.max(1))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(sms_from_row).collect()
    }
}

fn sms_from_row(row: &SqliteRow) -> Result<SmsMessage, RepositoryError> {
    Ok(SmsMessage {
        id: SmsId(row.get("id")),
        business_id: BusinessId(row.get("business_id")),
        phone: row.get("phone"),
        text: row.get("text"),
        status: row.get("status"),
        provider_message_id: row.get("provider_message_id"),
        created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
    })
}

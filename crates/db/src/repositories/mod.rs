use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use zapys_core::domain::appointment::{Appointment, AppointmentId, AppointmentStatus};
use zapys_core::domain::client::{Client, ClientId};
use zapys_core::domain::conversation::Turn;
use zapys_core::domain::engagement::{Note, Reminder, Segment, SmsMessage};
use zapys_core::domain::master::{DayOverride, Master, MasterId, WorkingHours};
use zapys_core::domain::service::{Service, ServiceId};
use zapys_core::domain::BusinessId;

pub mod appointment;
pub mod client;
pub mod conversation;
pub mod engagement;
pub mod master;
pub mod memory;
pub mod service;
pub mod settings;

pub use appointment::SqlAppointmentRepository;
pub use client::SqlClientRepository;
pub use conversation::SqlConversationRepository;
pub use engagement::{
    SqlNoteRepository, SqlReminderRepository, SqlSegmentRepository, SqlSmsRepository,
};
pub use master::SqlMasterRepository;
pub use memory::{
    InMemoryAppointmentRepository, InMemoryClientRepository, InMemoryConversationRepository,
    InMemoryMasterRepository, InMemoryNoteRepository, InMemoryReminderRepository,
    InMemorySegmentRepository, InMemorySettingsRepository, InMemoryServiceRepository,
    InMemorySmsRepository,
};
pub use service::SqlServiceRepository;
pub use settings::SqlSettingsRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

#[async_trait]
pub trait ClientRepository: Send + Sync {
    /// Insert or update keyed on `(business_id, phone)`. A repeated call
    /// with the same phone updates the existing row instead of creating a
    /// duplicate; the stored row is returned.
    async fn upsert_by_phone(&self, client: Client) -> Result<Client, RepositoryError>;
    async fn find_by_id(
        &self,
        business_id: &BusinessId,
        id: &ClientId,
    ) -> Result<Option<Client>, RepositoryError>;
    async fn find_by_phone(
        &self,
        business_id: &BusinessId,
        phone: &str,
    ) -> Result<Option<Client>, RepositoryError>;
    async fn search(
        &self,
        business_id: &BusinessId,
        query: &str,
        limit: i64,
    ) -> Result<Vec<Client>, RepositoryError>;
    async fn append_tag(
        &self,
        business_id: &BusinessId,
        phone: &str,
        tag: &str,
    ) -> Result<Option<Client>, RepositoryError>;
    async fn deactivate(
        &self,
        business_id: &BusinessId,
        phone: &str,
    ) -> Result<Option<Client>, RepositoryError>;
    async fn list_recent(
        &self,
        business_id: &BusinessId,
        limit: i64,
    ) -> Result<Vec<Client>, RepositoryError>;
    async fn count_active(&self, business_id: &BusinessId) -> Result<i64, RepositoryError>;
}

#[async_trait]
pub trait MasterRepository: Send + Sync {
    async fn create(&self, master: Master) -> Result<Master, RepositoryError>;
    async fn find_by_id(
        &self,
        business_id: &BusinessId,
        id: &MasterId,
    ) -> Result<Option<Master>, RepositoryError>;
    /// Earliest-created active master whose name contains the fragment,
    /// case-insensitive.
    async fn find_by_name_fragment(
        &self,
        business_id: &BusinessId,
        fragment: &str,
    ) -> Result<Option<Master>, RepositoryError>;
    async fn update_profile(
        &self,
        business_id: &BusinessId,
        id: &MasterId,
        name: Option<String>,
        bio: Option<String>,
    ) -> Result<Option<Master>, RepositoryError>;
    async fn set_working_hours(
        &self,
        business_id: &BusinessId,
        id: &MasterId,
        hours: WorkingHours,
    ) -> Result<Option<Master>, RepositoryError>;
    /// Merge one `YYYY-MM-DD` key into the override map; other keys survive.
    async fn set_override(
        &self,
        business_id: &BusinessId,
        id: &MasterId,
        date: &str,
        day: DayOverride,
    ) -> Result<Option<Master>, RepositoryError>;
    /// Remove one `YYYY-MM-DD` key; other keys survive.
    async fn clear_override(
        &self,
        business_id: &BusinessId,
        id: &MasterId,
        date: &str,
    ) -> Result<Option<Master>, RepositoryError>;
    async fn deactivate(
        &self,
        business_id: &BusinessId,
        id: &MasterId,
    ) -> Result<Option<Master>, RepositoryError>;
    async fn list_active(&self, business_id: &BusinessId) -> Result<Vec<Master>, RepositoryError>;
}

#[async_trait]
pub trait ServiceRepository: Send + Sync {
    /// Insert or update keyed on the case-insensitive name.
    async fn upsert_by_name(&self, service: Service) -> Result<Service, RepositoryError>;
    async fn find_by_name_fragment(
        &self,
        business_id: &BusinessId,
        fragment: &str,
    ) -> Result<Option<Service>, RepositoryError>;
    async fn find_by_id(
        &self,
        business_id: &BusinessId,
        id: &ServiceId,
    ) -> Result<Option<Service>, RepositoryError>;
    async fn deactivate(
        &self,
        business_id: &BusinessId,
        name: &str,
    ) -> Result<Option<Service>, RepositoryError>;
    async fn list_active(&self, business_id: &BusinessId)
        -> Result<Vec<Service>, RepositoryError>;
}

#[async_trait]
pub trait AppointmentRepository: Send + Sync {
    async fn create(&self, appointment: Appointment) -> Result<Appointment, RepositoryError>;
    async fn find_by_id(
        &self,
        business_id: &BusinessId,
        id: &AppointmentId,
    ) -> Result<Option<Appointment>, RepositoryError>;
    async fn set_status(
        &self,
        business_id: &BusinessId,
        id: &AppointmentId,
        status: AppointmentStatus,
    ) -> Result<Option<Appointment>, RepositoryError>;
    async fn reschedule(
        &self,
        business_id: &BusinessId,
        id: &AppointmentId,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Result<Option<Appointment>, RepositoryError>;
    /// Non-cancelled appointments of the master overlapping `[start, end)`,
    /// excluding `exclude` when rescheduling.
    async fn find_conflicts(
        &self,
        business_id: &BusinessId,
        master_id: &MasterId,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        exclude: Option<&AppointmentId>,
    ) -> Result<Vec<Appointment>, RepositoryError>;
    async fn find_by_phone_and_start(
        &self,
        business_id: &BusinessId,
        phone: &str,
        start_time: DateTime<Utc>,
    ) -> Result<Option<Appointment>, RepositoryError>;
    async fn next_upcoming_by_phone(
        &self,
        business_id: &BusinessId,
        phone: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Appointment>, RepositoryError>;
    async fn next_upcoming_by_name(
        &self,
        business_id: &BusinessId,
        fragment: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Appointment>, RepositoryError>;
    async fn list_between(
        &self,
        business_id: &BusinessId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Appointment>, RepositoryError>;
    async fn list_for_master_between(
        &self,
        business_id: &BusinessId,
        master_id: &MasterId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, RepositoryError>;
}

#[async_trait]
pub trait NoteRepository: Send + Sync {
    async fn create(&self, note: Note) -> Result<Note, RepositoryError>;
    async fn list_recent(
        &self,
        business_id: &BusinessId,
        limit: i64,
    ) -> Result<Vec<Note>, RepositoryError>;
    /// Mark the most recent open note containing the fragment as completed.
    async fn complete_matching(
        &self,
        business_id: &BusinessId,
        fragment: &str,
    ) -> Result<Option<Note>, RepositoryError>;
}

#[async_trait]
pub trait ReminderRepository: Send + Sync {
    async fn create(&self, reminder: Reminder) -> Result<Reminder, RepositoryError>;
    async fn list_upcoming(
        &self,
        business_id: &BusinessId,
        limit: i64,
    ) -> Result<Vec<Reminder>, RepositoryError>;
    /// Cancel the earliest pending reminder whose message contains the
    /// fragment.
    async fn cancel_matching(
        &self,
        business_id: &BusinessId,
        fragment: &str,
    ) -> Result<Option<Reminder>, RepositoryError>;
}

#[async_trait]
pub trait SegmentRepository: Send + Sync {
    async fn create(&self, segment: Segment) -> Result<Segment, RepositoryError>;
    async fn list(&self, business_id: &BusinessId) -> Result<Vec<Segment>, RepositoryError>;
    async fn delete_by_name(
        &self,
        business_id: &BusinessId,
        name: &str,
    ) -> Result<Option<Segment>, RepositoryError>;
}

#[async_trait]
pub trait SmsRepository: Send + Sync {
    async fn record(&self, sms: SmsMessage) -> Result<SmsMessage, RepositoryError>;
    async fn list_recent(
        &self,
        business_id: &BusinessId,
        limit: i64,
    ) -> Result<Vec<SmsMessage>, RepositoryError>;
}

#[async_trait]
pub trait ConversationRepository: Send + Sync {
    async fn append(&self, turn: Turn) -> Result<(), RepositoryError>;
    /// Most recent turns for `(business, session)`, returned oldest-first.
    async fn last_turns(
        &self,
        business_id: &BusinessId,
        session_id: &str,
        limit: i64,
    ) -> Result<Vec<Turn>, RepositoryError>;
}

#[async_trait]
pub trait SettingsRepository: Send + Sync {
    async fn get(
        &self,
        business_id: &BusinessId,
        key: &str,
    ) -> Result<Option<String>, RepositoryError>;
    async fn set(
        &self,
        business_id: &BusinessId,
        key: &str,
        value: &str,
    ) -> Result<(), RepositoryError>;
}

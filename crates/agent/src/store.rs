//! Repository bundle handed to the executors. One wiring point for the SQL
//! stack at bootstrap and the in-memory stack in tests.

use std::sync::Arc;

use zapys_db::repositories::{
    AppointmentRepository, ClientRepository, ConversationRepository, InMemoryAppointmentRepository,
    InMemoryClientRepository, InMemoryConversationRepository, InMemoryMasterRepository,
    InMemoryNoteRepository, InMemoryReminderRepository, InMemorySegmentRepository,
    InMemorySettingsRepository, InMemoryServiceRepository, InMemorySmsRepository, MasterRepository,
    NoteRepository, ReminderRepository, SegmentRepository, ServiceRepository, SettingsRepository,
    SmsRepository, SqlAppointmentRepository, SqlClientRepository, SqlConversationRepository,
    SqlMasterRepository, SqlNoteRepository, SqlReminderRepository, SqlSegmentRepository,
    SqlServiceRepository, SqlSettingsRepository, SqlSmsRepository,
};
use zapys_db::DbPool;

#[derive(Clone)]
pub struct AgentStore {
    pub clients: Arc<dyn ClientRepository>,
    pub masters: Arc<dyn MasterRepository>,
    pub services: Arc<dyn ServiceRepository>,
    pub appointments: Arc<dyn AppointmentRepository>,
    pub notes: Arc<dyn NoteRepository>,
    pub reminders: Arc<dyn ReminderRepository>,
    pub segments: Arc<dyn SegmentRepository>,
    pub sms: Arc<dyn SmsRepository>,
    pub conversations: Arc<dyn ConversationRepository>,
    pub settings: Arc<dyn SettingsRepository>,
}

impl AgentStore {
    pub fn sql(pool: DbPool) -> Self {
        Self {
            clients: Arc::new(SqlClientRepository::new(pool.clone())),
            masters: Arc::new(SqlMasterRepository::new(pool.clone())),
            services: Arc::new(SqlServiceRepository::new(pool.clone())),
            appointments: Arc::new(SqlAppointmentRepository::new(pool.clone())),
            notes: Arc::new(SqlNoteRepository::new(pool.clone())),
            reminders: Arc::new(SqlReminderRepository::new(pool.clone())),
            segments: Arc::new(SqlSegmentRepository::new(pool.clone())),
            sms: Arc::new(SqlSmsRepository::new(pool.clone())),
            conversations: Arc::new(SqlConversationRepository::new(pool.clone())),
            settings: Arc::new(SqlSettingsRepository::new(pool)),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            clients: Arc::new(InMemoryClientRepository::default()),
            masters: Arc::new(InMemoryMasterRepository::default()),
            services: Arc::new(InMemoryServiceRepository::default()),
            appointments: Arc::new(InMemoryAppointmentRepository::default()),
            notes: Arc::new(InMemoryNoteRepository::default()),
            reminders: Arc::new(InMemoryReminderRepository::default()),
            segments: Arc::new(InMemorySegmentRepository::default()),
            sms: Arc::new(InMemorySmsRepository::default()),
            conversations: Arc::new(InMemoryConversationRepository::default()),
            settings: Arc::new(InMemorySettingsRepository::default()),
        }
    }

    pub fn resolver(&self) -> crate::resolver::EntityResolver {
        crate::resolver::EntityResolver::new(
            self.masters.clone(),
            self.services.clone(),
            self.appointments.clone(),
        )
    }
}

pub mod config;
pub mod domain;
pub mod errors;
pub mod phone;

pub use chrono;

pub use domain::appointment::{intervals_overlap, Appointment, AppointmentId, AppointmentStatus};
pub use domain::client::{Client, ClientId};
pub use domain::conversation::{AiMeta, Indicator, Turn, TurnMetadata, TurnRole};
pub use domain::engagement::{
    Note, NoteId, Reminder, ReminderId, ReminderStatus, ReminderTarget, Segment, SegmentId, SmsId,
    SmsMessage,
};
pub use domain::master::{DayOverride, DaySchedule, Master, MasterId, WorkingHours};
pub use domain::service::{Service, ServiceId};
pub use domain::BusinessId;
pub use errors::{is_infrastructure_error, truncate_reason, AgentError, InterfaceOutcome};
pub use phone::{is_phone_only, normalize_phone, PhoneError};

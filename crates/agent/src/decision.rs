use serde::{Deserialize, Serialize};

/// One decision per inbound message: an action tag with its typed payload,
/// reply text, advisory confidence, and an optional read-only tool request.
///
/// Constructed once, consumed immediately, never persisted as its own record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    #[serde(flatten)]
    pub action: AgentAction,
    #[serde(default)]
    pub reply: String,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default)]
    pub tool: Option<ToolRequest>,
}

fn default_confidence() -> f64 {
    0.5
}

impl Decision {
    pub fn reply(text: impl Into<String>, confidence: f64) -> Self {
        Self { action: AgentAction::Reply, reply: text.into(), confidence, tool: None }
    }

    pub fn action(action: AgentAction, reply: impl Into<String>, confidence: f64) -> Self {
        Self { action, reply: reply.into(), confidence, tool: None }
    }

    pub fn is_mutating(&self) -> bool {
        !matches!(self.action, AgentAction::Reply)
    }
}

/// A read-only business-data query requested by the LLM (or built by a
/// heuristic). Executed at most once per message.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolRequest {
    pub tool: String,
    #[serde(default)]
    pub args: ToolArgs,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolArgs {
    #[serde(default)]
    pub days: Option<i64>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub master_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub query: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AgentAction {
    Reply,
    CreateClient(ClientPayload),
    UpdateClient(UpdateClientPayload),
    DeleteClient(PhonePayload),
    TagClient(TagClientPayload),
    CreateMaster(MasterPayload),
    UpdateMaster(UpdateMasterPayload),
    DeleteMaster(MasterRefPayload),
    SetWorkingHours(WorkingHoursPayload),
    SetScheduleOverride(ScheduleOverridePayload),
    ClearScheduleOverride(ClearOverridePayload),
    CreateService(ServicePayload),
    UpdateService(UpdateServicePayload),
    DeleteService(NamePayload),
    CreateAppointment(AppointmentPayload),
    CancelAppointment(AppointmentRefPayload),
    RescheduleAppointment(ReschedulePayload),
    CreateNote(NotePayload),
    CompleteNote(TextPayload),
    CreateReminder(ReminderPayload),
    CancelReminder(TextPayload),
    CreateSegment(SegmentPayload),
    DeleteSegment(NamePayload),
    SendSms(SmsPayload),
}

impl AgentAction {
    pub fn action_key(&self) -> &'static str {
        match self {
            Self::Reply => "reply",
            Self::CreateClient(_) => "create_client",
            Self::UpdateClient(_) => "update_client",
            Self::DeleteClient(_) => "delete_client",
            Self::TagClient(_) => "tag_client",
            Self::CreateMaster(_) => "create_master",
            Self::UpdateMaster(_) => "update_master",
            Self::DeleteMaster(_) => "delete_master",
            Self::SetWorkingHours(_) => "set_working_hours",
            Self::SetScheduleOverride(_) => "set_schedule_override",
            Self::ClearScheduleOverride(_) => "clear_schedule_override",
            Self::CreateService(_) => "create_service",
            Self::UpdateService(_) => "update_service",
            Self::DeleteService(_) => "delete_service",
            Self::CreateAppointment(_) => "create_appointment",
            Self::CancelAppointment(_) => "cancel_appointment",
            Self::RescheduleAppointment(_) => "reschedule_appointment",
            Self::CreateNote(_) => "create_note",
            Self::CompleteNote(_) => "complete_note",
            Self::CreateReminder(_) => "create_reminder",
            Self::CancelReminder(_) => "cancel_reminder",
            Self::CreateSegment(_) => "create_segment",
            Self::DeleteSegment(_) => "delete_segment",
            Self::SendSms(_) => "send_sms",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientPayload {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateClientPayload {
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PhonePayload {
    #[serde(default)]
    pub phone: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TagClientPayload {
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub tag: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MasterPayload {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub bio: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateMasterPayload {
    /// Id or name fragment of the master to update.
    #[serde(default)]
    pub master: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MasterRefPayload {
    #[serde(default)]
    pub master: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkingHoursPayload {
    #[serde(default)]
    pub master: String,
    /// Lowercase English weekday name.
    #[serde(default)]
    pub day: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub start: String,
    #[serde(default)]
    pub end: String,
}

fn default_enabled() -> bool {
    true
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ScheduleOverridePayload {
    #[serde(default)]
    pub master: String,
    /// `YYYY-MM-DD`.
    #[serde(default)]
    pub date: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub start: String,
    #[serde(default)]
    pub end: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ClearOverridePayload {
    #[serde(default)]
    pub master: String,
    #[serde(default)]
    pub date: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ServicePayload {
    #[serde(default)]
    pub name: String,
    /// Minor units (kopiykas). Command input in whole hryvnias is scaled
    /// by the grammar before it lands here.
    #[serde(default)]
    pub price: Option<i64>,
    #[serde(default)]
    pub duration_minutes: Option<i64>,
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateServicePayload {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub price: Option<i64>,
    #[serde(default)]
    pub duration_minutes: Option<i64>,
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NamePayload {
    #[serde(default)]
    pub name: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AppointmentPayload {
    #[serde(default)]
    pub client_name: String,
    #[serde(default)]
    pub phone: String,
    /// Id or name fragment.
    #[serde(default)]
    pub master: String,
    /// Free-form datetime; parsed by the executor.
    #[serde(default)]
    pub start_time: String,
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub duration_minutes: Option<i64>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AppointmentRefPayload {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub client_name: Option<String>,
    #[serde(default)]
    pub start_time: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ReschedulePayload {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub start_time: String,
    #[serde(default)]
    pub duration_minutes: Option<i64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NotePayload {
    #[serde(default)]
    pub text: String,
    /// `YYYY-MM-DD`; today when absent.
    #[serde(default)]
    pub date: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TextPayload {
    #[serde(default)]
    pub text: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ReminderPayload {
    #[serde(default)]
    pub message: String,
    /// Free-form datetime; parsed by the executor.
    #[serde(default)]
    pub scheduled_at: String,
    /// Targets one client when present, the whole base otherwise.
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentPayload {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub criteria: Option<String>,
    #[serde(default)]
    pub auto_update: Option<bool>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SmsPayload {
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::{AgentAction, Decision};

    #[test]
    fn tagged_decision_json_round_trips() {
        let raw = r#"{
            "action": "create_service",
            "name": "Стрижка",
            "price": 50000,
            "duration_minutes": 45,
            "reply": "Додаю послугу.",
            "confidence": 0.8
        }"#;

        let decision: Decision = serde_json::from_str(raw).expect("decode");
        match &decision.action {
            AgentAction::CreateService(payload) => {
                assert_eq!(payload.name, "Стрижка");
                assert_eq!(payload.price, Some(50000));
            }
            other => panic!("unexpected action: {other:?}"),
        }
        assert!(decision.is_mutating());

        let encoded = serde_json::to_value(&decision).expect("encode");
        assert_eq!(encoded["action"], "create_service");
    }

    #[test]
    fn reply_with_tool_request_decodes_defaults() {
        let raw = r#"{
            "action": "reply",
            "reply": "Дивлюсь розклад.",
            "tool": { "tool": "free_slots", "args": { "master_name": "Олена" } }
        }"#;

        let decision: Decision = serde_json::from_str(raw).expect("decode");
        assert_eq!(decision.action, AgentAction::Reply);
        let tool = decision.tool.expect("tool request");
        assert_eq!(tool.tool, "free_slots");
        assert_eq!(tool.args.master_name.as_deref(), Some("Олена"));
        assert!(tool.args.date.is_none());
    }
}

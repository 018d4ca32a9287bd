//! Mutation layer. Each action validates its payload, resolves the entities
//! it refers to, performs exactly one mutation, and answers with fixed
//! Ukrainian vocabulary. Everything except infrastructure failures comes back
//! as a normal reply with a machine-readable status in the data document.

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde_json::{json, Value};
use tracing::{info, warn};

use zapys_core::domain::appointment::{Appointment, AppointmentStatus};
use zapys_core::domain::client::Client;
use zapys_core::domain::engagement::{
    Note, NoteId, Reminder, ReminderId, ReminderStatus, ReminderTarget, Segment, SegmentId, SmsId,
    SmsMessage,
};
use zapys_core::domain::master::{DayOverride, DaySchedule, Master};
use zapys_core::domain::service::Service;
use zapys_core::domain::{new_entity_id, BusinessId};
use zapys_core::errors::AgentError;
use zapys_core::phone::normalize_phone;
use zapys_db::repositories::RepositoryError;

use crate::decision::{
    AgentAction, AppointmentPayload, AppointmentRefPayload, ReschedulePayload, ToolArgs,
    ToolRequest,
};
use crate::providers::{PushNotifier, SmsProvider};
use crate::resolver::EntityResolver;
use crate::store::AgentStore;
use crate::tools::ToolExecutor;
use crate::heuristics;

const DEFAULT_APPOINTMENT_MINUTES: i64 = 60;

const WEEKDAYS: &[&str] =
    &["monday", "tuesday", "wednesday", "thursday", "friday", "saturday", "sunday"];

#[derive(Clone, Debug)]
pub struct ActionResult {
    pub message: String,
    pub data: Value,
}

impl ActionResult {
    fn completed(message: impl Into<String>, mut data: Value) -> Self {
        data["status"] = json!("completed");
        Self { message: message.into(), data }
    }

    fn status(status: &str, message: impl Into<String>, mut data: Value) -> Self {
        data["status"] = json!(status);
        Self { message: message.into(), data }
    }

    /// Recoverable domain failures stay conversational: the error picks the
    /// status key, the caller supplies the reply text.
    fn recovered(error: &AgentError, message: impl Into<String>, mut data: Value) -> Self {
        data["status"] = json!(status_key(error));
        Self { message: message.into(), data }
    }
}

fn status_key(error: &AgentError) -> String {
    match error {
        AgentError::Validation { .. } => "missing_fields".to_string(),
        AgentError::InvalidPhone(_) => "invalid_phone".to_string(),
        AgentError::NotFound { entity } => format!("{entity}_not_found"),
        AgentError::TimeConflict => "time_conflict".to_string(),
        AgentError::Upstream(_) => "upstream_failed".to_string(),
        AgentError::Infrastructure(_) => "infrastructure".to_string(),
    }
}

pub struct ActionExecutor {
    store: AgentStore,
    resolver: Arc<EntityResolver>,
    tools: Arc<ToolExecutor>,
    sms: Arc<dyn SmsProvider>,
    push: Arc<dyn PushNotifier>,
}

fn infra(err: RepositoryError) -> AgentError {
    AgentError::from_persistence(err.to_string())
}

fn missing_fields(fields: &[&str]) -> ActionResult {
    let labels: Vec<&str> = fields.iter().map(|field| field_label(field)).collect();
    let error =
        AgentError::Validation { missing: fields.iter().map(|f| f.to_string()).collect() };
    ActionResult::recovered(
        &error,
        format!("Щоб виконати це, вкажіть: {}.", labels.join(", ")),
        json!({ "missing": fields }),
    )
}

fn field_label(field: &str) -> &str {
    match field {
        "client_name" | "name" => "ім'я",
        "phone" => "телефон",
        "master" => "майстра",
        "start_time" => "дату і час",
        "scheduled_at" => "дату і час",
        "price" => "ціну",
        "text" => "текст",
        "message" => "текст",
        "day" => "день тижня",
        "date" => "дату",
        other => other,
    }
}

fn invalid_phone(raw: &str) -> ActionResult {
    ActionResult::recovered(
        &AgentError::InvalidPhone(raw.to_string()),
        format!("Номер «{raw}» виглядає некоректним. Формат: 0671234567."),
        json!({ "phone": raw }),
    )
}

fn not_found(entity: &str, message: impl Into<String>) -> ActionResult {
    ActionResult::recovered(
        &AgentError::NotFound { entity: entity.to_string() },
        message,
        json!({}),
    )
}

fn bad_time() -> ActionResult {
    ActionResult::recovered(
        &AgentError::Validation { missing: vec!["start_time".to_string()] },
        "Не зрозуміла дату і час. Вкажіть, наприклад, 2025-05-01T10:00.",
        json!({ "missing": ["start_time"] }),
    )
}

impl ActionExecutor {
    pub fn new(
        store: AgentStore,
        resolver: Arc<EntityResolver>,
        tools: Arc<ToolExecutor>,
        sms: Arc<dyn SmsProvider>,
        push: Arc<dyn PushNotifier>,
    ) -> Self {
        Self { store, resolver, tools, sms, push }
    }

    pub async fn execute(
        &self,
        business_id: &BusinessId,
        action: &AgentAction,
        now: DateTime<Utc>,
    ) -> Result<ActionResult, AgentError> {
        info!(
            event_name = "action.execute",
            business_id = %business_id.0,
            action = action.action_key()
        );
        match action {
            AgentAction::Reply => Ok(ActionResult::status("noop", "", json!({}))),
            AgentAction::CreateClient(payload) => self.create_client(business_id, payload).await,
            AgentAction::UpdateClient(payload) => self.update_client(business_id, payload).await,
            AgentAction::DeleteClient(payload) => {
                self.delete_client(business_id, &payload.phone).await
            }
            AgentAction::TagClient(payload) => self.tag_client(business_id, payload).await,
            AgentAction::CreateMaster(payload) => self.create_master(business_id, payload).await,
            AgentAction::UpdateMaster(payload) => self.update_master(business_id, payload).await,
            AgentAction::DeleteMaster(payload) => {
                self.delete_master(business_id, &payload.master).await
            }
            AgentAction::SetWorkingHours(payload) => {
                self.set_working_hours(business_id, payload).await
            }
            AgentAction::SetScheduleOverride(payload) => {
                self.set_schedule_override(business_id, payload).await
            }
            AgentAction::ClearScheduleOverride(payload) => {
                self.clear_schedule_override(business_id, &payload.master, &payload.date).await
            }
            AgentAction::CreateService(payload) => self.create_service(business_id, payload).await,
            AgentAction::UpdateService(payload) => self.update_service(business_id, payload).await,
            AgentAction::DeleteService(payload) => {
                self.delete_service(business_id, &payload.name).await
            }
            AgentAction::CreateAppointment(payload) => {
                self.create_appointment(business_id, payload, now).await
            }
            AgentAction::CancelAppointment(payload) => {
                self.cancel_appointment(business_id, payload, now).await
            }
            AgentAction::RescheduleAppointment(payload) => {
                self.reschedule_appointment(business_id, payload, now).await
            }
            AgentAction::CreateNote(payload) => {
                self.create_note(business_id, &payload.text, payload.date.as_deref(), now).await
            }
            AgentAction::CompleteNote(payload) => {
                self.complete_note(business_id, &payload.text).await
            }
            AgentAction::CreateReminder(payload) => {
                self.create_reminder(business_id, payload, now).await
            }
            AgentAction::CancelReminder(payload) => {
                self.cancel_reminder(business_id, &payload.text).await
            }
            AgentAction::CreateSegment(payload) => self.create_segment(business_id, payload).await,
            AgentAction::DeleteSegment(payload) => {
                self.delete_segment(business_id, &payload.name).await
            }
            AgentAction::SendSms(payload) => {
                self.send_sms(business_id, &payload.phone, &payload.text).await
            }
        }
    }

    async fn create_client(
        &self,
        business_id: &BusinessId,
        payload: &crate::decision::ClientPayload,
    ) -> Result<ActionResult, AgentError> {
        let mut missing = Vec::new();
        if payload.name.trim().is_empty() {
            missing.push("name");
        }
        if payload.phone.trim().is_empty() {
            missing.push("phone");
        }
        if !missing.is_empty() {
            return Ok(missing_fields(&missing));
        }
        let Ok(phone) = normalize_phone(&payload.phone) else {
            return Ok(invalid_phone(&payload.phone));
        };

        let mut client = Client::new(business_id.clone(), payload.name.trim(), phone);
        client.email = payload.email.clone();
        let stored = self.store.clients.upsert_by_phone(client).await.map_err(infra)?;
        Ok(ActionResult::completed(
            "Готово, клієнта збережено.",
            json!({ "client_id": stored.id.0, "phone": stored.phone }),
        ))
    }

    async fn update_client(
        &self,
        business_id: &BusinessId,
        payload: &crate::decision::UpdateClientPayload,
    ) -> Result<ActionResult, AgentError> {
        let Ok(phone) = normalize_phone(&payload.phone) else {
            return Ok(invalid_phone(&payload.phone));
        };
        let Some(mut client) =
            self.store.clients.find_by_phone(business_id, &phone).await.map_err(infra)?
        else {
            return Ok(not_found("client", format!("Клієнта з номером {phone} не знайдено.")));
        };

        if let Some(name) = payload.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            client.name = name.to_string();
        }
        if payload.email.is_some() {
            client.email = payload.email.clone();
        }
        if payload.notes.is_some() {
            client.notes = payload.notes.clone();
        }
        let stored = self.store.clients.upsert_by_phone(client).await.map_err(infra)?;
        Ok(ActionResult::completed(
            "Готово, дані клієнта оновлено.",
            json!({ "client_id": stored.id.0 }),
        ))
    }

    async fn delete_client(
        &self,
        business_id: &BusinessId,
        raw_phone: &str,
    ) -> Result<ActionResult, AgentError> {
        let Ok(phone) = normalize_phone(raw_phone) else {
            return Ok(invalid_phone(raw_phone));
        };
        match self.store.clients.deactivate(business_id, &phone).await.map_err(infra)? {
            Some(client) => Ok(ActionResult::completed(
                "Готово, клієнта видалено.",
                json!({ "client_id": client.id.0 }),
            )),
            None => Ok(not_found("client", format!("Клієнта з номером {phone} не знайдено."))),
        }
    }

    async fn tag_client(
        &self,
        business_id: &BusinessId,
        payload: &crate::decision::TagClientPayload,
    ) -> Result<ActionResult, AgentError> {
        if payload.tag.trim().is_empty() {
            return Ok(missing_fields(&["tag"]));
        }
        let Ok(phone) = normalize_phone(&payload.phone) else {
            return Ok(invalid_phone(&payload.phone));
        };
        match self
            .store
            .clients
            .append_tag(business_id, &phone, payload.tag.trim())
            .await
            .map_err(infra)?
        {
            Some(client) => Ok(ActionResult::completed(
                "Готово, тег додано.",
                json!({ "client_id": client.id.0, "tags": client.tags }),
            )),
            None => Ok(not_found("client", format!("Клієнта з номером {phone} не знайдено."))),
        }
    }

    async fn create_master(
        &self,
        business_id: &BusinessId,
        payload: &crate::decision::MasterPayload,
    ) -> Result<ActionResult, AgentError> {
        if payload.name.trim().is_empty() {
            return Ok(missing_fields(&["name"]));
        }
        let mut master = Master::new(business_id.clone(), payload.name.trim());
        master.bio = payload.bio.clone();
        let stored = self.store.masters.create(master).await.map_err(infra)?;
        Ok(ActionResult::completed(
            "Готово, майстра додано.",
            json!({ "master_id": stored.id.0 }),
        ))
    }

    async fn update_master(
        &self,
        business_id: &BusinessId,
        payload: &crate::decision::UpdateMasterPayload,
    ) -> Result<ActionResult, AgentError> {
        let Some(master) = self
            .resolver
            .resolve_master(business_id, &payload.master)
            .await
            .map_err(infra)?
        else {
            return Ok(master_not_found(&payload.master));
        };
        let stored = self
            .store
            .masters
            .update_profile(business_id, &master.id, payload.name.clone(), payload.bio.clone())
            .await
            .map_err(infra)?;
        match stored {
            Some(master) => Ok(ActionResult::completed(
                "Готово, профіль майстра оновлено.",
                json!({ "master_id": master.id.0 }),
            )),
            None => Ok(master_not_found(&payload.master)),
        }
    }

    async fn delete_master(
        &self,
        business_id: &BusinessId,
        reference: &str,
    ) -> Result<ActionResult, AgentError> {
        let Some(master) =
            self.resolver.resolve_master(business_id, reference).await.map_err(infra)?
        else {
            return Ok(master_not_found(reference));
        };
        self.store.masters.deactivate(business_id, &master.id).await.map_err(infra)?;
        Ok(ActionResult::completed(
            "Готово, майстра видалено.",
            json!({ "master_id": master.id.0 }),
        ))
    }

    async fn set_working_hours(
        &self,
        business_id: &BusinessId,
        payload: &crate::decision::WorkingHoursPayload,
    ) -> Result<ActionResult, AgentError> {
        let day = payload.day.trim().to_lowercase();
        if !WEEKDAYS.contains(&day.as_str()) {
            return Ok(ActionResult::recovered(
                &AgentError::Validation { missing: vec!["day".to_string()] },
                "Не зрозуміла день тижня. Використайте monday..sunday.",
                json!({ "missing": ["day"] }),
            ));
        }
        let Some(master) = self
            .resolver
            .resolve_master(business_id, &payload.master)
            .await
            .map_err(infra)?
        else {
            return Ok(master_not_found(&payload.master));
        };

        let schedule = if payload.enabled {
            let Some((start, end)) = valid_window(&payload.start, &payload.end) else {
                return Ok(ActionResult::recovered(
                    &AgentError::Validation {
                        missing: vec!["start".to_string(), "end".to_string()],
                    },
                    "Вкажіть години у форматі 09:00, 18:00 (початок раніше за кінець).",
                    json!({ "missing": ["start", "end"] }),
                ));
            };
            DaySchedule::working(&start, &end)
        } else {
            DaySchedule::off()
        };

        let mut hours = master.working_hours.clone();
        hours.0.insert(day.clone(), schedule);
        self.store
            .masters
            .set_working_hours(business_id, &master.id, hours)
            .await
            .map_err(infra)?;
        Ok(ActionResult::completed(
            "Готово, графік оновлено.",
            json!({ "master_id": master.id.0, "day": day }),
        ))
    }

    async fn set_schedule_override(
        &self,
        business_id: &BusinessId,
        payload: &crate::decision::ScheduleOverridePayload,
    ) -> Result<ActionResult, AgentError> {
        if NaiveDate::parse_from_str(payload.date.trim(), "%Y-%m-%d").is_err() {
            return Ok(ActionResult::recovered(
                &AgentError::Validation { missing: vec!["date".to_string()] },
                "Вкажіть дату у форматі 2025-05-01.",
                json!({ "missing": ["date"] }),
            ));
        }
        let Some(master) = self
            .resolver
            .resolve_master(business_id, &payload.master)
            .await
            .map_err(infra)?
        else {
            return Ok(master_not_found(&payload.master));
        };

        let day = if payload.enabled {
            let Some((start, end)) = valid_window(&payload.start, &payload.end) else {
                return Ok(ActionResult::recovered(
                    &AgentError::Validation {
                        missing: vec!["start".to_string(), "end".to_string()],
                    },
                    "Вкажіть години у форматі 12:00, 15:00 (початок раніше за кінець).",
                    json!({ "missing": ["start", "end"] }),
                ));
            };
            DayOverride { enabled: true, start, end }
        } else {
            DayOverride { enabled: false, start: "00:00".to_string(), end: "00:00".to_string() }
        };

        self.store
            .masters
            .set_override(business_id, &master.id, payload.date.trim(), day)
            .await
            .map_err(infra)?;
        Ok(ActionResult::completed(
            "Готово, виняток у графіку збережено.",
            json!({ "master_id": master.id.0, "date": payload.date.trim() }),
        ))
    }

    async fn clear_schedule_override(
        &self,
        business_id: &BusinessId,
        reference: &str,
        date: &str,
    ) -> Result<ActionResult, AgentError> {
        let Some(master) =
            self.resolver.resolve_master(business_id, reference).await.map_err(infra)?
        else {
            return Ok(master_not_found(reference));
        };
        self.store
            .masters
            .clear_override(business_id, &master.id, date.trim())
            .await
            .map_err(infra)?;
        Ok(ActionResult::completed(
            "Готово, виняток прибрано.",
            json!({ "master_id": master.id.0, "date": date.trim() }),
        ))
    }

    async fn create_service(
        &self,
        business_id: &BusinessId,
        payload: &crate::decision::ServicePayload,
    ) -> Result<ActionResult, AgentError> {
        let mut missing = Vec::new();
        if payload.name.trim().is_empty() {
            missing.push("name");
        }
        if payload.price.is_none() {
            missing.push("price");
        }
        if !missing.is_empty() {
            return Ok(missing_fields(&missing));
        }

        let mut service = Service::new(
            business_id.clone(),
            payload.name.trim(),
            payload.price.unwrap_or(0),
            payload.duration_minutes.unwrap_or(DEFAULT_APPOINTMENT_MINUTES),
        );
        service.category = payload.category.clone();
        let stored = self.store.services.upsert_by_name(service).await.map_err(infra)?;
        Ok(ActionResult::completed(
            "Готово, послугу збережено.",
            json!({ "service_id": stored.id.0, "price": stored.price }),
        ))
    }

    async fn update_service(
        &self,
        business_id: &BusinessId,
        payload: &crate::decision::UpdateServicePayload,
    ) -> Result<ActionResult, AgentError> {
        let Some(mut service) = self
            .resolver
            .resolve_service(business_id, &payload.name)
            .await
            .map_err(infra)?
        else {
            return Ok(not_found(
                "service",
                format!("Не знайшла послугу «{}».", payload.name.trim()),
            ));
        };

        if let Some(price) = payload.price {
            service.price = price;
        }
        if let Some(duration) = payload.duration_minutes {
            service.duration_minutes = duration;
        }
        if payload.category.is_some() {
            service.category = payload.category.clone();
        }
        let stored = self.store.services.upsert_by_name(service).await.map_err(infra)?;
        Ok(ActionResult::completed(
            "Готово, послугу оновлено.",
            json!({ "service_id": stored.id.0 }),
        ))
    }

    async fn delete_service(
        &self,
        business_id: &BusinessId,
        name: &str,
    ) -> Result<ActionResult, AgentError> {
        match self.store.services.deactivate(business_id, name.trim()).await.map_err(infra)? {
            Some(service) => Ok(ActionResult::completed(
                "Готово, послугу видалено.",
                json!({ "service_id": service.id.0 }),
            )),
            None => Ok(not_found("service", format!("Не знайшла послугу «{}».", name.trim()))),
        }
    }

    async fn create_appointment(
        &self,
        business_id: &BusinessId,
        payload: &AppointmentPayload,
        now: DateTime<Utc>,
    ) -> Result<ActionResult, AgentError> {
        let mut missing = Vec::new();
        if payload.client_name.trim().is_empty() {
            missing.push("client_name");
        }
        if payload.phone.trim().is_empty() {
            missing.push("phone");
        }
        if payload.master.trim().is_empty() {
            missing.push("master");
        }
        if payload.start_time.trim().is_empty() {
            missing.push("start_time");
        }
        if !missing.is_empty() {
            return Ok(missing_fields(&missing));
        }

        let Ok(phone) = normalize_phone(&payload.phone) else {
            return Ok(invalid_phone(&payload.phone));
        };
        let Some(start) = heuristics::parse_datetime(&payload.start_time, now) else {
            return Ok(bad_time());
        };
        let Some(master) = self
            .resolver
            .resolve_master(business_id, &payload.master)
            .await
            .map_err(infra)?
        else {
            return Ok(master_not_found(&payload.master));
        };

        let service = match &payload.service {
            Some(name) => self.resolver.resolve_service(business_id, name).await.map_err(infra)?,
            None => None,
        };
        // Duration precedence: explicit payload, then the service's own
        // duration, then the house default.
        let minutes = payload
            .duration_minutes
            .or_else(|| service.as_ref().map(|s| s.duration_minutes))
            .unwrap_or(DEFAULT_APPOINTMENT_MINUTES);
        let end = start + Duration::minutes(minutes);

        let conflicts = self
            .store
            .appointments
            .find_conflicts(business_id, &master.id, start, end, None)
            .await
            .map_err(infra)?;
        if !conflicts.is_empty() {
            return Ok(self.time_conflict_reply(business_id, &master.name, start, now).await?);
        }

        let client = self
            .store
            .clients
            .upsert_by_phone(Client::new(business_id.clone(), payload.client_name.trim(), &phone))
            .await
            .map_err(infra)?;

        let appointment = Appointment {
            id: zapys_core::domain::appointment::AppointmentId(new_entity_id()),
            business_id: business_id.clone(),
            master_id: master.id.clone(),
            client_id: client.id.clone(),
            client_name: client.name.clone(),
            client_phone: phone.clone(),
            start_time: start,
            end_time: end,
            status: AppointmentStatus::Confirmed,
            service_ids: service.iter().map(|s| s.id.clone()).collect(),
            notes: payload.notes.clone(),
            source: "agent".to_string(),
            created_at: now,
        };
        let stored = self.store.appointments.create(appointment).await.map_err(infra)?;

        let push = self.push.clone();
        let push_business = business_id.clone();
        let push_name = stored.client_name.clone();
        let push_start = stored.start_time.format("%Y-%m-%d %H:%M").to_string();
        tokio::spawn(async move {
            push.notify_booking(&push_business, &push_name, &push_start).await;
        });

        Ok(ActionResult::completed(
            "Готово, запис створено.",
            json!({
                "appointment_id": stored.id.0,
                "master": master.name,
                "start": stored.start_time.to_rfc3339(),
            }),
        ))
    }

    /// Conflict replies carry the day's remaining free hours so the user can
    /// re-ask without another round-trip.
    async fn time_conflict_reply(
        &self,
        business_id: &BusinessId,
        master_name: &str,
        start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<ActionResult, AgentError> {
        let request = ToolRequest {
            tool: "free_slots".to_string(),
            args: ToolArgs {
                master_name: Some(master_name.to_string()),
                date: Some(start.format("%Y-%m-%d").to_string()),
                ..ToolArgs::default()
            },
        };
        let outcome = self.tools.run(business_id, &request, now).await.map_err(infra)?;
        let slots: Vec<String> = outcome.data["slots"]
            .as_array()
            .map(|values| {
                values
                    .iter()
                    .filter_map(|v| v.as_str())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let message = if slots.is_empty() {
            format!("Цей час у {master_name} зайнятий, і вільних годин на цей день немає.")
        } else {
            format!("Цей час у {master_name} зайнятий. Вільні години: {}.", slots.join(", "))
        };
        Ok(ActionResult::recovered(&AgentError::TimeConflict, message, json!({ "suggestions": slots })))
    }

    async fn cancel_appointment(
        &self,
        business_id: &BusinessId,
        payload: &AppointmentRefPayload,
        now: DateTime<Utc>,
    ) -> Result<ActionResult, AgentError> {
        let Some((appointment, method)) = self
            .resolver
            .resolve_appointment(business_id, payload, now)
            .await
            .map_err(infra)?
        else {
            // Upcoming lookups skip cancelled rows, so a repeated cancel by
            // phone lands here. Still a calm reply, never an error.
            return Ok(not_found("appointment", "Запис не знайдено або вже скасовано."));
        };

        // Second cancel of the same appointment is a no-op, not an error.
        if appointment.status == AppointmentStatus::Cancelled {
            return Ok(ActionResult::completed(
                "Цей запис уже скасовано.",
                json!({ "appointment_id": appointment.id.0, "already_cancelled": true }),
            ));
        }

        self.store
            .appointments
            .set_status(business_id, &appointment.id, AppointmentStatus::Cancelled)
            .await
            .map_err(infra)?;
        Ok(ActionResult::completed(
            "Готово, запис скасовано.",
            json!({ "appointment_id": appointment.id.0, "resolved_by": method }),
        ))
    }

    async fn reschedule_appointment(
        &self,
        business_id: &BusinessId,
        payload: &ReschedulePayload,
        now: DateTime<Utc>,
    ) -> Result<ActionResult, AgentError> {
        if payload.start_time.trim().is_empty() {
            return Ok(missing_fields(&["start_time"]));
        }
        let reference = AppointmentRefPayload {
            id: payload.id.clone(),
            phone: payload.phone.clone(),
            ..AppointmentRefPayload::default()
        };
        let Some((appointment, method)) = self
            .resolver
            .resolve_appointment(business_id, &reference, now)
            .await
            .map_err(infra)?
        else {
            return Ok(not_found("appointment", "Не знайшла запис для перенесення."));
        };
        let Some(start) = heuristics::parse_datetime(&payload.start_time, now) else {
            return Ok(bad_time());
        };

        let minutes = payload
            .duration_minutes
            .unwrap_or((appointment.end_time - appointment.start_time).num_minutes());
        let end = start + Duration::minutes(minutes.max(15));

        let conflicts = self
            .store
            .appointments
            .find_conflicts(business_id, &appointment.master_id, start, end, Some(&appointment.id))
            .await
            .map_err(infra)?;
        if !conflicts.is_empty() {
            let master_name = self
                .store
                .masters
                .find_by_id(business_id, &appointment.master_id)
                .await
                .map_err(infra)?
                .map(|m| m.name)
                .unwrap_or_else(|| "майстра".to_string());
            return Ok(self.time_conflict_reply(business_id, &master_name, start, now).await?);
        }

        self.store
            .appointments
            .reschedule(business_id, &appointment.id, start, end)
            .await
            .map_err(infra)?;
        Ok(ActionResult::completed(
            "Готово, запис перенесено.",
            json!({
                "appointment_id": appointment.id.0,
                "start": start.to_rfc3339(),
                "resolved_by": method,
            }),
        ))
    }

    async fn create_note(
        &self,
        business_id: &BusinessId,
        text: &str,
        date: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<ActionResult, AgentError> {
        if text.trim().is_empty() {
            return Ok(missing_fields(&["text"]));
        }
        let date = date
            .and_then(|raw| NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok())
            .unwrap_or_else(|| now.date_naive());
        let note = Note {
            id: NoteId(new_entity_id()),
            business_id: business_id.clone(),
            text: text.trim().to_string(),
            date,
            completed: false,
            created_at: now,
        };
        let stored = self.store.notes.create(note).await.map_err(infra)?;
        Ok(ActionResult::completed(
            "Готово, нотатку збережено.",
            json!({ "note_id": stored.id.0 }),
        ))
    }

    async fn complete_note(
        &self,
        business_id: &BusinessId,
        fragment: &str,
    ) -> Result<ActionResult, AgentError> {
        match self
            .store
            .notes
            .complete_matching(business_id, fragment.trim())
            .await
            .map_err(infra)?
        {
            Some(note) => Ok(ActionResult::completed(
                "Готово, нотатку виконано.",
                json!({ "note_id": note.id.0 }),
            )),
            None => Ok(not_found("note", "Не знайшла таку нотатку.")),
        }
    }

    async fn create_reminder(
        &self,
        business_id: &BusinessId,
        payload: &crate::decision::ReminderPayload,
        now: DateTime<Utc>,
    ) -> Result<ActionResult, AgentError> {
        let mut missing = Vec::new();
        if payload.message.trim().is_empty() {
            missing.push("message");
        }
        if payload.scheduled_at.trim().is_empty() {
            missing.push("scheduled_at");
        }
        if !missing.is_empty() {
            return Ok(missing_fields(&missing));
        }
        let Some(scheduled_at) = heuristics::parse_datetime(&payload.scheduled_at, now) else {
            return Ok(bad_time());
        };

        let target = match &payload.phone {
            Some(raw) => {
                let Ok(phone) = normalize_phone(raw) else {
                    return Ok(invalid_phone(raw));
                };
                match self.store.clients.find_by_phone(business_id, &phone).await.map_err(infra)? {
                    Some(client) => ReminderTarget::Client(client.id),
                    None => {
                        return Ok(not_found(
                            "client",
                            format!("Клієнта з номером {phone} не знайдено."),
                        ));
                    }
                }
            }
            None => ReminderTarget::All,
        };

        let reminder = Reminder {
            id: ReminderId(new_entity_id()),
            business_id: business_id.clone(),
            message: payload.message.trim().to_string(),
            target,
            scheduled_at,
            status: ReminderStatus::Pending,
            created_at: now,
        };
        let stored = self.store.reminders.create(reminder).await.map_err(infra)?;
        Ok(ActionResult::completed(
            "Готово, нагадування створено.",
            json!({ "reminder_id": stored.id.0, "at": stored.scheduled_at.to_rfc3339() }),
        ))
    }

    async fn cancel_reminder(
        &self,
        business_id: &BusinessId,
        fragment: &str,
    ) -> Result<ActionResult, AgentError> {
        match self
            .store
            .reminders
            .cancel_matching(business_id, fragment.trim())
            .await
            .map_err(infra)?
        {
            Some(reminder) => Ok(ActionResult::completed(
                "Готово, нагадування скасовано.",
                json!({ "reminder_id": reminder.id.0 }),
            )),
            None => Ok(not_found("reminder", "Не знайшла такого нагадування.")),
        }
    }

    async fn create_segment(
        &self,
        business_id: &BusinessId,
        payload: &crate::decision::SegmentPayload,
    ) -> Result<ActionResult, AgentError> {
        if payload.name.trim().is_empty() {
            return Ok(missing_fields(&["name"]));
        }
        // Best-effort cached size; refreshed only at creation time.
        let client_count = self.store.clients.count_active(business_id).await.map_err(infra)?;
        let segment = Segment {
            id: SegmentId(new_entity_id()),
            business_id: business_id.clone(),
            name: payload.name.trim().to_string(),
            criteria: payload.criteria.clone().unwrap_or_default(),
            auto_update: payload.auto_update.unwrap_or(false),
            client_count,
            created_at: Utc::now(),
        };
        let stored = self.store.segments.create(segment).await.map_err(infra)?;
        Ok(ActionResult::completed(
            "Готово, сегмент створено.",
            json!({ "segment_id": stored.id.0, "clients": stored.client_count }),
        ))
    }

    async fn delete_segment(
        &self,
        business_id: &BusinessId,
        name: &str,
    ) -> Result<ActionResult, AgentError> {
        match self.store.segments.delete_by_name(business_id, name.trim()).await.map_err(infra)? {
            Some(segment) => Ok(ActionResult::completed(
                "Готово, сегмент видалено.",
                json!({ "segment_id": segment.id.0 }),
            )),
            None => Ok(not_found("segment", format!("Не знайшла сегмент «{}».", name.trim()))),
        }
    }

    async fn send_sms(
        &self,
        business_id: &BusinessId,
        raw_phone: &str,
        text: &str,
    ) -> Result<ActionResult, AgentError> {
        if text.trim().is_empty() {
            return Ok(missing_fields(&["text"]));
        }
        let Ok(phone) = normalize_phone(raw_phone) else {
            return Ok(invalid_phone(raw_phone));
        };

        let send = self.sms.send(&phone, text.trim()).await;
        let (status, provider_message_id) = match &send {
            Ok(result) => ("sent", result.provider_message_id.clone()),
            Err(err) => {
                warn!(event_name = "sms.send_failed", error = %err);
                ("failed", None)
            }
        };

        let record = SmsMessage {
            id: SmsId(new_entity_id()),
            business_id: business_id.clone(),
            phone: phone.clone(),
            text: text.trim().to_string(),
            status: status.to_string(),
            provider_message_id,
            created_at: Utc::now(),
        };
        let stored = self.store.sms.record(record).await.map_err(infra)?;

        match send {
            Ok(_) => Ok(ActionResult::completed(
                "Готово, SMS надіслано.",
                json!({ "sms_id": stored.id.0, "phone": phone }),
            )),
            Err(_) => Ok(ActionResult::status(
                "sms_failed",
                "Не вдалося надіслати SMS. Спробуйте пізніше.",
                json!({ "sms_id": stored.id.0 }),
            )),
        }
    }
}

fn master_not_found(reference: &str) -> ActionResult {
    not_found("master", format!("Не знайшла майстра «{}». Перевірте ім'я.", reference.trim()))
}

/// `HH:MM` pair with start strictly before end.
fn valid_window(start: &str, end: &str) -> Option<(String, String)> {
    use chrono::NaiveTime;
    let start = start.trim();
    let end = end.trim();
    let parsed_start = NaiveTime::parse_from_str(start, "%H:%M").ok()?;
    let parsed_end = NaiveTime::parse_from_str(end, "%H:%M").ok()?;
    (parsed_start < parsed_end).then(|| (start.to_string(), end.to_string()))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};
    use serde_json::json;

    use zapys_core::domain::BusinessId;

    use super::ActionExecutor;
    use crate::decision::{AgentAction, AppointmentPayload, AppointmentRefPayload, ClientPayload};
    use crate::providers::{NoopPushNotifier, NoopSmsProvider};
    use crate::store::AgentStore;
    use crate::tools::ToolExecutor;

    fn business() -> BusinessId {
        BusinessId("biz".to_string())
    }

    fn executor() -> (ActionExecutor, AgentStore) {
        let store = AgentStore::in_memory();
        let resolver = Arc::new(store.resolver());
        let tools = Arc::new(ToolExecutor::new(store.clone(), resolver.clone()));
        let executor = ActionExecutor::new(
            store.clone(),
            resolver,
            tools,
            Arc::new(NoopSmsProvider),
            Arc::new(NoopPushNotifier),
        );
        (executor, store)
    }

    fn now() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 4, 30, 8, 0, 0).single().unwrap()
    }

    #[tokio::test]
    async fn create_client_requires_name_and_phone() {
        let (executor, _store) = executor();
        let action = AgentAction::CreateClient(ClientPayload {
            name: "Іван".to_string(),
            ..ClientPayload::default()
        });
        let result = executor.execute(&business(), &action, now()).await.expect("execute");
        assert_eq!(result.data["status"], json!("missing_fields"));
        assert!(result.message.contains("телефон"));
    }

    #[tokio::test]
    async fn create_client_rejects_bad_phone_as_reply() {
        let (executor, _store) = executor();
        let action = AgentAction::CreateClient(ClientPayload {
            name: "Іван".to_string(),
            phone: "123".to_string(),
            email: None,
        });
        let result = executor.execute(&business(), &action, now()).await.expect("execute");
        assert_eq!(result.data["status"], json!("invalid_phone"));
    }

    #[tokio::test]
    async fn booking_conflict_suggests_free_hours() {
        let (executor, _store) = executor();
        let master_action = AgentAction::CreateMaster(crate::decision::MasterPayload {
            name: "Олена".to_string(),
            bio: None,
        });
        executor.execute(&business(), &master_action, now()).await.expect("master");

        let booking = |phone: &str| {
            AgentAction::CreateAppointment(AppointmentPayload {
                client_name: "Іван Петров".to_string(),
                phone: phone.to_string(),
                master: "Олена".to_string(),
                start_time: "2025-05-01T10:00".to_string(),
                ..AppointmentPayload::default()
            })
        };

        let first = executor.execute(&business(), &booking("0671234567"), now()).await.expect("ok");
        assert_eq!(first.data["status"], json!("completed"));
        assert_eq!(first.message, "Готово, запис створено.");

        let second =
            executor.execute(&business(), &booking("0507654321"), now()).await.expect("ok");
        assert_eq!(second.data["status"], json!("time_conflict"));
        let suggestions = second.data["suggestions"].as_array().expect("suggestions");
        assert!(!suggestions.is_empty());
        assert!(!suggestions.iter().any(|s| s == "10:00"));
    }

    #[tokio::test]
    async fn cancelling_twice_is_idempotent() {
        let (executor, _store) = executor();
        executor
            .execute(
                &business(),
                &AgentAction::CreateMaster(crate::decision::MasterPayload {
                    name: "Олена".to_string(),
                    bio: None,
                }),
                now(),
            )
            .await
            .expect("master");
        executor
            .execute(
                &business(),
                &AgentAction::CreateAppointment(AppointmentPayload {
                    client_name: "Іван Петров".to_string(),
                    phone: "0671234567".to_string(),
                    master: "Олена".to_string(),
                    start_time: "2025-05-01T10:00".to_string(),
                    ..AppointmentPayload::default()
                }),
                now(),
            )
            .await
            .expect("booking");

        let cancel = AgentAction::CancelAppointment(AppointmentRefPayload {
            phone: Some("0671234567".to_string()),
            ..AppointmentRefPayload::default()
        });
        let first = executor.execute(&business(), &cancel, now()).await.expect("first cancel");
        assert_eq!(first.message, "Готово, запис скасовано.");

        let second = executor.execute(&business(), &cancel, now()).await.expect("second cancel");
        assert_eq!(second.message, "Запис не знайдено або вже скасовано.");
        assert_eq!(second.data["status"], json!("appointment_not_found"));
    }

    #[tokio::test]
    async fn cancel_by_id_of_cancelled_row_reports_already_cancelled() {
        let (executor, _store) = executor();
        executor
            .execute(
                &business(),
                &AgentAction::CreateMaster(crate::decision::MasterPayload {
                    name: "Олена".to_string(),
                    bio: None,
                }),
                now(),
            )
            .await
            .expect("master");
        let booked = executor
            .execute(
                &business(),
                &AgentAction::CreateAppointment(AppointmentPayload {
                    client_name: "Іван Петров".to_string(),
                    phone: "0671234567".to_string(),
                    master: "Олена".to_string(),
                    start_time: "2025-05-01T10:00".to_string(),
                    ..AppointmentPayload::default()
                }),
                now(),
            )
            .await
            .expect("booking");
        let id = booked.data["appointment_id"].as_str().expect("id").to_string();

        let cancel = AgentAction::CancelAppointment(AppointmentRefPayload {
            id: Some(id),
            ..AppointmentRefPayload::default()
        });
        executor.execute(&business(), &cancel, now()).await.expect("first cancel");
        let second = executor.execute(&business(), &cancel, now()).await.expect("second cancel");
        assert_eq!(second.message, "Цей запис уже скасовано.");
        assert_eq!(second.data["already_cancelled"], json!(true));
    }
}

//! In-memory repository implementations behind the same traits as the SQL
//! ones. Used by agent unit and scenario tests; behavior mirrors the SQL
//! queries including soft-delete and upsert semantics.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use zapys_core::domain::appointment::{
    intervals_overlap, Appointment, AppointmentId, AppointmentStatus,
};
use zapys_core::domain::client::{Client, ClientId};
use zapys_core::domain::conversation::Turn;
use zapys_core::domain::engagement::{
    Note, Reminder, ReminderStatus, Segment, SmsMessage,
};
use zapys_core::domain::master::{DayOverride, Master, MasterId, WorkingHours};
use zapys_core::domain::service::{Service, ServiceId};
use zapys_core::domain::BusinessId;

use super::{
    AppointmentRepository, ClientRepository, ConversationRepository, MasterRepository,
    NoteRepository, ReminderRepository, RepositoryError, SegmentRepository, ServiceRepository,
    SettingsRepository, SmsRepository,
};

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.trim().to_lowercase())
}

#[derive(Default)]
pub struct InMemoryClientRepository {
    clients: RwLock<Vec<Client>>,
}

#[async_trait]
impl ClientRepository for InMemoryClientRepository {
    async fn upsert_by_phone(&self, client: Client) -> Result<Client, RepositoryError> {
        let mut clients = self.clients.write().await;
        if let Some(existing) = clients
            .iter_mut()
            .find(|row| row.business_id == client.business_id && row.phone == client.phone)
        {
            existing.name = client.name;
            if client.email.is_some() {
                existing.email = client.email;
            }
            if client.notes.is_some() {
                existing.notes = client.notes;
            }
            existing.is_active = true;
            existing.status = "active".to_string();
            return Ok(existing.clone());
        }
        clients.push(client.clone());
        Ok(client)
    }

    async fn find_by_id(
        &self,
        business_id: &BusinessId,
        id: &ClientId,
    ) -> Result<Option<Client>, RepositoryError> {
        let clients = self.clients.read().await;
        Ok(clients.iter().find(|row| &row.business_id == business_id && &row.id == id).cloned())
    }

    async fn find_by_phone(
        &self,
        business_id: &BusinessId,
        phone: &str,
    ) -> Result<Option<Client>, RepositoryError> {
        let clients = self.clients.read().await;
        Ok(clients
            .iter()
            .find(|row| &row.business_id == business_id && row.phone == phone)
            .cloned())
    }

    async fn search(
        &self,
        business_id: &BusinessId,
        query: &str,
        limit: i64,
    ) -> Result<Vec<Client>, RepositoryError> {
        let clients = self.clients.read().await;
        let mut found: Vec<Client> = clients
            .iter()
            .filter(|row| {
                &row.business_id == business_id
                    && row.is_active
                    && (contains_ci(&row.name, query) || row.phone.contains(query.trim()))
            })
            .cloned()
            .collect();
        found.sort_by(|a, b| a.name.cmp(&b.name));
        found.truncate(limit.max(1) as usize);
        Ok(found)
    }

    async fn append_tag(
        &self,
        business_id: &BusinessId,
        phone: &str,
        tag: &str,
    ) -> Result<Option<Client>, RepositoryError> {
        let mut clients = self.clients.write().await;
        let Some(client) = clients
            .iter_mut()
            .find(|row| &row.business_id == business_id && row.phone == phone)
        else {
            return Ok(None);
        };
        if !client.tags.iter().any(|existing| existing == tag) {
            client.tags.push(tag.to_string());
        }
        Ok(Some(client.clone()))
    }

    async fn deactivate(
        &self,
        business_id: &BusinessId,
        phone: &str,
    ) -> Result<Option<Client>, RepositoryError> {
        let mut clients = self.clients.write().await;
        let Some(client) = clients
            .iter_mut()
            .find(|row| &row.business_id == business_id && row.phone == phone)
        else {
            return Ok(None);
        };
        client.is_active = false;
        client.status = "inactive".to_string();
        Ok(Some(client.clone()))
    }

    async fn list_recent(
        &self,
        business_id: &BusinessId,
        limit: i64,
    ) -> Result<Vec<Client>, RepositoryError> {
        let clients = self.clients.read().await;
        let mut found: Vec<Client> = clients
            .iter()
            .filter(|row| &row.business_id == business_id && row.is_active)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        found.truncate(limit.max(1) as usize);
        Ok(found)
    }

    async fn count_active(&self, business_id: &BusinessId) -> Result<i64, RepositoryError> {
        let clients = self.clients.read().await;
        Ok(clients
            .iter()
            .filter(|row| &row.business_id == business_id && row.is_active)
            .count() as i64)
    }
}

#[derive(Default)]
pub struct InMemoryMasterRepository {
    masters: RwLock<Vec<Master>>,
}

impl InMemoryMasterRepository {
    async fn mutate<F>(
        &self,
        business_id: &BusinessId,
        id: &MasterId,
        apply: F,
    ) -> Result<Option<Master>, RepositoryError>
    where
        F: FnOnce(&mut Master),
    {
        let mut masters = self.masters.write().await;
        let Some(master) =
            masters.iter_mut().find(|row| &row.business_id == business_id && &row.id == id)
        else {
            return Ok(None);
        };
        apply(master);
        Ok(Some(master.clone()))
    }
}

#[async_trait]
impl MasterRepository for InMemoryMasterRepository {
    async fn create(&self, master: Master) -> Result<Master, RepositoryError> {
        let mut masters = self.masters.write().await;
        masters.push(master.clone());
        Ok(master)
    }

    async fn find_by_id(
        &self,
        business_id: &BusinessId,
        id: &MasterId,
    ) -> Result<Option<Master>, RepositoryError> {
        let masters = self.masters.read().await;
        Ok(masters.iter().find(|row| &row.business_id == business_id && &row.id == id).cloned())
    }

    async fn find_by_name_fragment(
        &self,
        business_id: &BusinessId,
        fragment: &str,
    ) -> Result<Option<Master>, RepositoryError> {
        let masters = self.masters.read().await;
        let mut candidates: Vec<&Master> = masters
            .iter()
            .filter(|row| {
                &row.business_id == business_id
                    && row.is_active
                    && contains_ci(&row.name, fragment)
            })
            .collect();
        candidates.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(candidates.first().map(|master| (*master).clone()))
    }

    async fn update_profile(
        &self,
        business_id: &BusinessId,
        id: &MasterId,
        name: Option<String>,
        bio: Option<String>,
    ) -> Result<Option<Master>, RepositoryError> {
        self.mutate(business_id, id, |master| {
            if let Some(name) = name {
                master.name = name;
            }
            if let Some(bio) = bio {
                master.bio = Some(bio);
            }
        })
        .await
    }

    async fn set_working_hours(
        &self,
        business_id: &BusinessId,
        id: &MasterId,
        hours: WorkingHours,
    ) -> Result<Option<Master>, RepositoryError> {
        self.mutate(business_id, id, |master| master.working_hours = hours).await
    }

    async fn set_override(
        &self,
        business_id: &BusinessId,
        id: &MasterId,
        date: &str,
        day: DayOverride,
    ) -> Result<Option<Master>, RepositoryError> {
        self.mutate(business_id, id, |master| {
            master.schedule_overrides.insert(date.to_string(), day);
        })
        .await
    }

    async fn clear_override(
        &self,
        business_id: &BusinessId,
        id: &MasterId,
        date: &str,
    ) -> Result<Option<Master>, RepositoryError> {
        self.mutate(business_id, id, |master| {
            master.schedule_overrides.remove(date);
        })
        .await
    }

    async fn deactivate(
        &self,
        business_id: &BusinessId,
        id: &MasterId,
    ) -> Result<Option<Master>, RepositoryError> {
        self.mutate(business_id, id, |master| master.is_active = false).await
    }

    async fn list_active(&self, business_id: &BusinessId) -> Result<Vec<Master>, RepositoryError> {
        let masters = self.masters.read().await;
        let mut found: Vec<Master> = masters
            .iter()
            .filter(|row| &row.business_id == business_id && row.is_active)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(found)
    }
}

#[derive(Default)]
pub struct InMemoryServiceRepository {
    services: RwLock<Vec<Service>>,
}

#[async_trait]
impl ServiceRepository for InMemoryServiceRepository {
    async fn upsert_by_name(&self, service: Service) -> Result<Service, RepositoryError> {
        let mut services = self.services.write().await;
        if let Some(existing) = services.iter_mut().find(|row| {
            row.business_id == service.business_id
                && row.name.to_lowercase() == service.name.trim().to_lowercase()
        }) {
            existing.price = service.price;
            existing.duration_minutes = service.duration_minutes;
            if service.category.is_some() {
                existing.category = service.category;
            }
            existing.is_active = true;
            return Ok(existing.clone());
        }
        services.push(service.clone());
        Ok(service)
    }

    async fn find_by_name_fragment(
        &self,
        business_id: &BusinessId,
        fragment: &str,
    ) -> Result<Option<Service>, RepositoryError> {
        let services = self.services.read().await;
        let mut candidates: Vec<&Service> = services
            .iter()
            .filter(|row| {
                &row.business_id == business_id
                    && row.is_active
                    && contains_ci(&row.name, fragment)
            })
            .collect();
        candidates.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(candidates.first().map(|service| (*service).clone()))
    }

    async fn find_by_id(
        &self,
        business_id: &BusinessId,
        id: &ServiceId,
    ) -> Result<Option<Service>, RepositoryError> {
        let services = self.services.read().await;
        Ok(services.iter().find(|row| &row.business_id == business_id && &row.id == id).cloned())
    }

    async fn deactivate(
        &self,
        business_id: &BusinessId,
        name: &str,
    ) -> Result<Option<Service>, RepositoryError> {
        let mut services = self.services.write().await;
        let Some(service) = services.iter_mut().find(|row| {
            &row.business_id == business_id
                && row.name.to_lowercase() == name.trim().to_lowercase()
        }) else {
            return Ok(None);
        };
        service.is_active = false;
        Ok(Some(service.clone()))
    }

    async fn list_active(
        &self,
        business_id: &BusinessId,
    ) -> Result<Vec<Service>, RepositoryError> {
        let services = self.services.read().await;
        let mut found: Vec<Service> = services
            .iter()
            .filter(|row| &row.business_id == business_id && row.is_active)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(found)
    }
}

#[derive(Default)]
pub struct InMemoryAppointmentRepository {
    appointments: RwLock<Vec<Appointment>>,
}

#[async_trait]
impl AppointmentRepository for InMemoryAppointmentRepository {
    async fn create(&self, appointment: Appointment) -> Result<Appointment, RepositoryError> {
        let mut appointments = self.appointments.write().await;
        appointments.push(appointment.clone());
        Ok(appointment)
    }

    async fn find_by_id(
        &self,
        business_id: &BusinessId,
        id: &AppointmentId,
    ) -> Result<Option<Appointment>, RepositoryError> {
        let appointments = self.appointments.read().await;
        Ok(appointments
            .iter()
            .find(|row| &row.business_id == business_id && &row.id == id)
            .cloned())
    }

    async fn set_status(
        &self,
        business_id: &BusinessId,
        id: &AppointmentId,
        status: AppointmentStatus,
    ) -> Result<Option<Appointment>, RepositoryError> {
        let mut appointments = self.appointments.write().await;
        let Some(appointment) =
            appointments.iter_mut().find(|row| &row.business_id == business_id && &row.id == id)
        else {
            return Ok(None);
        };
        appointment.status = status;
        Ok(Some(appointment.clone()))
    }

    async fn reschedule(
        &self,
        business_id: &BusinessId,
        id: &AppointmentId,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Result<Option<Appointment>, RepositoryError> {
        let mut appointments = self.appointments.write().await;
        let Some(appointment) =
            appointments.iter_mut().find(|row| &row.business_id == business_id && &row.id == id)
        else {
            return Ok(None);
        };
        appointment.start_time = start_time;
        appointment.end_time = end_time;
        Ok(Some(appointment.clone()))
    }

    async fn find_conflicts(
        &self,
        business_id: &BusinessId,
        master_id: &MasterId,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        exclude: Option<&AppointmentId>,
    ) -> Result<Vec<Appointment>, RepositoryError> {
        let appointments = self.appointments.read().await;
        Ok(appointments
            .iter()
            .filter(|row| {
                &row.business_id == business_id
                    && &row.master_id == master_id
                    && row.status != AppointmentStatus::Cancelled
                    && Some(&row.id) != exclude
                    && intervals_overlap(row.start_time, row.end_time, start_time, end_time)
            })
            .cloned()
            .collect())
    }

    async fn find_by_phone_and_start(
        &self,
        business_id: &BusinessId,
        phone: &str,
        start_time: DateTime<Utc>,
    ) -> Result<Option<Appointment>, RepositoryError> {
        let appointments = self.appointments.read().await;
        Ok(appointments
            .iter()
            .find(|row| {
                &row.business_id == business_id
                    && row.client_phone == phone
                    && row.start_time == start_time
                    && row.status != AppointmentStatus::Cancelled
            })
            .cloned())
    }

    async fn next_upcoming_by_phone(
        &self,
        business_id: &BusinessId,
        phone: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Appointment>, RepositoryError> {
        let appointments = self.appointments.read().await;
        let mut upcoming: Vec<&Appointment> = appointments
            .iter()
            .filter(|row| {
                &row.business_id == business_id
                    && row.client_phone == phone
                    && row.start_time >= now
                    && row.status != AppointmentStatus::Cancelled
            })
            .collect();
        upcoming.sort_by(|a, b| a.start_time.cmp(&b.start_time));
        Ok(upcoming.first().map(|appointment| (*appointment).clone()))
    }

    async fn next_upcoming_by_name(
        &self,
        business_id: &BusinessId,
        fragment: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Appointment>, RepositoryError> {
        let appointments = self.appointments.read().await;
        let mut upcoming: Vec<&Appointment> = appointments
            .iter()
            .filter(|row| {
                &row.business_id == business_id
                    && contains_ci(&row.client_name, fragment)
                    && row.start_time >= now
                    && row.status != AppointmentStatus::Cancelled
            })
            .collect();
        upcoming.sort_by(|a, b| a.start_time.cmp(&b.start_time));
        Ok(upcoming.first().map(|appointment| (*appointment).clone()))
    }

    async fn list_between(
        &self,
        business_id: &BusinessId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Appointment>, RepositoryError> {
        let appointments = self.appointments.read().await;
        let mut found: Vec<Appointment> = appointments
            .iter()
            .filter(|row| {
                &row.business_id == business_id && row.start_time >= from && row.start_time < to
            })
            .cloned()
            .collect();
        found.sort_by(|a, b| a.start_time.cmp(&b.start_time));
        found.truncate(limit.max(1) as usize);
        Ok(found)
    }

    async fn list_for_master_between(
        &self,
        business_id: &BusinessId,
        master_id: &MasterId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, RepositoryError> {
        let appointments = self.appointments.read().await;
        let mut found: Vec<Appointment> = appointments
            .iter()
            .filter(|row| {
                &row.business_id == business_id
                    && &row.master_id == master_id
                    && row.status != AppointmentStatus::Cancelled
                    && row.start_time >= from
                    && row.start_time < to
            })
            .cloned()
            .collect();
        found.sort_by(|a, b| a.start_time.cmp(&b.start_time));
        Ok(found)
    }
}

#[derive(Default)]
pub struct InMemoryNoteRepository {
    notes: RwLock<Vec<Note>>,
}

#[async_trait]
impl NoteRepository for InMemoryNoteRepository {
    async fn create(&self, note: Note) -> Result<Note, RepositoryError> {
        let mut notes = self.notes.write().await;
        notes.push(note.clone());
        Ok(note)
    }

    async fn list_recent(
        &self,
        business_id: &BusinessId,
        limit: i64,
    ) -> Result<Vec<Note>, RepositoryError> {
        let notes = self.notes.read().await;
        let mut found: Vec<Note> =
            notes.iter().filter(|row| &row.business_id == business_id).cloned().collect();
        found.sort_by(|a, b| b.date.cmp(&a.date).then(b.created_at.cmp(&a.created_at)));
        found.truncate(limit.max(1) as usize);
        Ok(found)
    }

    async fn complete_matching(
        &self,
        business_id: &BusinessId,
        fragment: &str,
    ) -> Result<Option<Note>, RepositoryError> {
        let mut notes = self.notes.write().await;
        let mut open: Vec<&mut Note> = notes
            .iter_mut()
            .filter(|row| {
                &row.business_id == business_id && !row.completed && contains_ci(&row.text, fragment)
            })
            .collect();
        open.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let Some(note) = open.into_iter().next() else {
            return Ok(None);
        };
        note.completed = true;
        Ok(Some(note.clone()))
    }
}

#[derive(Default)]
pub struct InMemoryReminderRepository {
    reminders: RwLock<Vec<Reminder>>,
}

#[async_trait]
impl ReminderRepository for InMemoryReminderRepository {
    async fn create(&self, reminder: Reminder) -> Result<Reminder, RepositoryError> {
        let mut reminders = self.reminders.write().await;
        reminders.push(reminder.clone());
        Ok(reminder)
    }

    async fn list_upcoming(
        &self,
        business_id: &BusinessId,
        limit: i64,
    ) -> Result<Vec<Reminder>, RepositoryError> {
        let reminders = self.reminders.read().await;
        let mut found: Vec<Reminder> = reminders
            .iter()
            .filter(|row| {
                &row.business_id == business_id && row.status == ReminderStatus::Pending
            })
            .cloned()
            .collect();
        found.sort_by(|a, b| a.scheduled_at.cmp(&b.scheduled_at));
        found.truncate(limit.max(1) as usize);
        Ok(found)
    }

    async fn cancel_matching(
        &self,
        business_id: &BusinessId,
        fragment: &str,
    ) -> Result<Option<Reminder>, RepositoryError> {
        let mut reminders = self.reminders.write().await;
        let mut pending: Vec<&mut Reminder> = reminders
            .iter_mut()
            .filter(|row| {
                &row.business_id == business_id
                    && row.status == ReminderStatus::Pending
                    && contains_ci(&row.message, fragment)
            })
            .collect();
        pending.sort_by(|a, b| a.scheduled_at.cmp(&b.scheduled_at));
        let Some(reminder) = pending.into_iter().next() else {
            return Ok(None);
        };
        reminder.status = ReminderStatus::Cancelled;
        Ok(Some(reminder.clone()))
    }
}

#[derive(Default)]
pub struct InMemorySegmentRepository {
    segments: RwLock<Vec<Segment>>,
}

#[async_trait]
impl SegmentRepository for InMemorySegmentRepository {
    async fn create(&self, segment: Segment) -> Result<Segment, RepositoryError> {
        let mut segments = self.segments.write().await;
        segments.push(segment.clone());
        Ok(segment)
    }

    async fn list(&self, business_id: &BusinessId) -> Result<Vec<Segment>, RepositoryError> {
        let segments = self.segments.read().await;
        let mut found: Vec<Segment> =
            segments.iter().filter(|row| &row.business_id == business_id).cloned().collect();
        found.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(found)
    }

    async fn delete_by_name(
        &self,
        business_id: &BusinessId,
        name: &str,
    ) -> Result<Option<Segment>, RepositoryError> {
        let mut segments = self.segments.write().await;
        let position = segments.iter().position(|row| {
            &row.business_id == business_id
                && row.name.to_lowercase() == name.trim().to_lowercase()
        });
        Ok(position.map(|index| segments.remove(index)))
    }
}

#[derive(Default)]
pub struct InMemorySmsRepository {
    messages: RwLock<Vec<SmsMessage>>,
}

#[async_trait]
impl SmsRepository for InMemorySmsRepository {
    async fn record(&self, sms: SmsMessage) -> Result<SmsMessage, RepositoryError> {
        let mut messages = self.messages.write().await;
        messages.push(sms.clone());
        Ok(sms)
    }

    async fn list_recent(
        &self,
        business_id: &BusinessId,
        limit: i64,
    ) -> Result<Vec<SmsMessage>, RepositoryError> {
        let messages = self.messages.read().await;
        let mut found: Vec<SmsMessage> =
            messages.iter().filter(|row| &row.business_id == business_id).cloned().collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        found.truncate(limit.max(1) as usize);
        Ok(found)
    }
}

#[derive(Default)]
pub struct InMemoryConversationRepository {
    turns: RwLock<Vec<Turn>>,
}

#[async_trait]
impl ConversationRepository for InMemoryConversationRepository {
    async fn append(&self, turn: Turn) -> Result<(), RepositoryError> {
        let mut turns = self.turns.write().await;
        turns.push(turn);
        Ok(())
    }

    async fn last_turns(
        &self,
        business_id: &BusinessId,
        session_id: &str,
        limit: i64,
    ) -> Result<Vec<Turn>, RepositoryError> {
        let turns = self.turns.read().await;
        let matching: Vec<Turn> = turns
            .iter()
            .filter(|row| &row.business_id == business_id && row.session_id == session_id)
            .cloned()
            .collect();
        let skip = matching.len().saturating_sub(limit.max(1) as usize);
        Ok(matching.into_iter().skip(skip).collect())
    }
}

#[derive(Default)]
pub struct InMemorySettingsRepository {
    values: RwLock<HashMap<(String, String), String>>,
}

#[async_trait]
impl SettingsRepository for InMemorySettingsRepository {
    async fn get(
        &self,
        business_id: &BusinessId,
        key: &str,
    ) -> Result<Option<String>, RepositoryError> {
        let values = self.values.read().await;
        Ok(values.get(&(business_id.0.clone(), key.to_string())).cloned())
    }

    async fn set(
        &self,
        business_id: &BusinessId,
        key: &str,
        value: &str,
    ) -> Result<(), RepositoryError> {
        let mut values = self.values.write().await;
        values.insert((business_id.0.clone(), key.to_string()), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use zapys_core::domain::client::Client;
    use zapys_core::domain::BusinessId;

    use super::InMemoryClientRepository;
    use crate::repositories::ClientRepository;

    #[tokio::test]
    async fn upsert_by_phone_converges_on_one_row() {
        let repo = InMemoryClientRepository::default();
        let business = BusinessId("b-1".to_string());

        let first = Client::new(business.clone(), "Іван", "+380671234567");
        let stored = repo.upsert_by_phone(first).await.expect("upsert");

        let mut second = Client::new(business.clone(), "Іван Петров", "+380671234567");
        second.created_at = Utc::now() + Duration::seconds(5);
        let updated = repo.upsert_by_phone(second).await.expect("upsert again");

        assert_eq!(stored.id, updated.id);
        assert_eq!(updated.name, "Іван Петров");
        assert_eq!(repo.count_active(&business).await.expect("count"), 1);
    }
}

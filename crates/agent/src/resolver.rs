//! Entity resolution. Users refer to things loosely (a name fragment, a bare
//! phone, sometimes an id) and every mutation path funnels through here so the
//! lookup chain is identical everywhere.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use zapys_core::domain::appointment::{Appointment, AppointmentId};
use zapys_core::domain::master::{Master, MasterId};
use zapys_core::domain::service::Service;
use zapys_core::domain::BusinessId;
use zapys_core::phone::normalize_phone;
use zapys_db::repositories::{
    AppointmentRepository, MasterRepository, RepositoryError, ServiceRepository,
};

use crate::decision::AppointmentRefPayload;
use crate::heuristics;

pub struct EntityResolver {
    masters: Arc<dyn MasterRepository>,
    services: Arc<dyn ServiceRepository>,
    appointments: Arc<dyn AppointmentRepository>,
}

impl EntityResolver {
    pub fn new(
        masters: Arc<dyn MasterRepository>,
        services: Arc<dyn ServiceRepository>,
        appointments: Arc<dyn AppointmentRepository>,
    ) -> Self {
        Self { masters, services, appointments }
    }

    /// Id match first, then earliest-created active master whose name
    /// contains the fragment. A miss retries with the last letter dropped:
    /// free text refers to masters in oblique cases («до Олени»), and the
    /// shortened stem still matches the nominative name.
    pub async fn resolve_master(
        &self,
        business_id: &BusinessId,
        reference: &str,
    ) -> Result<Option<Master>, RepositoryError> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Ok(None);
        }
        if let Some(master) =
            self.masters.find_by_id(business_id, &MasterId(reference.to_string())).await?
        {
            return Ok(Some(master));
        }
        if let Some(master) = self.masters.find_by_name_fragment(business_id, reference).await? {
            return Ok(Some(master));
        }
        let stem: String = {
            let mut chars: Vec<char> = reference.chars().collect();
            chars.pop();
            chars.into_iter().collect()
        };
        if stem.chars().count() >= 3 {
            return self.masters.find_by_name_fragment(business_id, &stem).await;
        }
        Ok(None)
    }

    pub async fn resolve_service(
        &self,
        business_id: &BusinessId,
        reference: &str,
    ) -> Result<Option<Service>, RepositoryError> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Ok(None);
        }
        self.services.find_by_name_fragment(business_id, reference).await
    }

    /// Fallback chain: explicit id, then normalized phone + exact start time,
    /// then next upcoming by phone, then next upcoming by client name. The
    /// winning method is returned for turn metadata.
    pub async fn resolve_appointment(
        &self,
        business_id: &BusinessId,
        reference: &AppointmentRefPayload,
        now: DateTime<Utc>,
    ) -> Result<Option<(Appointment, &'static str)>, RepositoryError> {
        if let Some(id) = reference.id.as_deref().map(str::trim).filter(|id| !id.is_empty()) {
            if let Some(found) =
                self.appointments.find_by_id(business_id, &AppointmentId(id.to_string())).await?
            {
                return Ok(Some((found, "id")));
            }
        }

        let phone = reference
            .phone
            .as_deref()
            .and_then(|raw| normalize_phone(raw).ok());
        if let Some(phone) = &phone {
            if let Some(start) = reference
                .start_time
                .as_deref()
                .and_then(|raw| heuristics::parse_datetime(raw, now))
            {
                if let Some(found) =
                    self.appointments.find_by_phone_and_start(business_id, phone, start).await?
                {
                    return Ok(Some((found, "phone_and_start")));
                }
            }
            if let Some(found) =
                self.appointments.next_upcoming_by_phone(business_id, phone, now).await?
            {
                return Ok(Some((found, "next_by_phone")));
            }
        }

        if let Some(name) = reference
            .client_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
        {
            if let Some(found) =
                self.appointments.next_upcoming_by_name(business_id, name, now).await?
            {
                return Ok(Some((found, "next_by_name")));
            }
        }

        debug!(event_name = "resolver.appointment_miss", business_id = %business_id.0);
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, TimeZone, Utc};

    use zapys_core::domain::appointment::{Appointment, AppointmentId, AppointmentStatus};
    use zapys_core::domain::client::ClientId;
    use zapys_core::domain::master::Master;
    use zapys_core::domain::{new_entity_id, BusinessId};
    use zapys_db::repositories::{
        AppointmentRepository, InMemoryAppointmentRepository, InMemoryMasterRepository,
        InMemoryServiceRepository, MasterRepository,
    };

    use super::EntityResolver;
    use crate::decision::AppointmentRefPayload;

    fn business() -> BusinessId {
        BusinessId("biz".to_string())
    }

    fn resolver(
        masters: Arc<InMemoryMasterRepository>,
        appointments: Arc<InMemoryAppointmentRepository>,
    ) -> EntityResolver {
        EntityResolver::new(masters, Arc::new(InMemoryServiceRepository::default()), appointments)
    }

    #[tokio::test]
    async fn master_resolves_by_id_and_by_fragment() {
        let masters = Arc::new(InMemoryMasterRepository::default());
        let appointments = Arc::new(InMemoryAppointmentRepository::default());
        let created = masters
            .create(Master::new(business(), "Олена Коваль"))
            .await
            .expect("create");
        let resolver = resolver(masters, appointments);

        let by_id = resolver.resolve_master(&business(), &created.id.0).await.expect("ok");
        assert_eq!(by_id.expect("found").id, created.id);

        let by_fragment = resolver.resolve_master(&business(), "олена").await.expect("ok");
        assert_eq!(by_fragment.expect("found").id, created.id);

        assert!(resolver.resolve_master(&business(), "Ірина").await.expect("ok").is_none());
    }

    #[tokio::test]
    async fn appointment_chain_falls_back_from_id_to_phone() {
        let masters = Arc::new(InMemoryMasterRepository::default());
        let appointments = Arc::new(InMemoryAppointmentRepository::default());
        let master =
            masters.create(Master::new(business(), "Олена")).await.expect("create master");

        let now = Utc.with_ymd_and_hms(2025, 4, 30, 9, 0, 0).single().unwrap();
        let start = now + Duration::days(1);
        appointments
            .create(Appointment {
                id: AppointmentId(new_entity_id()),
                business_id: business(),
                master_id: master.id.clone(),
                client_id: ClientId(new_entity_id()),
                client_name: "Іван Петров".to_string(),
                client_phone: "+380671234567".to_string(),
                start_time: start,
                end_time: start + Duration::minutes(60),
                status: AppointmentStatus::Confirmed,
                service_ids: Vec::new(),
                notes: None,
                source: "agent".to_string(),
                created_at: now,
            })
            .await
            .expect("create appointment");
        let resolver = resolver(masters, appointments);

        let reference = AppointmentRefPayload {
            id: Some("missing-id".to_string()),
            phone: Some("0671234567".to_string()),
            ..AppointmentRefPayload::default()
        };
        let (found, method) = resolver
            .resolve_appointment(&business(), &reference, now)
            .await
            .expect("ok")
            .expect("found");
        assert_eq!(found.client_phone, "+380671234567");
        assert_eq!(method, "next_by_phone");
    }
}

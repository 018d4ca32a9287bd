//! Read-only tool layer. Tools never mutate anything; each returns a JSON
//! document that the formatter turns into a reply and that also lands in the
//! turn metadata.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Timelike, Utc};
use serde_json::{json, Value};
use tracing::debug;

use zapys_core::domain::appointment::{intervals_overlap, AppointmentStatus};
use zapys_core::domain::BusinessId;
use zapys_core::phone::normalize_phone;
use zapys_db::repositories::RepositoryError;

use crate::decision::{ToolArgs, ToolRequest};
use crate::resolver::EntityResolver;
use crate::store::AgentStore;

const DEFAULT_LIMIT: i64 = 10;
const DEFAULT_DAYS: i64 = 7;

#[derive(Clone, Debug)]
pub struct ToolOutcome {
    pub tool: String,
    pub data: Value,
}

pub struct ToolExecutor {
    store: AgentStore,
    resolver: Arc<EntityResolver>,
}

impl ToolExecutor {
    pub fn new(store: AgentStore, resolver: Arc<EntityResolver>) -> Self {
        Self { store, resolver }
    }

    pub async fn run(
        &self,
        business_id: &BusinessId,
        request: &ToolRequest,
        now: DateTime<Utc>,
    ) -> Result<ToolOutcome, RepositoryError> {
        debug!(event_name = "tool.run", tool = %request.tool, business_id = %business_id.0);
        let args = &request.args;
        let data = match request.tool.as_str() {
            "who_working" => self.who_working(business_id, args, now).await?,
            "free_slots" => self.free_slots(business_id, args, now).await?,
            "gaps_summary" => self.gaps_summary(business_id, args, now).await?,
            "analytics_kpi" => self.analytics_kpi(business_id, args, now).await?,
            "payments_kpi" => self.payments_kpi(business_id, args, now).await?,
            "appointments_list" => self.appointments_list(business_id, args, now).await?,
            "clients_search" => self.clients_search(business_id, args).await?,
            "client_by_phone" => self.client_by_phone(business_id, args).await?,
            "segments_list" => self.segments_list(business_id).await?,
            "notes_list" => self.notes_list(business_id, args).await?,
            "reminders_list" => self.reminders_list(business_id, args).await?,
            "social_inbox_summary" => self.social_inbox_summary(business_id).await?,
            "services_top" => self.services_top(business_id, args, now).await?,
            "masters_top" => self.masters_top(business_id, args, now).await?,
            "schedule_overview" => self.schedule_overview(business_id, args, now).await?,
            "biz_overview" => self.biz_overview(business_id, now).await?,
            _ => json!({ "status": "unknown_tool" }),
        };
        Ok(ToolOutcome { tool: request.tool.clone(), data })
    }

    async fn who_working(
        &self,
        business_id: &BusinessId,
        args: &ToolArgs,
        now: DateTime<Utc>,
    ) -> Result<Value, RepositoryError> {
        let date = arg_date(args, now);
        let masters = self.store.masters.list_active(business_id).await?;
        let rows: Vec<Value> = masters
            .iter()
            .map(|master| {
                let window = master.day_window(date).map(|(start, end)| {
                    format!("{}-{}", start.format("%H:%M"), end.format("%H:%M"))
                });
                json!({ "name": master.name, "window": window })
            })
            .collect();
        Ok(json!({ "date": date.format("%Y-%m-%d").to_string(), "masters": rows }))
    }

    /// Hour-granularity free starts inside the master's window for the date.
    /// A slot is free when `[slot, slot + 1h)` touches no non-cancelled
    /// appointment.
    async fn free_slots(
        &self,
        business_id: &BusinessId,
        args: &ToolArgs,
        now: DateTime<Utc>,
    ) -> Result<Value, RepositoryError> {
        let Some(reference) = args.master_name.as_deref().filter(|name| !name.trim().is_empty())
        else {
            return Ok(json!({ "status": "master_required" }));
        };
        let Some(master) = self.resolver.resolve_master(business_id, reference).await? else {
            return Ok(json!({ "status": "master_not_found", "master": reference }));
        };

        let date = arg_date(args, now);
        let slots = self.free_slots_for(business_id, &master, date, now).await?;
        Ok(json!({
            "master": master.name,
            "date": date.format("%Y-%m-%d").to_string(),
            "slots": slots,
        }))
    }

    async fn free_slots_for(
        &self,
        business_id: &BusinessId,
        master: &zapys_core::domain::master::Master,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Vec<String>, RepositoryError> {
        let Some((open, close)) = master.day_window(date) else {
            return Ok(Vec::new());
        };
        let day_start = date.and_time(open).and_utc();
        let day_end = date.and_time(close).and_utc();
        let booked = self.store
            .appointments
            .list_for_master_between(business_id, &master.id, day_start, day_end)
            .await?;

        let mut slots = Vec::new();
        let mut cursor = day_start;
        // Align forward to the next full hour when the window opens mid-hour.
        if cursor.minute() != 0 {
            cursor = cursor + Duration::minutes(60 - i64::from(cursor.minute()));
        }
        while cursor + Duration::hours(1) <= day_end {
            let slot_end = cursor + Duration::hours(1);
            let taken = booked.iter().any(|appointment| {
                appointment.status != AppointmentStatus::Cancelled
                    && intervals_overlap(
                        cursor,
                        slot_end,
                        appointment.start_time,
                        appointment.end_time,
                    )
            });
            if !taken && cursor >= now {
                slots.push(cursor.format("%H:%M").to_string());
            }
            cursor = slot_end;
        }
        Ok(slots)
    }

    async fn gaps_summary(
        &self,
        business_id: &BusinessId,
        args: &ToolArgs,
        now: DateTime<Utc>,
    ) -> Result<Value, RepositoryError> {
        let days = args.days.unwrap_or(DEFAULT_DAYS).clamp(1, 31);
        let masters = self.store.masters.list_active(business_id).await?;
        let mut rows = Vec::new();
        for master in &masters {
            let mut free_hours = 0usize;
            for offset in 0..days {
                let date = (now + Duration::days(offset)).date_naive();
                free_hours += self.free_slots_for(business_id, master, date, now).await?.len();
            }
            rows.push(json!({ "master": master.name, "free_hours": free_hours }));
        }
        Ok(json!({ "days": days, "masters": rows }))
    }

    async fn analytics_kpi(
        &self,
        business_id: &BusinessId,
        args: &ToolArgs,
        now: DateTime<Utc>,
    ) -> Result<Value, RepositoryError> {
        let days = args.days.unwrap_or(30).clamp(1, 365);
        let from = now - Duration::days(days);
        let rows = self.store.appointments.list_between(business_id, from, now, 1_000).await?;

        let total = rows.len();
        let done = rows.iter().filter(|a| a.status == AppointmentStatus::Done).count();
        let cancelled = rows.iter().filter(|a| a.status == AppointmentStatus::Cancelled).count();
        let unique_clients: std::collections::HashSet<&str> =
            rows.iter().map(|a| a.client_phone.as_str()).collect();

        Ok(json!({
            "days": days,
            "appointments": total,
            "done": done,
            "cancelled": cancelled,
            "unique_clients": unique_clients.len(),
        }))
    }

    /// Revenue estimate: sum of service prices over done appointments in the
    /// window, in minor units.
    async fn payments_kpi(
        &self,
        business_id: &BusinessId,
        args: &ToolArgs,
        now: DateTime<Utc>,
    ) -> Result<Value, RepositoryError> {
        let days = args.days.unwrap_or(30).clamp(1, 365);
        let from = now - Duration::days(days);
        let rows = self.store.appointments.list_between(business_id, from, now, 1_000).await?;

        let mut revenue: i64 = 0;
        let mut paid_visits = 0usize;
        for appointment in rows.iter().filter(|a| a.status == AppointmentStatus::Done) {
            paid_visits += 1;
            for service_id in &appointment.service_ids {
                if let Some(service) = self.store.services.find_by_id(business_id, service_id).await? {
                    revenue += service.price;
                }
            }
        }
        Ok(json!({ "days": days, "revenue": revenue, "paid_visits": paid_visits }))
    }

    async fn appointments_list(
        &self,
        business_id: &BusinessId,
        args: &ToolArgs,
        now: DateTime<Utc>,
    ) -> Result<Value, RepositoryError> {
        let from = match args.date.as_deref().and_then(parse_date) {
            Some(date) => date.and_hms_opt(0, 0, 0).map(|t| t.and_utc()).unwrap_or(now),
            None => now,
        };
        let days = args.days.unwrap_or(1).clamp(1, 31);
        let limit = args.limit.unwrap_or(20).clamp(1, 100);
        let rows = self.store
            .appointments
            .list_between(business_id, from, from + Duration::days(days), limit)
            .await?;
        let items: Vec<Value> = rows
            .iter()
            .map(|a| {
                json!({
                    "id": a.id.0,
                    "start": a.start_time.format("%Y-%m-%d %H:%M").to_string(),
                    "client": a.client_name,
                    "phone": a.client_phone,
                    "status": a.status.as_str(),
                })
            })
            .collect();
        Ok(json!({ "appointments": items }))
    }

    async fn clients_search(
        &self,
        business_id: &BusinessId,
        args: &ToolArgs,
    ) -> Result<Value, RepositoryError> {
        let query = args.query.clone().unwrap_or_default();
        let limit = args.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, 50);
        let rows = if query.trim().is_empty() {
            self.store.clients.list_recent(business_id, limit).await?
        } else {
            self.store.clients.search(business_id, &query, limit).await?
        };
        let items: Vec<Value> = rows
            .iter()
            .map(|c| json!({ "name": c.name, "phone": c.phone, "tags": c.tags }))
            .collect();
        Ok(json!({ "query": query, "clients": items }))
    }

    async fn client_by_phone(
        &self,
        business_id: &BusinessId,
        args: &ToolArgs,
    ) -> Result<Value, RepositoryError> {
        let raw = args.phone.clone().unwrap_or_default();
        let Ok(phone) = normalize_phone(&raw) else {
            return Ok(json!({ "status": "invalid_phone", "phone": raw }));
        };
        match self.store.clients.find_by_phone(business_id, &phone).await? {
            Some(client) => Ok(json!({
                "name": client.name,
                "phone": client.phone,
                "tags": client.tags,
                "total_appointments": client.total_appointments,
                "last_appointment": client
                    .last_appointment_date
                    .map(|d| d.format("%Y-%m-%d").to_string()),
            })),
            None => Ok(json!({ "status": "client_not_found", "phone": phone })),
        }
    }

    async fn segments_list(&self, business_id: &BusinessId) -> Result<Value, RepositoryError> {
        let rows = self.store.segments.list(business_id).await?;
        let items: Vec<Value> = rows
            .iter()
            .map(|s| json!({ "name": s.name, "criteria": s.criteria, "clients": s.client_count }))
            .collect();
        Ok(json!({ "segments": items }))
    }

    async fn notes_list(
        &self,
        business_id: &BusinessId,
        args: &ToolArgs,
    ) -> Result<Value, RepositoryError> {
        let limit = args.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, 50);
        let rows = self.store.notes.list_recent(business_id, limit).await?;
        let items: Vec<Value> = rows
            .iter()
            .map(|n| {
                json!({
                    "text": n.text,
                    "date": n.date.format("%Y-%m-%d").to_string(),
                    "completed": n.completed,
                })
            })
            .collect();
        Ok(json!({ "notes": items }))
    }

    async fn reminders_list(
        &self,
        business_id: &BusinessId,
        args: &ToolArgs,
    ) -> Result<Value, RepositoryError> {
        let limit = args.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, 50);
        let rows = self.store.reminders.list_upcoming(business_id, limit).await?;
        let items: Vec<Value> = rows
            .iter()
            .map(|r| {
                json!({
                    "message": r.message,
                    "at": r.scheduled_at.format("%Y-%m-%d %H:%M").to_string(),
                })
            })
            .collect();
        Ok(json!({ "reminders": items }))
    }

    /// The only outbound channel is SMS, so the inbox summary reports recent
    /// sends rather than a per-network breakdown.
    async fn social_inbox_summary(
        &self,
        business_id: &BusinessId,
    ) -> Result<Value, RepositoryError> {
        let rows = self.store.sms.list_recent(business_id, 20).await?;
        Ok(json!({ "recent_sms": rows.len() }))
    }

    /// Services ranked by bookings over the window; price breaks ties.
    async fn services_top(
        &self,
        business_id: &BusinessId,
        args: &ToolArgs,
        now: DateTime<Utc>,
    ) -> Result<Value, RepositoryError> {
        let limit = args.limit.unwrap_or(5).clamp(1, 20) as usize;
        let services = self.store.services.list_active(business_id).await?;
        let rows = self.store
            .appointments
            .list_between(business_id, now - Duration::days(30), now, 1_000)
            .await?;

        let mut bookings: HashMap<&str, i64> = HashMap::new();
        for appointment in &rows {
            for service_id in &appointment.service_ids {
                *bookings.entry(service_id.0.as_str()).or_default() += 1;
            }
        }
        let mut ranked: Vec<_> = services
            .iter()
            .map(|s| (s, bookings.get(s.id.0.as_str()).copied().unwrap_or(0)))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(b.0.price.cmp(&a.0.price)));

        let items: Vec<Value> = ranked
            .into_iter()
            .take(limit)
            .map(|(s, count)| json!({ "name": s.name, "price": s.price, "bookings": count }))
            .collect();
        Ok(json!({ "services": items }))
    }

    async fn masters_top(
        &self,
        business_id: &BusinessId,
        args: &ToolArgs,
        now: DateTime<Utc>,
    ) -> Result<Value, RepositoryError> {
        let days = args.days.unwrap_or(30).clamp(1, 365);
        let masters = self.store.masters.list_active(business_id).await?;
        let rows = self.store
            .appointments
            .list_between(business_id, now - Duration::days(days), now, 1_000)
            .await?;

        let mut counts: HashMap<&str, i64> = HashMap::new();
        for appointment in rows.iter().filter(|a| a.status != AppointmentStatus::Cancelled) {
            *counts.entry(appointment.master_id.0.as_str()).or_default() += 1;
        }
        let mut ranked: Vec<_> = masters
            .iter()
            .map(|m| (m, counts.get(m.id.0.as_str()).copied().unwrap_or(0)))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1));

        let items: Vec<Value> = ranked
            .into_iter()
            .map(|(m, count)| json!({ "name": m.name, "appointments": count }))
            .collect();
        Ok(json!({ "days": days, "masters": items }))
    }

    async fn schedule_overview(
        &self,
        business_id: &BusinessId,
        args: &ToolArgs,
        now: DateTime<Utc>,
    ) -> Result<Value, RepositoryError> {
        let days = args.days.unwrap_or(DEFAULT_DAYS).clamp(1, 31);
        let masters = match args.master_name.as_deref().filter(|name| !name.trim().is_empty()) {
            Some(reference) => match self.resolver.resolve_master(business_id, reference).await? {
                Some(master) => vec![master],
                None => {
                    return Ok(json!({ "status": "master_not_found", "master": reference }));
                }
            },
            None => self.store.masters.list_active(business_id).await?,
        };

        let mut rows = Vec::new();
        for master in &masters {
            let mut day_rows = Vec::new();
            for offset in 0..days {
                let date = (now + Duration::days(offset)).date_naive();
                let window = master.day_window(date).map(|(start, end)| {
                    format!("{}-{}", start.format("%H:%M"), end.format("%H:%M"))
                });
                day_rows.push(json!({
                    "date": date.format("%Y-%m-%d").to_string(),
                    "window": window,
                }));
            }
            rows.push(json!({ "master": master.name, "days": day_rows }));
        }
        Ok(json!({ "masters": rows }))
    }

    async fn biz_overview(
        &self,
        business_id: &BusinessId,
        now: DateTime<Utc>,
    ) -> Result<Value, RepositoryError> {
        let clients = self.store.clients.count_active(business_id).await?;
        let masters = self.store.masters.list_active(business_id).await?.len();
        let services = self.store.services.list_active(business_id).await?.len();
        let upcoming = self.store
            .appointments
            .list_between(business_id, now, now + Duration::days(7), 1_000)
            .await?
            .len();
        Ok(json!({
            "clients": clients,
            "masters": masters,
            "services": services,
            "upcoming_week": upcoming,
        }))
    }
}

fn arg_date(args: &ToolArgs, now: DateTime<Utc>) -> NaiveDate {
    args.date.as_deref().and_then(parse_date).unwrap_or_else(|| now.date_naive())
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, TimeZone, Utc};
    use serde_json::json;

    use zapys_core::domain::appointment::{Appointment, AppointmentId, AppointmentStatus};
    use zapys_core::domain::client::ClientId;
    use zapys_core::domain::master::Master;
    use zapys_core::domain::{new_entity_id, BusinessId};

    use super::ToolExecutor;
    use crate::decision::{ToolArgs, ToolRequest};
    use crate::store::AgentStore;

    fn business() -> BusinessId {
        BusinessId("biz".to_string())
    }

    struct Fixture {
        executor: ToolExecutor,
        store: AgentStore,
    }

    fn fixture() -> Fixture {
        let store = AgentStore::in_memory();
        let resolver = Arc::new(store.resolver());
        let executor = ToolExecutor::new(store.clone(), resolver);
        Fixture { executor, store }
    }

    #[tokio::test]
    async fn free_slots_without_a_master_asks_for_one() {
        let fixture = fixture();
        let now = Utc.with_ymd_and_hms(2025, 5, 1, 8, 0, 0).single().unwrap();
        let outcome = fixture
            .executor
            .run(
                &business(),
                &ToolRequest { tool: "free_slots".to_string(), args: ToolArgs::default() },
                now,
            )
            .await
            .expect("run");
        assert_eq!(outcome.data["status"], json!("master_required"));
    }

    #[tokio::test]
    async fn free_slots_skip_booked_hours() {
        let fixture = fixture();
        let master = fixture
            .store
            .masters
            .create(Master::new(business(), "Олена"))
            .await
            .expect("create master");

        // 2025-05-01 is a Thursday: default window 09:00-18:00.
        let now = Utc.with_ymd_and_hms(2025, 5, 1, 8, 0, 0).single().unwrap();
        let start = Utc.with_ymd_and_hms(2025, 5, 1, 10, 0, 0).single().unwrap();
        fixture
            .store
            .appointments
            .create(Appointment {
                id: AppointmentId(new_entity_id()),
                business_id: business(),
                master_id: master.id.clone(),
                client_id: ClientId(new_entity_id()),
                client_name: "Іван".to_string(),
                client_phone: "+380671234567".to_string(),
                start_time: start,
                end_time: start + Duration::hours(1),
                status: AppointmentStatus::Confirmed,
                service_ids: Vec::new(),
                notes: None,
                source: "agent".to_string(),
                created_at: now,
            })
            .await
            .expect("create appointment");

        let outcome = fixture
            .executor
            .run(
                &business(),
                &ToolRequest {
                    tool: "free_slots".to_string(),
                    args: ToolArgs {
                        master_name: Some("Олена".to_string()),
                        date: Some("2025-05-01".to_string()),
                        ..ToolArgs::default()
                    },
                },
                now,
            )
            .await
            .expect("run");

        let slots: Vec<String> = outcome.data["slots"]
            .as_array()
            .expect("slots")
            .iter()
            .map(|v| v.as_str().unwrap_or_default().to_string())
            .collect();
        assert!(slots.contains(&"09:00".to_string()));
        assert!(!slots.contains(&"10:00".to_string()), "booked hour must be absent");
        assert!(slots.contains(&"11:00".to_string()));
    }

    #[tokio::test]
    async fn appointment_backed_tools_read_through_the_shared_store() {
        let fixture = fixture();
        let master = fixture
            .store
            .masters
            .create(Master::new(business(), "Олена"))
            .await
            .expect("create master");

        let now = Utc.with_ymd_and_hms(2025, 4, 30, 8, 0, 0).single().unwrap();
        let start = Utc.with_ymd_and_hms(2025, 5, 1, 10, 0, 0).single().unwrap();
        fixture
            .store
            .appointments
            .create(Appointment {
                id: AppointmentId(new_entity_id()),
                business_id: business(),
                master_id: master.id.clone(),
                client_id: ClientId(new_entity_id()),
                client_name: "Іван".to_string(),
                client_phone: "+380671234567".to_string(),
                start_time: start,
                end_time: start + Duration::hours(1),
                status: AppointmentStatus::Confirmed,
                service_ids: Vec::new(),
                notes: None,
                source: "agent".to_string(),
                created_at: now,
            })
            .await
            .expect("create appointment");

        let listed = fixture
            .executor
            .run(
                &business(),
                &ToolRequest {
                    tool: "appointments_list".to_string(),
                    args: ToolArgs { date: Some("2025-05-01".to_string()), ..ToolArgs::default() },
                },
                now,
            )
            .await
            .expect("run");
        let items = listed.data["appointments"].as_array().expect("appointments");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["client"], json!("Іван"));

        let overview = fixture
            .executor
            .run(
                &business(),
                &ToolRequest { tool: "biz_overview".to_string(), args: ToolArgs::default() },
                now,
            )
            .await
            .expect("run");
        assert_eq!(overview.data["masters"], json!(1));
        assert_eq!(overview.data["upcoming_week"], json!(1));
    }

    #[tokio::test]
    async fn unknown_tool_reports_status() {
        let fixture = fixture();
        let now = Utc::now();
        let outcome = fixture
            .executor
            .run(
                &business(),
                &ToolRequest { tool: "nonexistent".to_string(), args: ToolArgs::default() },
                now,
            )
            .await
            .expect("run");
        assert_eq!(outcome.data["status"], json!("unknown_tool"));
    }
}

//! Business snapshot: a compact text digest of masters, services, and today's
//! load that is prepended to every LLM call so short questions can be
//! answered without a tool round-trip.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use zapys_core::domain::BusinessId;
use zapys_db::repositories::RepositoryError;

use crate::store::AgentStore;

/// Upper bound for the snapshot digest itself.
const SNAPSHOT_MAX_CHARS: usize = 1_500;

/// Upper bound for the whole tool context handed to the model: snapshot plus
/// accumulated tool output.
pub const TOOL_CONTEXT_MAX_CHARS: usize = 3_800;

#[async_trait]
pub trait SnapshotProvider: Send + Sync {
    async fn snapshot(
        &self,
        business_id: &BusinessId,
        now: DateTime<Utc>,
    ) -> Result<String, RepositoryError>;
}

pub struct StoreSnapshotProvider {
    store: AgentStore,
}

impl StoreSnapshotProvider {
    pub fn new(store: AgentStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl SnapshotProvider for StoreSnapshotProvider {
    async fn snapshot(
        &self,
        business_id: &BusinessId,
        now: DateTime<Utc>,
    ) -> Result<String, RepositoryError> {
        let masters = self.store.masters.list_active(business_id).await?;
        let services = self.store.services.list_active(business_id).await?;
        let client_count = self.store.clients.count_active(business_id).await?;

        let today = now.date_naive();
        let day_start = today
            .and_hms_opt(0, 0, 0)
            .map(|naive| naive.and_utc())
            .unwrap_or(now);
        let todays = self
            .store
            .appointments
            .list_between(business_id, day_start, day_start + Duration::days(1), 50)
            .await?;

        let mut lines = Vec::new();
        lines.push(format!("Сьогодні: {}", today.format("%Y-%m-%d")));
        lines.push(format!("Клієнтів у базі: {client_count}"));

        lines.push(format!("Майстри ({}):", masters.len()));
        for master in &masters {
            let window = match master.day_window(today) {
                Some((start, end)) => {
                    format!("{}-{}", start.format("%H:%M"), end.format("%H:%M"))
                }
                None => "вихідний".to_string(),
            };
            lines.push(format!("- {} [{window}]", master.name));
        }

        lines.push(format!("Послуги ({}):", services.len()));
        for service in &services {
            lines.push(format!(
                "- {} — {} грн, {} хв",
                service.name,
                service.price / 100,
                service.duration_minutes
            ));
        }

        lines.push(format!("Записів сьогодні: {}", todays.len()));
        for appointment in &todays {
            lines.push(format!(
                "- {} {} ({})",
                appointment.start_time.format("%H:%M"),
                appointment.client_name,
                appointment.status.as_str()
            ));
        }

        Ok(truncate_chars(&lines.join("\n"), SNAPSHOT_MAX_CHARS))
    }
}

/// Combine the snapshot with accumulated tool output under the context cap.
/// The head of the snapshot is the most valuable part and the tail of the
/// tool output is the freshest, so truncation keeps those ends.
pub fn build_tool_context(snapshot: &str, tool_output: &str) -> String {
    let combined = if tool_output.is_empty() {
        snapshot.to_string()
    } else {
        format!("{snapshot}\n\n{tool_output}")
    };
    if combined.chars().count() <= TOOL_CONTEXT_MAX_CHARS {
        return combined;
    }

    // The ellipsis separator counts against the cap too.
    const SEPARATOR: &str = "\n…\n";
    let budget = TOOL_CONTEXT_MAX_CHARS - SEPARATOR.chars().count();
    let head_budget = budget / 2;
    let tail_budget = budget - head_budget;
    let head: String = snapshot.chars().take(head_budget).collect();
    let total = combined.chars().count();
    let tail: String = combined.chars().skip(total.saturating_sub(tail_budget)).collect();
    format!("{head}{SEPARATOR}{tail}")
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::{build_tool_context, TOOL_CONTEXT_MAX_CHARS};

    #[test]
    fn short_context_passes_through_untruncated() {
        let context = build_tool_context("знімок", "дані інструмента");
        assert!(context.starts_with("знімок"));
        assert!(context.ends_with("дані інструмента"));
    }

    #[test]
    fn oversized_context_keeps_snapshot_head_and_output_tail() {
        let snapshot = "S".repeat(3_000);
        let output = format!("{}КІНЕЦЬ", "T".repeat(3_000));
        let context = build_tool_context(&snapshot, &output);

        assert!(context.chars().count() <= TOOL_CONTEXT_MAX_CHARS);
        assert!(context.starts_with('S'));
        assert!(context.ends_with("КІНЕЦЬ"));
    }
}

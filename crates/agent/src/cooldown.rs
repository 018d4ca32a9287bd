//! Per-business LLM cooldowns. A provider failure opens a window during which
//! the arbiter skips the LLM entirely and answers from the deterministic
//! tiers; a success closes it.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Duration, Utc};

use zapys_core::domain::BusinessId;

/// Cooldown bounds in seconds. Providers occasionally ask for sub-second or
/// multi-hour retries; both are clamped to something livable.
const MIN_COOLDOWN_SECS: i64 = 5;
const MAX_COOLDOWN_SECS: i64 = 300;
const DEFAULT_COOLDOWN_SECS: i64 = 30;

/// Window after a successful LLM round-trip during which the availability
/// indicator stays green even for replies that did not use the model.
pub const SUCCESS_FRESHNESS_SECS: i64 = 600;

/// Every method takes `now` explicitly so callers (and tests) control the
/// clock; the store itself never reads wall time.
pub trait CooldownStore: Send + Sync {
    fn set_cooldown(&self, business_id: &BusinessId, until: DateTime<Utc>);
    fn cooldown_until(&self, business_id: &BusinessId) -> Option<DateTime<Utc>>;
    fn record_success(&self, business_id: &BusinessId, at: DateTime<Utc>);
    fn last_success_at(&self, business_id: &BusinessId) -> Option<DateTime<Utc>>;

    fn is_cooling(&self, business_id: &BusinessId, now: DateTime<Utc>) -> bool {
        self.cooldown_until(business_id).map(|until| now < until).unwrap_or(false)
    }

    fn success_is_fresh(&self, business_id: &BusinessId, now: DateTime<Utc>) -> bool {
        self.last_success_at(business_id)
            .map(|at| now - at < Duration::seconds(SUCCESS_FRESHNESS_SECS))
            .unwrap_or(false)
    }
}

#[derive(Default)]
pub struct InMemoryCooldownStore {
    cooldowns: RwLock<HashMap<String, DateTime<Utc>>>,
    successes: RwLock<HashMap<String, DateTime<Utc>>>,
}

impl InMemoryCooldownStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CooldownStore for InMemoryCooldownStore {
    fn set_cooldown(&self, business_id: &BusinessId, until: DateTime<Utc>) {
        if let Ok(mut map) = self.cooldowns.write() {
            map.insert(business_id.0.clone(), until);
        }
    }

    fn cooldown_until(&self, business_id: &BusinessId) -> Option<DateTime<Utc>> {
        self.cooldowns.read().ok()?.get(&business_id.0).copied()
    }

    fn record_success(&self, business_id: &BusinessId, at: DateTime<Utc>) {
        if let Ok(mut map) = self.cooldowns.write() {
            map.remove(&business_id.0);
        }
        if let Ok(mut map) = self.successes.write() {
            map.insert(business_id.0.clone(), at);
        }
    }

    fn last_success_at(&self, business_id: &BusinessId) -> Option<DateTime<Utc>> {
        self.successes.read().ok()?.get(&business_id.0).copied()
    }
}

/// True for responses that should open a cooldown rather than be retried.
pub fn is_rate_limit(error_text: &str) -> bool {
    let lowered = error_text.to_lowercase();
    lowered.contains("429")
        || lowered.contains("rate limit")
        || lowered.contains("too many requests")
        || lowered.contains("quota")
        || lowered.contains("overloaded")
}

/// Retry hint from a provider error body. Two shapes are recognized:
/// prose `retry in 20s` and the structured `"retryDelay":"20s"` field.
pub fn parse_retry_after(error_text: &str) -> Option<Duration> {
    if let Some(secs) = seconds_after(error_text, "retry in ") {
        return Some(Duration::seconds(secs));
    }
    if let Some(pos) = error_text.find("\"retryDelay\"") {
        let rest = &error_text[pos..];
        let value_start = rest.find(':')? + 1;
        if let Some(secs) = leading_seconds(rest[value_start..].trim_start_matches([' ', '"'])) {
            return Some(Duration::seconds(secs));
        }
    }
    None
}

fn seconds_after(text: &str, marker: &str) -> Option<i64> {
    let lowered = text.to_lowercase();
    let pos = lowered.find(marker)?;
    leading_seconds(&text[pos + marker.len()..])
}

/// Parses `20s`, `20 s`, or a bare `20` at the start of the slice.
fn leading_seconds(text: &str) -> Option<i64> {
    let digits: String = text.chars().take_while(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

/// Cooldown to open for a failed LLM call. Only rate-limit responses get
/// their retry hint honored; any other failure takes the 30s default, and the
/// result is clamped to `[5s, 300s]`.
pub fn cooldown_for_error(error_text: &str) -> Duration {
    let hinted = if is_rate_limit(error_text) {
        parse_retry_after(error_text)
            .unwrap_or_else(|| Duration::seconds(DEFAULT_COOLDOWN_SECS))
    } else {
        Duration::seconds(DEFAULT_COOLDOWN_SECS)
    };
    Duration::seconds(hinted.num_seconds().clamp(MIN_COOLDOWN_SECS, MAX_COOLDOWN_SECS))
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use zapys_core::domain::BusinessId;

    use super::{
        cooldown_for_error, is_rate_limit, parse_retry_after, CooldownStore,
        InMemoryCooldownStore,
    };

    fn business() -> BusinessId {
        BusinessId("biz".to_string())
    }

    #[test]
    fn cooldown_expires_at_the_boundary_without_sleeping() {
        let store = InMemoryCooldownStore::new();
        let t0 = Utc.with_ymd_and_hms(2025, 5, 1, 10, 0, 0).single().unwrap();
        store.set_cooldown(&business(), t0 + Duration::seconds(10));

        assert!(store.is_cooling(&business(), t0 + Duration::seconds(1)));
        assert!(store.is_cooling(&business(), t0 + Duration::seconds(9)));
        assert!(!store.is_cooling(&business(), t0 + Duration::seconds(10)));
        assert!(!store.is_cooling(&business(), t0 + Duration::seconds(11)));
    }

    #[test]
    fn success_clears_cooldown_and_marks_freshness() {
        let store = InMemoryCooldownStore::new();
        let t0 = Utc.with_ymd_and_hms(2025, 5, 1, 10, 0, 0).single().unwrap();
        store.set_cooldown(&business(), t0 + Duration::seconds(30));
        store.record_success(&business(), t0 + Duration::seconds(5));

        assert!(!store.is_cooling(&business(), t0 + Duration::seconds(6)));
        assert!(store.success_is_fresh(&business(), t0 + Duration::minutes(9)));
        assert!(!store.success_is_fresh(&business(), t0 + Duration::minutes(11)));
    }

    #[test]
    fn retry_hints_are_parsed_from_both_shapes() {
        assert_eq!(parse_retry_after("rate limited, retry in 20s"), Some(Duration::seconds(20)));
        assert_eq!(
            parse_retry_after(r#"{"error":{"details":[{"retryDelay":"20s"}]}}"#),
            Some(Duration::seconds(20))
        );
        assert_eq!(parse_retry_after("something else entirely"), None);
    }

    #[test]
    fn cooldown_duration_defaults_and_clamps() {
        assert_eq!(cooldown_for_error("plain failure").num_seconds(), 30);
        assert_eq!(cooldown_for_error("429, retry in 2s").num_seconds(), 5);
        assert_eq!(cooldown_for_error("429, retry in 9000s").num_seconds(), 300);
        assert_eq!(cooldown_for_error("429, retry in 20s").num_seconds(), 20);
    }

    #[test]
    fn retry_hints_outside_rate_limits_are_ignored() {
        // A 500 with a stray "retry in" phrase must not stretch the window.
        assert_eq!(cooldown_for_error("500 internal error, retry in 120s").num_seconds(), 30);
        assert_eq!(cooldown_for_error("quota exceeded, retry in 120s").num_seconds(), 120);
    }

    #[test]
    fn rate_limit_markers_are_recognized() {
        assert!(is_rate_limit("HTTP 429 Too Many Requests"));
        assert!(is_rate_limit("model is overloaded"));
        assert!(!is_rate_limit("400 bad request"));
    }
}

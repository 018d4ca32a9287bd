//! Per-business AI settings with a short TTL cache. The owner can flip
//! `ai_disabled` or point at another model from the app; the agent picks the
//! change up within a minute without a restart.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, Utc};

use zapys_core::domain::BusinessId;
use zapys_db::repositories::{RepositoryError, SettingsRepository};

const CACHE_TTL_SECS: i64 = 60;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AiSettings {
    pub provider: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub disabled: bool,
}

pub struct SettingsCache {
    repo: Arc<dyn SettingsRepository>,
    cache: RwLock<HashMap<String, (DateTime<Utc>, AiSettings)>>,
}

impl SettingsCache {
    pub fn new(repo: Arc<dyn SettingsRepository>) -> Self {
        Self { repo, cache: RwLock::new(HashMap::new()) }
    }

    pub async fn ai_settings(
        &self,
        business_id: &BusinessId,
        now: DateTime<Utc>,
    ) -> Result<AiSettings, RepositoryError> {
        if let Ok(cache) = self.cache.read() {
            if let Some((fetched_at, settings)) = cache.get(&business_id.0) {
                if now - *fetched_at < Duration::seconds(CACHE_TTL_SECS) {
                    return Ok(settings.clone());
                }
            }
        }

        let settings = AiSettings {
            provider: self.repo.get(business_id, "ai_provider").await?,
            base_url: self.repo.get(business_id, "ai_base_url").await?,
            model: self.repo.get(business_id, "ai_model").await?,
            disabled: self
                .repo
                .get(business_id, "ai_disabled")
                .await?
                .map(|value| {
                    let lowered = value.trim().to_ascii_lowercase();
                    lowered == "true" || lowered == "1"
                })
                .unwrap_or(false),
        };
        if let Ok(mut cache) = self.cache.write() {
            cache.insert(business_id.0.clone(), (now, settings.clone()));
        }
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, TimeZone, Utc};

    use zapys_core::domain::BusinessId;
    use zapys_db::repositories::{InMemorySettingsRepository, SettingsRepository};

    use super::SettingsCache;

    fn business() -> BusinessId {
        BusinessId("biz".to_string())
    }

    #[tokio::test]
    async fn cached_value_survives_until_the_ttl_passes() {
        let repo = Arc::new(InMemorySettingsRepository::default());
        repo.set(&business(), "ai_disabled", "false").await.expect("set");
        let cache = SettingsCache::new(repo.clone());
        let t0 = Utc.with_ymd_and_hms(2025, 5, 1, 10, 0, 0).single().unwrap();

        assert!(!cache.ai_settings(&business(), t0).await.expect("first").disabled);

        repo.set(&business(), "ai_disabled", "true").await.expect("flip");

        // Within the TTL the stale value is served; after it, the flip shows.
        let within = cache.ai_settings(&business(), t0 + Duration::seconds(30)).await.expect("ok");
        assert!(!within.disabled);
        let after = cache.ai_settings(&business(), t0 + Duration::seconds(61)).await.expect("ok");
        assert!(after.disabled);
    }
}

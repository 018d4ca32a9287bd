//! Decision arbiter. Four tiers, cheapest first: explicit command grammar,
//! phone-only continuation, cooldown short-circuit, and finally one LLM
//! round-trip. Grammar and continuation never touch the model; while a
//! cooldown is open the model is skipped entirely.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tracing::{info, warn};

use zapys_core::domain::conversation::{AiMeta, Indicator, Turn, TurnMetadata, TurnRole};
use zapys_core::domain::BusinessId;
use zapys_core::errors::{truncate_reason, AgentError};
use zapys_db::repositories::RepositoryError;

use crate::actions::ActionExecutor;
use crate::cooldown::{cooldown_for_error, CooldownStore};
use crate::decision::Decision;
use crate::format::format_tool_reply;
use crate::llm::{LlmClient, ModelOverrides};
use crate::providers::{PushNotifier, SmsProvider};
use crate::settings::{AiSettings, SettingsCache};
use crate::snapshot::{build_tool_context, SnapshotProvider, StoreSnapshotProvider};
use crate::store::AgentStore;
use crate::tools::{ToolExecutor, ToolOutcome};
use crate::{commands, heuristics};

const HISTORY_LIMIT: i64 = 6;
const REASON_MAX_CHARS: usize = 200;

const FALLBACK_REPLY: &str = "Зараз я працюю без AI. Можу виконувати команди, наприклад: \
«service: Стрижка, 500, 45», «appointment: Ім'я, телефон, майстер, час», «cancel: телефон».";

#[derive(Clone, Debug)]
pub struct AgentResponse {
    pub message: String,
    pub action: String,
    pub data: Value,
    pub ai: AiMeta,
}

pub struct Arbiter {
    store: AgentStore,
    actions: ActionExecutor,
    tools: Arc<ToolExecutor>,
    snapshot: Arc<dyn SnapshotProvider>,
    llm: Option<Arc<dyn LlmClient>>,
    cooldowns: Arc<dyn CooldownStore>,
    settings: SettingsCache,
    has_key: bool,
}

/// What the tiering produced, before execution.
struct Resolution {
    decision: Decision,
    used_ai: bool,
    reason: Option<String>,
    failure: bool,
}

impl Resolution {
    fn deterministic(decision: Decision) -> Self {
        Self { decision, used_ai: false, reason: None, failure: false }
    }

    fn fallback(reason: impl Into<String>, failure: bool) -> Self {
        Self {
            decision: Decision::reply(FALLBACK_REPLY, 0.3),
            used_ai: false,
            reason: Some(reason.into()),
            failure,
        }
    }
}

fn infra(err: RepositoryError) -> AgentError {
    AgentError::from_persistence(err.to_string())
}

impl Arbiter {
    pub fn new(
        store: AgentStore,
        llm: Option<Arc<dyn LlmClient>>,
        cooldowns: Arc<dyn CooldownStore>,
        sms: Arc<dyn SmsProvider>,
        push: Arc<dyn PushNotifier>,
        has_key: bool,
    ) -> Self {
        let resolver = Arc::new(store.resolver());
        let tools = Arc::new(ToolExecutor::new(store.clone(), resolver.clone()));
        let actions =
            ActionExecutor::new(store.clone(), resolver, tools.clone(), sms, push);
        let snapshot: Arc<dyn SnapshotProvider> =
            Arc::new(StoreSnapshotProvider::new(store.clone()));
        let settings = SettingsCache::new(store.settings.clone());
        Self { store, actions, tools, snapshot, llm, cooldowns, settings, has_key }
    }

    pub async fn handle_message(
        &self,
        business_id: &BusinessId,
        session_id: &str,
        message: &str,
        now: DateTime<Utc>,
    ) -> Result<AgentResponse, AgentError> {
        let history = self
            .store
            .conversations
            .last_turns(business_id, session_id, HISTORY_LIMIT)
            .await
            .map_err(infra)?;
        let ai_settings = self.settings.ai_settings(business_id, now).await.map_err(infra)?;

        let resolution = self
            .resolve(business_id, message, &history, &ai_settings, now)
            .await?;

        let mut tool_outcome: Option<ToolOutcome> = None;
        let (reply, data) = if resolution.decision.is_mutating() {
            let result =
                self.actions.execute(business_id, &resolution.decision.action, now).await?;
            (result.message, result.data)
        } else if let Some(request) = &resolution.decision.tool {
            let outcome = self.tools.run(business_id, request, now).await.map_err(infra)?;
            let reply = format_tool_reply(&outcome);
            let data = json!({ "tool": outcome.tool, "data": outcome.data });
            tool_outcome = Some(outcome);
            (reply, data)
        } else {
            (resolution.decision.reply.clone(), json!({ "status": "reply" }))
        };

        let fresh = self.cooldowns.success_is_fresh(business_id, now);
        let green = self.has_key
            && !ai_settings.disabled
            && !resolution.failure
            && (resolution.used_ai || fresh);
        let ai = AiMeta {
            has_key: self.has_key,
            indicator: if green { Indicator::Green } else { Indicator::Red },
            used_ai: resolution.used_ai,
            reason: resolution.reason.clone(),
        };

        let action = resolution.decision.action.action_key().to_string();
        info!(
            event_name = "agent.handled",
            business_id = %business_id.0,
            action = %action,
            used_ai = resolution.used_ai,
            tool = tool_outcome.as_ref().map(|o| o.tool.as_str()).unwrap_or("")
        );

        self.persist_turns(business_id, session_id, message, &reply, &action, &data, &ai, now)
            .await?;

        Ok(AgentResponse { message: reply, action, data, ai })
    }

    pub async fn history(
        &self,
        business_id: &BusinessId,
        session_id: &str,
        limit: i64,
    ) -> Result<Vec<Turn>, AgentError> {
        self.store
            .conversations
            .last_turns(business_id, session_id, limit)
            .await
            .map_err(infra)
    }

    async fn resolve(
        &self,
        business_id: &BusinessId,
        message: &str,
        history: &[Turn],
        ai_settings: &AiSettings,
        now: DateTime<Utc>,
    ) -> Result<Resolution, AgentError> {
        if let Some(decision) = commands::parse_command(message) {
            return Ok(Resolution::deterministic(decision));
        }
        if let Some(decision) = heuristics::phone_continuation(message, history, now) {
            return Ok(Resolution::deterministic(decision));
        }

        let Some(llm) = &self.llm else {
            return Ok(Resolution::fallback("no_provider", false));
        };
        if !self.has_key {
            return Ok(Resolution::fallback("no_key", false));
        }
        if ai_settings.disabled {
            return Ok(Resolution::fallback("disabled", false));
        }
        if self.cooldowns.is_cooling(business_id, now) {
            return Ok(Resolution::fallback("cooldown", false));
        }

        let snapshot = self
            .snapshot
            .snapshot(business_id, now)
            .await
            .map_err(infra)?;
        let context = build_tool_context(&snapshot, &prior_tool_output(history));
        let overrides = ModelOverrides::from(ai_settings);

        match llm.decide(message, &context, history, &overrides).await {
            Ok(decision) => {
                self.cooldowns.record_success(business_id, now);
                Ok(Resolution { decision, used_ai: true, reason: None, failure: false })
            }
            Err(err) => {
                let text = err.to_string();
                let until = now + cooldown_for_error(&text);
                self.cooldowns.set_cooldown(business_id, until);
                warn!(
                    event_name = "llm.failed",
                    business_id = %business_id.0,
                    cooldown_until = %until,
                    error = %text
                );
                Ok(Resolution::fallback(truncate_reason(&text, REASON_MAX_CHARS), true))
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn persist_turns(
        &self,
        business_id: &BusinessId,
        session_id: &str,
        user_message: &str,
        reply: &str,
        action: &str,
        data: &Value,
        ai: &AiMeta,
        now: DateTime<Utc>,
    ) -> Result<(), AgentError> {
        self.store
            .conversations
            .append(Turn {
                business_id: business_id.clone(),
                session_id: session_id.to_string(),
                role: TurnRole::User,
                message: user_message.to_string(),
                metadata: TurnMetadata {
                    decision_action: None,
                    action_data: None,
                    ai: None,
                    timestamp: now,
                },
            })
            .await
            .map_err(infra)?;
        self.store
            .conversations
            .append(Turn {
                business_id: business_id.clone(),
                session_id: session_id.to_string(),
                role: TurnRole::Assistant,
                message: reply.to_string(),
                metadata: TurnMetadata {
                    decision_action: Some(action.to_string()),
                    action_data: Some(data.clone()),
                    ai: Some(ai.clone()),
                    timestamp: now,
                },
            })
            .await
            .map_err(infra)
    }
}

/// Replies that came out of tools in earlier turns, freshest last. They ride
/// along in the context so follow-up questions can refer to them.
fn prior_tool_output(history: &[Turn]) -> String {
    let mut outputs: Vec<&str> = history
        .iter()
        .filter(|turn| {
            turn.role == TurnRole::Assistant
                && turn
                    .metadata
                    .action_data
                    .as_ref()
                    .map(|data| data.get("tool").is_some())
                    .unwrap_or(false)
        })
        .map(|turn| turn.message.as_str())
        .collect();
    let keep = outputs.len().saturating_sub(2);
    outputs.drain(..keep);
    outputs.join("\n\n")
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    use zapys_core::domain::conversation::{Indicator, Turn};
    use zapys_core::domain::BusinessId;

    use super::Arbiter;
    use crate::cooldown::{CooldownStore, InMemoryCooldownStore};
    use crate::decision::Decision;
    use crate::llm::{LlmClient, LlmError, ModelOverrides};
    use crate::providers::{NoopPushNotifier, NoopSmsProvider};
    use crate::store::AgentStore;

    struct ScriptedLlm {
        calls: AtomicUsize,
        response: Result<Decision, String>,
    }

    impl ScriptedLlm {
        fn replying(text: &str) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                response: Ok(Decision::reply(text, 0.8)),
            }
        }

        fn failing(error: &str) -> Self {
            Self { calls: AtomicUsize::new(0), response: Err(error.to_string()) }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn decide(
            &self,
            _message: &str,
            _tool_context: &str,
            _history: &[Turn],
            _overrides: &ModelOverrides,
        ) -> Result<Decision, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.response {
                Ok(decision) => Ok(decision.clone()),
                Err(text) => Err(LlmError::Provider(text.clone())),
            }
        }
    }

    fn business() -> BusinessId {
        BusinessId("biz".to_string())
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 4, 30, 8, 0, 0).single().unwrap()
    }

    fn arbiter_with(
        llm: Arc<ScriptedLlm>,
        cooldowns: Arc<InMemoryCooldownStore>,
    ) -> Arbiter {
        Arbiter::new(
            AgentStore::in_memory(),
            Some(llm),
            cooldowns,
            Arc::new(NoopSmsProvider),
            Arc::new(NoopPushNotifier),
            true,
        )
    }

    #[tokio::test]
    async fn command_grammar_never_reaches_the_model() {
        let llm = Arc::new(ScriptedLlm::replying("не мало б викликатися"));
        let arbiter = arbiter_with(llm.clone(), Arc::new(InMemoryCooldownStore::new()));

        let response = arbiter
            .handle_message(&business(), "s1", "service: Стрижка, 500, 45", now())
            .await
            .expect("handled");

        assert_eq!(response.message, "Готово, послугу збережено.");
        assert_eq!(llm.call_count(), 0, "grammar tier must not call the model");
        assert!(!response.ai.used_ai);
    }

    #[tokio::test]
    async fn open_cooldown_short_circuits_and_then_expires() {
        let llm = Arc::new(ScriptedLlm::replying("Відповідь моделі."));
        let cooldowns = Arc::new(InMemoryCooldownStore::new());
        cooldowns.set_cooldown(&business(), now() + Duration::seconds(10));
        let arbiter = arbiter_with(llm.clone(), cooldowns);

        let during = arbiter
            .handle_message(&business(), "s1", "як справи у салоні?", now() + Duration::seconds(1))
            .await
            .expect("handled");
        assert_eq!(llm.call_count(), 0, "cooldown must skip the model");
        assert_eq!(during.ai.reason.as_deref(), Some("cooldown"));
        assert_eq!(during.ai.indicator, Indicator::Red);

        let after = arbiter
            .handle_message(&business(), "s1", "як справи у салоні?", now() + Duration::seconds(11))
            .await
            .expect("handled");
        assert_eq!(llm.call_count(), 1, "expired cooldown must reach the model");
        assert_eq!(after.message, "Відповідь моделі.");
        assert!(after.ai.used_ai);
        assert_eq!(after.ai.indicator, Indicator::Green);
    }

    #[tokio::test]
    async fn provider_retry_hint_sets_the_cooldown_end() {
        let llm = Arc::new(ScriptedLlm::failing(r#"429 {"retryDelay":"20s"}"#));
        let cooldowns = Arc::new(InMemoryCooldownStore::new());
        let arbiter = arbiter_with(llm.clone(), cooldowns.clone());

        let response = arbiter
            .handle_message(&business(), "s1", "вільне питання", now())
            .await
            .expect("handled");

        assert!(!response.message.is_empty(), "fallback reply still answers");
        assert_eq!(response.ai.indicator, Indicator::Red);
        assert_eq!(
            cooldowns.cooldown_until(&business()),
            Some(now() + Duration::seconds(20)),
            "hinted retry delay becomes the cooldown end"
        );
    }

    #[tokio::test]
    async fn turns_are_persisted_in_order() {
        let llm = Arc::new(ScriptedLlm::replying("Ок."));
        let arbiter = arbiter_with(llm, Arc::new(InMemoryCooldownStore::new()));

        arbiter
            .handle_message(&business(), "s1", "master: Олена", now())
            .await
            .expect("handled");
        let turns = arbiter.history(&business(), "s1", 10).await.expect("history");

        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].message, "master: Олена");
        assert_eq!(turns[1].metadata.decision_action.as_deref(), Some("create_master"));
    }
}

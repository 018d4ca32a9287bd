use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::json;

use zapys_agent::cooldown::{CooldownStore, InMemoryCooldownStore};
use zapys_agent::llm::{LlmClient, LlmError, ModelOverrides};
use zapys_agent::providers::{NoopPushNotifier, NoopSmsProvider};
use zapys_agent::{AgentStore, Arbiter, Decision};
use zapys_core::domain::conversation::Turn;
use zapys_core::domain::BusinessId;

struct ScriptedLlm {
    calls: AtomicUsize,
    script: Vec<Result<Decision, String>>,
    seen_overrides: Mutex<Vec<ModelOverrides>>,
}

impl ScriptedLlm {
    fn new(script: Vec<Result<Decision, String>>) -> Self {
        Self { calls: AtomicUsize::new(0), script, seen_overrides: Mutex::new(Vec::new()) }
    }

    fn silent() -> Self {
        Self::new(Vec::new())
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn last_overrides(&self) -> Option<ModelOverrides> {
        self.seen_overrides.lock().expect("lock").last().cloned()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn decide(
        &self,
        _message: &str,
        _tool_context: &str,
        _history: &[Turn],
        overrides: &ModelOverrides,
    ) -> Result<Decision, LlmError> {
        let index = self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen_overrides.lock().expect("lock").push(overrides.clone());
        match self.script.get(index) {
            Some(Ok(decision)) => Ok(decision.clone()),
            Some(Err(text)) => Err(LlmError::Provider(text.clone())),
            None => Err(LlmError::Provider("script exhausted".to_string())),
        }
    }
}

fn business() -> BusinessId {
    BusinessId("salon-1".to_string())
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 4, 30, 8, 0, 0).single().unwrap()
}

fn arbiter(llm: Arc<ScriptedLlm>, cooldowns: Arc<InMemoryCooldownStore>) -> Arbiter {
    Arbiter::new(
        AgentStore::in_memory(),
        Some(llm),
        cooldowns,
        Arc::new(NoopSmsProvider),
        Arc::new(NoopPushNotifier),
        true,
    )
}

async fn send(arbiter: &Arbiter, message: &str, at: DateTime<Utc>) -> zapys_agent::AgentResponse {
    arbiter.handle_message(&business(), "s1", message, at).await.expect("handled")
}

#[tokio::test]
async fn service_and_master_setup_then_booking_happy_path() {
    let llm = Arc::new(ScriptedLlm::silent());
    let arbiter = arbiter(llm.clone(), Arc::new(InMemoryCooldownStore::new()));

    let service = send(&arbiter, "service: Стрижка, 500, 45", t0()).await;
    assert_eq!(service.message, "Готово, послугу збережено.");
    assert_eq!(service.data["price"], json!(50000), "price stored in kopiykas");

    let master = send(&arbiter, "master: Олена", t0()).await;
    assert_eq!(master.message, "Готово, майстра додано.");

    let booking = send(
        &arbiter,
        "appointment: Іван Петров, 0671234567, Олена, 2025-05-01T10:00, Стрижка",
        t0(),
    )
    .await;
    assert_eq!(booking.message, "Готово, запис створено.");
    assert_eq!(booking.data["status"], json!("completed"));

    assert_eq!(llm.call_count(), 0, "explicit commands never call the model");
}

#[tokio::test]
async fn conflicting_booking_suggests_remaining_hours() {
    let llm = Arc::new(ScriptedLlm::silent());
    let arbiter = arbiter(llm, Arc::new(InMemoryCooldownStore::new()));

    send(&arbiter, "master: Олена", t0()).await;
    send(
        &arbiter,
        "appointment: Іван Петров, 0671234567, Олена, 2025-05-01T10:00",
        t0(),
    )
    .await;

    let clash = send(
        &arbiter,
        "appointment: Марія Шевченко, 0507654321, Олена, 2025-05-01T10:00",
        t0(),
    )
    .await;
    assert_eq!(clash.data["status"], json!("time_conflict"));
    assert!(clash.message.contains("Вільні години"));
    let suggestions = clash.data["suggestions"].as_array().expect("suggestions");
    assert!(!suggestions.iter().any(|s| s == "10:00"));
}

#[tokio::test]
async fn cancelling_the_same_booking_twice_stays_friendly() {
    let llm = Arc::new(ScriptedLlm::silent());
    let arbiter = arbiter(llm, Arc::new(InMemoryCooldownStore::new()));

    send(&arbiter, "master: Олена", t0()).await;
    send(
        &arbiter,
        "appointment: Іван Петров, 0671234567, Олена, 2025-05-01T10:00",
        t0(),
    )
    .await;

    let first = send(&arbiter, "cancel: 0671234567", t0()).await;
    assert_eq!(first.message, "Готово, запис скасовано.");

    let second = send(&arbiter, "cancel: 0671234567", t0()).await;
    assert_eq!(second.message, "Запис не знайдено або вже скасовано.");
    assert_eq!(second.data["status"], json!("appointment_not_found"));
}

#[tokio::test]
async fn invalid_phone_in_command_becomes_a_clarifying_reply() {
    let llm = Arc::new(ScriptedLlm::silent());
    let arbiter = arbiter(llm, Arc::new(InMemoryCooldownStore::new()));

    let response = send(&arbiter, "client: Іван, +1234", t0()).await;
    assert_eq!(response.data["status"], json!("invalid_phone"));
    assert!(response.message.contains("0671234567"), "reply shows the expected format");
}

#[tokio::test]
async fn phone_only_followup_completes_the_previous_booking_request() {
    let decision = Decision::reply(
        "Вкажіть, будь ласка, телефон клієнта, щоб я створила запис.",
        0.8,
    );
    let llm = Arc::new(ScriptedLlm::new(vec![Ok(decision)]));
    let arbiter = arbiter(llm.clone(), Arc::new(InMemoryCooldownStore::new()));

    send(&arbiter, "master: Олена", t0()).await;
    // Free text goes to the model, which asks for the phone.
    let ask = send(&arbiter, "Запиши Івана Петрова до Олени завтра о 10", t0()).await;
    assert!(ask.ai.used_ai);

    // The bare phone is merged with the previous turn deterministically.
    let done = send(&arbiter, "0671234567", t0()).await;
    assert_eq!(done.message, "Готово, запис створено.");
    assert!(!done.ai.used_ai, "continuation tier must not call the model");
    assert_eq!(llm.call_count(), 1);
}

#[tokio::test]
async fn provider_rate_limit_opens_a_hinted_cooldown_then_recovers() {
    let llm = Arc::new(ScriptedLlm::new(vec![
        Err(r#"429 Too Many Requests {"retryDelay":"20s"}"#.to_string()),
        Ok(Decision::reply("Знову на зв'язку.", 0.8)),
    ]));
    let cooldowns = Arc::new(InMemoryCooldownStore::new());
    let arbiter = arbiter(llm.clone(), cooldowns.clone());

    let failed = send(&arbiter, "скільки у нас клієнтів?", t0()).await;
    assert!(!failed.message.is_empty(), "fallback still answers");
    assert_eq!(cooldowns.cooldown_until(&business()), Some(t0() + Duration::seconds(20)));

    // Inside the window the model is skipped.
    let during = send(&arbiter, "а записи на завтра?", t0() + Duration::seconds(5)).await;
    assert_eq!(during.ai.reason.as_deref(), Some("cooldown"));
    assert_eq!(llm.call_count(), 1);

    // After it expires the next message reaches the model again.
    let after = send(&arbiter, "а записи на завтра?", t0() + Duration::seconds(21)).await;
    assert_eq!(after.message, "Знову на зв'язку.");
    assert_eq!(llm.call_count(), 2);
}

#[tokio::test]
async fn tenant_model_settings_reach_the_model_call() {
    let llm = Arc::new(ScriptedLlm::new(vec![Ok(Decision::reply("Ок.", 0.8))]));
    let store = AgentStore::in_memory();
    store.settings.set(&business(), "ai_provider", "ollama").await.expect("set");
    store.settings.set(&business(), "ai_model", "llama3.1").await.expect("set");
    let arbiter = Arbiter::new(
        store,
        Some(llm.clone()),
        Arc::new(InMemoryCooldownStore::new()),
        Arc::new(NoopSmsProvider),
        Arc::new(NoopPushNotifier),
        true,
    );

    send(&arbiter, "як справи у салоні?", t0()).await;

    let overrides = llm.last_overrides().expect("model was called");
    assert_eq!(overrides.provider.as_deref(), Some("ollama"));
    assert_eq!(overrides.model.as_deref(), Some("llama3.1"));
    assert_eq!(overrides.base_url, None);
}

#[tokio::test]
async fn model_tool_request_without_master_asks_to_specify_one() {
    let mut decision = Decision::reply("Дивлюся вільні години.", 0.8);
    decision.tool = Some(zapys_agent::ToolRequest {
        tool: "free_slots".to_string(),
        args: Default::default(),
    });
    let llm = Arc::new(ScriptedLlm::new(vec![Ok(decision)]));
    let arbiter = arbiter(llm, Arc::new(InMemoryCooldownStore::new()));

    let response = send(&arbiter, "які вільні години завтра?", t0()).await;
    assert!(response.message.contains("до якого майстра"));
    assert_eq!(response.data["tool"], json!("free_slots"));
}

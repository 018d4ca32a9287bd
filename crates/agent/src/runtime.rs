//! Builds a ready-to-serve [`Arbiter`] from application config: LLM client,
//! SMS/push collaborators, and the cooldown store.

use std::sync::Arc;

use zapys_core::config::{AppConfig, LlmProvider};
use zapys_core::domain::conversation::Turn;
use zapys_core::domain::BusinessId;
use zapys_core::errors::AgentError;

use crate::arbiter::{AgentResponse, Arbiter};
use crate::cooldown::InMemoryCooldownStore;
use crate::llm::{HttpLlmClient, LlmClient};
use crate::providers::{
    HttpPushNotifier, HttpSmsProvider, NoopPushNotifier, NoopSmsProvider, PushNotifier,
    SmsProvider,
};
use crate::store::AgentStore;

pub struct AgentRuntime {
    arbiter: Arbiter,
}

impl AgentRuntime {
    pub fn from_config(config: &AppConfig, store: AgentStore) -> Self {
        let llm: Option<Arc<dyn LlmClient>> = HttpLlmClient::from_config(&config.llm)
            .map(|client| Arc::new(client) as Arc<dyn LlmClient>);
        // Local models need no key; cloud providers do.
        let has_key = match config.llm.provider {
            LlmProvider::Ollama => true,
            LlmProvider::None => false,
            LlmProvider::OpenAi | LlmProvider::Anthropic => config.llm.api_key.is_some(),
        };

        let sms: Arc<dyn SmsProvider> = match &config.sms.endpoint {
            Some(endpoint) => {
                Arc::new(HttpSmsProvider::new(endpoint.clone(), config.sms.sender.clone()))
            }
            None => Arc::new(NoopSmsProvider),
        };
        let push: Arc<dyn PushNotifier> = match &config.push.endpoint {
            Some(endpoint) => Arc::new(HttpPushNotifier::new(endpoint.clone())),
            None => Arc::new(NoopPushNotifier),
        };

        let arbiter = Arbiter::new(
            store,
            llm,
            Arc::new(InMemoryCooldownStore::new()),
            sms,
            push,
            has_key,
        );
        Self { arbiter }
    }

    pub async fn handle_message(
        &self,
        business_id: &BusinessId,
        session_id: &str,
        message: &str,
    ) -> Result<AgentResponse, AgentError> {
        self.arbiter
            .handle_message(business_id, session_id, message, chrono::Utc::now())
            .await
    }

    pub async fn history(
        &self,
        business_id: &BusinessId,
        session_id: &str,
        limit: i64,
    ) -> Result<Vec<Turn>, AgentError> {
        self.arbiter.history(business_id, session_id, limit).await
    }
}

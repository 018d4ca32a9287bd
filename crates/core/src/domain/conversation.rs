use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::BusinessId;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    User,
    Assistant,
}

impl TurnRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }
}

/// Availability indicator shipped to the UI alongside every reply.
///
/// Cosmetic only: it drives a status dot and must never gate whether a reply
/// is produced.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiMeta {
    pub has_key: bool,
    pub indicator: Indicator,
    pub used_ai: bool,
    pub reason: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Indicator {
    Green,
    Red,
}

impl AiMeta {
    pub fn offline(reason: impl Into<String>) -> Self {
        Self {
            has_key: false,
            indicator: Indicator::Red,
            used_ai: false,
            reason: Some(reason.into()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TurnMetadata {
    pub decision_action: Option<String>,
    pub action_data: Option<Value>,
    pub ai: Option<AiMeta>,
    pub timestamp: DateTime<Utc>,
}

/// One persisted conversation turn. The log is append-only; history queries
/// read the most recent turns for a `(business, session)` pair.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub business_id: BusinessId,
    pub session_id: String,
    pub role: TurnRole,
    pub message: String,
    pub metadata: TurnMetadata,
}

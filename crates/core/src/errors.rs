use thiserror::Error;

/// Agent-level failures. Everything except `Infrastructure` is recovered
/// locally and surfaced as a clarifying chat reply, never as an HTTP error.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AgentError {
    #[error("missing required fields: {}", missing.join(", "))]
    Validation { missing: Vec<String> },
    #[error("invalid phone: {0}")]
    InvalidPhone(String),
    #[error("{entity} not found")]
    NotFound { entity: String },
    #[error("time conflict for the requested slot")]
    TimeConflict,
    #[error("upstream provider unavailable: {0}")]
    Upstream(String),
    #[error("infrastructure failure: {0}")]
    Infrastructure(String),
}

/// How a failure is presented at the HTTP boundary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InterfaceOutcome {
    /// Keep talking: the failure becomes the reply text of a normal 200.
    ChatReply,
    /// The only class allowed to produce a non-200: a generic 503 body.
    ServiceUnavailable,
}

impl AgentError {
    pub fn interface_outcome(&self) -> InterfaceOutcome {
        match self {
            Self::Infrastructure(_) => InterfaceOutcome::ServiceUnavailable,
            _ => InterfaceOutcome::ChatReply,
        }
    }

    /// Classify a raw persistence failure: known outage markers take the
    /// `Infrastructure` path, anything else stays a recoverable `Upstream`.
    pub fn from_persistence(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        if is_infrastructure_error(&raw) {
            Self::Infrastructure(raw)
        } else {
            Self::Upstream(raw)
        }
    }

    /// User-safe text for the 503 path. Raw reasons stay in logs/metadata.
    pub fn user_message(&self) -> &'static str {
        "Сервіс тимчасово недоступний. Спробуйте ще раз за хвилину."
    }
}

const INFRA_MARKERS: &[&str] = &[
    "connection refused",
    "connection reset",
    "database is locked",
    "no such table",
    "pool timed out",
    "unable to open database",
];

/// Classify a raw persistence error by known substrings. Matching on markers
/// keeps connection strings and secrets out of anything user-visible.
pub fn is_infrastructure_error(raw: &str) -> bool {
    let lowered = raw.to_ascii_lowercase();
    INFRA_MARKERS.iter().any(|marker| lowered.contains(marker))
}

/// Truncate a raw upstream reason before it is stored in turn metadata.
pub fn truncate_reason(raw: &str, max_chars: usize) -> String {
    if raw.chars().count() <= max_chars {
        return raw.to_string();
    }
    raw.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::{is_infrastructure_error, truncate_reason, AgentError, InterfaceOutcome};

    #[test]
    fn only_infrastructure_surfaces_as_non_200() {
        let chat_errors = [
            AgentError::Validation { missing: vec!["phone".to_string()] },
            AgentError::InvalidPhone("123".to_string()),
            AgentError::NotFound { entity: "master".to_string() },
            AgentError::TimeConflict,
            AgentError::Upstream("429 rate limited".to_string()),
        ];
        for error in chat_errors {
            assert_eq!(error.interface_outcome(), InterfaceOutcome::ChatReply, "{error}");
        }

        let infra = AgentError::Infrastructure("connection refused".to_string());
        assert_eq!(infra.interface_outcome(), InterfaceOutcome::ServiceUnavailable);
    }

    #[test]
    fn infra_markers_match_known_failures() {
        assert!(is_infrastructure_error("SqliteError: database is locked"));
        assert!(is_infrastructure_error("io error: Connection refused (os error 111)"));
        assert!(!is_infrastructure_error("master not found"));
    }

    #[test]
    fn persistence_failures_classify_by_marker() {
        let outage = AgentError::from_persistence("unable to open database file");
        assert_eq!(outage.interface_outcome(), InterfaceOutcome::ServiceUnavailable);

        let logical = AgentError::from_persistence("UNIQUE constraint failed: clients.phone");
        assert_eq!(logical, AgentError::Upstream("UNIQUE constraint failed: clients.phone".to_string()));
        assert_eq!(logical.interface_outcome(), InterfaceOutcome::ChatReply);
    }

    #[test]
    fn reasons_are_truncated_for_metadata() {
        let long = "x".repeat(500);
        assert_eq!(truncate_reason(&long, 200).chars().count(), 200);
        assert_eq!(truncate_reason("short", 200), "short");
    }
}

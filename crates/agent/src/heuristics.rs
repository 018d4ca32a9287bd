//! Deterministic continuation heuristics. Tier two of the pipeline: a message
//! that is nothing but a phone number completes the booking request from the
//! previous user turn without spending an LLM call.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};

use zapys_core::domain::conversation::{Turn, TurnRole};
use zapys_core::phone::is_phone_only;

use crate::decision::{AgentAction, AppointmentPayload, Decision};

/// Verbs and filler words that precede a client name in a booking phrase.
const LEADING_FILLER: &[&str] =
    &["запиши", "запис", "записати", "додай", "додати", "створи", "будь", "ласка", "на"];

/// If the current message is only a phone number, the assistant has just
/// asked for one, and the previous user turn reads like a booking request,
/// merge the two into one appointment decision.
pub fn phone_continuation(
    message: &str,
    history: &[Turn],
    now: DateTime<Utc>,
) -> Option<Decision> {
    if !is_phone_only(message) {
        return None;
    }
    // The tier arms only right after the assistant asked for the phone; a
    // bare number in an unrelated exchange stays free text.
    let asked_for_phone = history
        .last()
        .filter(|turn| turn.role == TurnRole::Assistant)
        .map(|turn| turn.message.to_lowercase().contains("телефон"))
        .unwrap_or(false);
    if !asked_for_phone {
        return None;
    }
    let previous = history.iter().rev().find(|turn| turn.role == TurnRole::User)?;
    let mut draft = extract_appointment(&previous.message, now)?;
    if !draft.phone.is_empty() {
        return None;
    }
    draft.phone = message.trim().to_string();
    Some(Decision::action(AgentAction::CreateAppointment(draft), "", 0.75))
}

/// Pulls a booking draft out of free text: a datetime is mandatory, the master
/// follows `до `, the service follows `на `, and the client name is the first
/// two capitalized tokens that are not part of either phrase.
pub fn extract_appointment(text: &str, now: DateTime<Utc>) -> Option<AppointmentPayload> {
    let start = extract_datetime(text, now)?;

    let tokens: Vec<&str> = text.split_whitespace().collect();
    let mut master = String::new();
    let mut service = None;
    let mut name_tokens: Vec<&str> = Vec::new();
    let mut consumed = vec![false; tokens.len()];

    for (i, token) in tokens.iter().enumerate() {
        let lowered = token.to_lowercase();
        if lowered == "до" {
            if let Some(next) = tokens.get(i + 1) {
                if next.chars().next().map(char::is_uppercase).unwrap_or(false) {
                    master = trim_punct(next).to_string();
                    consumed[i] = true;
                    consumed[i + 1] = true;
                }
            }
        } else if lowered == "на" {
            if let Some(next) = tokens.get(i + 1) {
                if !is_time_word(next) && !next.chars().any(|c| c.is_ascii_digit()) {
                    service = Some(trim_punct(next).to_string());
                    consumed[i] = true;
                    consumed[i + 1] = true;
                }
            }
        }
    }

    for (i, token) in tokens.iter().enumerate() {
        if consumed[i] || is_time_word(token) || token.chars().any(|c| c.is_ascii_digit()) {
            continue;
        }
        let lowered = token.to_lowercase();
        if LEADING_FILLER.contains(&lowered.as_str()) {
            continue;
        }
        if token.chars().next().map(char::is_uppercase).unwrap_or(false) {
            name_tokens.push(trim_punct(token));
            if name_tokens.len() == 2 {
                break;
            }
        }
    }
    if name_tokens.is_empty() {
        return None;
    }

    Some(AppointmentPayload {
        client_name: name_tokens.join(" "),
        phone: String::new(),
        master,
        start_time: start.to_rfc3339(),
        service,
        duration_minutes: None,
        notes: None,
    })
}

fn trim_punct(token: &str) -> &str {
    token.trim_matches(|c: char| c.is_ascii_punctuation())
}

fn is_time_word(token: &str) -> bool {
    matches!(token.to_lowercase().as_str(), "завтра" | "сьогодні" | "о" | "об")
}

/// Parses the datetime shapes the agent accepts, in order of specificity:
/// ISO `YYYY-MM-DDTHH:MM[:SS]`, `YYYY-MM-DD HH:MM`, `DD.MM[.YYYY] HH:MM`,
/// and relative `завтра/сьогодні о H[:MM]`. Naive values are taken as UTC.
pub fn parse_datetime(raw: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Utc.from_local_datetime(&naive).single();
        }
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, "%d.%m.%Y %H:%M") {
        return Utc.from_local_datetime(&naive).single();
    }
    if let Some((date_part, time_part)) = trimmed.split_once(' ') {
        if let Some(dt) = parse_day_month(date_part, time_part, now) {
            return Some(dt);
        }
    }
    parse_relative(trimmed, now)
}

/// Finds the first datetime mentioned anywhere in free text.
pub fn extract_datetime(text: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    for (i, token) in tokens.iter().enumerate() {
        let cleaned = trim_punct(token);
        if let Some(dt) = parse_datetime(cleaned, now) {
            return Some(dt);
        }
        if let Some(next) = tokens.get(i + 1) {
            let pair = format!("{cleaned} {}", trim_punct(next));
            if let Some(dt) = parse_datetime(&pair, now) {
                return Some(dt);
            }
        }
        if is_time_word(cleaned) {
            if let Some(dt) = parse_relative(&tokens[i..].join(" "), now) {
                return Some(dt);
            }
        }
    }
    None
}

/// `DD.MM HH:MM` with the year taken from `now`.
fn parse_day_month(date_part: &str, time_part: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let (day, month) = date_part.split_once('.')?;
    let day: u32 = day.parse().ok()?;
    let month: u32 = month.parse().ok()?;
    let time = parse_clock(time_part)?;
    let date = NaiveDate::from_ymd_opt(now.year(), month, day)?;
    Utc.from_local_datetime(&date.and_time(time)).single()
}

/// `завтра о 10`, `завтра о 10:30`, `сьогодні об 11`.
fn parse_relative(text: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let lowered = text.to_lowercase();
    let offset_days = if lowered.starts_with("завтра") {
        1
    } else if lowered.starts_with("сьогодні") {
        0
    } else {
        return None;
    };

    let time = lowered
        .split_whitespace()
        .skip(1)
        .map(|t| t.trim_matches(|c: char| c.is_ascii_punctuation() && c != ':'))
        .find_map(parse_clock)?;
    let date = (now + Duration::days(offset_days)).date_naive();
    Utc.from_local_datetime(&date.and_time(time)).single()
}

/// `10`, `10:30`.
fn parse_clock(raw: &str) -> Option<NaiveTime> {
    let (hour, minute) = match raw.split_once(':') {
        Some((h, m)) => (h.parse::<u32>().ok()?, m.parse::<u32>().ok()?),
        None => (raw.parse::<u32>().ok()?, 0),
    };
    NaiveTime::from_hms_opt(hour, minute, 0)
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use zapys_core::domain::conversation::{Turn, TurnMetadata, TurnRole};
    use zapys_core::domain::BusinessId;

    use super::{extract_appointment, parse_datetime, phone_continuation};
    use crate::decision::AgentAction;

    fn now() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 4, 30, 12, 0, 0).single().unwrap()
    }

    fn turn(role: TurnRole, message: &str) -> Turn {
        Turn {
            business_id: BusinessId("biz".to_string()),
            session_id: "s1".to_string(),
            role,
            message: message.to_string(),
            metadata: TurnMetadata {
                decision_action: None,
                action_data: None,
                ai: None,
                timestamp: now(),
            },
        }
    }

    fn user_turn(message: &str) -> Turn {
        turn(TurnRole::User, message)
    }

    fn assistant_turn(message: &str) -> Turn {
        turn(TurnRole::Assistant, message)
    }

    #[test]
    fn parses_iso_and_dotted_and_relative_datetimes() {
        let expected = Utc.with_ymd_and_hms(2025, 5, 1, 10, 0, 0).single().unwrap();
        assert_eq!(parse_datetime("2025-05-01T10:00", now()), Some(expected));
        assert_eq!(parse_datetime("2025-05-01 10:00", now()), Some(expected));
        assert_eq!(parse_datetime("01.05.2025 10:00", now()), Some(expected));
        assert_eq!(parse_datetime("01.05 10:00", now()), Some(expected));
        assert_eq!(parse_datetime("завтра о 10", now()), Some(expected));
        assert_eq!(parse_datetime("якась маячня", now()), None);
    }

    #[test]
    fn extracts_booking_draft_from_free_text() {
        let draft = extract_appointment("Запиши Івана Петрова до Олени на стрижку завтра о 10", now())
            .expect("draft");
        assert_eq!(draft.client_name, "Івана Петрова");
        assert_eq!(draft.master, "Олени");
        assert_eq!(draft.service.as_deref(), Some("стрижку"));
        assert!(draft.start_time.starts_with("2025-05-01T10:00"));
        assert!(draft.phone.is_empty());
    }

    #[test]
    fn phone_only_message_completes_previous_booking_request() {
        let history = vec![
            user_turn("Іван Петров завтра о 10 до Олени"),
            assistant_turn("Вкажіть, будь ласка, телефон клієнта."),
        ];
        let decision = phone_continuation("0671234567", &history, now()).expect("continuation");
        match decision.action {
            AgentAction::CreateAppointment(draft) => {
                assert_eq!(draft.phone, "0671234567");
                assert_eq!(draft.client_name, "Іван Петров");
                assert_eq!(draft.master, "Олени");
            }
            other => panic!("unexpected action: {other:?}"),
        }
    }

    #[test]
    fn phone_only_without_booking_context_is_ignored() {
        let history = vec![
            user_turn("скільки в нас клієнтів?"),
            assistant_turn("Вкажіть телефон клієнта."),
        ];
        assert!(phone_continuation("0671234567", &history, now()).is_none());
        assert!(phone_continuation("звичайне питання", &[], now()).is_none());
    }

    #[test]
    fn stale_draft_is_not_resurrected_without_a_phone_prompt() {
        // A booking draft sits earlier in the session, but the assistant's
        // last reply never asked for a phone.
        let history = vec![
            user_turn("Іван Петров завтра о 10 до Олени"),
            assistant_turn("У вас 12 клієнтів."),
        ];
        assert!(phone_continuation("0671234567", &history, now()).is_none());
    }
}

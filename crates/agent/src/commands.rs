//! Explicit command grammar. `verb: args` messages are routed here first and
//! never reach the language model.

use crate::decision::{
    AgentAction, AppointmentPayload, AppointmentRefPayload, ClearOverridePayload, ClientPayload,
    Decision, MasterPayload, MasterRefPayload, NamePayload, NotePayload, PhonePayload,
    ReminderPayload, ReschedulePayload, ScheduleOverridePayload, SegmentPayload, ServicePayload,
    SmsPayload, TagClientPayload, TextPayload, UpdateClientPayload, UpdateMasterPayload,
    WorkingHoursPayload,
};

struct CommandRule {
    verb: &'static str,
    confidence: f64,
    build: fn(&str) -> AgentAction,
}

/// Ordered so that longer verbs shadow their shorter prefixes
/// (`delete client:` before `client:`, `cancel reminder:` before `cancel:`).
const RULES: &[CommandRule] = &[
    CommandRule { verb: "delete client:", confidence: 0.95, build: build_delete_client },
    CommandRule { verb: "update client:", confidence: 0.9, build: build_update_client },
    CommandRule { verb: "client:", confidence: 0.95, build: build_client },
    CommandRule { verb: "tag:", confidence: 0.9, build: build_tag },
    CommandRule { verb: "delete master:", confidence: 0.95, build: build_delete_master },
    CommandRule { verb: "update master:", confidence: 0.9, build: build_update_master },
    CommandRule { verb: "master:", confidence: 0.95, build: build_master },
    CommandRule { verb: "schedule:", confidence: 0.9, build: build_schedule },
    CommandRule { verb: "clear override:", confidence: 0.95, build: build_clear_override },
    CommandRule { verb: "override:", confidence: 0.9, build: build_override },
    CommandRule { verb: "delete service:", confidence: 0.95, build: build_delete_service },
    CommandRule { verb: "service:", confidence: 0.95, build: build_service },
    CommandRule { verb: "appointment:", confidence: 0.95, build: build_appointment },
    CommandRule { verb: "cancel reminder:", confidence: 0.95, build: build_cancel_reminder },
    CommandRule { verb: "reschedule:", confidence: 0.9, build: build_reschedule },
    CommandRule { verb: "cancel:", confidence: 0.95, build: build_cancel },
    CommandRule { verb: "note done:", confidence: 0.9, build: build_note_done },
    CommandRule { verb: "note:", confidence: 0.9, build: build_note },
    CommandRule { verb: "reminder:", confidence: 0.9, build: build_reminder },
    CommandRule { verb: "delete segment:", confidence: 0.95, build: build_delete_segment },
    CommandRule { verb: "segment:", confidence: 0.9, build: build_segment },
    CommandRule { verb: "sms:", confidence: 0.9, build: build_sms },
];

/// Matches `verb: args` at the start of the message, case-insensitively on the
/// verb. Returns `None` for anything that is not an explicit command; missing
/// argument validation is the executor's job, not the grammar's.
pub fn parse_command(message: &str) -> Option<Decision> {
    let trimmed = message.trim();
    let lowered = trimmed.to_lowercase();
    for rule in RULES {
        if lowered.starts_with(rule.verb) {
            let args = trimmed[rule.verb.len()..].trim();
            let action = (rule.build)(args);
            return Some(Decision::action(action, "", rule.confidence));
        }
    }
    None
}

fn parts(args: &str) -> Vec<&str> {
    args.split(',').map(str::trim).filter(|p| !p.is_empty()).collect()
}

fn part(list: &[&str], index: usize) -> String {
    list.get(index).copied().unwrap_or_default().to_string()
}

fn opt_part(list: &[&str], index: usize) -> Option<String> {
    list.get(index).map(|p| p.to_string())
}

fn looks_like_phone(raw: &str) -> bool {
    let digits = raw.chars().filter(|c| c.is_ascii_digit()).count();
    digits >= 9 && raw.chars().all(|c| c.is_ascii_digit() || "+ ()-.".contains(c))
}

fn looks_like_date(raw: &str) -> bool {
    raw.len() == 10
        && raw.as_bytes()[4] == b'-'
        && raw.as_bytes()[7] == b'-'
        && raw.chars().enumerate().all(|(i, c)| {
            if i == 4 || i == 7 { c == '-' } else { c.is_ascii_digit() }
        })
}

fn build_client(args: &str) -> AgentAction {
    let p = parts(args);
    AgentAction::CreateClient(ClientPayload {
        name: part(&p, 0),
        phone: part(&p, 1),
        email: opt_part(&p, 2),
    })
}

fn build_update_client(args: &str) -> AgentAction {
    let p = parts(args);
    AgentAction::UpdateClient(UpdateClientPayload {
        phone: part(&p, 0),
        name: opt_part(&p, 1),
        email: opt_part(&p, 2),
        notes: None,
    })
}

fn build_delete_client(args: &str) -> AgentAction {
    AgentAction::DeleteClient(PhonePayload { phone: args.trim().to_string() })
}

fn build_tag(args: &str) -> AgentAction {
    let p = parts(args);
    AgentAction::TagClient(TagClientPayload { phone: part(&p, 0), tag: part(&p, 1) })
}

fn build_master(args: &str) -> AgentAction {
    let p = parts(args);
    AgentAction::CreateMaster(MasterPayload { name: part(&p, 0), bio: opt_part(&p, 1) })
}

fn build_update_master(args: &str) -> AgentAction {
    let p = parts(args);
    AgentAction::UpdateMaster(UpdateMasterPayload {
        master: part(&p, 0),
        name: opt_part(&p, 1),
        bio: opt_part(&p, 2),
    })
}

fn build_delete_master(args: &str) -> AgentAction {
    AgentAction::DeleteMaster(MasterRefPayload { master: args.trim().to_string() })
}

/// `schedule: Олена, monday, 09:00, 18:00` or `schedule: Олена, sunday, off`.
fn build_schedule(args: &str) -> AgentAction {
    let p = parts(args);
    let off = p.get(2).map(|v| v.eq_ignore_ascii_case("off")).unwrap_or(false);
    AgentAction::SetWorkingHours(WorkingHoursPayload {
        master: part(&p, 0),
        day: part(&p, 1).to_lowercase(),
        enabled: !off,
        start: if off { String::new() } else { part(&p, 2) },
        end: if off { String::new() } else { part(&p, 3) },
    })
}

/// `override: Олена, 2025-05-01, 12:00, 15:00` or `override: Олена, 2025-05-01, off`.
fn build_override(args: &str) -> AgentAction {
    let p = parts(args);
    let off = p.get(2).map(|v| v.eq_ignore_ascii_case("off")).unwrap_or(false);
    AgentAction::SetScheduleOverride(ScheduleOverridePayload {
        master: part(&p, 0),
        date: part(&p, 1),
        enabled: !off,
        start: if off { String::new() } else { part(&p, 2) },
        end: if off { String::new() } else { part(&p, 3) },
    })
}

fn build_clear_override(args: &str) -> AgentAction {
    let p = parts(args);
    AgentAction::ClearScheduleOverride(ClearOverridePayload {
        master: part(&p, 0),
        date: part(&p, 1),
    })
}

/// `service: Стрижка, 500, 45`: price arrives in whole hryvnias and is
/// stored in kopiykas.
fn build_service(args: &str) -> AgentAction {
    let p = parts(args);
    AgentAction::CreateService(ServicePayload {
        name: part(&p, 0),
        price: p.get(1).and_then(|v| v.parse::<i64>().ok()).map(|uah| uah * 100),
        duration_minutes: p.get(2).and_then(|v| v.parse().ok()),
        category: opt_part(&p, 3),
    })
}

fn build_delete_service(args: &str) -> AgentAction {
    AgentAction::DeleteService(NamePayload { name: args.trim().to_string() })
}

/// `appointment: Іван Петров, 0671234567, Олена, 2025-05-01T10:00[, Стрижка]`.
fn build_appointment(args: &str) -> AgentAction {
    let p = parts(args);
    AgentAction::CreateAppointment(AppointmentPayload {
        client_name: part(&p, 0),
        phone: part(&p, 1),
        master: part(&p, 2),
        start_time: part(&p, 3),
        service: opt_part(&p, 4),
        duration_minutes: None,
        notes: None,
    })
}

/// `cancel: 0671234567` (next upcoming for the phone) or `cancel: <id>`.
fn build_cancel(args: &str) -> AgentAction {
    let reference = args.trim().to_string();
    if looks_like_phone(&reference) {
        AgentAction::CancelAppointment(AppointmentRefPayload {
            phone: Some(reference),
            ..AppointmentRefPayload::default()
        })
    } else {
        AgentAction::CancelAppointment(AppointmentRefPayload {
            id: Some(reference),
            ..AppointmentRefPayload::default()
        })
    }
}

/// `reschedule: 0671234567, 2025-05-02T12:00`: first argument is a phone or
/// an appointment id.
fn build_reschedule(args: &str) -> AgentAction {
    let p = parts(args);
    let reference = part(&p, 0);
    let (id, phone) = if looks_like_phone(&reference) {
        (None, Some(reference))
    } else {
        (Some(reference), None)
    };
    AgentAction::RescheduleAppointment(ReschedulePayload {
        id,
        phone,
        start_time: part(&p, 1),
        duration_minutes: None,
    })
}

/// `note: text[, YYYY-MM-DD]`: the note text may itself contain commas, so
/// only a trailing date-shaped argument is peeled off.
fn build_note(args: &str) -> AgentAction {
    let mut text = args.trim().to_string();
    let mut date = None;
    if let Some((head, tail)) = args.rsplit_once(',') {
        let tail = tail.trim();
        if looks_like_date(tail) {
            text = head.trim().to_string();
            date = Some(tail.to_string());
        }
    }
    AgentAction::CreateNote(NotePayload { text, date })
}

fn build_note_done(args: &str) -> AgentAction {
    AgentAction::CompleteNote(TextPayload { text: args.trim().to_string() })
}

/// `reminder: message, datetime[, phone]`.
fn build_reminder(args: &str) -> AgentAction {
    let p = parts(args);
    AgentAction::CreateReminder(ReminderPayload {
        message: part(&p, 0),
        scheduled_at: part(&p, 1),
        phone: opt_part(&p, 2),
    })
}

fn build_cancel_reminder(args: &str) -> AgentAction {
    AgentAction::CancelReminder(TextPayload { text: args.trim().to_string() })
}

/// `segment: VIP[, criteria text]`: everything after the first comma is the
/// criteria, verbatim.
fn build_segment(args: &str) -> AgentAction {
    let (name, criteria) = match args.split_once(',') {
        Some((name, rest)) => (name.trim().to_string(), Some(rest.trim().to_string())),
        None => (args.trim().to_string(), None),
    };
    AgentAction::CreateSegment(SegmentPayload { name, criteria, auto_update: None })
}

fn build_delete_segment(args: &str) -> AgentAction {
    AgentAction::DeleteSegment(NamePayload { name: args.trim().to_string() })
}

/// `sms: phone, text`: the text keeps its commas.
fn build_sms(args: &str) -> AgentAction {
    let (phone, text) = match args.split_once(',') {
        Some((phone, rest)) => (phone.trim().to_string(), rest.trim().to_string()),
        None => (args.trim().to_string(), String::new()),
    };
    AgentAction::SendSms(SmsPayload { phone, text })
}

#[cfg(test)]
mod tests {
    use super::parse_command;
    use crate::decision::AgentAction;

    #[test]
    fn service_command_parses_and_scales_price_to_kopiykas() {
        let decision = parse_command("service: Стрижка, 500, 45").expect("command");
        match decision.action {
            AgentAction::CreateService(payload) => {
                assert_eq!(payload.name, "Стрижка");
                assert_eq!(payload.price, Some(50000));
                assert_eq!(payload.duration_minutes, Some(45));
            }
            other => panic!("unexpected action: {other:?}"),
        }
        assert!(decision.confidence >= 0.9);
    }

    #[test]
    fn longer_verbs_shadow_shorter_prefixes() {
        let delete = parse_command("delete client: 0671234567").expect("command");
        assert!(matches!(delete.action, AgentAction::DeleteClient(_)));

        let cancel_reminder = parse_command("cancel reminder: подзвонити").expect("command");
        assert!(matches!(cancel_reminder.action, AgentAction::CancelReminder(_)));
    }

    #[test]
    fn appointment_command_carries_all_positional_fields() {
        let decision =
            parse_command("appointment: Іван Петров, 0671234567, Олена, 2025-05-01T10:00, Стрижка")
                .expect("command");
        match decision.action {
            AgentAction::CreateAppointment(payload) => {
                assert_eq!(payload.client_name, "Іван Петров");
                assert_eq!(payload.phone, "0671234567");
                assert_eq!(payload.master, "Олена");
                assert_eq!(payload.start_time, "2025-05-01T10:00");
                assert_eq!(payload.service.as_deref(), Some("Стрижка"));
            }
            other => panic!("unexpected action: {other:?}"),
        }
    }

    #[test]
    fn cancel_routes_phone_and_id_differently() {
        let by_phone = parse_command("cancel: 0671234567").expect("command");
        match by_phone.action {
            AgentAction::CancelAppointment(r) => {
                assert_eq!(r.phone.as_deref(), Some("0671234567"));
                assert!(r.id.is_none());
            }
            other => panic!("unexpected action: {other:?}"),
        }

        let by_id = parse_command("cancel: a1b2c3").expect("command");
        match by_id.action {
            AgentAction::CancelAppointment(r) => {
                assert_eq!(r.id.as_deref(), Some("a1b2c3"));
                assert!(r.phone.is_none());
            }
            other => panic!("unexpected action: {other:?}"),
        }
    }

    #[test]
    fn schedule_off_disables_the_day() {
        let decision = parse_command("schedule: Олена, sunday, off").expect("command");
        match decision.action {
            AgentAction::SetWorkingHours(payload) => {
                assert_eq!(payload.day, "sunday");
                assert!(!payload.enabled);
            }
            other => panic!("unexpected action: {other:?}"),
        }
    }

    #[test]
    fn note_peels_trailing_date_but_keeps_inner_commas() {
        let decision = parse_command("note: купити фарбу, лак, 2025-05-01").expect("command");
        match decision.action {
            AgentAction::CreateNote(payload) => {
                assert_eq!(payload.text, "купити фарбу, лак");
                assert_eq!(payload.date.as_deref(), Some("2025-05-01"));
            }
            other => panic!("unexpected action: {other:?}"),
        }
    }

    #[test]
    fn free_text_is_not_a_command() {
        assert!(parse_command("скільки записів завтра?").is_none());
        assert!(parse_command("клієнт хоче стрижку").is_none());
    }
}

//! Turns tool output into reply text. Pure functions over the JSON documents
//! the tools emit; one branch per tool, a generic degrade for anything else
//! so a new tool never breaks replies.

use serde_json::Value;

use crate::tools::ToolOutcome;

pub fn format_tool_reply(outcome: &ToolOutcome) -> String {
    if let Some(status) = outcome.data["status"].as_str() {
        return format_status(status, &outcome.data);
    }
    match outcome.tool.as_str() {
        "who_working" => who_working(&outcome.data),
        "free_slots" => free_slots(&outcome.data),
        "gaps_summary" => gaps_summary(&outcome.data),
        "analytics_kpi" => analytics_kpi(&outcome.data),
        "payments_kpi" => payments_kpi(&outcome.data),
        "appointments_list" => appointments_list(&outcome.data),
        "clients_search" => clients_search(&outcome.data),
        "client_by_phone" => client_by_phone(&outcome.data),
        "segments_list" => segments_list(&outcome.data),
        "notes_list" => notes_list(&outcome.data),
        "reminders_list" => reminders_list(&outcome.data),
        "social_inbox_summary" => social_inbox_summary(&outcome.data),
        "services_top" => services_top(&outcome.data),
        "masters_top" => masters_top(&outcome.data),
        "schedule_overview" => schedule_overview(&outcome.data),
        "biz_overview" => biz_overview(&outcome.data),
        _ => generic(&outcome.data),
    }
}

fn format_status(status: &str, data: &Value) -> String {
    match status {
        "master_required" => {
            "Уточніть, будь ласка, до якого майстра дивитися вільні години.".to_string()
        }
        "master_not_found" => format!(
            "Не знайшла майстра «{}». Перевірте ім'я.",
            data["master"].as_str().unwrap_or("?")
        ),
        "client_not_found" => format!(
            "Клієнта з номером {} не знайдено.",
            data["phone"].as_str().unwrap_or("?")
        ),
        "invalid_phone" => format!(
            "Номер «{}» виглядає некоректним. Формат: 0671234567.",
            data["phone"].as_str().unwrap_or("?")
        ),
        "unknown_tool" => "Не можу відповісти на це запитання.".to_string(),
        other => format!("Не вийшло отримати дані ({other})."),
    }
}

fn who_working(data: &Value) -> String {
    let date = data["date"].as_str().unwrap_or("?");
    let mut lines = vec![format!("Хто працює {date}:")];
    for master in array(&data["masters"]) {
        let name = master["name"].as_str().unwrap_or("?");
        match master["window"].as_str() {
            Some(window) => lines.push(format!("• {name}: {window}")),
            None => lines.push(format!("• {name}: вихідний")),
        }
    }
    lines.join("\n")
}

fn free_slots(data: &Value) -> String {
    let master = data["master"].as_str().unwrap_or("?");
    let date = data["date"].as_str().unwrap_or("?");
    let slots: Vec<&str> =
        array(&data["slots"]).iter().filter_map(|slot| slot.as_str()).collect();
    if slots.is_empty() {
        format!("У {master} на {date} вільних годин немає.")
    } else {
        format!("Вільні години {master} на {date}: {}.", slots.join(", "))
    }
}

fn gaps_summary(data: &Value) -> String {
    let days = data["days"].as_i64().unwrap_or(0);
    let mut lines = vec![format!("Вільні години на {days} дн.:")];
    for master in array(&data["masters"]) {
        lines.push(format!(
            "• {}: {} год",
            master["master"].as_str().unwrap_or("?"),
            master["free_hours"].as_i64().unwrap_or(0)
        ));
    }
    lines.join("\n")
}

fn analytics_kpi(data: &Value) -> String {
    format!(
        "За {} дн.: записів {}, виконано {}, скасовано {}, унікальних клієнтів {}.",
        data["days"].as_i64().unwrap_or(0),
        data["appointments"].as_i64().unwrap_or(0),
        data["done"].as_i64().unwrap_or(0),
        data["cancelled"].as_i64().unwrap_or(0),
        data["unique_clients"].as_i64().unwrap_or(0)
    )
}

fn payments_kpi(data: &Value) -> String {
    format!(
        "За {} дн.: дохід {} грн із {} візитів.",
        data["days"].as_i64().unwrap_or(0),
        data["revenue"].as_i64().unwrap_or(0) / 100,
        data["paid_visits"].as_i64().unwrap_or(0)
    )
}

fn appointments_list(data: &Value) -> String {
    let rows = array(&data["appointments"]);
    if rows.is_empty() {
        return "Записів у цей період немає.".to_string();
    }
    let mut lines = vec!["Записи:".to_string()];
    for row in rows {
        lines.push(format!(
            "• {} — {} ({})",
            row["start"].as_str().unwrap_or("?"),
            row["client"].as_str().unwrap_or("?"),
            row["status"].as_str().unwrap_or("?")
        ));
    }
    lines.join("\n")
}

fn clients_search(data: &Value) -> String {
    let rows = array(&data["clients"]);
    if rows.is_empty() {
        return "Нікого не знайшла за цим запитом.".to_string();
    }
    let mut lines = vec![format!("Знайдено {}:", rows.len())];
    for row in rows {
        lines.push(format!(
            "• {} — {}",
            row["name"].as_str().unwrap_or("?"),
            row["phone"].as_str().unwrap_or("?")
        ));
    }
    lines.join("\n")
}

fn client_by_phone(data: &Value) -> String {
    let name = data["name"].as_str().unwrap_or("?");
    let phone = data["phone"].as_str().unwrap_or("?");
    let visits = data["total_appointments"].as_i64().unwrap_or(0);
    match data["last_appointment"].as_str() {
        Some(last) => format!("{name} ({phone}): візитів {visits}, останній {last}."),
        None => format!("{name} ({phone}): візитів {visits}."),
    }
}

fn segments_list(data: &Value) -> String {
    let rows = array(&data["segments"]);
    if rows.is_empty() {
        return "Сегментів поки немає.".to_string();
    }
    let mut lines = vec!["Сегменти:".to_string()];
    for row in rows {
        lines.push(format!(
            "• {} ({} клієнтів)",
            row["name"].as_str().unwrap_or("?"),
            row["clients"].as_i64().unwrap_or(0)
        ));
    }
    lines.join("\n")
}

fn notes_list(data: &Value) -> String {
    let rows = array(&data["notes"]);
    if rows.is_empty() {
        return "Нотаток немає.".to_string();
    }
    let mut lines = vec!["Нотатки:".to_string()];
    for row in rows {
        let mark = if row["completed"].as_bool().unwrap_or(false) { "✓" } else { "•" };
        lines.push(format!(
            "{mark} {} ({})",
            row["text"].as_str().unwrap_or("?"),
            row["date"].as_str().unwrap_or("?")
        ));
    }
    lines.join("\n")
}

fn reminders_list(data: &Value) -> String {
    let rows = array(&data["reminders"]);
    if rows.is_empty() {
        return "Нагадувань немає.".to_string();
    }
    let mut lines = vec!["Нагадування:".to_string()];
    for row in rows {
        lines.push(format!(
            "• {} — {}",
            row["at"].as_str().unwrap_or("?"),
            row["message"].as_str().unwrap_or("?")
        ));
    }
    lines.join("\n")
}

fn social_inbox_summary(data: &Value) -> String {
    format!("Вихідних SMS за останній час: {}.", data["recent_sms"].as_i64().unwrap_or(0))
}

fn services_top(data: &Value) -> String {
    let rows = array(&data["services"]);
    if rows.is_empty() {
        return "Послуг поки немає.".to_string();
    }
    let mut lines = vec!["Топ послуг:".to_string()];
    for row in rows {
        lines.push(format!(
            "• {} — {} грн, записів: {}",
            row["name"].as_str().unwrap_or("?"),
            row["price"].as_i64().unwrap_or(0) / 100,
            row["bookings"].as_i64().unwrap_or(0)
        ));
    }
    lines.join("\n")
}

fn masters_top(data: &Value) -> String {
    let mut lines = vec![format!("Майстри за {} дн.:", data["days"].as_i64().unwrap_or(0))];
    for row in array(&data["masters"]) {
        lines.push(format!(
            "• {}: {} записів",
            row["name"].as_str().unwrap_or("?"),
            row["appointments"].as_i64().unwrap_or(0)
        ));
    }
    lines.join("\n")
}

fn schedule_overview(data: &Value) -> String {
    let mut lines = Vec::new();
    for master in array(&data["masters"]) {
        lines.push(format!("{}:", master["master"].as_str().unwrap_or("?")));
        for day in array(&master["days"]) {
            let date = day["date"].as_str().unwrap_or("?");
            match day["window"].as_str() {
                Some(window) => lines.push(format!("  {date}: {window}")),
                None => lines.push(format!("  {date}: вихідний")),
            }
        }
    }
    if lines.is_empty() {
        return "Майстрів поки немає.".to_string();
    }
    lines.join("\n")
}

fn biz_overview(data: &Value) -> String {
    format!(
        "Клієнтів: {}, майстрів: {}, послуг: {}, записів на тиждень: {}.",
        data["clients"].as_i64().unwrap_or(0),
        data["masters"].as_i64().unwrap_or(0),
        data["services"].as_i64().unwrap_or(0),
        data["upcoming_week"].as_i64().unwrap_or(0)
    )
}

fn generic(data: &Value) -> String {
    format!("Дані: {data}")
}

fn array(value: &Value) -> &[Value] {
    value.as_array().map(Vec::as_slice).unwrap_or(&[])
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::format_tool_reply;
    use crate::tools::ToolOutcome;

    #[test]
    fn free_slots_render_as_one_line() {
        let outcome = ToolOutcome {
            tool: "free_slots".to_string(),
            data: json!({ "master": "Олена", "date": "2025-05-01", "slots": ["09:00", "11:00"] }),
        };
        assert_eq!(
            format_tool_reply(&outcome),
            "Вільні години Олена на 2025-05-01: 09:00, 11:00."
        );
    }

    #[test]
    fn master_required_status_asks_to_specify() {
        let outcome = ToolOutcome {
            tool: "free_slots".to_string(),
            data: json!({ "status": "master_required" }),
        };
        assert!(format_tool_reply(&outcome).contains("до якого майстра"));
    }

    #[test]
    fn unknown_tool_degrades_gracefully() {
        let outcome = ToolOutcome {
            tool: "future_tool".to_string(),
            data: json!({ "anything": 1 }),
        };
        assert!(format_tool_reply(&outcome).starts_with("Дані:"));
    }
}

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::domain::BusinessId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MasterId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaySchedule {
    pub enabled: bool,
    pub start: String,
    pub end: String,
}

impl DaySchedule {
    pub fn working(start: &str, end: &str) -> Self {
        Self { enabled: true, start: start.to_string(), end: end.to_string() }
    }

    pub fn off() -> Self {
        Self { enabled: false, start: "00:00".to_string(), end: "00:00".to_string() }
    }
}

/// Regular weekly schedule, keyed by lowercase English weekday name.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingHours(pub BTreeMap<String, DaySchedule>);

impl Default for WorkingHours {
    fn default() -> Self {
        let mut days = BTreeMap::new();
        for day in ["monday", "tuesday", "wednesday", "thursday", "friday"] {
            days.insert(day.to_string(), DaySchedule::working("09:00", "18:00"));
        }
        days.insert("saturday".to_string(), DaySchedule::working("10:00", "16:00"));
        days.insert("sunday".to_string(), DaySchedule::off());
        Self(days)
    }
}

impl WorkingHours {
    pub fn for_weekday(&self, weekday: Weekday) -> Option<&DaySchedule> {
        self.0.get(weekday_key(weekday))
    }
}

pub fn weekday_key(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "monday",
        Weekday::Tue => "tuesday",
        Weekday::Wed => "wednesday",
        Weekday::Thu => "thursday",
        Weekday::Fri => "friday",
        Weekday::Sat => "saturday",
        Weekday::Sun => "sunday",
    }
}

/// Per-date exception to the weekly schedule, keyed by `YYYY-MM-DD`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayOverride {
    pub enabled: bool,
    pub start: String,
    pub end: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Master {
    pub id: MasterId,
    pub business_id: BusinessId,
    pub name: String,
    pub bio: Option<String>,
    pub working_hours: WorkingHours,
    pub schedule_overrides: BTreeMap<String, DayOverride>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Master {
    pub fn new(business_id: BusinessId, name: impl Into<String>) -> Self {
        Self {
            id: MasterId(super::new_entity_id()),
            business_id,
            name: name.into(),
            bio: None,
            working_hours: WorkingHours::default(),
            schedule_overrides: BTreeMap::new(),
            is_active: true,
            created_at: Utc::now(),
        }
    }

    /// Effective window for a calendar date: the date override when one is
    /// set, otherwise the weekly schedule for that weekday. `None` means the
    /// master does not work that day.
    pub fn day_window(&self, date: chrono::NaiveDate) -> Option<(NaiveTime, NaiveTime)> {
        use chrono::Datelike;

        let key = date.format("%Y-%m-%d").to_string();
        let (enabled, start, end) = match self.schedule_overrides.get(&key) {
            Some(over) => (over.enabled, over.start.as_str(), over.end.as_str()),
            None => {
                let day = self.working_hours.for_weekday(date.weekday())?;
                (day.enabled, day.start.as_str(), day.end.as_str())
            }
        };
        if !enabled {
            return None;
        }
        let start = NaiveTime::parse_from_str(start, "%H:%M").ok()?;
        let end = NaiveTime::parse_from_str(end, "%H:%M").ok()?;
        (start < end).then_some((start, end))
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{DayOverride, Master};
    use crate::domain::BusinessId;

    #[test]
    fn day_window_prefers_date_override() {
        let mut master = Master::new(BusinessId("b-1".to_string()), "Олена");
        master.schedule_overrides.insert(
            "2025-05-01".to_string(),
            DayOverride { enabled: true, start: "12:00".to_string(), end: "15:00".to_string() },
        );

        let date = NaiveDate::from_ymd_opt(2025, 5, 1).expect("date");
        let (start, end) = master.day_window(date).expect("window");
        assert_eq!(start.to_string(), "12:00:00");
        assert_eq!(end.to_string(), "15:00:00");
    }

    #[test]
    fn disabled_override_closes_the_day() {
        let mut master = Master::new(BusinessId("b-1".to_string()), "Олена");
        master.schedule_overrides.insert(
            "2025-05-02".to_string(),
            DayOverride { enabled: false, start: "00:00".to_string(), end: "00:00".to_string() },
        );

        let date = NaiveDate::from_ymd_opt(2025, 5, 2).expect("date");
        assert!(master.day_window(date).is_none());
    }

    #[test]
    fn sunday_is_off_by_default() {
        let master = Master::new(BusinessId("b-1".to_string()), "Олена");
        let sunday = NaiveDate::from_ymd_opt(2025, 5, 4).expect("date");
        assert!(master.day_window(sunday).is_none());
    }
}

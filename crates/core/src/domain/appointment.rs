use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::client::ClientId;
use crate::domain::master::MasterId;
use crate::domain::service::ServiceId;
use crate::domain::BusinessId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AppointmentId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Done,
    Cancelled,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Done => "done",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "confirmed" => Some(Self::Confirmed),
            "done" => Some(Self::Done),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

/// A booked visit. Client name and phone are snapshotted at creation time so
/// the calendar stays readable even if the client record changes later.
///
/// Invariant: per master, no two non-cancelled appointments overlap on
/// `[start_time, end_time)`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: AppointmentId,
    pub business_id: BusinessId,
    pub master_id: MasterId,
    pub client_id: ClientId,
    pub client_name: String,
    pub client_phone: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: AppointmentStatus,
    pub service_ids: Vec<ServiceId>,
    pub notes: Option<String>,
    pub source: String,
    pub created_at: DateTime<Utc>,
}

/// Half-open interval overlap: `[a_start, a_end)` intersects `[b_start, b_end)`.
pub fn intervals_overlap(
    a_start: DateTime<Utc>,
    a_end: DateTime<Utc>,
    b_start: DateTime<Utc>,
    b_end: DateTime<Utc>,
) -> bool {
    a_start < b_end && b_start < a_end
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::{intervals_overlap, AppointmentStatus};

    #[test]
    fn status_round_trip() {
        for status in [
            AppointmentStatus::Pending,
            AppointmentStatus::Confirmed,
            AppointmentStatus::Done,
            AppointmentStatus::Cancelled,
        ] {
            assert_eq!(AppointmentStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(AppointmentStatus::parse("unknown"), None);
    }

    #[test]
    fn touching_intervals_do_not_overlap() {
        let base = Utc.with_ymd_and_hms(2025, 5, 1, 10, 0, 0).single().expect("time");
        let next = base + Duration::minutes(60);
        let later = next + Duration::minutes(60);

        assert!(!intervals_overlap(base, next, next, later));
        assert!(intervals_overlap(base, next, next - Duration::minutes(1), later));
    }

    #[test]
    fn randomized_pairs_match_reference_predicate() {
        let mut rng = StdRng::seed_from_u64(42);
        let origin = Utc.with_ymd_and_hms(2025, 5, 1, 0, 0, 0).single().expect("time");

        for _ in 0..500 {
            let a_start = origin + Duration::minutes(rng.gen_range(0..720));
            let a_end = a_start + Duration::minutes(rng.gen_range(1..180));
            let b_start = origin + Duration::minutes(rng.gen_range(0..720));
            let b_end = b_start + Duration::minutes(rng.gen_range(1..180));

            let expected = a_start.max(b_start) < a_end.min(b_end);
            assert_eq!(intervals_overlap(a_start, a_end, b_start, b_end), expected);
            // Symmetric by construction.
            assert_eq!(
                intervals_overlap(b_start, b_end, a_start, a_end),
                intervals_overlap(a_start, a_end, b_start, b_end)
            );
        }
    }
}

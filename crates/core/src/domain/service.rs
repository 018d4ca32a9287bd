use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::BusinessId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceId(pub String);

/// A bookable service. Price is integer minor units (kopiykas), duration is
/// minutes. Upserted by case-insensitive name so re-phrased commands
/// converge on one row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub id: ServiceId,
    pub business_id: BusinessId,
    pub name: String,
    pub price: i64,
    pub duration_minutes: i64,
    pub category: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Service {
    pub fn new(
        business_id: BusinessId,
        name: impl Into<String>,
        price: i64,
        duration_minutes: i64,
    ) -> Self {
        Self {
            id: ServiceId(super::new_entity_id()),
            business_id,
            name: name.into(),
            price,
            duration_minutes,
            category: None,
            is_active: true,
            created_at: Utc::now(),
        }
    }
}

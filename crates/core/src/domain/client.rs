use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::BusinessId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientId(pub String);

/// A client of the business, identified by `(business_id, phone)`.
///
/// The phone is stored in normalized `+380XXXXXXXXX` form; repositories
/// enforce uniqueness on that pair. Clients are deactivated, never deleted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Client {
    pub id: ClientId,
    pub business_id: BusinessId,
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub notes: Option<String>,
    pub tags: Vec<String>,
    pub total_spent: i64,
    pub total_appointments: i64,
    pub last_appointment_date: Option<DateTime<Utc>>,
    pub status: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Client {
    pub fn new(
        business_id: BusinessId,
        name: impl Into<String>,
        phone: impl Into<String>,
    ) -> Self {
        Self {
            id: ClientId(super::new_entity_id()),
            business_id,
            name: name.into(),
            phone: phone.into(),
            email: None,
            notes: None,
            tags: Vec::new(),
            total_spent: 0,
            total_appointments: 0,
            last_appointment_date: None,
            status: "active".to_string(),
            is_active: true,
            created_at: Utc::now(),
        }
    }
}

use serde::{Deserialize, Serialize};

pub mod appointment;
pub mod client;
pub mod conversation;
pub mod engagement;
pub mod master;
pub mod service;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BusinessId(pub String);

pub fn new_entity_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

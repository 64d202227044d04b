use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Profile record owned by the persistence layer.
///
/// `id` is the only identifier used for authorization; username and phone
/// number exist for discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub phone_number: String,
    pub display_name: Option<String>,
    pub profile_picture_url: Option<String>,
    pub status: Option<String>,
    pub last_seen: Option<DateTime<Utc>>,
}

impl User {
    pub fn new(username: impl Into<String>, phone_number: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            username: username.into(),
            phone_number: phone_number.into(),
            display_name: None,
            profile_picture_url: None,
            status: None,
            last_seen: None,
        }
    }
}

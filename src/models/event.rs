//! Represents an event, the collection photos belong to.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// An event owned by exactly one user.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,

    /// Display name, used as the base of archive filenames.
    pub name: String,

    /// User allowed to request and download archives for this event.
    pub owner_id: String,

    pub created_at: DateTime<Utc>,
}

impl Event {
    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.owner_id == user_id
    }
}

//! Class records exchanged with the class server.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ClassId, ClassStatus, UserId};

/// A class as listed by `GET /class/list`.
///
/// Classes are owned by the server; the client reads them for display and
/// passes their IDs back when reserving.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassRecord {
    pub id: ClassId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub creator_id: UserId,
    #[serde(default)]
    pub creator_name: Option<String>,
    /// Creation timestamp, kept as the server formatted it.
    #[serde(default)]
    pub created_at: Option<String>,
    pub start_date: DateTime<Utc>,
    #[serde(default)]
    pub status: ClassStatus,
    /// Maximum number of participants, when the server reports one.
    #[serde(default)]
    pub capacity: Option<u32>,
    /// Participant entries; their shape is server-defined.
    #[serde(default)]
    pub participants: Vec<serde_json::Value>,
}

impl ClassRecord {
    /// Number of seats already reserved.
    #[must_use]
    pub fn seats_taken(&self) -> usize {
        self.participants.len()
    }

    /// Remaining seats, if the class has a known capacity.
    #[must_use]
    pub fn seats_left(&self) -> Option<usize> {
        self.capacity
            .map(|capacity| (capacity as usize).saturating_sub(self.seats_taken()))
    }

    /// Whether a new reservation could be accepted.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.status.accepts_reservations() && self.seats_left().is_none_or(|left| left > 0)
    }
}

/// Body of `POST /class/create`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewClass {
    pub title: String,
    pub creator_id: UserId,
    /// Start time, sent in UTC.
    pub start_date: DateTime<Utc>,
    pub description: String,
    pub status: ClassStatus,
    pub capacity: u32,
}

/// Body of `POST /class/reserve`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub class_id: ClassId,
    pub user_id: UserId,
}

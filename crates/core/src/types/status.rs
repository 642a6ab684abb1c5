//! Class status values.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a class, as reported by the class server.
///
/// Classes are created as `active`. Statuses this client does not know about
/// are preserved verbatim in [`ClassStatus::Other`] so they survive a
/// round trip back to the server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(from = "String", into = "String")]
pub enum ClassStatus {
    /// Open for reservations.
    #[default]
    Active,
    /// No longer accepting reservations.
    Closed,
    /// Called off by its creator.
    Cancelled,
    /// Any other status string sent by the server.
    Other(String),
}

impl ClassStatus {
    /// Returns the wire representation of the status.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Active => "active",
            Self::Closed => "closed",
            Self::Cancelled => "cancelled",
            Self::Other(other) => other,
        }
    }

    /// Whether seats can still be reserved.
    #[must_use]
    pub const fn accepts_reservations(&self) -> bool {
        matches!(self, Self::Active)
    }
}

impl std::fmt::Display for ClassStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for ClassStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "active" => Self::Active,
            "closed" => Self::Closed,
            "cancelled" | "canceled" => Self::Cancelled,
            _ => Self::Other(s),
        }
    }
}

impl From<ClassStatus> for String {
    fn from(status: ClassStatus) -> Self {
        match status {
            ClassStatus::Other(other) => other,
            known => known.as_str().to_owned(),
        }
    }
}

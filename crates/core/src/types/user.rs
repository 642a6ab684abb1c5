//! Cached user profile.

use serde::{Deserialize, Serialize};

use super::{Email, UserId};

/// The signed-in user, as returned by the login and sign-up endpoints.
///
/// The shape is defined by the server; only `id` and `name` are required.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<Email>,
}

impl UserProfile {
    /// Greeting shown at the top of the home view.
    #[must_use]
    pub fn greeting(&self) -> String {
        format!("Welcome, {}", self.name)
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Represents a user in the system.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// The unique identifier for the user.
    pub id: Uuid,
    /// The user's email address. Guests have none.
    pub email: Option<String>,
    /// The user's display name.
    pub user_name: String,
    /// The user's avatar reference.
    pub profile_picture_url: Option<String>,
    /// The user's Argon2 password hash. Guests have none.
    #[serde(skip_serializing, default)]
    pub password_hash: Option<String>,
    /// The timestamp when the user was created.
    pub created_at: DateTime<Utc>,
}

/// The public projection of a member, as pushed to room subscribers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
    pub id: Uuid,
    pub profile_picture_url: Option<String>,
    pub user_name: String,
}

impl From<&User> for RosterEntry {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            profile_picture_url: user.profile_picture_url.clone(),
            user_name: user.user_name.clone(),
        }
    }
}

/// The authenticated caller, resolved from an access token.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: Uuid,
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A time-limited invite that resolves directly to a session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralLink {
    pub token: String,
    pub session_hash: String,
    pub expires_at: DateTime<Utc>,
}

impl ReferralLink {
    /// Whether the link is still usable at `now`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Public display fields of a user, resolved through the identity lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantProfile {
    pub user_id: Uuid,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

impl ParticipantProfile {
    /// Stand-in used when the identity lookup is unavailable for listings
    pub fn unknown(user_id: Uuid) -> Self {
        Self {
            user_id,
            display_name: "Unknown user".to_string(),
            avatar_url: None,
        }
    }
}

use super::profile::ParticipantProfile;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Order-independent key for a direct conversation.
///
/// `low <= high` always holds, so `{A, B}` and `{B, A}` produce the same key.
/// Stores use it as their uniqueness constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParticipantPair {
    low: Uuid,
    high: Uuid,
}

impl ParticipantPair {
    /// Returns `None` when both sides are the same identity.
    pub fn new(a: Uuid, b: Uuid) -> Option<Self> {
        match a.cmp(&b) {
            std::cmp::Ordering::Less => Some(Self { low: a, high: b }),
            std::cmp::Ordering::Greater => Some(Self { low: b, high: a }),
            std::cmp::Ordering::Equal => None,
        }
    }

    pub fn low(&self) -> Uuid {
        self.low
    }

    pub fn high(&self) -> Uuid {
        self.high
    }
}

/// Derived lifecycle of a conversation. Never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationState {
    Empty,
    Active,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub participants: [Uuid; 2],
    /// Cached preview of the newest message. Rewritten on every send.
    pub last_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(pair: ParticipantPair) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            participants: [pair.low(), pair.high()],
            last_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_participant(&self, user_id: Uuid) -> bool {
        self.participants.contains(&user_id)
    }

    /// The counterpart of `user_id`, or `None` if `user_id` is not a participant.
    pub fn other_participant(&self, user_id: Uuid) -> Option<Uuid> {
        match self.participants {
            [a, b] if a == user_id => Some(b),
            [a, b] if b == user_id => Some(a),
            _ => None,
        }
    }

    /// A conversation becomes active with its first message and stays active,
    /// even after its history is deleted.
    pub fn state(&self) -> ConversationState {
        if self.last_message.is_some() {
            ConversationState::Active
        } else {
            ConversationState::Empty
        }
    }
}

/// Row of the conversation list as seen by one participant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub conversation_id: Uuid,
    pub other_participant: ParticipantProfile,
    pub last_message: Option<String>,
    pub unread_count: u64,
    pub state: ConversationState,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_is_order_independent() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_eq!(ParticipantPair::new(a, b), ParticipantPair::new(b, a));
    }

    #[test]
    fn test_pair_rejects_self_conversation() {
        let a = Uuid::new_v4();
        assert!(ParticipantPair::new(a, a).is_none());
    }

    #[test]
    fn test_other_participant() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let conv = Conversation::new(ParticipantPair::new(a, b).unwrap());

        assert_eq!(conv.other_participant(a), Some(b));
        assert_eq!(conv.other_participant(b), Some(a));
        assert_eq!(conv.other_participant(Uuid::new_v4()), None);
    }

    #[test]
    fn test_state_follows_last_message() {
        let mut conv =
            Conversation::new(ParticipantPair::new(Uuid::new_v4(), Uuid::new_v4()).unwrap());
        assert_eq!(conv.state(), ConversationState::Empty);
        conv.last_message = Some("hi".into());
        assert_eq!(conv.state(), ConversationState::Active);
    }
}

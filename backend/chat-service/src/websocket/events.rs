use crate::error::{AppError, AppResult};
use crate::models::MessageView;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Events pushed to connected clients. Serialized with a `type` tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum DeliveryEvent {
    NewMessage {
        conversation_id: Uuid,
        message: MessageView,
    },
    MessagesSeen {
        conversation_id: Uuid,
        seen_by: Uuid,
        count: u64,
    },
}

impl DeliveryEvent {
    pub fn conversation_id(&self) -> Uuid {
        match self {
            DeliveryEvent::NewMessage {
                conversation_id, ..
            }
            | DeliveryEvent::MessagesSeen {
                conversation_id, ..
            } => *conversation_id,
        }
    }

    /// Wire name of the event, also used as a metric label.
    pub fn kind(&self) -> &'static str {
        match self {
            DeliveryEvent::NewMessage { .. } => "new-message",
            DeliveryEvent::MessagesSeen { .. } => "messages-seen",
        }
    }

    pub fn to_json(&self) -> AppResult<String> {
        serde_json::to_string(self).map_err(|e| AppError::Delivery(format!("serialize event: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_seen_wire_format() {
        let conversation_id = Uuid::new_v4();
        let seen_by = Uuid::new_v4();
        let event = DeliveryEvent::MessagesSeen {
            conversation_id,
            seen_by,
            count: 3,
        };

        let value: serde_json::Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(value["type"], "messages-seen");
        assert_eq!(value["conversation_id"], conversation_id.to_string());
        assert_eq!(value["seen_by"], seen_by.to_string());
        assert_eq!(value["count"], 3);
        assert_eq!(event.conversation_id(), conversation_id);
    }
}

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::MessageRecord;

/// Events pushed over the realtime gateway, one JSON text frame each:
/// `{"type": "<event>", "data": <payload>}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Full snapshot of the users currently online. Order is not meaningful.
    #[serde(rename = "getOnlineUser")]
    OnlineUsers(Vec<Uuid>),

    /// A message addressed to the receiving connection's user was stored.
    #[serde(rename = "newMessage")]
    NewMessage(MessageRecord),
}

impl GatewayEvent {
    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::OnlineUsers(_) => "getOnlineUser",
            Self::NewMessage(_) => "newMessage",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn online_users_wire_shape() {
        let id = Uuid::new_v4();
        let event = GatewayEvent::OnlineUsers(vec![id]);

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "getOnlineUser");
        assert_eq!(json["data"], serde_json::json!([id]));
        assert_eq!(event.name(), "getOnlineUser");
    }

    #[test]
    fn parses_new_message_frame() {
        let raw = r#"{
            "type": "newMessage",
            "data": {
                "id": "00000000-0000-0000-0000-000000000001",
                "senderId": "00000000-0000-0000-0000-000000000002",
                "receiverId": "00000000-0000-0000-0000-000000000003",
                "text": "hi",
                "createdAt": "2025-01-01T00:00:00Z"
            }
        }"#;

        match serde_json::from_str::<GatewayEvent>(raw).unwrap() {
            GatewayEvent::NewMessage(record) => {
                assert_eq!(record.text.as_deref(), Some("hi"));
                assert!(record.image_url.is_none());
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }
}

use crate::ids::{MessageId, SessionId, UserId};
use serde::{Deserialize, Serialize};

/// Who authored a message in a companion chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A decrypted message as handed to the UI layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub content: String,
    pub role: Role,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub user_id: UserId,
}

impl Message {
    /// Build a new message stamped with the current time.
    pub fn new(user_id: UserId, role: Role, content: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            content: content.into(),
            role,
            timestamp: chrono::Utc::now(),
            user_id,
        }
    }
}

/// A message row as persisted by the remote store.
///
/// `content` is either an encrypted envelope or legacy plaintext.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRow {
    pub id: MessageId,
    pub session_id: SessionId,
    pub user_id: UserId,
    pub role: Role,
    pub content: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::User).unwrap(), "\"user\"");
        assert_eq!(
            serde_json::to_string(&Role::Assistant).unwrap(),
            "\"assistant\""
        );
    }

    #[test]
    fn message_row_includes_all_fields() {
        let row = MessageRow {
            id: MessageId::new(),
            session_id: SessionId::from("s1"),
            user_id: UserId::from("u1"),
            role: Role::User,
            content: "encrypted_abc".into(),
            timestamp: chrono::Utc::now(),
        };
        let json = serde_json::to_value(&row).unwrap();
        for field in ["id", "session_id", "user_id", "role", "content", "timestamp"] {
            assert!(json.get(field).is_some(), "missing {field}");
        }
        assert_eq!(json["session_id"], "s1");
    }

    #[test]
    fn message_new_sets_fields() {
        let msg = Message::new(UserId::from("u1"), Role::Assistant, "hi");
        assert_eq!(msg.content, "hi");
        assert_eq!(msg.role, Role::Assistant);
        assert_eq!(msg.user_id.as_str(), "u1");
    }

    #[test]
    fn message_roundtrips_through_json() {
        let msg = Message::new(UserId::from("u1"), Role::User, "hello");
        let json = serde_json::to_string(&msg).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);
    }
}

//! Outbound payloads and destination naming.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{Message, ReactionKind};

/// Private queue names under `user/{uid}/queue/`.
pub const QUEUE_MESSAGE_SENT: &str = "message-sent";
pub const QUEUE_ERRORS: &str = "errors";
pub const QUEUE_HEARTBEAT: &str = "heartbeat";

pub fn conversation_topic(conversation_id: Uuid) -> String {
    format!("topic/chat/{conversation_id}")
}

pub fn typing_topic(conversation_id: Uuid) -> String {
    format!("topic/chat/{conversation_id}/typing")
}

pub fn user_status_topic(user_id: Uuid) -> String {
    format!("topic/user/{user_id}/status")
}

pub fn user_queue(user_id: Uuid, queue: &str) -> String {
    format!("user/{user_id}/queue/{queue}")
}

/// Topics are stored without surrounding whitespace or a leading `/`.
pub fn normalize_topic(topic: &str) -> &str {
    topic.trim().trim_start_matches('/')
}

/// Every text frame written to a socket has this shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundFrame<T> {
    pub destination: String,
    pub body: T,
}

/// Conversation-wide event. Exactly one is emitted per visible mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ChatEvent {
    #[serde(rename = "message.created")]
    MessageCreated { message: Message },

    #[serde(rename = "message.edited")]
    MessageEdited { message: Message },

    #[serde(rename = "message.deleted", rename_all = "camelCase")]
    MessageDeleted {
        message_id: Uuid,
        conversation_id: Uuid,
    },

    #[serde(rename = "message.forwarded", rename_all = "camelCase")]
    MessageForwarded {
        message: Message,
        source_message_id: Uuid,
    },

    #[serde(rename = "reaction.added", rename_all = "camelCase")]
    ReactionAdded {
        message: Message,
        user_id: Uuid,
        reaction: ReactionKind,
    },

    #[serde(rename = "reaction.removed", rename_all = "camelCase")]
    ReactionRemoved { message: Message, user_id: Uuid },
}

impl ChatEvent {
    pub fn conversation_id(&self) -> Uuid {
        match self {
            ChatEvent::MessageDeleted {
                conversation_id, ..
            } => *conversation_id,
            ChatEvent::MessageCreated { message }
            | ChatEvent::MessageEdited { message }
            | ChatEvent::MessageForwarded { message, .. }
            | ChatEvent::ReactionAdded { message, .. }
            | ChatEvent::ReactionRemoved { message, .. } => message.conversation_id,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            ChatEvent::MessageCreated { .. } => "message.created",
            ChatEvent::MessageEdited { .. } => "message.edited",
            ChatEvent::MessageDeleted { .. } => "message.deleted",
            ChatEvent::MessageForwarded { .. } => "message.forwarded",
            ChatEvent::ReactionAdded { .. } => "reaction.added",
            ChatEvent::ReactionRemoved { .. } => "reaction.removed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendAck {
    pub message_id: Uuid,
    pub status: String,
    pub timestamp: DateTime<Utc>,
}

impl SendAck {
    pub fn sent(message_id: Uuid) -> Self {
        Self {
            message_id,
            status: "sent".into(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorNotice {
    pub status: String,
    pub code: String,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

impl From<&AppError> for ErrorNotice {
    fn from(err: &AppError) -> Self {
        Self {
            status: "error".into(),
            code: err.error_code().into(),
            reason: err.public_reason(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatReply {
    pub status: String,
    pub timestamp: DateTime<Utc>,
}

impl HeartbeatReply {
    pub fn pong() -> Self {
        Self {
            status: "pong".into(),
            timestamp: Utc::now(),
        }
    }
}

/// Transient, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingNotice {
    pub conversation_id: Uuid,
    pub user_id: Uuid,
    pub is_typing: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceNotice {
    pub user_id: Uuid,
    pub status: String,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MessageDraft;

    #[test]
    fn events_are_tagged_with_dotted_names() {
        let message = Message::from_draft(Uuid::new_v4(), Uuid::new_v4(), MessageDraft::text("hi"));
        let event = ChatEvent::ReactionAdded {
            message: message.clone(),
            user_id: message.sender_id,
            reaction: ReactionKind::Heart,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "reaction.added");
        assert_eq!(json["reaction"], "HEART");
        assert_eq!(json["userId"], message.sender_id.to_string());
        assert_eq!(event.conversation_id(), message.conversation_id);
    }

    #[test]
    fn error_notice_hides_internal_detail() {
        let notice = ErrorNotice::from(&AppError::Database("pool timed out".into()));
        assert_eq!(notice.status, "error");
        assert_eq!(notice.code, "INTERNAL_ERROR");
        assert!(!notice.reason.contains("pool"));
    }

    #[test]
    fn topics_normalize_leading_slash() {
        assert_eq!(normalize_topic("/topic/user/x/status"), "topic/user/x/status");
        assert_eq!(normalize_topic(" topic/user/x/status "), "topic/user/x/status");
    }

    #[test]
    fn destinations() {
        let id = Uuid::nil();
        assert_eq!(
            user_queue(id, QUEUE_ERRORS),
            format!("user/{id}/queue/errors")
        );
        assert_eq!(typing_topic(id), format!("topic/chat/{id}/typing"));
    }
}

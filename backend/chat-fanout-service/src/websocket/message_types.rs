use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{MessageDraft, ReactionKind};

/// Inbound text frame: `{"destination": "...", "payload": {...}}`
#[derive(Debug, Clone, Deserialize)]
pub struct InboundEnvelope {
    pub destination: String,
    #[serde(default)]
    pub payload: Value,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingPayload {
    #[serde(default = "default_true")]
    pub is_typing: bool,
}

fn default_true() -> bool {
    true
}

/// Clients send either a bare status string or `{"status": "..."}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PresencePayload {
    Plain(String),
    Object { status: String },
}

impl PresencePayload {
    pub fn into_status(self) -> String {
        match self {
            PresencePayload::Plain(status) | PresencePayload::Object { status } => status,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EditPayload {
    pub content: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReactPayload {
    #[serde(alias = "reactionType", alias = "type")]
    pub reaction: ReactionKind,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForwardPayload {
    pub target_conversation_id: Uuid,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TopicPayload {
    pub topic: String,
}

/// Decoded envelope, one variant per destination.
#[derive(Debug, Clone)]
pub enum Command {
    Send {
        conversation_id: Uuid,
        draft: MessageDraft,
    },
    Typing {
        conversation_id: Uuid,
        is_typing: bool,
    },
    Heartbeat,
    PresenceUpdate {
        status: String,
    },
    Edit {
        message_id: Uuid,
        content: String,
    },
    Delete {
        message_id: Uuid,
    },
    React {
        message_id: Uuid,
        reaction: ReactionKind,
    },
    Unreact {
        message_id: Uuid,
    },
    Forward {
        message_id: Uuid,
        target_conversation_id: Uuid,
    },
    Subscribe {
        topic: String,
    },
    Unsubscribe {
        topic: String,
    },
}

impl Command {
    pub fn parse(envelope: InboundEnvelope) -> Result<Self, AppError> {
        let destination = envelope.destination.trim_start_matches('/');
        let segments: Vec<&str> = destination.split('/').collect();
        let payload = envelope.payload;

        let command = match segments.as_slice() {
            ["chat", id, "send"] => Command::Send {
                conversation_id: parse_id(id)?,
                draft: payload_as(payload)?,
            },
            ["chat", id, "typing"] => {
                let is_typing = if payload.is_null() {
                    true
                } else {
                    payload_as::<TypingPayload>(payload)?.is_typing
                };
                Command::Typing {
                    conversation_id: parse_id(id)?,
                    is_typing,
                }
            }
            ["heartbeat"] => Command::Heartbeat,
            ["user", "status"] => Command::PresenceUpdate {
                status: payload_as::<PresencePayload>(payload)?.into_status(),
            },
            ["message", id, "edit"] => Command::Edit {
                message_id: parse_id(id)?,
                content: payload_as::<EditPayload>(payload)?.content,
            },
            ["message", id, "delete"] => Command::Delete {
                message_id: parse_id(id)?,
            },
            ["message", id, "react"] => Command::React {
                message_id: parse_id(id)?,
                reaction: payload_as::<ReactPayload>(payload)?.reaction,
            },
            ["message", id, "unreact"] => Command::Unreact {
                message_id: parse_id(id)?,
            },
            ["message", id, "forward"] => Command::Forward {
                message_id: parse_id(id)?,
                target_conversation_id: payload_as::<ForwardPayload>(payload)?
                    .target_conversation_id,
            },
            ["subscribe"] => Command::Subscribe {
                topic: payload_as::<TopicPayload>(payload)?.topic,
            },
            ["unsubscribe"] => Command::Unsubscribe {
                topic: payload_as::<TopicPayload>(payload)?.topic,
            },
            _ => {
                return Err(AppError::Validation(format!(
                    "unknown destination: {destination}"
                )))
            }
        };
        Ok(command)
    }

    /// Metric label and log field.
    pub fn operation(&self) -> &'static str {
        match self {
            Command::Send { .. } => "send",
            Command::Typing { .. } => "typing",
            Command::Heartbeat => "heartbeat",
            Command::PresenceUpdate { .. } => "presence",
            Command::Edit { .. } => "edit",
            Command::Delete { .. } => "delete",
            Command::React { .. } => "react",
            Command::Unreact { .. } => "unreact",
            Command::Forward { .. } => "forward",
            Command::Subscribe { .. } => "subscribe",
            Command::Unsubscribe { .. } => "unsubscribe",
        }
    }
}

fn parse_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::Validation(format!("invalid id: {raw}")))
}

fn payload_as<T: DeserializeOwned>(payload: Value) -> Result<T, AppError> {
    serde_json::from_value(payload).map_err(|e| AppError::Validation(format!("invalid payload: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(destination: &str, payload: Value) -> InboundEnvelope {
        InboundEnvelope {
            destination: destination.to_string(),
            payload,
        }
    }

    #[test]
    fn parses_send_with_leading_slash() {
        let id = Uuid::new_v4();
        let cmd = Command::parse(envelope(
            &format!("/chat/{id}/send"),
            json!({"type": "TEXT", "content": "hi"}),
        ))
        .unwrap();
        match cmd {
            Command::Send {
                conversation_id,
                draft,
            } => {
                assert_eq!(conversation_id, id);
                assert_eq!(draft.content.as_deref(), Some("hi"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn presence_accepts_plain_string() {
        let cmd = Command::parse(envelope("user/status", json!("away"))).unwrap();
        assert!(matches!(cmd, Command::PresenceUpdate { status } if status == "away"));
    }

    #[test]
    fn typing_defaults_to_started() {
        let id = Uuid::new_v4();
        let cmd = Command::parse(envelope(&format!("chat/{id}/typing"), Value::Null)).unwrap();
        assert!(matches!(cmd, Command::Typing { is_typing: true, .. }));
    }

    #[test]
    fn rejects_unknown_destination_and_bad_ids() {
        assert!(matches!(
            Command::parse(envelope("admin/shutdown", Value::Null)),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            Command::parse(envelope("message/42/delete", Value::Null)),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn react_accepts_reaction_type_alias() {
        let id = Uuid::new_v4();
        let cmd = Command::parse(envelope(
            &format!("message/{id}/react"),
            json!({"reactionType": "LAUGH"}),
        ))
        .unwrap();
        assert!(matches!(
            cmd,
            Command::React {
                reaction: ReactionKind::Laugh,
                ..
            }
        ));
    }
}

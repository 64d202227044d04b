use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageKind {
    Text,
    Image,
    Video,
    Audio,
    Voice,
    File,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "TEXT",
            MessageKind::Image => "IMAGE",
            MessageKind::Video => "VIDEO",
            MessageKind::Audio => "AUDIO",
            MessageKind::Voice => "VOICE",
            MessageKind::File => "FILE",
        }
    }

    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "TEXT" => Some(MessageKind::Text),
            "IMAGE" => Some(MessageKind::Image),
            "VIDEO" => Some(MessageKind::Video),
            "AUDIO" => Some(MessageKind::Audio),
            "VOICE" => Some(MessageKind::Voice),
            "FILE" => Some(MessageKind::File),
            _ => None,
        }
    }

    pub fn is_media(&self) -> bool {
        !matches!(self, MessageKind::Text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageStatus {
    Sent,
    Delivered,
    Read,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Sent => "SENT",
            MessageStatus::Delivered => "DELIVERED",
            MessageStatus::Read => "READ",
        }
    }

    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "SENT" => Some(MessageStatus::Sent),
            "DELIVERED" => Some(MessageStatus::Delivered),
            "READ" => Some(MessageStatus::Read),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReactionKind {
    Like,
    Heart,
    Laugh,
    Surprised,
    Sad,
    Angry,
}

impl ReactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReactionKind::Like => "LIKE",
            ReactionKind::Heart => "HEART",
            ReactionKind::Laugh => "LAUGH",
            ReactionKind::Surprised => "SURPRISED",
            ReactionKind::Sad => "SAD",
            ReactionKind::Angry => "ANGRY",
        }
    }

    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "LIKE" => Some(ReactionKind::Like),
            "HEART" => Some(ReactionKind::Heart),
            "LAUGH" => Some(ReactionKind::Laugh),
            "SURPRISED" => Some(ReactionKind::Surprised),
            "SAD" => Some(ReactionKind::Sad),
            "ANGRY" => Some(ReactionKind::Angry),
            _ => None,
        }
    }
}

/// Message as stored and as broadcast to participants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub kind: MessageKind,
    pub content: Option<String>,
    pub media_url: Option<String>,
    pub sent_at: DateTime<Utc>,
    pub edited_at: Option<DateTime<Utc>>,
    pub status: MessageStatus,
    pub reply_to_message_id: Option<Uuid>,
    pub is_forwarded: bool,
    /// One entry per reacting user
    pub reactions: BTreeMap<Uuid, ReactionKind>,
    /// Prior bodies, oldest first. Append-only.
    pub edit_history: Vec<String>,
}

impl Message {
    pub fn from_draft(conversation_id: Uuid, sender_id: Uuid, draft: MessageDraft) -> Self {
        Self {
            id: Uuid::new_v4(),
            conversation_id,
            sender_id,
            kind: draft.kind,
            content: draft.content,
            media_url: draft.media_url,
            sent_at: Utc::now(),
            edited_at: None,
            status: MessageStatus::Sent,
            reply_to_message_id: draft.reply_to_message_id,
            is_forwarded: false,
            reactions: BTreeMap::new(),
            edit_history: Vec::new(),
        }
    }

    /// Copy of this message as a fresh forwarded message. Reactions and
    /// history stay behind.
    pub fn forwarded_copy(&self, target_conversation_id: Uuid, forwarded_by: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            conversation_id: target_conversation_id,
            sender_id: forwarded_by,
            kind: self.kind,
            content: self.content.clone(),
            media_url: self.media_url.clone(),
            sent_at: Utc::now(),
            edited_at: None,
            status: MessageStatus::Sent,
            reply_to_message_id: None,
            is_forwarded: true,
            reactions: BTreeMap::new(),
            edit_history: Vec::new(),
        }
    }

    pub fn body_text(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }
}

/// Client-supplied fields for a new message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDraft {
    #[serde(rename = "type", alias = "kind")]
    pub kind: MessageKind,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub media_url: Option<String>,
    #[serde(default)]
    pub reply_to_message_id: Option<Uuid>,
}

impl MessageDraft {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Text,
            content: Some(content.into()),
            media_url: None,
            reply_to_message_id: None,
        }
    }

    pub fn validate(&self, max_bytes: usize) -> Result<(), AppError> {
        let content_len = self.content.as_deref().map(str::len).unwrap_or(0);
        if content_len > max_bytes {
            return Err(AppError::Validation(format!(
                "message content exceeds {max_bytes} bytes"
            )));
        }

        if self.kind.is_media() {
            let has_media = self
                .media_url
                .as_deref()
                .map(|u| !u.trim().is_empty())
                .unwrap_or(false);
            if !has_media {
                return Err(AppError::Validation(format!(
                    "{} messages require a media url",
                    self.kind.as_str()
                )));
            }
        } else if self
            .content
            .as_deref()
            .map(|c| c.trim().is_empty())
            .unwrap_or(true)
        {
            return Err(AppError::Validation("message content cannot be empty".into()));
        }

        Ok(())
    }
}

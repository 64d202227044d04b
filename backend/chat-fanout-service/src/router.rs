//! Single entry point for inbound envelopes.
//!
//! The router validates against the caller's session, runs the state
//! transition under the conversation lock and emits exactly one fanout per
//! visible change. Failures go to the acting user's private error queue and
//! are never broadcast.

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::metrics;
use crate::models::{Message, MessageDraft, ReactionKind, Session};
use crate::services::{ConversationLocks, ConversationStore, MessageLifecycle};
use crate::websocket::events::{
    normalize_topic, typing_topic, user_status_topic, ChatEvent, ErrorNotice, HeartbeatReply,
    PresenceNotice, SendAck, TypingNotice, QUEUE_ERRORS, QUEUE_HEARTBEAT, QUEUE_MESSAGE_SENT,
};
use crate::websocket::message_types::{Command, InboundEnvelope};
use crate::websocket::ConnectionRegistry;

const MAX_STATUS_LEN: usize = 64;

/// Post-send changes to an existing message.
#[derive(Debug, Clone)]
pub enum Mutation {
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
}

impl Mutation {
    fn message_id(&self) -> Uuid {
        match self {
            Mutation::Edit { message_id, .. }
            | Mutation::Delete { message_id }
            | Mutation::React { message_id, .. }
            | Mutation::Unreact { message_id }
            | Mutation::Forward { message_id, .. } => *message_id,
        }
    }
}

#[derive(Clone)]
pub struct Router {
    registry: ConnectionRegistry,
    conversations: Arc<ConversationStore>,
    messages: Arc<MessageLifecycle>,
    locks: ConversationLocks,
}

impl Router {
    pub fn new(
        registry: ConnectionRegistry,
        conversations: Arc<ConversationStore>,
        messages: Arc<MessageLifecycle>,
    ) -> Self {
        Self {
            registry,
            conversations,
            messages,
            locks: ConversationLocks::new(),
        }
    }

    /// Decode one text frame and dispatch it.
    pub async fn handle_text(&self, session: &Session, text: &str) {
        let envelope = match serde_json::from_str::<InboundEnvelope>(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                let err = AppError::Validation(format!("malformed envelope: {e}"));
                self.reject(session, "unknown", &err).await;
                return;
            }
        };

        match Command::parse(envelope) {
            Ok(command) => self.handle_command(session, command).await,
            Err(err) => self.reject(session, "unknown", &err).await,
        }
    }

    pub async fn handle_command(&self, session: &Session, command: Command) {
        let operation = command.operation();
        metrics::envelope_handled(operation);
        let user_id = session.user_id();

        let result = match command {
            Command::Send {
                conversation_id,
                draft,
            } => self.send(user_id, conversation_id, draft).await.map(|_| ()),
            Command::Typing {
                conversation_id,
                is_typing,
            } => self.typing(user_id, conversation_id, is_typing).await,
            Command::Heartbeat => {
                self.registry
                    .deliver_to_user(user_id, QUEUE_HEARTBEAT, &HeartbeatReply::pong())
                    .await;
                Ok(())
            }
            Command::PresenceUpdate { status } => self.presence(user_id, status).await,
            Command::Edit {
                message_id,
                content,
            } => self
                .apply_mutation(user_id, Mutation::Edit { message_id, content })
                .await
                .map(|_| ()),
            Command::Delete { message_id } => self
                .apply_mutation(user_id, Mutation::Delete { message_id })
                .await
                .map(|_| ()),
            Command::React {
                message_id,
                reaction,
            } => self
                .apply_mutation(user_id, Mutation::React { message_id, reaction })
                .await
                .map(|_| ()),
            Command::Unreact { message_id } => self
                .apply_mutation(user_id, Mutation::Unreact { message_id })
                .await
                .map(|_| ()),
            Command::Forward {
                message_id,
                target_conversation_id,
            } => self
                .apply_mutation(
                    user_id,
                    Mutation::Forward {
                        message_id,
                        target_conversation_id,
                    },
                )
                .await
                .map(|_| ()),
            Command::Subscribe { topic } => self.subscribe(session, &topic).await,
            Command::Unsubscribe { topic } => {
                self.registry
                    .unsubscribe(session.session_id(), normalize_topic(&topic))
                    .await;
                Ok(())
            }
        };

        if let Err(err) = result {
            self.reject(session, operation, &err).await;
        }
    }

    /// Persist, fan out to every participant, then acknowledge the sender.
    pub async fn send(
        &self,
        sender_id: Uuid,
        conversation_id: Uuid,
        draft: MessageDraft,
    ) -> AppResult<Message> {
        let _guard = self.locks.acquire(conversation_id).await;

        let message = self.messages.send(conversation_id, sender_id, draft).await?;
        let participants = self.conversations.participants(conversation_id).await?;

        let reached = self
            .registry
            .deliver_to_conversation(
                conversation_id,
                participants.iter(),
                &ChatEvent::MessageCreated {
                    message: message.clone(),
                },
            )
            .await;
        self.registry
            .deliver_to_user(sender_id, QUEUE_MESSAGE_SENT, &SendAck::sent(message.id))
            .await;

        tracing::info!(
            conversation_id = %conversation_id,
            message_id = %message.id,
            sender_id = %sender_id,
            sessions = reached,
            "message fanned out"
        );
        Ok(message)
    }

    /// Run a mutation and broadcast its single resulting event.
    ///
    /// Returns `None` when the change had no visible effect (removing a
    /// reaction that did not exist); nothing is broadcast then.
    pub async fn apply_mutation(
        &self,
        acting_user_id: Uuid,
        mutation: Mutation,
    ) -> AppResult<Option<ChatEvent>> {
        let lock_key = match &mutation {
            Mutation::Forward {
                target_conversation_id,
                ..
            } => *target_conversation_id,
            other => self.conversation_of(other.message_id()).await?,
        };
        let _guard = self.locks.acquire(lock_key).await;

        let event = match mutation {
            Mutation::Edit {
                message_id,
                content,
            } => ChatEvent::MessageEdited {
                message: self.messages.edit(message_id, content, acting_user_id).await?,
            },
            Mutation::Delete { message_id } => {
                let deleted = self.messages.delete(message_id, acting_user_id).await?;
                ChatEvent::MessageDeleted {
                    message_id: deleted.id,
                    conversation_id: deleted.conversation_id,
                }
            }
            Mutation::React {
                message_id,
                reaction,
            } => ChatEvent::ReactionAdded {
                message: self
                    .messages
                    .add_reaction(message_id, acting_user_id, reaction)
                    .await?,
                user_id: acting_user_id,
                reaction,
            },
            Mutation::Unreact { message_id } => {
                let removal = self
                    .messages
                    .remove_reaction(message_id, acting_user_id)
                    .await?;
                if !removal.removed {
                    return Ok(None);
                }
                ChatEvent::ReactionRemoved {
                    message: removal.message,
                    user_id: acting_user_id,
                }
            }
            Mutation::Forward {
                message_id,
                target_conversation_id,
            } => ChatEvent::MessageForwarded {
                message: self
                    .messages
                    .forward(message_id, target_conversation_id, acting_user_id)
                    .await?,
                source_message_id: message_id,
            },
        };

        let conversation_id = event.conversation_id();
        let participants = self.conversations.participants(conversation_id).await?;
        let reached = self
            .registry
            .deliver_to_conversation(conversation_id, participants.iter(), &event)
            .await;

        tracing::info!(
            conversation_id = %conversation_id,
            user_id = %acting_user_id,
            event = event.event_type(),
            sessions = reached,
            "mutation fanned out"
        );
        Ok(Some(event))
    }

    async fn conversation_of(&self, message_id: Uuid) -> AppResult<Uuid> {
        self.messages.conversation_of(message_id).await
    }

    async fn typing(&self, user_id: Uuid, conversation_id: Uuid, is_typing: bool) -> AppResult<()> {
        let participants = self
            .conversations
            .require_participant(conversation_id, user_id)
            .await?;
        self.registry
            .deliver_to_participants(
                typing_topic(conversation_id),
                participants.iter(),
                Some(user_id),
                &TypingNotice {
                    conversation_id,
                    user_id,
                    is_typing,
                },
            )
            .await;
        Ok(())
    }

    async fn presence(&self, user_id: Uuid, status: String) -> AppResult<()> {
        let status = status.trim().to_string();
        if status.is_empty() || status.len() > MAX_STATUS_LEN {
            return Err(AppError::Validation(format!(
                "status must be 1 to {MAX_STATUS_LEN} bytes"
            )));
        }
        let reached = self
            .registry
            .deliver_to_topic(
                &user_status_topic(user_id),
                &PresenceNotice {
                    user_id,
                    status,
                    timestamp: Utc::now(),
                },
            )
            .await;
        tracing::debug!(user_id = %user_id, sessions = reached, "presence broadcast");
        Ok(())
    }

    /// Only user presence topics are open for subscription. Conversation
    /// topics are reached through participant fanout.
    async fn subscribe(&self, session: &Session, topic: &str) -> AppResult<()> {
        let topic = normalize_topic(topic);
        let is_presence_topic = matches!(
            topic.split('/').collect::<Vec<_>>().as_slice(),
            ["topic", "user", id, "status"] if Uuid::parse_str(id).is_ok()
        );
        if !is_presence_topic {
            return Err(AppError::Validation(format!(
                "cannot subscribe to {topic}"
            )));
        }
        if !self.registry.subscribe(session.session_id(), topic).await {
            return Err(AppError::NotFound("session"));
        }
        Ok(())
    }

    async fn reject(&self, session: &Session, operation: &str, err: &AppError) {
        metrics::envelope_rejected(err.error_code());
        if err.is_internal() {
            tracing::error!(
                session_id = %session.session_id(),
                user_id = %session.user_id(),
                operation,
                error = %err,
                "envelope failed"
            );
        } else {
            tracing::debug!(
                session_id = %session.session_id(),
                user_id = %session.user_id(),
                operation,
                code = err.error_code(),
                "envelope rejected"
            );
        }
        self.registry
            .deliver_to_user(session.user_id(), QUEUE_ERRORS, &ErrorNotice::from(err))
            .await;
    }
}

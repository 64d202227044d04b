use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{Message, MessageDraft, ReactionKind};
use crate::repository::{ChatRepository, PageRequest};
use crate::services::conversation_service::ConversationStore;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePage {
    pub messages: Vec<Message>,
    pub page: u32,
    pub size: u32,
}

impl MessagePage {
    fn new(messages: Vec<Message>, page: PageRequest) -> Self {
        Self {
            messages,
            page: page.page,
            size: page.size,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReactionRemoval {
    pub message: Message,
    /// `false` when the user had no reaction to remove
    pub removed: bool,
}

/// Message state machine: authorization, validation and persistence.
///
/// Nothing here delivers frames. Callers turn the returned state into a
/// single fanout event.
pub struct MessageLifecycle {
    repo: Arc<dyn ChatRepository>,
    conversations: Arc<ConversationStore>,
    max_message_bytes: usize,
}

impl MessageLifecycle {
    pub fn new(
        repo: Arc<dyn ChatRepository>,
        conversations: Arc<ConversationStore>,
        max_message_bytes: usize,
    ) -> Self {
        Self {
            repo,
            conversations,
            max_message_bytes,
        }
    }

    pub async fn send(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        draft: MessageDraft,
    ) -> AppResult<Message> {
        self.conversations
            .require_participant(conversation_id, sender_id)
            .await?;
        draft.validate(self.max_message_bytes)?;

        if let Some(reply_to) = draft.reply_to_message_id {
            let target = self.repo.find_message(reply_to).await?;
            if target.map(|m| m.conversation_id) != Some(conversation_id) {
                return Err(AppError::Validation(
                    "reply target is not a message of this conversation".into(),
                ));
            }
        }

        let message = Message::from_draft(conversation_id, sender_id, draft);
        self.repo.insert_message(&message).await?;
        self.conversations
            .set_last_message(conversation_id, message.id)
            .await?;

        tracing::debug!(
            conversation_id = %conversation_id,
            message_id = %message.id,
            sender_id = %sender_id,
            kind = message.kind.as_str(),
            "message stored"
        );
        Ok(message)
    }

    pub async fn edit(
        &self,
        message_id: Uuid,
        new_content: String,
        acting_user_id: Uuid,
    ) -> AppResult<Message> {
        let mut message = self.load(message_id).await?;
        if message.sender_id != acting_user_id {
            return Err(AppError::NotAuthorized);
        }
        if new_content.trim().is_empty() {
            return Err(AppError::Validation("message content cannot be empty".into()));
        }
        if new_content.len() > self.max_message_bytes {
            return Err(AppError::Validation(format!(
                "message content exceeds {} bytes",
                self.max_message_bytes
            )));
        }

        let edited_at = Utc::now();
        message.edit_history.push(message.body_text().to_string());
        message.content = Some(new_content);
        message.edited_at = Some(edited_at);

        self.repo
            .update_message_body(
                message.id,
                message.content.as_deref(),
                edited_at,
                &message.edit_history,
            )
            .await?;
        Ok(message)
    }

    /// Hard delete. Returns the removed message so callers know where to
    /// announce it.
    pub async fn delete(&self, message_id: Uuid, acting_user_id: Uuid) -> AppResult<Message> {
        let message = self.load(message_id).await?;
        if message.sender_id != acting_user_id {
            return Err(AppError::NotAuthorized);
        }
        if !self.repo.delete_message(message_id).await? {
            return Err(AppError::NotFound("message"));
        }
        Ok(message)
    }

    /// Replaces any earlier reaction from the same user.
    pub async fn add_reaction(
        &self,
        message_id: Uuid,
        acting_user_id: Uuid,
        reaction: ReactionKind,
    ) -> AppResult<Message> {
        let mut message = self.load(message_id).await?;
        self.conversations
            .require_participant(message.conversation_id, acting_user_id)
            .await?;

        self.repo
            .upsert_reaction(message_id, acting_user_id, reaction)
            .await?;
        message.reactions.insert(acting_user_id, reaction);
        Ok(message)
    }

    /// Idempotent: removing an absent reaction succeeds with `removed == false`.
    pub async fn remove_reaction(
        &self,
        message_id: Uuid,
        acting_user_id: Uuid,
    ) -> AppResult<ReactionRemoval> {
        let mut message = self.load(message_id).await?;
        self.conversations
            .require_participant(message.conversation_id, acting_user_id)
            .await?;

        let removed = self.repo.delete_reaction(message_id, acting_user_id).await?;
        message.reactions.remove(&acting_user_id);
        Ok(ReactionRemoval { message, removed })
    }

    /// New message in the target conversation. The source is left untouched.
    pub async fn forward(
        &self,
        source_message_id: Uuid,
        target_conversation_id: Uuid,
        acting_user_id: Uuid,
    ) -> AppResult<Message> {
        let source = self.load(source_message_id).await?;
        self.conversations
            .require_participant(target_conversation_id, acting_user_id)
            .await?;
        self.conversations
            .require_participant(source.conversation_id, acting_user_id)
            .await?;

        let copy = source.forwarded_copy(target_conversation_id, acting_user_id);
        self.repo.insert_message(&copy).await?;
        self.conversations
            .set_last_message(target_conversation_id, copy.id)
            .await?;
        Ok(copy)
    }

    /// Case-insensitive substring search, newest first. A blank query
    /// yields an empty page.
    pub async fn search(
        &self,
        conversation_id: Uuid,
        query: &str,
        page: PageRequest,
    ) -> AppResult<MessagePage> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(MessagePage::new(Vec::new(), page));
        }
        let messages = self
            .repo
            .search_messages(conversation_id, query, page)
            .await?;
        Ok(MessagePage::new(messages, page))
    }

    pub async fn history(
        &self,
        conversation_id: Uuid,
        acting_user_id: Uuid,
        page: PageRequest,
    ) -> AppResult<MessagePage> {
        self.conversations
            .require_participant(conversation_id, acting_user_id)
            .await?;
        let messages = self.repo.list_messages(conversation_id, page).await?;
        Ok(MessagePage::new(messages, page))
    }

    pub async fn conversation_of(&self, message_id: Uuid) -> AppResult<Uuid> {
        Ok(self.load(message_id).await?.conversation_id)
    }

    async fn load(&self, message_id: Uuid) -> AppResult<Message> {
        self.repo
            .find_message(message_id)
            .await?
            .ok_or(AppError::NotFound("message"))
    }
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{ChatRepository, PageRequest};
use crate::error::{AppError, AppResult};
use crate::models::{Conversation, Message, ReactionKind, User};

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    conversations: HashMap<Uuid, Conversation>,
    messages: HashMap<Uuid, Message>,
}

/// In-process store. Cheap to construct; every test gets its own.
#[derive(Default)]
pub struct MemoryRepository {
    tables: RwLock<Tables>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first_page(mut messages: Vec<Message>, page: PageRequest) -> Vec<Message> {
    messages.sort_by(|a, b| b.sent_at.cmp(&a.sent_at).then_with(|| b.id.cmp(&a.id)));
    messages
        .into_iter()
        .skip(page.offset() as usize)
        .take(page.size as usize)
        .collect()
}

#[async_trait]
impl ChatRepository for MemoryRepository {
    async fn insert_user(&self, user: &User) -> AppResult<()> {
        let mut tables = self.tables.write().await;
        tables.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn find_user(&self, user_id: Uuid) -> AppResult<Option<User>> {
        Ok(self.tables.read().await.users.get(&user_id).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> AppResult<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .values()
            .find(|u| u.username.eq_ignore_ascii_case(username))
            .cloned())
    }

    async fn update_user(&self, user: &User) -> AppResult<bool> {
        let mut tables = self.tables.write().await;
        match tables.users.get_mut(&user.id) {
            Some(stored) => {
                *stored = user.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn find_users_by_phone_digits(&self, digits: &str) -> AppResult<Vec<User>> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .values()
            .filter(|u| {
                let stored: String = u.phone_number.chars().filter(char::is_ascii_digit).collect();
                stored.contains(digits)
            })
            .cloned()
            .collect())
    }

    async fn find_users_by_username(&self, fragment: &str) -> AppResult<Vec<User>> {
        let needle = fragment.to_lowercase();
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .values()
            .filter(|u| u.username.to_lowercase().contains(&needle))
            .cloned()
            .collect())
    }

    async fn insert_conversation(&self, conversation: &Conversation) -> AppResult<()> {
        let mut tables = self.tables.write().await;
        tables
            .conversations
            .insert(conversation.id, conversation.clone());
        Ok(())
    }

    async fn find_conversation(&self, conversation_id: Uuid) -> AppResult<Option<Conversation>> {
        Ok(self
            .tables
            .read()
            .await
            .conversations
            .get(&conversation_id)
            .cloned())
    }

    async fn conversations_for_user(&self, user_id: Uuid) -> AppResult<Vec<Conversation>> {
        let tables = self.tables.read().await;
        let mut found: Vec<Conversation> = tables
            .conversations
            .values()
            .filter(|c| c.has_participant(user_id))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    async fn set_last_message(&self, conversation_id: Uuid, message_id: Uuid) -> AppResult<()> {
        let mut tables = self.tables.write().await;
        let conversation = tables
            .conversations
            .get_mut(&conversation_id)
            .ok_or(AppError::NotFound("conversation"))?;
        conversation.last_message_id = Some(message_id);
        Ok(())
    }

    async fn insert_message(&self, message: &Message) -> AppResult<()> {
        let mut tables = self.tables.write().await;
        tables.messages.insert(message.id, message.clone());
        Ok(())
    }

    async fn find_message(&self, message_id: Uuid) -> AppResult<Option<Message>> {
        Ok(self.tables.read().await.messages.get(&message_id).cloned())
    }

    async fn update_message_body(
        &self,
        message_id: Uuid,
        content: Option<&str>,
        edited_at: DateTime<Utc>,
        edit_history: &[String],
    ) -> AppResult<()> {
        let mut tables = self.tables.write().await;
        let message = tables
            .messages
            .get_mut(&message_id)
            .ok_or(AppError::NotFound("message"))?;
        message.content = content.map(str::to_string);
        message.edited_at = Some(edited_at);
        message.edit_history = edit_history.to_vec();
        Ok(())
    }

    async fn delete_message(&self, message_id: Uuid) -> AppResult<bool> {
        Ok(self
            .tables
            .write()
            .await
            .messages
            .remove(&message_id)
            .is_some())
    }

    async fn list_messages(
        &self,
        conversation_id: Uuid,
        page: PageRequest,
    ) -> AppResult<Vec<Message>> {
        let tables = self.tables.read().await;
        let in_conversation = tables
            .messages
            .values()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect();
        Ok(newest_first_page(in_conversation, page))
    }

    async fn search_messages(
        &self,
        conversation_id: Uuid,
        query: &str,
        page: PageRequest,
    ) -> AppResult<Vec<Message>> {
        let needle = query.to_lowercase();
        let tables = self.tables.read().await;
        let matches = tables
            .messages
            .values()
            .filter(|m| m.conversation_id == conversation_id)
            .filter(|m| m.body_text().to_lowercase().contains(&needle))
            .cloned()
            .collect();
        Ok(newest_first_page(matches, page))
    }

    async fn upsert_reaction(
        &self,
        message_id: Uuid,
        user_id: Uuid,
        kind: ReactionKind,
    ) -> AppResult<()> {
        let mut tables = self.tables.write().await;
        let message = tables
            .messages
            .get_mut(&message_id)
            .ok_or(AppError::NotFound("message"))?;
        message.reactions.insert(user_id, kind);
        Ok(())
    }

    async fn delete_reaction(&self, message_id: Uuid, user_id: Uuid) -> AppResult<bool> {
        let mut tables = self.tables.write().await;
        Ok(tables
            .messages
            .get_mut(&message_id)
            .map(|m| m.reactions.remove(&user_id).is_some())
            .unwrap_or(false))
    }
}

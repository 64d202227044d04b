//! Persistence boundary.
//!
//! The fanout core only talks to [`ChatRepository`]. `MemoryRepository` keeps
//! everything in process (tests, single-node dev); `PgRepository` is the
//! PostgreSQL-backed implementation used in deployments.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{Conversation, Message, ReactionKind, User};

pub mod memory;
pub mod postgres;

pub use memory::MemoryRepository;
pub use postgres::PgRepository;

/// Offset pagination, zero-based page index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub size: u32,
}

impl PageRequest {
    pub const MAX_SIZE: u32 = 100;

    /// Clamp client-supplied values into a usable range.
    pub fn new(page: u32, size: u32) -> Self {
        Self {
            page,
            size: size.clamp(1, Self::MAX_SIZE),
        }
    }

    pub fn offset(&self) -> u64 {
        self.page as u64 * self.size as u64
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(0, 20)
    }
}

#[async_trait]
pub trait ChatRepository: Send + Sync {
    // Users
    async fn insert_user(&self, user: &User) -> AppResult<()>;
    async fn find_user(&self, user_id: Uuid) -> AppResult<Option<User>>;
    /// Case-insensitive exact match.
    async fn find_user_by_username(&self, username: &str) -> AppResult<Option<User>>;
    /// Overwrites the profile fields of an existing user. `false` if absent.
    async fn update_user(&self, user: &User) -> AppResult<bool>;
    /// `digits` is already stripped of everything but 0-9.
    async fn find_users_by_phone_digits(&self, digits: &str) -> AppResult<Vec<User>>;
    async fn find_users_by_username(&self, fragment: &str) -> AppResult<Vec<User>>;

    // Conversations
    async fn insert_conversation(&self, conversation: &Conversation) -> AppResult<()>;
    async fn find_conversation(&self, conversation_id: Uuid) -> AppResult<Option<Conversation>>;
    async fn conversations_for_user(&self, user_id: Uuid) -> AppResult<Vec<Conversation>>;
    async fn set_last_message(&self, conversation_id: Uuid, message_id: Uuid) -> AppResult<()>;

    // Messages
    async fn insert_message(&self, message: &Message) -> AppResult<()>;
    async fn find_message(&self, message_id: Uuid) -> AppResult<Option<Message>>;
    async fn update_message_body(
        &self,
        message_id: Uuid,
        content: Option<&str>,
        edited_at: DateTime<Utc>,
        edit_history: &[String],
    ) -> AppResult<()>;
    /// Returns `false` when nothing was deleted.
    async fn delete_message(&self, message_id: Uuid) -> AppResult<bool>;
    /// Newest first.
    async fn list_messages(
        &self,
        conversation_id: Uuid,
        page: PageRequest,
    ) -> AppResult<Vec<Message>>;
    /// Case-insensitive substring match on content, newest first.
    async fn search_messages(
        &self,
        conversation_id: Uuid,
        query: &str,
        page: PageRequest,
    ) -> AppResult<Vec<Message>>;

    // Reactions
    async fn upsert_reaction(
        &self,
        message_id: Uuid,
        user_id: Uuid,
        kind: ReactionKind,
    ) -> AppResult<()>;
    /// Returns `false` when the user had no reaction.
    async fn delete_reaction(&self, message_id: Uuid, user_id: Uuid) -> AppResult<bool>;
}

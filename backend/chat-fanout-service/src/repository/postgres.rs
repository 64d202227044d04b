use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::Pool;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tokio_postgres::{error::SqlState, Row};
use uuid::Uuid;

use super::{ChatRepository, PageRequest};
use crate::error::{AppError, AppResult};
use crate::models::{
    Conversation, ConversationKind, Message, MessageKind, MessageStatus, ReactionKind, User,
};

const USER_COLUMNS: &str =
    "id, username, phone_number, display_name, profile_picture_url, status, last_seen";

const MESSAGE_COLUMNS: &str = "id, conversation_id, sender_id, kind, content, media_url, sent_at, \
     edited_at, status, reply_to_message_id, is_forwarded, edit_history";

#[derive(Clone)]
pub struct PgRepository {
    db: Pool,
}

impl PgRepository {
    pub fn new(db: Pool) -> Self {
        Self { db }
    }

    fn user_from_row(row: &Row) -> User {
        User {
            id: row.get("id"),
            username: row.get("username"),
            phone_number: row.get("phone_number"),
            display_name: row.get("display_name"),
            profile_picture_url: row.get("profile_picture_url"),
            status: row.get("status"),
            last_seen: row.get("last_seen"),
        }
    }

    fn message_from_row(row: &Row) -> AppResult<Message> {
        let kind: String = row.get("kind");
        let status: String = row.get("status");
        Ok(Message {
            id: row.get("id"),
            conversation_id: row.get("conversation_id"),
            sender_id: row.get("sender_id"),
            kind: MessageKind::from_db(&kind)
                .ok_or_else(|| AppError::Database(format!("unknown message kind {kind}")))?,
            content: row.get("content"),
            media_url: row.get("media_url"),
            sent_at: row.get("sent_at"),
            edited_at: row.get("edited_at"),
            status: MessageStatus::from_db(&status)
                .ok_or_else(|| AppError::Database(format!("unknown message status {status}")))?,
            reply_to_message_id: row.get("reply_to_message_id"),
            is_forwarded: row.get("is_forwarded"),
            reactions: BTreeMap::new(),
            edit_history: row.get("edit_history"),
        })
    }

    /// Load message rows and attach their reactions with one extra query.
    async fn hydrate_messages(&self, rows: Vec<Row>) -> AppResult<Vec<Message>> {
        let mut messages = rows
            .iter()
            .map(Self::message_from_row)
            .collect::<AppResult<Vec<_>>>()?;
        if messages.is_empty() {
            return Ok(messages);
        }

        let ids: Vec<Uuid> = messages.iter().map(|m| m.id).collect();
        let client = self.db.get().await?;
        let reaction_rows = client
            .query(
                "SELECT message_id, user_id, kind FROM message_reactions WHERE message_id = ANY($1)",
                &[&ids],
            )
            .await?;

        let mut by_message: HashMap<Uuid, BTreeMap<Uuid, ReactionKind>> = HashMap::new();
        for row in reaction_rows {
            let kind: String = row.get("kind");
            let Some(kind) = ReactionKind::from_db(&kind) else {
                tracing::warn!(reaction_kind = %kind, "skipping unknown reaction kind");
                continue;
            };
            by_message
                .entry(row.get("message_id"))
                .or_default()
                .insert(row.get("user_id"), kind);
        }

        for message in &mut messages {
            if let Some(reactions) = by_message.remove(&message.id) {
                message.reactions = reactions;
            }
        }
        Ok(messages)
    }

    async fn load_conversations(&self, rows: Vec<Row>) -> AppResult<Vec<Conversation>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<Uuid> = rows.iter().map(|r| r.get("id")).collect();

        let client = self.db.get().await?;
        let participant_rows = client
            .query(
                "SELECT conversation_id, user_id FROM conversation_participants WHERE conversation_id = ANY($1)",
                &[&ids],
            )
            .await?;

        let mut participants: HashMap<Uuid, BTreeSet<Uuid>> = HashMap::new();
        for row in participant_rows {
            participants
                .entry(row.get("conversation_id"))
                .or_default()
                .insert(row.get("user_id"));
        }

        rows.iter()
            .map(|row| {
                let id: Uuid = row.get("id");
                let kind: String = row.get("kind");
                Ok(Conversation {
                    id,
                    kind: ConversationKind::from_db(&kind).ok_or_else(|| {
                        AppError::Database(format!("unknown conversation kind {kind}"))
                    })?,
                    display_name: row.get("display_name"),
                    participant_ids: participants.remove(&id).unwrap_or_default(),
                    last_message_id: row.get("last_message_id"),
                    created_at: row.get("created_at"),
                })
            })
            .collect()
    }
}

/// Escape LIKE wildcards so user input matches literally.
fn like_pattern(fragment: &str) -> String {
    let escaped = fragment
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

#[async_trait]
impl ChatRepository for PgRepository {
    async fn insert_user(&self, user: &User) -> AppResult<()> {
        let client = self.db.get().await?;
        client
            .execute(
                r#"
                INSERT INTO users
                    (id, username, phone_number, display_name, profile_picture_url, status, last_seen)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
                &[
                    &user.id,
                    &user.username,
                    &user.phone_number,
                    &user.display_name,
                    &user.profile_picture_url,
                    &user.status,
                    &user.last_seen,
                ],
            )
            .await?;
        Ok(())
    }

    async fn find_user(&self, user_id: Uuid) -> AppResult<Option<User>> {
        let client = self.db.get().await?;
        let row = client
            .query_opt(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"),
                &[&user_id],
            )
            .await?;
        Ok(row.as_ref().map(Self::user_from_row))
    }

    async fn find_user_by_username(&self, username: &str) -> AppResult<Option<User>> {
        let client = self.db.get().await?;
        let row = client
            .query_opt(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE lower(username) = lower($1) LIMIT 1"),
                &[&username],
            )
            .await?;
        Ok(row.as_ref().map(Self::user_from_row))
    }

    async fn update_user(&self, user: &User) -> AppResult<bool> {
        let client = self.db.get().await?;
        let updated = client
            .execute(
                r#"
                UPDATE users
                SET username = $2, display_name = $3, profile_picture_url = $4,
                    status = $5, last_seen = $6
                WHERE id = $1
                "#,
                &[
                    &user.id,
                    &user.username,
                    &user.display_name,
                    &user.profile_picture_url,
                    &user.status,
                    &user.last_seen,
                ],
            )
            .await
            .map_err(|e| {
                if e.code() == Some(&SqlState::UNIQUE_VIOLATION) {
                    AppError::Validation("username is already taken".into())
                } else {
                    AppError::from(e)
                }
            })?;
        Ok(updated > 0)
    }

    async fn find_users_by_phone_digits(&self, digits: &str) -> AppResult<Vec<User>> {
        let client = self.db.get().await?;
        let rows = client
            .query(
                &format!(
                    r#"
                SELECT {USER_COLUMNS}
                FROM users
                WHERE regexp_replace(phone_number, '[^0-9]', '', 'g') LIKE $1
                ORDER BY username
                LIMIT 50
                "#
                ),
                &[&like_pattern(digits)],
            )
            .await?;
        Ok(rows.iter().map(Self::user_from_row).collect())
    }

    async fn find_users_by_username(&self, fragment: &str) -> AppResult<Vec<User>> {
        let client = self.db.get().await?;
        let rows = client
            .query(
                &format!(
                    r#"
                SELECT {USER_COLUMNS}
                FROM users
                WHERE username ILIKE $1
                ORDER BY username
                LIMIT 50
                "#
                ),
                &[&like_pattern(fragment)],
            )
            .await?;
        Ok(rows.iter().map(Self::user_from_row).collect())
    }

    async fn insert_conversation(&self, conversation: &Conversation) -> AppResult<()> {
        let mut client = self.db.get().await?;
        let tx = client.transaction().await?;

        tx.execute(
            r#"
            INSERT INTO conversations (id, kind, display_name, last_message_id, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
            &[
                &conversation.id,
                &conversation.kind.as_str(),
                &conversation.display_name,
                &conversation.last_message_id,
                &conversation.created_at,
            ],
        )
        .await?;

        let participants: Vec<Uuid> = conversation.participant_ids.iter().copied().collect();
        tx.execute(
            r#"
            INSERT INTO conversation_participants (conversation_id, user_id)
            SELECT $1, unnest($2::uuid[])
            ON CONFLICT DO NOTHING
            "#,
            &[&conversation.id, &participants],
        )
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn find_conversation(&self, conversation_id: Uuid) -> AppResult<Option<Conversation>> {
        let client = self.db.get().await?;
        let rows = client
            .query(
                "SELECT id, kind, display_name, last_message_id, created_at FROM conversations WHERE id = $1",
                &[&conversation_id],
            )
            .await?;
        drop(client);
        Ok(self.load_conversations(rows).await?.into_iter().next())
    }

    async fn conversations_for_user(&self, user_id: Uuid) -> AppResult<Vec<Conversation>> {
        let client = self.db.get().await?;
        let rows = client
            .query(
                r#"
                SELECT c.id, c.kind, c.display_name, c.last_message_id, c.created_at
                FROM conversations c
                JOIN conversation_participants p ON p.conversation_id = c.id
                WHERE p.user_id = $1
                ORDER BY c.created_at DESC
                "#,
                &[&user_id],
            )
            .await?;
        drop(client);
        self.load_conversations(rows).await
    }

    async fn set_last_message(&self, conversation_id: Uuid, message_id: Uuid) -> AppResult<()> {
        let client = self.db.get().await?;
        let updated = client
            .execute(
                "UPDATE conversations SET last_message_id = $2 WHERE id = $1",
                &[&conversation_id, &message_id],
            )
            .await?;
        if updated == 0 {
            return Err(AppError::NotFound("conversation"));
        }
        Ok(())
    }

    async fn insert_message(&self, message: &Message) -> AppResult<()> {
        let client = self.db.get().await?;
        client
            .execute(
                r#"
                INSERT INTO messages (
                    id, conversation_id, sender_id, kind, content, media_url, sent_at,
                    edited_at, status, reply_to_message_id, is_forwarded, edit_history
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                "#,
                &[
                    &message.id,
                    &message.conversation_id,
                    &message.sender_id,
                    &message.kind.as_str(),
                    &message.content,
                    &message.media_url,
                    &message.sent_at,
                    &message.edited_at,
                    &message.status.as_str(),
                    &message.reply_to_message_id,
                    &message.is_forwarded,
                    &message.edit_history,
                ],
            )
            .await?;
        Ok(())
    }

    async fn find_message(&self, message_id: Uuid) -> AppResult<Option<Message>> {
        let client = self.db.get().await?;
        let rows = client
            .query(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1"),
                &[&message_id],
            )
            .await?;
        drop(client);
        Ok(self.hydrate_messages(rows).await?.into_iter().next())
    }

    async fn update_message_body(
        &self,
        message_id: Uuid,
        content: Option<&str>,
        edited_at: DateTime<Utc>,
        edit_history: &[String],
    ) -> AppResult<()> {
        let client = self.db.get().await?;
        let history = edit_history.to_vec();
        let updated = client
            .execute(
                "UPDATE messages SET content = $2, edited_at = $3, edit_history = $4 WHERE id = $1",
                &[&message_id, &content, &edited_at, &history],
            )
            .await?;
        if updated == 0 {
            return Err(AppError::NotFound("message"));
        }
        Ok(())
    }

    async fn delete_message(&self, message_id: Uuid) -> AppResult<bool> {
        let client = self.db.get().await?;
        let deleted = client
            .execute("DELETE FROM messages WHERE id = $1", &[&message_id])
            .await?;
        Ok(deleted > 0)
    }

    async fn list_messages(
        &self,
        conversation_id: Uuid,
        page: PageRequest,
    ) -> AppResult<Vec<Message>> {
        let client = self.db.get().await?;
        let limit = page.size as i64;
        let offset = page.offset() as i64;
        let rows = client
            .query(
                &format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages \
                     WHERE conversation_id = $1 \
                     ORDER BY sent_at DESC, id DESC \
                     LIMIT $2 OFFSET $3"
                ),
                &[&conversation_id, &limit, &offset],
            )
            .await?;
        drop(client);
        self.hydrate_messages(rows).await
    }

    async fn search_messages(
        &self,
        conversation_id: Uuid,
        query: &str,
        page: PageRequest,
    ) -> AppResult<Vec<Message>> {
        let client = self.db.get().await?;
        let limit = page.size as i64;
        let offset = page.offset() as i64;
        let rows = client
            .query(
                &format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages \
                     WHERE conversation_id = $1 AND content ILIKE $2 \
                     ORDER BY sent_at DESC, id DESC \
                     LIMIT $3 OFFSET $4"
                ),
                &[&conversation_id, &like_pattern(query), &limit, &offset],
            )
            .await?;
        drop(client);
        self.hydrate_messages(rows).await
    }

    async fn upsert_reaction(
        &self,
        message_id: Uuid,
        user_id: Uuid,
        kind: ReactionKind,
    ) -> AppResult<()> {
        let client = self.db.get().await?;
        client
            .execute(
                r#"
                INSERT INTO message_reactions (message_id, user_id, kind)
                VALUES ($1, $2, $3)
                ON CONFLICT (message_id, user_id)
                DO UPDATE SET kind = EXCLUDED.kind, created_at = NOW()
                "#,
                &[&message_id, &user_id, &kind.as_str()],
            )
            .await?;
        Ok(())
    }

    async fn delete_reaction(&self, message_id: Uuid, user_id: Uuid) -> AppResult<bool> {
        let client = self.db.get().await?;
        let deleted = client
            .execute(
                "DELETE FROM message_reactions WHERE message_id = $1 AND user_id = $2",
                &[&message_id, &user_id],
            )
            .await?;
        Ok(deleted > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::like_pattern;

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
        assert_eq!(like_pattern("hi"), "%hi%");
    }
}

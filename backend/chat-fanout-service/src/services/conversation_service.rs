use chrono::Utc;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{Conversation, ConversationKind, Message};
use crate::repository::ChatRepository;

/// Conversation plus its resolved last message.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationView {
    #[serde(flatten)]
    pub conversation: Conversation,
    /// `None` when the referenced message has since been deleted
    pub last_message: Option<Message>,
}

/// Membership authority for fanout and authorization.
///
/// Participant sets do not change after creation, so they are cached
/// on first read.
pub struct ConversationStore {
    repo: Arc<dyn ChatRepository>,
    participants: RwLock<HashMap<Uuid, Arc<BTreeSet<Uuid>>>>,
}

impl ConversationStore {
    pub fn new(repo: Arc<dyn ChatRepository>) -> Self {
        Self {
            repo,
            participants: RwLock::new(HashMap::new()),
        }
    }

    pub async fn participants(&self, conversation_id: Uuid) -> AppResult<Arc<BTreeSet<Uuid>>> {
        if let Some(cached) = self.participants.read().await.get(&conversation_id) {
            return Ok(cached.clone());
        }

        let conversation = self
            .repo
            .find_conversation(conversation_id)
            .await?
            .ok_or(AppError::NotFound("conversation"))?;
        let set = Arc::new(conversation.participant_ids);
        self.participants
            .write()
            .await
            .insert(conversation_id, set.clone());
        Ok(set)
    }

    pub async fn is_participant(&self, conversation_id: Uuid, user_id: Uuid) -> AppResult<bool> {
        Ok(self.participants(conversation_id).await?.contains(&user_id))
    }

    /// Participant set, or `NotAParticipant` when `user_id` is outside it.
    pub async fn require_participant(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<Arc<BTreeSet<Uuid>>> {
        let participants = self.participants(conversation_id).await?;
        if !participants.contains(&user_id) {
            return Err(AppError::NotAParticipant);
        }
        Ok(participants)
    }

    /// The creator is always added to `participant_ids`.
    pub async fn create(
        &self,
        creator_id: Uuid,
        kind: ConversationKind,
        display_name: Option<String>,
        participant_ids: impl IntoIterator<Item = Uuid>,
    ) -> AppResult<Conversation> {
        let mut participants: BTreeSet<Uuid> = participant_ids.into_iter().collect();
        participants.insert(creator_id);

        if participants.len() < 2 {
            return Err(AppError::Validation(
                "a conversation needs at least two participants".into(),
            ));
        }
        if kind == ConversationKind::Direct && participants.len() > 2 {
            return Err(AppError::Validation(
                "a direct conversation has exactly two participants".into(),
            ));
        }

        let display_name = match kind {
            ConversationKind::Direct => None,
            ConversationKind::Group => {
                let name = display_name
                    .map(|n| n.trim().to_string())
                    .filter(|n| !n.is_empty())
                    .ok_or_else(|| AppError::Validation("a group needs a name".into()))?;
                Some(name)
            }
        };

        for user_id in &participants {
            if self.repo.find_user(*user_id).await?.is_none() {
                return Err(AppError::NotFound("user"));
            }
        }

        let conversation = Conversation {
            id: Uuid::new_v4(),
            kind,
            display_name,
            participant_ids: participants,
            last_message_id: None,
            created_at: Utc::now(),
        };
        self.repo.insert_conversation(&conversation).await?;
        self.participants.write().await.insert(
            conversation.id,
            Arc::new(conversation.participant_ids.clone()),
        );

        tracing::info!(
            conversation_id = %conversation.id,
            kind = conversation.kind.as_str(),
            participants = conversation.participant_ids.len(),
            "conversation created"
        );
        Ok(conversation)
    }

    pub async fn get(&self, conversation_id: Uuid, user_id: Uuid) -> AppResult<ConversationView> {
        let conversation = self
            .repo
            .find_conversation(conversation_id)
            .await?
            .ok_or(AppError::NotFound("conversation"))?;
        if !conversation.has_participant(user_id) {
            return Err(AppError::NotAParticipant);
        }
        self.view(conversation).await
    }

    pub async fn list_for_user(&self, user_id: Uuid) -> AppResult<Vec<ConversationView>> {
        let conversations = self.repo.conversations_for_user(user_id).await?;
        let mut views = Vec::with_capacity(conversations.len());
        for conversation in conversations {
            views.push(self.view(conversation).await?);
        }
        Ok(views)
    }

    pub async fn set_last_message(&self, conversation_id: Uuid, message_id: Uuid) -> AppResult<()> {
        self.repo.set_last_message(conversation_id, message_id).await
    }

    async fn view(&self, conversation: Conversation) -> AppResult<ConversationView> {
        let last_message = match conversation.last_message_id {
            Some(id) => self.repo.find_message(id).await?,
            None => None,
        };
        Ok(ConversationView {
            conversation,
            last_message,
        })
    }
}

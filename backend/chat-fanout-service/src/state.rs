use std::sync::Arc;

use crate::config::Config;
use crate::middleware::{IdentityBinder, TokenVerifier};
use crate::repository::ChatRepository;
use crate::router::Router;
use crate::services::{ConversationStore, MediaStorage, MessageLifecycle, UserDirectory};
use crate::websocket::ConnectionRegistry;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: ConnectionRegistry,
    pub router: Router,
    pub binder: IdentityBinder,
    pub conversations: Arc<ConversationStore>,
    pub messages: Arc<MessageLifecycle>,
    pub users: Arc<UserDirectory>,
    pub media: Arc<dyn MediaStorage>,
}

impl AppState {
    pub fn new(
        config: Config,
        repo: Arc<dyn ChatRepository>,
        verifier: Arc<dyn TokenVerifier>,
        media: Arc<dyn MediaStorage>,
    ) -> Self {
        let registry = ConnectionRegistry::new();
        let conversations = Arc::new(ConversationStore::new(repo.clone()));
        let messages = Arc::new(MessageLifecycle::new(
            repo.clone(),
            conversations.clone(),
            config.max_message_bytes,
        ));
        let router = Router::new(registry.clone(), conversations.clone(), messages.clone());

        Self {
            config: Arc::new(config),
            registry,
            router,
            binder: IdentityBinder::new(verifier, repo.clone()),
            conversations,
            messages,
            users: Arc::new(UserDirectory::new(repo)),
            media,
        }
    }
}

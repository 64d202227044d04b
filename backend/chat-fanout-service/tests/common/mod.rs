#![allow(dead_code)]

use chat_fanout_service::config::Config;
use chat_fanout_service::middleware::auth::Claims;
use chat_fanout_service::middleware::JwtVerifier;
use chat_fanout_service::models::{Session, User};
use chat_fanout_service::repository::{ChatRepository, MemoryRepository};
use chat_fanout_service::services::LocalMediaStorage;
use chat_fanout_service::state::AppState;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use uuid::Uuid;

pub const SECRET: &str = "test-secret";

pub struct TestApp {
    pub state: AppState,
    pub repo: Arc<MemoryRepository>,
}

impl TestApp {
    pub fn new() -> Self {
        let config = Config::test_defaults();
        let repo = Arc::new(MemoryRepository::new());
        let media = Arc::new(LocalMediaStorage::new(&config.media));
        let state = AppState::new(
            config,
            repo.clone(),
            Arc::new(JwtVerifier::hs256(SECRET)),
            media,
        );
        Self { state, repo }
    }

    pub async fn user(&self, name: &str) -> User {
        let digits = Uuid::new_v4().as_u128() % 10_000_000;
        let user = User::new(name, format!("+1555{digits:07}"));
        self.repo.insert_user(&user).await.unwrap();
        user
    }

    /// Register a live session for `user` and return it with its frame stream.
    pub async fn connect(&self, user: &User) -> (Session, UnboundedReceiver<String>) {
        let session = Session::new(user.id);
        let rx = self.state.registry.register(session.clone()).await;
        (session, rx)
    }
}

pub fn token_for(user_id: Uuid, exp_offset_secs: i64) -> String {
    let now = chrono::Utc::now().timestamp();
    let claims = Claims {
        sub: user_id.to_string(),
        exp: (now + exp_offset_secs) as usize,
        iat: now as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

/// Everything currently queued for a session, decoded.
pub fn drain(rx: &mut UnboundedReceiver<String>) -> Vec<Value> {
    let mut frames = Vec::new();
    while let Ok(raw) = rx.try_recv() {
        frames.push(serde_json::from_str(&raw).unwrap());
    }
    frames
}

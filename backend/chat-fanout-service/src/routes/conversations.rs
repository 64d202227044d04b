use actix_web::{get, post, web, HttpResponse};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::AuthenticatedUser;
use crate::models::{ConversationKind, MessageDraft};
use crate::repository::PageRequest;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateConversationRequest {
    #[serde(alias = "chatType")]
    pub kind: ConversationKind,
    #[serde(default)]
    pub name: Option<String>,
    pub participant_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    pub page: u32,
    #[serde(default = "default_page_size")]
    pub size: u32,
}

fn default_page_size() -> u32 {
    20
}

impl From<&PageQuery> for PageRequest {
    fn from(q: &PageQuery) -> Self {
        PageRequest::new(q.page, q.size)
    }
}

/// POST /conversations
#[post("/conversations")]
pub async fn create_conversation(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    body: web::Json<CreateConversationRequest>,
) -> Result<HttpResponse, AppError> {
    let body = body.into_inner();
    let conversation = state
        .conversations
        .create(user.id, body.kind, body.name, body.participant_ids)
        .await?;
    Ok(HttpResponse::Created().json(conversation))
}

/// GET /conversations
#[get("/conversations")]
pub async fn list_conversations(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    let conversations = state.conversations.list_for_user(user.id).await?;
    Ok(HttpResponse::Ok().json(conversations))
}

/// GET /conversations/{id}
#[get("/conversations/{id}")]
pub async fn get_conversation(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    conversation_id: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let view = state
        .conversations
        .get(conversation_id.into_inner(), user.id)
        .await?;
    Ok(HttpResponse::Ok().json(view))
}

/// GET /conversations/{id}/messages
#[get("/conversations/{id}/messages")]
pub async fn get_messages(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    conversation_id: web::Path<Uuid>,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, AppError> {
    let page = state
        .messages
        .history(conversation_id.into_inner(), user.id, (&*query).into())
        .await?;
    Ok(HttpResponse::Ok().json(page))
}

/// POST /conversations/{id}/messages
///
/// Same path as a socket send: participants get the broadcast and the
/// sender's sockets get the acknowledgment.
#[post("/conversations/{id}/messages")]
pub async fn send_message(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    conversation_id: web::Path<Uuid>,
    body: web::Json<MessageDraft>,
) -> Result<HttpResponse, AppError> {
    let message = state
        .router
        .send(user.id, conversation_id.into_inner(), body.into_inner())
        .await?;
    Ok(HttpResponse::Created().json(message))
}

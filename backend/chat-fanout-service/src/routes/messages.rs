use actix_web::{delete, get, post, put, web, HttpResponse};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::AuthenticatedUser;
use crate::repository::PageRequest;
use crate::router::Mutation;
use crate::state::AppState;
use crate::websocket::events::ChatEvent;
use crate::websocket::message_types::{EditPayload, ForwardPayload, ReactPayload};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    pub conversation_id: Uuid,
    #[serde(default)]
    pub q: String,
    #[serde(default)]
    pub page: u32,
    #[serde(default = "default_page_size")]
    pub size: u32,
}

fn default_page_size() -> u32 {
    20
}

fn event_response(event: Option<ChatEvent>) -> HttpResponse {
    match event {
        Some(event) => HttpResponse::Ok().json(event),
        None => HttpResponse::NoContent().finish(),
    }
}

/// GET /messages/search
#[get("/messages/search")]
pub async fn search_messages(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    query: web::Query<SearchQuery>,
) -> Result<HttpResponse, AppError> {
    state
        .conversations
        .require_participant(query.conversation_id, user.id)
        .await?;
    let page = state
        .messages
        .search(
            query.conversation_id,
            &query.q,
            PageRequest::new(query.page, query.size),
        )
        .await?;
    Ok(HttpResponse::Ok().json(page))
}

/// PUT /messages/{id}
#[put("/messages/{id}")]
pub async fn edit_message(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    message_id: web::Path<Uuid>,
    body: web::Json<EditPayload>,
) -> Result<HttpResponse, AppError> {
    let event = state
        .router
        .apply_mutation(
            user.id,
            Mutation::Edit {
                message_id: message_id.into_inner(),
                content: body.into_inner().content,
            },
        )
        .await?;
    Ok(event_response(event))
}

/// DELETE /messages/{id}
#[delete("/messages/{id}")]
pub async fn delete_message(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    message_id: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    state
        .router
        .apply_mutation(
            user.id,
            Mutation::Delete {
                message_id: message_id.into_inner(),
            },
        )
        .await?;
    Ok(HttpResponse::NoContent().finish())
}

/// POST /messages/{id}/reactions
#[post("/messages/{id}/reactions")]
pub async fn add_reaction(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    message_id: web::Path<Uuid>,
    body: web::Json<ReactPayload>,
) -> Result<HttpResponse, AppError> {
    let event = state
        .router
        .apply_mutation(
            user.id,
            Mutation::React {
                message_id: message_id.into_inner(),
                reaction: body.reaction,
            },
        )
        .await?;
    Ok(event_response(event))
}

/// DELETE /messages/{id}/reactions
#[delete("/messages/{id}/reactions")]
pub async fn remove_reaction(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    message_id: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    state
        .router
        .apply_mutation(
            user.id,
            Mutation::Unreact {
                message_id: message_id.into_inner(),
            },
        )
        .await?;
    Ok(HttpResponse::NoContent().finish())
}

/// POST /messages/{id}/forward
#[post("/messages/{id}/forward")]
pub async fn forward_message(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    message_id: web::Path<Uuid>,
    body: web::Json<ForwardPayload>,
) -> Result<HttpResponse, AppError> {
    let event = state
        .router
        .apply_mutation(
            user.id,
            Mutation::Forward {
                message_id: message_id.into_inner(),
                target_conversation_id: body.target_conversation_id,
            },
        )
        .await?;
    match event {
        Some(event) => Ok(HttpResponse::Created().json(event)),
        None => Ok(HttpResponse::NoContent().finish()),
    }
}

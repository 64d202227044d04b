use actix_web::{get, put, web, HttpResponse};
use serde::Deserialize;

use crate::error::AppError;
use crate::middleware::AuthenticatedUser;
use crate::services::ProfileUpdate;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct UserSearchQuery {
    #[serde(default)]
    pub q: String,
}

/// GET /users/search?q=
#[get("/users/search")]
pub async fn search_users(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    query: web::Query<UserSearchQuery>,
) -> Result<HttpResponse, AppError> {
    let users = state.users.search(&query.q, user.id).await?;
    Ok(HttpResponse::Ok().json(users))
}

/// GET /users/me
#[get("/users/me")]
pub async fn get_me(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    Ok(HttpResponse::Ok().json(state.users.me(user.id).await?))
}

/// PUT /users/me
#[put("/users/me")]
pub async fn update_me(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    body: web::Json<ProfileUpdate>,
) -> Result<HttpResponse, AppError> {
    let updated = state.users.update_profile(user.id, body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(updated))
}

//! Request guards for the REST surface.

use actix_web::{web, Error, FromRequest, HttpRequest};
use std::future::Future;
use std::pin::Pin;
use uuid::Uuid;

use crate::error::AppError;
use crate::metrics;
use crate::middleware::auth::bearer_token;
use crate::state::AppState;

/// Caller bound through the same path as a socket handshake.
/// No session is registered for REST calls.
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedUser {
    pub id: Uuid,
}

impl FromRequest for AuthenticatedUser {
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self, Self::Error>>>>;

    fn from_request(req: &HttpRequest, _payload: &mut actix_web::dev::Payload) -> Self::Future {
        let state = req.app_data::<web::Data<AppState>>().cloned();
        let token = bearer_token(req);

        Box::pin(async move {
            let state = state.ok_or(AppError::Internal)?;
            let session = state.binder.bind(token.as_deref()).await.map_err(|failure| {
                metrics::rest_auth_rejected(failure.reason.as_str());
                AppError::from(failure)
            })?;
            Ok(AuthenticatedUser {
                id: session.user_id(),
            })
        })
    }
}

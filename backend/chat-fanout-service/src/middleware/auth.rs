//! Handshake authentication.
//!
//! [`IdentityBinder`] turns a raw bearer credential into a [`Session`] or an
//! [`AuthFailure`]. There is no partial result: callers either hold a fully
//! bound session or reject the connection.

use actix_web::http::header::AUTHORIZATION;
use actix_web::HttpRequest;
use jsonwebtoken::{decode, errors::ErrorKind, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::JwtKeyConfig;
use crate::error::{AppError, AuthFailure, AuthFailureReason};
use crate::models::Session;
use crate::repository::ChatRepository;

/// JWT claims carried by access tokens. `sub` is the canonical user id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    #[serde(default)]
    pub iat: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifiedIdentity {
    pub user_id: Uuid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("token is malformed or has an invalid signature")]
    Malformed,
    #[error("token has expired")]
    Expired,
}

pub trait TokenVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<VerifiedIdentity, TokenError>;
}

pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn rs256_from_pem(public_key_pem: &str) -> Result<Self, AppError> {
        let key = DecodingKey::from_rsa_pem(public_key_pem.as_bytes())
            .map_err(|e| AppError::Config(format!("invalid JWT public key: {e}")))?;
        Ok(Self::with_key(key, Algorithm::RS256))
    }

    pub fn hs256(secret: &str) -> Self {
        Self::with_key(DecodingKey::from_secret(secret.as_bytes()), Algorithm::HS256)
    }

    pub fn from_config(config: &JwtKeyConfig) -> Result<Self, AppError> {
        match config {
            JwtKeyConfig::RsaPublicKeyPem(pem) => Self::rs256_from_pem(pem),
            JwtKeyConfig::SharedSecret(secret) => Ok(Self::hs256(secret)),
        }
    }

    fn with_key(key: DecodingKey, algorithm: Algorithm) -> Self {
        let mut validation = Validation::new(algorithm);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);
        Self { key, validation }
    }
}

impl TokenVerifier for JwtVerifier {
    fn verify(&self, token: &str) -> Result<VerifiedIdentity, TokenError> {
        let data = decode::<Claims>(token, &self.key, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Malformed,
            }
        })?;

        let user_id = Uuid::parse_str(&data.claims.sub).map_err(|_| TokenError::Malformed)?;
        Ok(VerifiedIdentity { user_id })
    }
}

#[derive(Clone)]
pub struct IdentityBinder {
    verifier: Arc<dyn TokenVerifier>,
    repo: Arc<dyn ChatRepository>,
}

impl IdentityBinder {
    pub fn new(verifier: Arc<dyn TokenVerifier>, repo: Arc<dyn ChatRepository>) -> Self {
        Self { verifier, repo }
    }

    /// Verify `raw_credential` and resolve it to an existing user.
    ///
    /// Never creates users. A lookup failure in the store is reported as
    /// `UNKNOWN_USER` after logging, since the connection cannot be bound.
    pub async fn bind(&self, raw_credential: Option<&str>) -> Result<Session, AuthFailure> {
        let token = raw_credential
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AuthFailure::new(AuthFailureReason::Missing))?;

        let identity = self.verifier.verify(token).map_err(|e| {
            AuthFailure::new(match e {
                TokenError::Malformed => AuthFailureReason::Malformed,
                TokenError::Expired => AuthFailureReason::Expired,
            })
        })?;

        match self.repo.find_user(identity.user_id).await {
            Ok(Some(user)) => Ok(Session::new(user.id)),
            Ok(None) => Err(AuthFailure::new(AuthFailureReason::UnknownUser)),
            Err(e) => {
                tracing::error!(user_id = %identity.user_id, error = %e, "user lookup failed during bind");
                Err(AuthFailure::new(AuthFailureReason::UnknownUser))
            }
        }
    }
}

/// `Authorization: Bearer <token>` value, if present.
pub fn bearer_token(req: &HttpRequest) -> Option<String> {
    req.headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|s| s.to_string())
}

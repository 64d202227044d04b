use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::Serialize;
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

/// Why a handshake credential was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthFailureReason {
    Missing,
    Malformed,
    Expired,
    UnknownUser,
}

impl AuthFailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthFailureReason::Missing => "MISSING",
            AuthFailureReason::Malformed => "MALFORMED",
            AuthFailureReason::Expired => "EXPIRED",
            AuthFailureReason::UnknownUser => "UNKNOWN_USER",
        }
    }
}

/// Connection-fatal authentication failure. Never converted into a session.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("authentication failed: {}", .reason.as_str())]
pub struct AuthFailure {
    pub reason: AuthFailureReason,
}

impl AuthFailure {
    pub fn new(reason: AuthFailureReason) -> Self {
        Self { reason }
    }
}

#[derive(Debug, Error, Clone)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("server start failure: {0}")]
    StartServer(String),

    #[error(transparent)]
    Auth(#[from] AuthFailure),

    #[error("user is not a participant of this conversation")]
    NotAParticipant,

    #[error("not authorized to modify this message")]
    NotAuthorized,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("media storage error: {0}")]
    Storage(String),

    #[error("internal server error")]
    Internal,
}

impl From<tokio_postgres::Error> for AppError {
    fn from(e: tokio_postgres::Error) -> Self {
        AppError::Database(e.to_string())
    }
}

impl From<deadpool_postgres::PoolError> for AppError {
    fn from(e: deadpool_postgres::PoolError) -> Self {
        AppError::Database(e.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::Storage(e.to_string())
    }
}

impl AppError {
    /// Stable machine-readable code sent to clients.
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Auth(_) => "AUTH_FAILURE",
            AppError::NotAParticipant => "NOT_A_PARTICIPANT",
            AppError::NotAuthorized => "NOT_AUTHORIZED",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Config(_)
            | AppError::StartServer(_)
            | AppError::Database(_)
            | AppError::Storage(_)
            | AppError::Internal => "INTERNAL_ERROR",
        }
    }

    /// Text safe to show the acting user. Internal details stay in the logs.
    pub fn public_reason(&self) -> String {
        match self {
            AppError::Config(_)
            | AppError::StartServer(_)
            | AppError::Database(_)
            | AppError::Storage(_)
            | AppError::Internal => "internal server error".to_string(),
            other => other.to_string(),
        }
    }

    /// Returns HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::Validation(_) => 400,
            AppError::Auth(_) => 401,
            AppError::NotAParticipant | AppError::NotAuthorized => 403,
            AppError::NotFound(_) => 404,
            _ => 500,
        }
    }

    pub fn is_internal(&self) -> bool {
        self.status_code() >= 500
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub status: &'static str,
    pub code: &'static str,
    pub reason: String,
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(AppError::status_code(self)).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(ResponseError::status_code(self)).json(ErrorBody {
            status: "error",
            code: self.error_code(),
            reason: self.public_reason(),
        })
    }
}

use chrono::{DateTime, Utc};
use rocket::http::Status;
use thiserror::Error;

pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Debug, Error)]
pub enum AuthError {
    /// Wrong password or unknown account; the caller can never tell which.
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("account locked until {until}")]
    AccountLocked { until: DateTime<Utc> },
    /// Every token failure collapses here; the reason is never exposed.
    #[error("token invalid")]
    TokenInvalid,
    #[error("weak password: {reason}")]
    WeakPassword { reason: &'static str },
    #[error("email already registered")]
    EmailTaken,
    #[error("account not found")]
    AccountNotFound,
    #[error("unauthorized")]
    Unauthorized,
    #[error("forbidden")]
    Forbidden,
    /// Optimistic-concurrency retries exhausted on the security record.
    #[error("concurrent update conflict")]
    Conflict,
    #[error("configuration error: {0}")]
    Config(String),
    #[error("database error: {0}")]
    Sqlx(#[from] rocket_db_pools::sqlx::Error),
    #[error("jwt error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
    #[error("argon2 parameter error: {0}")]
    Argon2(String),
    #[error("password hashing error: {0}")]
    PasswordHash(String),
}

impl AuthError {
    pub fn status(&self) -> Status {
        match self {
            AuthError::InvalidCredentials => Status::Unauthorized,
            AuthError::AccountLocked { .. } => Status::Locked,
            AuthError::TokenInvalid => Status::Unauthorized,
            AuthError::WeakPassword { .. } => Status::BadRequest,
            AuthError::EmailTaken => Status::Conflict,
            AuthError::AccountNotFound => Status::NotFound,
            AuthError::Unauthorized => Status::Unauthorized,
            AuthError::Forbidden => Status::Forbidden,
            AuthError::Conflict
            | AuthError::Config(_)
            | AuthError::Sqlx(_)
            | AuthError::Jwt(_)
            | AuthError::Argon2(_)
            | AuthError::PasswordHash(_) => Status::InternalServerError,
        }
    }
}

impl From<argon2::Error> for AuthError {
    fn from(err: argon2::Error) -> Self {
        AuthError::Argon2(err.to_string())
    }
}

impl From<argon2::password_hash::Error> for AuthError {
    fn from(err: argon2::password_hash::Error) -> Self {
        AuthError::PasswordHash(err.to_string())
    }
}

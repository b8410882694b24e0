use thiserror::Error;
use tracing::debug;

/// Failures of the argon2 password hasher.
#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("password hashing failed: {0}")]
    Hash(String),
    #[error("malformed password hash: {0}")]
    MalformedHash(String),
    #[error("invalid hashing parameters: {0}")]
    InvalidParams(String),
}

/// Failures of bearer token signing and verification.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,
    #[error("bad token signature")]
    BadSignature,
    #[error("token expired")]
    Expired,
    #[error("token signing failed: {0}")]
    Signing(String),
}

/// Errors surfaced by the account service to request handlers.
///
/// Messages never say which of username, email or password caused a failure.
#[derive(Debug, Error)]
pub enum AccountError {
    #[error("record not found")]
    NotFound,
    #[error("username or email already exists")]
    Conflict,
    #[error("invalid username or password")]
    InvalidCredentials,
    #[error("operation cancelled")]
    Cancelled,
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for AccountError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::RowNotFound => AccountError::NotFound,
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                debug!(
                    constraint = db.constraint().unwrap_or("unknown"),
                    "unique constraint violated"
                );
                AccountError::Conflict
            }
            _ => AccountError::Internal(e.to_string()),
        }
    }
}

impl From<PasswordError> for AccountError {
    fn from(e: PasswordError) -> Self {
        AccountError::Internal(e.to_string())
    }
}

impl From<TokenError> for AccountError {
    fn from(e: TokenError) -> Self {
        AccountError::Internal(e.to_string())
    }
}

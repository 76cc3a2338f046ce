//! Authentication: password hashing, bearer tokens and role extractors.

pub mod extractor;
pub mod jwt;
pub mod password;

use axum::http::StatusCode;
use thiserror::Error;

pub use extractor::{AdminUser, AuthUser, MaybeAuthUser};
pub use jwt::{Claims, TokenService};
pub use password::{hash_password, validate_password, verify_password};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing Authorization header")]
    MissingToken,

    #[error("Authorization header must use the Bearer scheme")]
    InvalidAuthScheme,

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Admin access required")]
    AdminRequired,

    #[error("{0}")]
    WeakPassword(String),

    #[error("Failed to hash password")]
    PasswordHash,

    #[error("Failed to issue token: {0}")]
    TokenCreation(String),
}

impl AuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingToken | Self::InvalidAuthScheme | Self::InvalidToken(_) | Self::TokenExpired | Self::InvalidCredentials => {
                StatusCode::UNAUTHORIZED
            }
            Self::AdminRequired => StatusCode::FORBIDDEN,
            Self::WeakPassword(_) => StatusCode::BAD_REQUEST,
            Self::PasswordHash | Self::TokenCreation(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

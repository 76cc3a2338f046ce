//! Unified error handling for route handlers.

use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use validator::ValidationErrors;

use crate::auth::AuthError;
use crate::domain::aggregates::{CartError, OrderError, ProductError};
use crate::domain::value_objects::{EmailError, ImageError, SkuError};
use crate::services::payments::PaymentError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Payment processor error: {0}")]
    Payment(#[from] PaymentError),

    #[error("{0}")]
    Auth(#[from] AuthError),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type AppResult<T> = std::result::Result<T, AppError>;

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self { Self::Validation(message.into()) }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Store(StoreError::Duplicate(_)) | Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Store(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Payment(PaymentError::InvalidSignature(_)) => StatusCode::BAD_REQUEST,
            Self::Payment(PaymentError::NotConfigured) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Payment(_) => StatusCode::BAD_GATEWAY,
            Self::Auth(e) => e.status(),
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, status = %status.as_u16(), "Request failed");
        }

        // Don't expose internal error details to clients
        let message = match &self {
            Self::Store(StoreError::Duplicate(c)) => format!("{} already exists", c.singular()),
            Self::Store(_) | Self::Internal(_) => "Internal server error".to_string(),
            Self::Payment(PaymentError::InvalidSignature(_)) => "Invalid webhook signature".to_string(),
            Self::Payment(_) => "Payment processor error".to_string(),
            _ => self.to_string(),
        };

        (status, Json(json!({ "message": message }))).into_response()
    }
}

impl From<ValidationErrors> for AppError {
    fn from(errors: ValidationErrors) -> Self { Self::Validation(first_validation_message(&errors)) }
}

/// Picks the alphabetically first failing field so the message is deterministic.
pub fn first_validation_message(errors: &ValidationErrors) -> String {
    let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
    fields.sort_by_key(|(field, _)| *field);
    fields
        .first()
        .and_then(|(field, errs)| {
            errs.first().map(|e| match &e.message {
                Some(message) => message.to_string(),
                None => format!("{field} is invalid"),
            })
        })
        .unwrap_or_else(|| "Invalid request".to_string())
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self { Self::Validation(rejection.body_text()) }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self { Self::Validation(rejection.body_text()) }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self { Self::Validation(rejection.body_text()) }
}

impl From<ProductError> for AppError {
    fn from(err: ProductError) -> Self {
        match err {
            ProductError::InsufficientInventory { .. } => Self::Conflict(err.to_string()),
            _ => Self::Validation(err.to_string()),
        }
    }
}

impl From<OrderError> for AppError {
    fn from(err: OrderError) -> Self { Self::Validation(err.to_string()) }
}

impl From<CartError> for AppError {
    fn from(_: CartError) -> Self { Self::NotFound("Cart item") }
}

impl From<EmailError> for AppError {
    fn from(err: EmailError) -> Self { Self::Validation(err.to_string()) }
}

impl From<SkuError> for AppError {
    fn from(err: SkuError) -> Self { Self::Validation(format!("sku: {err}")) }
}

impl From<ImageError> for AppError {
    fn from(err: ImageError) -> Self { Self::Validation(err.to_string()) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Collection;
    use validator::Validate;

    #[derive(Validate)]
    struct Signup {
        #[validate(email(message = "email must be valid"))]
        email: String,
        #[validate(length(min = 8, message = "password must be at least 8 characters"))]
        password: String,
    }

    #[test]
    fn test_app_error_status_codes() {
        fn get_status(err: AppError) -> StatusCode { err.into_response().status() }

        assert_eq!(get_status(AppError::NotFound("Product")), StatusCode::NOT_FOUND);
        assert_eq!(get_status(AppError::validation("bad")), StatusCode::BAD_REQUEST);
        assert_eq!(get_status(AppError::Forbidden("no".into())), StatusCode::FORBIDDEN);
        assert_eq!(get_status(AppError::Conflict("dup".into())), StatusCode::CONFLICT);
        assert_eq!(get_status(AppError::Store(StoreError::Duplicate(Collection::Users))), StatusCode::CONFLICT);
        assert_eq!(get_status(AppError::Internal("boom".into())), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(get_status(AppError::Auth(AuthError::MissingToken)), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_validation_message_is_field_specific() {
        let errors = Signup { email: "nope".into(), password: "short".into() }.validate().unwrap_err();
        assert_eq!(first_validation_message(&errors), "email must be valid");
        assert_eq!(AppError::from(errors).to_string(), "email must be valid");
    }

    #[test]
    fn test_display() {
        assert_eq!(AppError::NotFound("Order").to_string(), "Order not found");
        let err = AppError::from(ProductError::InsufficientInventory { name: "Mug".into(), available: 1 });
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }
}

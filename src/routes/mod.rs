//! HTTP routes, one module per resource.

pub mod admin;
pub mod auth;
pub mod cart;
pub mod catalog;
pub mod categories;
pub mod extract;
pub mod health;
pub mod orders;
pub mod payments;
pub mod products;
pub mod reviews;
pub mod users;
pub mod wishlist;

use axum::{
    http::header,
    response::{IntoResponse, Response},
    Router,
};
use serde::Serialize;

use crate::domain::value_objects::ImageBlob;
use crate::state::AppState;
use crate::store::{PageMeta, Pagination};

pub use extract::{ApiJson, ApiPath, ApiQuery};

/// Every route the service exposes, with state attached.
pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(health::routes())
        .merge(auth::routes())
        .merge(products::routes())
        .merge(catalog::routes())
        .merge(categories::routes())
        .merge(reviews::routes())
        .merge(orders::routes())
        .merge(cart::routes())
        .merge(wishlist::routes())
        .merge(payments::routes())
        .merge(users::routes())
        .merge(admin::routes())
        .with_state(state)
}

/// Envelope for paginated listings.
#[derive(Debug, Serialize)]
pub struct Paginated<T> {
    pub data: Vec<T>,
    pub pagination: PageMeta,
}

impl<T> Paginated<T> {
    pub fn new(data: Vec<T>, pagination: Pagination, total: u64) -> Self {
        Self { data, pagination: pagination.meta(total) }
    }
}

/// Raw image bytes with the stored content type.
pub(crate) fn image_response(image: &ImageBlob) -> Response {
    (
        [(header::CONTENT_TYPE, image.content_type.clone()), (header::CACHE_CONTROL, "public, max-age=3600".to_string())],
        image.data.clone(),
    )
        .into_response()
}

/// Trimmed, non-empty optional text.
pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

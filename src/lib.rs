//! Storefront API
//!
//! REST backend for a small storefront and its admin dashboard.
//!
//! ## Features
//! - Product catalog with search, filters and embedded images
//! - Cart, wishlist and checkout through a hosted payment processor
//! - Order lifecycle with stock reservation and restocking
//! - Customer accounts, reviews and admin statistics

pub mod auth;
pub mod config;
pub mod domain;
pub mod error;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;

use axum::{http::HeaderValue, Router};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub use error::{AppError, AppResult};
pub use state::AppState;

/// Full application: routes plus request tracing and CORS.
pub fn app(state: AppState, cors_origin: Option<&str>) -> Router {
    let cors = match cors_origin.map(HeaderValue::from_str) {
        Some(Ok(origin)) => CorsLayer::new().allow_origin(origin).allow_methods(Any).allow_headers(Any),
        Some(Err(_)) => {
            tracing::warn!(origin = ?cors_origin, "Invalid CORS_ORIGIN; allowing any origin");
            CorsLayer::permissive()
        }
        None => CorsLayer::permissive(),
    };
    routes::router(state).layer(TraceLayer::new_for_http()).layer(cors)
}

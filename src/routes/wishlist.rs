//! Per-user wishlist with a move-to-cart shortcut.

use axum::{
    extract::State,
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::cart::{add_to_cart, cart_view, load_cart, CartView};
use super::products::load_product;
use super::{ApiJson, ApiPath};
use crate::auth::AuthUser;
use crate::domain::aggregates::{Product, ProductView, Wishlist};
use crate::error::{AppError, AppResult};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/wishlist", get(get_wishlist))
        .route("/api/wishlist/items", post(add_item))
        .route("/api/wishlist/items/:product_id", delete(remove_item))
        .route("/api/wishlist/items/:product_id/move-to-cart", post(move_to_cart))
}

#[derive(Debug, Deserialize)]
pub struct AddWishlistItem {
    pub product_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct WishlistEntry {
    pub product: ProductView,
    pub added_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct WishlistView {
    pub items: Vec<WishlistEntry>,
}

#[derive(Debug, Serialize)]
pub struct MovedToCart {
    pub wishlist: WishlistView,
    pub cart: CartView,
}

async fn load_wishlist(state: &AppState, user_id: Uuid) -> AppResult<Wishlist> {
    Ok(state.repo::<Wishlist>().get(user_id).await?.unwrap_or_else(|| Wishlist::for_user(user_id)))
}

async fn wishlist_view(state: &AppState, wishlist: &Wishlist) -> AppResult<WishlistView> {
    let products = state.repo::<Product>();
    let mut items = Vec::with_capacity(wishlist.items.len());
    for item in &wishlist.items {
        if let Some(product) = products.get(item.product_id).await? {
            items.push(WishlistEntry { product: ProductView::from(&product), added_at: item.added_at });
        }
    }
    Ok(WishlistView { items })
}

async fn get_wishlist(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<WishlistView>> {
    let wishlist = load_wishlist(&state, auth.id).await?;
    Ok(Json(wishlist_view(&state, &wishlist).await?))
}

/// Adding a product that is already listed is a no-op.
async fn add_item(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiJson(req): ApiJson<AddWishlistItem>,
) -> AppResult<Json<WishlistView>> {
    load_product(&state, req.product_id).await?;
    let mut wishlist = load_wishlist(&state, auth.id).await?;
    if wishlist.add(req.product_id) {
        state.repo::<Wishlist>().upsert(&wishlist).await?;
    }
    Ok(Json(wishlist_view(&state, &wishlist).await?))
}

async fn remove_item(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(product_id): ApiPath<Uuid>,
) -> AppResult<Json<WishlistView>> {
    let mut wishlist = load_wishlist(&state, auth.id).await?;
    if !wishlist.remove(product_id) {
        return Err(AppError::NotFound("Wishlist item"));
    }
    state.repo::<Wishlist>().upsert(&wishlist).await?;
    Ok(Json(wishlist_view(&state, &wishlist).await?))
}

async fn move_to_cart(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(product_id): ApiPath<Uuid>,
) -> AppResult<Json<MovedToCart>> {
    let mut wishlist = load_wishlist(&state, auth.id).await?;
    if !wishlist.contains(product_id) {
        return Err(AppError::NotFound("Wishlist item"));
    }

    let mut cart = load_cart(&state, auth.id).await?;
    add_to_cart(&state, &mut cart, product_id, 1).await?;
    wishlist.remove(product_id);
    state.repo::<Wishlist>().upsert(&wishlist).await?;

    Ok(Json(MovedToCart {
        wishlist: wishlist_view(&state, &wishlist).await?,
        cart: cart_view(&state, &cart).await?,
    }))
}

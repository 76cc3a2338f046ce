//! Shopping cart with live product data and a totals quote.

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::products::load_product;
use super::{ApiJson, ApiPath};
use crate::auth::AuthUser;
use crate::domain::aggregates::{Cart, Product};
use crate::domain::pricing::{compute_totals, Totals};
use crate::domain::value_objects::Money;
use crate::error::{AppError, AppResult};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/cart", get(get_cart).delete(clear_cart))
        .route("/api/cart/items", post(add_item))
        .route("/api/cart/items/:product_id", put(update_item).delete(remove_item))
}

#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
    pub product_id: Uuid,
    #[serde(default = "one")]
    pub quantity: u32,
}

fn one() -> u32 { 1 }

#[derive(Debug, Deserialize)]
pub struct UpdateItemRequest {
    pub quantity: u32,
}

#[derive(Debug, Serialize)]
pub struct CartLineView {
    pub product_id: Uuid,
    pub name: String,
    pub slug: String,
    pub image_url: Option<String>,
    pub unit_price: Money,
    pub sale_price: Money,
    pub discount_percent: u8,
    pub quantity: u32,
    pub line_total: Money,
    pub stock: i64,
    /// Active and with enough stock for the requested quantity.
    pub available: bool,
}

#[derive(Debug, Serialize)]
pub struct CartView {
    pub items: Vec<CartLineView>,
    pub item_count: u32,
    pub totals: Totals,
}

/// Joins cart lines with current product data. Lines whose product has been
/// deleted are dropped; inactive products stay visible but are not priced.
pub(crate) async fn cart_view(state: &AppState, cart: &Cart) -> AppResult<CartView> {
    let products = state.repo::<Product>();
    let mut items = Vec::with_capacity(cart.items.len());
    let mut priced = Vec::with_capacity(cart.items.len());
    for item in &cart.items {
        let Some(product) = products.get(item.product_id).await? else { continue };
        let line = product.priced_line(item.quantity);
        if product.is_active() {
            priced.push(line);
        }
        items.push(CartLineView {
            product_id: product.id,
            name: product.name.clone(),
            slug: product.slug.clone(),
            image_url: (!product.images.is_empty()).then(|| product.image_url(0)),
            unit_price: product.price,
            sale_price: product.sale_price(),
            discount_percent: product.discount_percent,
            quantity: item.quantity,
            line_total: line.net(),
            stock: product.stock,
            available: product.is_active() && product.check_stock(item.quantity).is_ok(),
        });
    }
    Ok(CartView {
        item_count: items.iter().map(|i| i.quantity).sum(),
        totals: compute_totals(&priced),
        items,
    })
}

pub(crate) async fn load_cart(state: &AppState, user_id: Uuid) -> AppResult<Cart> {
    Ok(state.repo::<Cart>().get(user_id).await?.unwrap_or_else(|| Cart::for_user(user_id)))
}

/// Adds `quantity` of a product to the cart, refusing more than is in stock.
pub(crate) async fn add_to_cart(state: &AppState, cart: &mut Cart, product_id: Uuid, quantity: u32) -> AppResult<()> {
    if quantity == 0 {
        return Err(AppError::validation("quantity must be at least 1"));
    }
    let product = load_product(state, product_id).await?;
    if !product.is_active() {
        return Err(AppError::validation(format!("{} is not available", product.name)));
    }
    product.check_stock(cart.quantity_of(product_id).saturating_add(quantity))?;
    cart.add_item(product_id, quantity);
    state.repo::<Cart>().upsert(cart).await?;
    Ok(())
}

async fn get_cart(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<CartView>> {
    let cart = load_cart(&state, auth.id).await?;
    Ok(Json(cart_view(&state, &cart).await?))
}

async fn add_item(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiJson(req): ApiJson<AddItemRequest>,
) -> AppResult<Json<CartView>> {
    let mut cart = load_cart(&state, auth.id).await?;
    add_to_cart(&state, &mut cart, req.product_id, req.quantity).await?;
    tracing::debug!(user_id = %auth.id, product_id = %req.product_id, quantity = req.quantity, "Cart item added");
    Ok(Json(cart_view(&state, &cart).await?))
}

/// Sets the quantity of a line; zero removes it.
async fn update_item(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(product_id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<UpdateItemRequest>,
) -> AppResult<Json<CartView>> {
    let mut cart = load_cart(&state, auth.id).await?;
    if req.quantity > 0 {
        let product = load_product(&state, product_id).await?;
        product.check_stock(req.quantity)?;
    }
    cart.update_quantity(product_id, req.quantity)?;
    state.repo::<Cart>().upsert(&cart).await?;
    Ok(Json(cart_view(&state, &cart).await?))
}

async fn remove_item(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(product_id): ApiPath<Uuid>,
) -> AppResult<Json<CartView>> {
    let mut cart = load_cart(&state, auth.id).await?;
    cart.remove_item(product_id)?;
    state.repo::<Cart>().upsert(&cart).await?;
    Ok(Json(cart_view(&state, &cart).await?))
}

async fn clear_cart(State(state): State<AppState>, auth: AuthUser) -> AppResult<StatusCode> {
    let mut cart = load_cart(&state, auth.id).await?;
    cart.clear();
    state.repo::<Cart>().upsert(&cart).await?;
    Ok(StatusCode::NO_CONTENT)
}

//! Admin product management plus public image bytes.

use axum::{
    extract::State,
    http::StatusCode,
    response::Response,
    routing::{get, patch, post},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use super::{image_response, non_blank, ApiJson, ApiPath, ApiQuery, Paginated};
use crate::auth::{AdminUser, MaybeAuthUser};
use crate::domain::aggregates::product::LOW_STOCK_THRESHOLD;
use crate::domain::aggregates::{Category, Product, ProductStatus, ProductView, Review, ShippingInfo, Specification};
use crate::domain::events::{DomainEvent, ProductEvent};
use crate::domain::value_objects::{slugify, ImageBlob, Money, Sku};
use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::store::{Filter, Pagination, Query, Repository, Sort};

pub const MAX_PRODUCT_IMAGES: usize = 10;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/products", get(list_products).post(create_product))
        .route("/api/products/:id", get(get_product).put(update_product).delete(delete_product))
        .route("/api/products/:id/images", post(add_image))
        .route("/api/products/:id/images/:index", get(get_image).delete(delete_image))
        .route("/api/products/:id/stock", patch(adjust_stock))
}

#[derive(Debug, Default, Deserialize)]
pub struct ProductListParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub search: Option<String>,
    pub status: Option<String>,
    pub category: Option<Uuid>,
    pub low_stock: Option<bool>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateProductRequest {
    #[validate(length(min = 1, max = 200, message = "name must be 1-200 characters"))]
    pub name: String,
    pub sku: Option<String>,
    #[serde(default)]
    pub description: String,
    pub price: Decimal,
    #[serde(default)]
    pub discount_percent: u8,
    pub category_id: Option<Uuid>,
    pub brand: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub stock: i64,
    #[serde(default)]
    pub status: ProductStatus,
    #[serde(default)]
    pub featured: bool,
    #[serde(default)]
    #[validate(length(max = 10, message = "at most 10 images per product"))]
    pub images: Vec<ImageBlob>,
    #[serde(default)]
    pub shipping: ShippingInfo,
    #[serde(default)]
    pub specifications: Vec<Specification>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateProductRequest {
    #[validate(length(min = 1, max = 200, message = "name must be 1-200 characters"))]
    pub name: Option<String>,
    pub sku: Option<String>,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub discount_percent: Option<u8>,
    pub category_id: Option<Uuid>,
    pub brand: Option<String>,
    pub tags: Option<Vec<String>>,
    pub stock: Option<i64>,
    pub status: Option<ProductStatus>,
    pub featured: Option<bool>,
    pub shipping: Option<ShippingInfo>,
    pub specifications: Option<Vec<Specification>>,
}

#[derive(Debug, Deserialize)]
pub struct StockAdjustment {
    pub delta: i64,
}

pub(crate) fn parse_status(value: &str) -> AppResult<ProductStatus> {
    serde_json::from_value(serde_json::Value::String(value.trim().to_lowercase()))
        .map_err(|_| AppError::validation(format!("unknown product status: {value}")))
}

pub(crate) async fn load_product(state: &AppState, id: Uuid) -> AppResult<Product> {
    state.repo::<Product>().get(id).await?.ok_or(AppError::NotFound("Product"))
}

async fn ensure_category_exists(state: &AppState, id: Option<Uuid>) -> AppResult<()> {
    if let Some(id) = id {
        if state.repo::<Category>().get(id).await?.is_none() {
            return Err(AppError::validation("category_id does not reference an existing category"));
        }
    }
    Ok(())
}

async fn ensure_slug_free(products: &Repository<Product>, slug: &str, except: Option<Uuid>) -> AppResult<()> {
    let mut filter = Filter::new().eq("slug", slug);
    if let Some(id) = except {
        filter = filter.ne("id", id);
    }
    if products.count(&filter).await? > 0 {
        return Err(AppError::Conflict("A product with this name already exists".into()));
    }
    Ok(())
}

async fn list_products(
    State(state): State<AppState>,
    _admin: AdminUser,
    ApiQuery(params): ApiQuery<ProductListParams>,
) -> AppResult<Json<Paginated<ProductView>>> {
    let pagination = Pagination::new(params.page, params.limit);
    let mut filter = Filter::new();
    if let Some(status) = non_blank(params.status) {
        filter = filter.eq("status", parse_status(&status)?);
    }
    if let Some(category) = params.category {
        filter = filter.eq("category_id", category);
    }
    if params.low_stock == Some(true) {
        filter = filter.lte("stock", Decimal::from(LOW_STOCK_THRESHOLD));
    }
    if let Some(search) = params.search {
        filter = filter.search(&["name", "sku", "description", "brand"], &search);
    }

    let query = Query::new(filter).sort(Sort::desc("created_at")).page(pagination.to_page());
    let (products, total) = state.repo::<Product>().page(&query).await?;
    let data = products.iter().map(ProductView::from).collect();
    Ok(Json(Paginated::new(data, pagination, total)))
}

/// Admins see any product; everyone else only active ones.
async fn get_product(
    State(state): State<AppState>,
    MaybeAuthUser(user): MaybeAuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> AppResult<Json<ProductView>> {
    let product = load_product(&state, id).await?;
    let is_admin = user.is_some_and(|u| u.is_admin());
    if !is_admin && !product.is_active() {
        return Err(AppError::NotFound("Product"));
    }
    Ok(Json(ProductView::from(&product)))
}

async fn create_product(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ApiJson(req): ApiJson<CreateProductRequest>,
) -> AppResult<(StatusCode, Json<ProductView>)> {
    req.validate()?;
    for image in &req.images {
        image.validate()?;
    }
    ensure_category_exists(&state, req.category_id).await?;

    let sku = match non_blank(req.sku) {
        Some(sku) => Sku::new(sku)?,
        None => Sku::generate(),
    };
    let mut product = Product::create(sku, req.name.trim(), Money::new(req.price));
    product.description = req.description;
    product.discount_percent = req.discount_percent;
    product.category_id = req.category_id;
    product.brand = non_blank(req.brand);
    product.tags = req.tags.into_iter().map(|t| t.trim().to_lowercase()).filter(|t| !t.is_empty()).collect();
    product.stock = req.stock;
    product.status = req.status;
    product.featured = req.featured;
    product.images = req.images;
    product.shipping = req.shipping;
    product.specifications = req.specifications;
    product.validate()?;

    let products = state.repo::<Product>();
    ensure_slug_free(&products, &product.slug, None).await?;
    products.insert(&product).await?;
    tracing::info!(product_id = %product.id, sku = %product.sku, admin_id = %admin.id, "Product created");

    state
        .events
        .publish(DomainEvent::Product(ProductEvent::Created { product_id: product.id, sku: product.sku.to_string() }))
        .await;
    Ok((StatusCode::CREATED, Json(ProductView::from(&product))))
}

async fn update_product(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<UpdateProductRequest>,
) -> AppResult<Json<ProductView>> {
    req.validate()?;
    let products = state.repo::<Product>();
    let mut product = load_product(&state, id).await?;

    if let Some(name) = req.name {
        let name = name.trim().to_string();
        let slug = slugify(&name);
        if slug != product.slug {
            ensure_slug_free(&products, &slug, Some(product.id)).await?;
        }
        product.name = name;
        product.slug = slug;
    }
    if let Some(sku) = non_blank(req.sku) {
        product.sku = Sku::new(sku)?;
    }
    if let Some(description) = req.description {
        product.description = description;
    }
    if let Some(price) = req.price {
        product.price = Money::new(price);
    }
    if let Some(discount) = req.discount_percent {
        product.discount_percent = discount;
    }
    if req.category_id.is_some() {
        ensure_category_exists(&state, req.category_id).await?;
        product.category_id = req.category_id;
    }
    if let Some(brand) = req.brand {
        product.brand = non_blank(Some(brand));
    }
    if let Some(tags) = req.tags {
        product.tags = tags.into_iter().map(|t| t.trim().to_lowercase()).filter(|t| !t.is_empty()).collect();
    }
    if let Some(stock) = req.stock {
        product.stock = stock;
    }
    if let Some(status) = req.status {
        product.status = status;
    }
    if let Some(featured) = req.featured {
        product.featured = featured;
    }
    if let Some(shipping) = req.shipping {
        product.shipping = shipping;
    }
    if let Some(specifications) = req.specifications {
        product.specifications = specifications;
    }
    product.validate()?;
    product.touch();

    if !products.save(&product).await? {
        return Err(AppError::NotFound("Product"));
    }
    tracing::info!(product_id = %product.id, admin_id = %admin.id, "Product updated");
    Ok(Json(ProductView::from(&product)))
}

/// Removes the product and every review written for it.
async fn delete_product(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ApiPath(id): ApiPath<Uuid>,
) -> AppResult<StatusCode> {
    if !state.repo::<Product>().delete(id).await? {
        return Err(AppError::NotFound("Product"));
    }

    let reviews = state.repo::<Review>();
    let orphaned = reviews.find(&Query::new(Filter::new().eq("product_id", id))).await?;
    for review in &orphaned {
        reviews.delete(review.id).await?;
    }
    tracing::info!(product_id = %id, admin_id = %admin.id, reviews_removed = orphaned.len(), "Product deleted");

    state.events.publish(DomainEvent::Product(ProductEvent::Deleted { product_id: id })).await;
    Ok(StatusCode::NO_CONTENT)
}

async fn add_image(
    State(state): State<AppState>,
    _admin: AdminUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(image): ApiJson<ImageBlob>,
) -> AppResult<(StatusCode, Json<ProductView>)> {
    image.validate()?;
    let mut product = load_product(&state, id).await?;
    if product.images.len() >= MAX_PRODUCT_IMAGES {
        return Err(AppError::validation(format!("at most {MAX_PRODUCT_IMAGES} images per product")));
    }
    product.images.push(image);
    product.touch();
    state.repo::<Product>().save(&product).await?;
    Ok((StatusCode::CREATED, Json(ProductView::from(&product))))
}

async fn delete_image(
    State(state): State<AppState>,
    _admin: AdminUser,
    ApiPath((id, index)): ApiPath<(Uuid, usize)>,
) -> AppResult<Json<ProductView>> {
    let mut product = load_product(&state, id).await?;
    if index >= product.images.len() {
        return Err(AppError::NotFound("Image"));
    }
    product.images.remove(index);
    product.touch();
    state.repo::<Product>().save(&product).await?;
    Ok(Json(ProductView::from(&product)))
}

async fn get_image(State(state): State<AppState>, ApiPath((id, index)): ApiPath<(Uuid, usize)>) -> AppResult<Response> {
    let product = load_product(&state, id).await?;
    let image = product.images.get(index).ok_or(AppError::NotFound("Image"))?;
    Ok(image_response(image))
}

/// Applies a relative stock change atomically; stock never drops below zero.
async fn adjust_stock(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<StockAdjustment>,
) -> AppResult<Json<ProductView>> {
    let products = state.repo::<Product>();
    let current = load_product(&state, id).await?;
    if !products.increment(id, "stock", req.delta, Some(0)).await? {
        return Err(AppError::Conflict(format!("Stock for {} cannot go below zero", current.name)));
    }
    let product = load_product(&state, id).await?;
    tracing::info!(product_id = %id, delta = req.delta, stock = product.stock, admin_id = %admin.id, "Stock adjusted");

    state.events.publish(DomainEvent::Product(ProductEvent::StockAdjusted { product_id: id, delta: req.delta })).await;
    Ok(Json(ProductView::from(&product)))
}

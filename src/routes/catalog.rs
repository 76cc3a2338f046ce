//! Customer-facing catalog: active products only.

use axum::{extract::State, routing::get, Json, Router};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use super::{non_blank, ApiPath, ApiQuery, Paginated};
use crate::domain::aggregates::{Category, Product, ProductStatus, ProductView};
use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::store::{Filter, Page, Pagination, Query, Sort};

pub const RELATED_LIMIT: u64 = 4;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/shop/products", get(browse))
        .route("/api/shop/products/:id", get(product_detail))
        .route("/api/shop/products/:id/related", get(related))
}

#[derive(Debug, Default, Deserialize)]
pub struct CatalogParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub search: Option<String>,
    /// Category id or slug.
    pub category: Option<String>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub featured: Option<bool>,
    /// Minimum average rating.
    pub rating: Option<Decimal>,
    pub sort: Option<String>,
}

pub(crate) fn catalog_sort(sort: Option<&str>) -> AppResult<Sort> {
    match sort.unwrap_or("newest") {
        "newest" => Ok(Sort::desc("created_at")),
        "price_asc" => Ok(Sort::asc("price")),
        "price_desc" => Ok(Sort::desc("price")),
        "rating" => Ok(Sort::desc("rating.average")),
        "name" => Ok(Sort::asc("name")),
        other => Err(AppError::validation(format!("unknown sort: {other}"))),
    }
}

fn active() -> Filter { Filter::new().eq("status", ProductStatus::Active) }

async fn resolve_category(state: &AppState, key: &str) -> AppResult<Option<Uuid>> {
    if let Ok(id) = key.parse::<Uuid>() {
        return Ok(Some(id));
    }
    let category = state.repo::<Category>().find_one(Filter::new().eq("slug", key.to_lowercase())).await?;
    Ok(category.map(|c| c.id))
}

async fn browse(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<CatalogParams>,
) -> AppResult<Json<Paginated<ProductView>>> {
    let pagination = Pagination::new(params.page, params.limit);
    let sort = catalog_sort(non_blank(params.sort).as_deref())?;

    let mut filter = active();
    if let Some(key) = non_blank(params.category) {
        match resolve_category(&state, &key).await? {
            Some(id) => filter = filter.eq("category_id", id),
            None => return Ok(Json(Paginated::new(Vec::new(), pagination, 0))),
        }
    }
    if let Some(min) = params.min_price {
        filter = filter.gte("price", min);
    }
    if let Some(max) = params.max_price {
        filter = filter.lte("price", max);
    }
    if params.featured == Some(true) {
        filter = filter.eq("featured", true);
    }
    if let Some(rating) = params.rating {
        filter = filter.gte("rating.average", rating);
    }
    if let Some(search) = params.search {
        filter = filter.search(&["name", "description", "brand", "tags"], &search);
    }

    let query = Query::new(filter).sort(sort).page(pagination.to_page());
    let (products, total) = state.repo::<Product>().page(&query).await?;
    Ok(Json(Paginated::new(products.iter().map(ProductView::from).collect(), pagination, total)))
}

async fn find_active(state: &AppState, key: &str) -> AppResult<Product> {
    let products = state.repo::<Product>();
    let product = match key.parse::<Uuid>() {
        Ok(id) => products.get(id).await?,
        Err(_) => products.find_one(active().eq("slug", key.to_lowercase())).await?,
    };
    product.filter(Product::is_active).ok_or(AppError::NotFound("Product"))
}

async fn product_detail(State(state): State<AppState>, ApiPath(key): ApiPath<String>) -> AppResult<Json<ProductView>> {
    let product = find_active(&state, &key).await?;
    Ok(Json(ProductView::from(&product)))
}

/// Up to four other active products from the same category, best rated first.
async fn related(State(state): State<AppState>, ApiPath(key): ApiPath<String>) -> AppResult<Json<Vec<ProductView>>> {
    let product = find_active(&state, &key).await?;
    let Some(category_id) = product.category_id else { return Ok(Json(Vec::new())) };

    let query = Query::new(active().eq("category_id", category_id).ne("id", product.id))
        .sort(Sort::desc("rating.average"))
        .page(Page { skip: 0, limit: RELATED_LIMIT });
    let products = state.repo::<Product>().find(&query).await?;
    Ok(Json(products.iter().map(ProductView::from).collect()))
}

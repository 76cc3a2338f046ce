//! Category listing and admin management.

use std::collections::HashSet;

use axum::{
    extract::State,
    http::StatusCode,
    response::Response,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::{image_response, non_blank, ApiJson, ApiPath};
use crate::auth::AdminUser;
use crate::domain::aggregates::{Category, Product, ProductStatus};
use crate::domain::value_objects::{slugify, ImageBlob};
use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::store::{Filter, Query, Sort};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/categories", get(list_categories).post(create_category))
        .route("/api/categories/:id", get(get_category).put(update_category).delete(delete_category))
        .route("/api/categories/:id/image", get(get_image))
}

#[derive(Debug, Serialize)]
pub struct CategoryView {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub parent_id: Option<Uuid>,
    pub image_url: Option<String>,
    pub product_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CategoryView {
    fn new(c: &Category, product_count: u64) -> Self {
        Self {
            id: c.id, name: c.name.clone(), slug: c.slug.clone(), description: c.description.clone(), parent_id: c.parent_id,
            image_url: c.image.as_ref().map(|_| format!("/api/categories/{}/image", c.id)),
            product_count, created_at: c.created_at, updated_at: c.updated_at,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CategoryRequest {
    #[validate(length(min = 1, max = 100, message = "name must be 1-100 characters"))]
    pub name: Option<String>,
    pub description: Option<String>,
    pub parent_id: Option<Uuid>,
    pub image: Option<ImageBlob>,
}

async fn active_product_count(state: &AppState, id: Uuid) -> AppResult<u64> {
    let filter = Filter::new().eq("category_id", id).eq("status", ProductStatus::Active);
    Ok(state.repo::<Product>().count(&filter).await?)
}

async fn load(state: &AppState, id: Uuid) -> AppResult<Category> {
    state.repo::<Category>().get(id).await?.ok_or(AppError::NotFound("Category"))
}

async fn ensure_slug_free(state: &AppState, slug: &str, except: Option<Uuid>) -> AppResult<()> {
    let mut filter = Filter::new().eq("slug", slug);
    if let Some(id) = except {
        filter = filter.ne("id", id);
    }
    if state.repo::<Category>().count(&filter).await? > 0 {
        return Err(AppError::Conflict("A category with this name already exists".into()));
    }
    Ok(())
}

async fn list_categories(State(state): State<AppState>) -> AppResult<Json<Vec<CategoryView>>> {
    let categories = state.repo::<Category>().find(&Query::all().sort(Sort::asc("name"))).await?;
    let mut views = Vec::with_capacity(categories.len());
    for category in &categories {
        views.push(CategoryView::new(category, active_product_count(&state, category.id).await?));
    }
    Ok(Json(views))
}

async fn get_category(State(state): State<AppState>, ApiPath(id): ApiPath<Uuid>) -> AppResult<Json<CategoryView>> {
    let category = load(&state, id).await?;
    let count = active_product_count(&state, id).await?;
    Ok(Json(CategoryView::new(&category, count)))
}

async fn get_image(State(state): State<AppState>, ApiPath(id): ApiPath<Uuid>) -> AppResult<Response> {
    let category = load(&state, id).await?;
    let image = category.image.as_ref().ok_or(AppError::NotFound("Image"))?;
    Ok(image_response(image))
}

async fn create_category(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ApiJson(req): ApiJson<CategoryRequest>,
) -> AppResult<(StatusCode, Json<CategoryView>)> {
    req.validate()?;
    let name = non_blank(req.name).ok_or_else(|| AppError::validation("name is required"))?;
    if let Some(parent) = req.parent_id {
        load(&state, parent).await?;
    }
    if let Some(image) = &req.image {
        image.validate()?;
    }

    let mut category = Category::create(name, non_blank(req.description), req.parent_id);
    if category.slug.is_empty() {
        return Err(AppError::validation("name must contain letters or digits"));
    }
    category.image = req.image;
    ensure_slug_free(&state, &category.slug, None).await?;
    state.repo::<Category>().insert(&category).await?;
    tracing::info!(category_id = %category.id, slug = %category.slug, admin_id = %admin.id, "Category created");
    Ok((StatusCode::CREATED, Json(CategoryView::new(&category, 0))))
}

async fn update_category(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<CategoryRequest>,
) -> AppResult<Json<CategoryView>> {
    req.validate()?;
    let mut category = load(&state, id).await?;

    if let Some(name) = non_blank(req.name) {
        let slug = slugify(&name);
        if slug.is_empty() {
            return Err(AppError::validation("name must contain letters or digits"));
        }
        if slug != category.slug {
            ensure_slug_free(&state, &slug, Some(id)).await?;
        }
        category.rename(name);
    }
    if let Some(description) = req.description {
        category.description = non_blank(Some(description));
    }
    if let Some(parent) = req.parent_id {
        if parent == id {
            return Err(AppError::validation("a category cannot be its own parent"));
        }
        ensure_not_descendant(&state, id, parent).await?;
        category.parent_id = Some(parent);
    }
    if let Some(image) = req.image {
        image.validate()?;
        category.image = Some(image);
    }
    category.touch();
    state.repo::<Category>().save(&category).await?;
    tracing::info!(category_id = %id, admin_id = %admin.id, "Category updated");

    let count = active_product_count(&state, id).await?;
    Ok(Json(CategoryView::new(&category, count)))
}

/// Walks up from `parent` and refuses when the chain reaches `id`.
async fn ensure_not_descendant(state: &AppState, id: Uuid, parent: Uuid) -> AppResult<()> {
    let mut seen = HashSet::new();
    let mut next = Some(parent);
    while let Some(current) = next {
        if current == id {
            return Err(AppError::validation("a category cannot be moved under one of its own descendants"));
        }
        if !seen.insert(current) {
            break;
        }
        next = load(state, current).await?.parent_id;
    }
    Ok(())
}

/// Refused while any product or child category still points at it.
async fn delete_category(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ApiPath(id): ApiPath<Uuid>,
) -> AppResult<StatusCode> {
    load(&state, id).await?;
    let products = state.repo::<Product>().count(&Filter::new().eq("category_id", id)).await?;
    if products > 0 {
        return Err(AppError::Conflict(format!("Category is used by {products} product(s)")));
    }
    let children = state.repo::<Category>().count(&Filter::new().eq("parent_id", id)).await?;
    if children > 0 {
        return Err(AppError::Conflict("Category has subcategories".into()));
    }

    state.repo::<Category>().delete(id).await?;
    tracing::info!(category_id = %id, admin_id = %admin.id, "Category deleted");
    Ok(StatusCode::NO_CONTENT)
}

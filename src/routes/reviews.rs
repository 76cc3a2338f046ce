//! Product reviews and the rating summary kept on each product.

use axum::{
    extract::State,
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use super::products::load_product;
use super::{non_blank, ApiJson, ApiPath, ApiQuery, Paginated};
use crate::auth::AuthUser;
use crate::domain::aggregates::{Product, RatingSummary, Review, User};
use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::store::{Filter, Pagination, Query, Sort};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/products/:id/reviews", get(list_for_product))
        .route("/api/reviews", post(create_review))
        .route("/api/reviews/:id", delete(delete_review))
}

#[derive(Debug, Default, Deserialize)]
pub struct ReviewListParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateReviewRequest {
    pub product_id: Uuid,
    #[validate(range(min = 1, max = 5, message = "rating must be between 1 and 5"))]
    pub rating: u8,
    #[validate(length(max = 200, message = "title must be at most 200 characters"))]
    pub title: Option<String>,
    #[validate(length(min = 1, max = 2000, message = "comment must be 1-2000 characters"))]
    pub comment: String,
}

/// Recomputes the product's rating summary from all of its reviews.
async fn refresh_rating(state: &AppState, product_id: Uuid) -> AppResult<()> {
    let reviews = state.repo::<Review>().find(&Query::new(Filter::new().eq("product_id", product_id))).await?;
    let ratings: Vec<u8> = reviews.iter().map(|r| r.rating).collect();

    let products = state.repo::<Product>();
    if let Some(mut product) = products.get(product_id).await? {
        product.rating = RatingSummary::from_ratings(&ratings);
        products.save(&product).await?;
    }
    Ok(())
}

async fn list_for_product(
    State(state): State<AppState>,
    ApiPath(product_id): ApiPath<Uuid>,
    ApiQuery(params): ApiQuery<ReviewListParams>,
) -> AppResult<Json<Paginated<Review>>> {
    load_product(&state, product_id).await?;
    let pagination = Pagination::new(params.page, params.limit);
    let query = Query::new(Filter::new().eq("product_id", product_id))
        .sort(Sort::desc("created_at"))
        .page(pagination.to_page());
    let (reviews, total) = state.repo::<Review>().page(&query).await?;
    Ok(Json(Paginated::new(reviews, pagination, total)))
}

async fn create_review(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiJson(req): ApiJson<CreateReviewRequest>,
) -> AppResult<(StatusCode, Json<Review>)> {
    req.validate()?;
    load_product(&state, req.product_id).await?;
    let user = state.repo::<User>().get(auth.id).await?.ok_or(AppError::NotFound("User"))?;

    let reviews = state.repo::<Review>();
    let existing = Filter::new().eq("product_id", req.product_id).eq("user_id", auth.id);
    if reviews.count(&existing).await? > 0 {
        return Err(AppError::Conflict("You have already reviewed this product".into()));
    }

    let review = Review::create(req.product_id, auth.id, user.name, req.rating, non_blank(req.title), req.comment.trim());
    reviews.insert(&review).await?;
    refresh_rating(&state, review.product_id).await?;
    tracing::info!(review_id = %review.id, product_id = %review.product_id, rating = review.rating, "Review created");
    Ok((StatusCode::CREATED, Json(review)))
}

/// Authors may delete their own reviews; admins may delete any.
async fn delete_review(State(state): State<AppState>, auth: AuthUser, ApiPath(id): ApiPath<Uuid>) -> AppResult<StatusCode> {
    let reviews = state.repo::<Review>();
    let review = reviews.get(id).await?.ok_or(AppError::NotFound("Review"))?;
    auth.ensure_can_access(review.user_id)?;

    reviews.delete(id).await?;
    refresh_rating(&state, review.product_id).await?;
    tracing::info!(review_id = %id, product_id = %review.product_id, "Review deleted");
    Ok(StatusCode::NO_CONTENT)
}

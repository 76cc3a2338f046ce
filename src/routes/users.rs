//! Own profile and avatar.

use axum::{
    extract::State,
    response::Response,
    routing::{get, put},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use super::{image_response, non_blank, ApiJson, ApiPath};
use crate::auth::AuthUser;
use crate::domain::aggregates::{Address, NotificationPreferences, User, UserProfile};
use crate::domain::value_objects::ImageBlob;
use crate::error::{AppError, AppResult};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/users/me", get(get_profile).put(update_profile))
        .route("/api/users/me/avatar", put(upload_avatar).get(own_avatar))
        .route("/api/users/:id/avatar", get(user_avatar))
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 100, message = "name must be 1-100 characters"))]
    pub name: Option<String>,
    #[validate(length(max = 30, message = "phone must be at most 30 characters"))]
    pub phone: Option<String>,
    pub default_address: Option<Address>,
    pub notifications: Option<NotificationPreferences>,
}

async fn load_user(state: &AppState, id: Uuid) -> AppResult<User> {
    state.repo::<User>().get(id).await?.ok_or(AppError::NotFound("User"))
}

async fn get_profile(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<UserProfile>> {
    let user = load_user(&state, auth.id).await?;
    Ok(Json(UserProfile::from(&user)))
}

async fn update_profile(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiJson(req): ApiJson<UpdateProfileRequest>,
) -> AppResult<Json<UserProfile>> {
    req.validate()?;
    let mut user = load_user(&state, auth.id).await?;

    if let Some(name) = non_blank(req.name) {
        user.name = name;
    }
    if let Some(phone) = req.phone {
        user.phone = non_blank(Some(phone));
    }
    if let Some(address) = req.default_address {
        address.validate()?;
        user.default_address = Some(address);
    }
    if let Some(notifications) = req.notifications {
        user.notifications = notifications;
    }
    user.touch();
    state.repo::<User>().save(&user).await?;
    tracing::info!(user_id = %user.id, "Profile updated");
    Ok(Json(UserProfile::from(&user)))
}

async fn upload_avatar(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiJson(image): ApiJson<ImageBlob>,
) -> AppResult<Json<UserProfile>> {
    image.validate()?;
    let mut user = load_user(&state, auth.id).await?;
    user.avatar = Some(image);
    user.touch();
    state.repo::<User>().save(&user).await?;
    Ok(Json(UserProfile::from(&user)))
}

async fn avatar_response(state: &AppState, id: Uuid) -> AppResult<Response> {
    let user = load_user(state, id).await?;
    let avatar = user.avatar.as_ref().ok_or(AppError::NotFound("Avatar"))?;
    Ok(image_response(avatar))
}

async fn own_avatar(State(state): State<AppState>, auth: AuthUser) -> AppResult<Response> {
    avatar_response(&state, auth.id).await
}

async fn user_avatar(State(state): State<AppState>, ApiPath(id): ApiPath<Uuid>) -> AppResult<Response> {
    avatar_response(&state, id).await
}

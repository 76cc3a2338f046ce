//! Registration, login and password management.

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use validator::Validate;

use super::ApiJson;
use crate::auth::{hash_password, validate_password, verify_password, AuthError, AuthUser};
use crate::domain::aggregates::{Role, User, UserProfile};
use crate::domain::value_objects::Email;
use crate::error::{AppError, AppResult};
use crate::services::mail;
use crate::state::AppState;
use crate::store::Filter;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/auth/me", get(me))
        .route("/api/auth/change-password", post(change_password))
}

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 100, message = "name is required"))]
    pub name: String,
    #[validate(email(message = "email must be valid"))]
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub user: UserProfile,
}

fn auth_response(state: &AppState, user: &User) -> AppResult<AuthResponse> {
    Ok(AuthResponse {
        token: state.tokens.issue(user.id, user.role)?,
        token_type: "Bearer",
        expires_in: state.tokens.ttl_seconds(),
        user: UserProfile::from(user),
    })
}

async fn register(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    req.validate()?;
    validate_password(&req.password)?;
    let email = Email::parse(&req.email)?;

    let users = state.repo::<User>();
    if users.find_one(Filter::new().eq("email", email.as_str())).await?.is_some() {
        return Err(AppError::Conflict("Email is already registered".into()));
    }

    let user = User::create(email, req.name.trim(), hash_password(&req.password).await?, Role::Customer);
    users.insert(&user).await?;
    tracing::info!(user_id = %user.id, "User registered");

    mail::deliver(state.mailer.as_ref(), user.email.as_str(), mail::welcome(&user.name)).await;
    Ok((StatusCode::CREATED, Json(auth_response(&state, &user)?)))
}

async fn login(State(state): State<AppState>, ApiJson(req): ApiJson<LoginRequest>) -> AppResult<Json<AuthResponse>> {
    let email = Email::parse(&req.email).map_err(|_| AuthError::InvalidCredentials)?;
    let users = state.repo::<User>();
    let mut user = users
        .find_one(Filter::new().eq("email", email.as_str()))
        .await?
        .ok_or(AuthError::InvalidCredentials)?;

    if verify_password(&req.password, &user.password_hash).await.is_err() {
        tracing::warn!(user_id = %user.id, "Failed login attempt");
        return Err(AuthError::InvalidCredentials.into());
    }

    user.last_login_at = Some(Utc::now());
    users.save(&user).await?;
    Ok(Json(auth_response(&state, &user)?))
}

async fn me(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<UserProfile>> {
    let user = state.repo::<User>().get(auth.id).await?.ok_or(AppError::NotFound("User"))?;
    Ok(Json(UserProfile::from(&user)))
}

async fn change_password(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiJson(req): ApiJson<ChangePasswordRequest>,
) -> AppResult<Json<Value>> {
    let users = state.repo::<User>();
    let mut user = users.get(auth.id).await?.ok_or(AppError::NotFound("User"))?;

    if verify_password(&req.current_password, &user.password_hash).await.is_err() {
        return Err(AppError::validation("Current password is incorrect"));
    }
    validate_password(&req.new_password)?;

    user.password_hash = hash_password(&req.new_password).await?;
    user.touch();
    users.save(&user).await?;
    tracing::info!(user_id = %user.id, "Password changed");
    Ok(Json(json!({ "message": "Password updated" })))
}

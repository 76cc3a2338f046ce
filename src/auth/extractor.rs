//! Request extractors for authenticated callers.

use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use tracing::warn;
use uuid::Uuid;

use super::{AuthError, TokenService};
use crate::domain::aggregates::{Role, User};
use crate::error::AppError;
use crate::store::{DocumentStore, Repository};

/// Caller identified by a valid bearer token. The role is the account's
/// current role in the store, not the one the token was issued with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser {
    pub id: Uuid,
    pub role: Role,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool { self.role == Role::Admin }

    /// Owners and admins may read a resource belonging to `owner`.
    pub fn ensure_can_access(&self, owner: Uuid) -> Result<(), AppError> {
        if self.id == owner || self.is_admin() { Ok(()) } else { Err(AppError::Forbidden("Not allowed to access this resource".into())) }
    }
}

/// Caller with the admin role.
#[derive(Debug, Clone, Copy)]
pub struct AdminUser(pub AuthUser);

/// Caller that may or may not have sent a token. Invalid tokens still reject.
#[derive(Debug, Clone, Copy)]
pub struct MaybeAuthUser(pub Option<AuthUser>);

fn bearer_token(parts: &Parts) -> Result<Option<&str>, AuthError> {
    let Some(header) = parts.headers.get(AUTHORIZATION) else { return Ok(None) };
    let value = header.to_str().map_err(|_| AuthError::InvalidAuthScheme)?;
    match value.split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("Bearer") && !token.trim().is_empty() => Ok(Some(token.trim())),
        _ => Err(AuthError::InvalidAuthScheme),
    }
}

async fn authenticate<S>(parts: &Parts, state: &S) -> Result<Option<AuthUser>, AppError>
where
    S: Sync,
    Arc<TokenService>: FromRef<S>,
    Arc<dyn DocumentStore>: FromRef<S>,
{
    let Some(token) = bearer_token(parts)? else { return Ok(None) };
    let tokens = Arc::<TokenService>::from_ref(state);
    let claims = tokens.verify(token).inspect_err(|e| warn!(uri = %parts.uri, error = %e, "Rejected bearer token"))?;

    let users: Repository<User> = Repository::new(Arc::<dyn DocumentStore>::from_ref(state));
    let Some(user) = users.get(claims.sub).await? else {
        warn!(user_id = %claims.sub, uri = %parts.uri, "Token for a deleted account");
        return Err(AuthError::InvalidToken("account no longer exists".into()).into());
    };
    if user.role != claims.role {
        warn!(user_id = %user.id, token_role = ?claims.role, role = ?user.role, "Token role is stale");
    }
    Ok(Some(AuthUser { id: user.id, role: user.role }))
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    Arc<TokenService>: FromRef<S>,
    Arc<dyn DocumentStore>: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        authenticate(parts, state).await?.ok_or_else(|| AuthError::MissingToken.into())
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
    Arc<TokenService>: FromRef<S>,
    Arc<dyn DocumentStore>: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            warn!(user_id = %user.id, uri = %parts.uri, "Admin route refused");
            return Err(AuthError::AdminRequired.into());
        }
        Ok(AdminUser(user))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for MaybeAuthUser
where
    S: Send + Sync,
    Arc<TokenService>: FromRef<S>,
    Arc<dyn DocumentStore>: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeAuthUser(authenticate(parts, state).await?))
    }
}

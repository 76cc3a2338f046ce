//! Shared application state handed to every handler.

use std::sync::Arc;

use axum::extract::FromRef;
use secrecy::ExposeSecret;

use crate::auth::{hash_password, validate_password, TokenService};
use crate::config::AdminBootstrap;
use crate::domain::aggregates::{Role, User};
use crate::domain::value_objects::Email;
use crate::error::AppResult;
use crate::services::mail::Mailer;
use crate::services::payments::PaymentGateway;
use crate::services::EventPublisher;
use crate::store::{Document, DocumentStore, Filter, Repository};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    pub tokens: Arc<TokenService>,
    pub payments: Arc<dyn PaymentGateway>,
    pub mailer: Arc<dyn Mailer>,
    pub events: EventPublisher,
}

impl FromRef<AppState> for Arc<TokenService> {
    fn from_ref(state: &AppState) -> Self { state.tokens.clone() }
}

impl FromRef<AppState> for Arc<dyn DocumentStore> {
    fn from_ref(state: &AppState) -> Self { state.store.clone() }
}

impl AppState {
    pub fn repo<T: Document>(&self) -> Repository<T> { Repository::new(self.store.clone()) }

    /// Creates the configured admin account, or promotes it if the email is already registered.
    pub async fn bootstrap_admin(&self, admin: &AdminBootstrap) -> AppResult<()> {
        let email = Email::parse(&admin.email)?;
        let users = self.repo::<User>();
        match users.find_one(Filter::new().eq("email", email.as_str())).await? {
            Some(mut user) if !user.is_admin() => {
                user.role = Role::Admin;
                user.touch();
                users.save(&user).await?;
                tracing::info!(email = %email, "Promoted existing user to admin");
            }
            Some(_) => {}
            None => {
                let password = admin.password.expose_secret();
                validate_password(password)?;
                let user = User::create(email.clone(), "Administrator", hash_password(password).await?, Role::Admin);
                users.insert(&user).await?;
                tracing::info!(email = %email, "Created admin account");
            }
        }
        Ok(())
    }
}

//! Storefront API server

use std::sync::Arc;

use anyhow::{Context, Result};
use secrecy::ExposeSecret;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use storefront_api::auth::TokenService;
use storefront_api::config::{AppConfig, StoreBackend};
use storefront_api::services::{DisabledGateway, EventPublisher, LogMailer, Mailer, PaymentGateway, SmtpMailer, StripeGateway};
use storefront_api::store::{DocumentStore, MemoryDocumentStore, PgDocumentStore};
use storefront_api::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;

    let store: Arc<dyn DocumentStore> = match config.store {
        StoreBackend::Postgres => {
            let url = config.database_url.as_ref().context("DATABASE_URL is required for the postgres store")?;
            let pool = PgPoolOptions::new().max_connections(10).connect(url.expose_secret()).await?;
            sqlx::migrate!("./migrations").run(&pool).await?;
            Arc::new(PgDocumentStore::new(pool))
        }
        StoreBackend::Memory => {
            tracing::warn!("Using the in-memory store; data is lost on restart");
            Arc::new(MemoryDocumentStore::new())
        }
    };

    let payments: Arc<dyn PaymentGateway> = match &config.payments {
        Some(payments) => Arc::new(StripeGateway::new(payments)),
        None => {
            tracing::warn!("STRIPE_SECRET_KEY not set; payment endpoints will return 503");
            Arc::new(DisabledGateway)
        }
    };
    let mailer: Arc<dyn Mailer> = match &config.smtp {
        Some(smtp) => Arc::new(SmtpMailer::new(smtp)?),
        None => Arc::new(LogMailer),
    };

    let state = AppState {
        store,
        tokens: Arc::new(TokenService::from_config(&config.jwt)),
        payments,
        mailer,
        events: EventPublisher::connect(config.nats_url.as_deref()).await,
    };
    if let Some(admin) = &config.admin {
        state.bootstrap_admin(admin).await?;
    }

    let app = storefront_api::app(state, config.cors_origin.as_deref());
    let addr = config.socket_addr();
    tracing::info!(%addr, "Storefront API listening");
    axum::serve(tokio::net::TcpListener::bind(addr).await?, app).await?;
    Ok(())
}

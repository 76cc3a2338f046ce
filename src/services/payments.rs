//! Hosted payment processor client (Stripe REST API) and webhook verification.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::PaymentsConfig;
use crate::domain::value_objects::Money;

type HmacSha256 = Hmac<Sha256>;

/// Signed webhook timestamps older than this are rejected.
pub const WEBHOOK_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("payment processor is not configured")]
    NotConfigured,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("processor returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("invalid webhook signature: {0}")]
    InvalidSignature(String),

    #[error("malformed payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Processor-side payment intent.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub client_secret: Option<String>,
    pub status: String,
    pub amount: i64,
    pub currency: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub last_payment_error: Option<PaymentFailure>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentFailure {
    pub message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct IntentRequest {
    pub order_id: Uuid,
    pub order_number: String,
    pub amount: Money,
    pub receipt_email: String,
}

/// Verified webhook event.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: WebhookData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookData {
    pub object: Value,
}

impl WebhookEvent {
    /// The payment intent carried by `payment_intent.*` events.
    pub fn payment_intent(&self) -> Result<PaymentIntent, PaymentError> {
        Ok(serde_json::from_value(self.data.object.clone())?)
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_intent(&self, request: &IntentRequest) -> Result<PaymentIntent, PaymentError>;

    async fn retrieve_intent(&self, intent_id: &str) -> Result<PaymentIntent, PaymentError>;

    /// Refunds the full captured amount of the intent.
    async fn refund(&self, intent_id: &str) -> Result<(), PaymentError>;

    /// Voids an intent that has not been paid yet.
    async fn cancel_intent(&self, intent_id: &str) -> Result<(), PaymentError>;

    /// Checks the signature header and parses the event body.
    fn verify_webhook(&self, payload: &[u8], signature_header: &str) -> Result<WebhookEvent, PaymentError>;
}

/// Verifies a `t=<unix>,v1=<hex hmac>` signature over `"{t}.{payload}"`.
pub fn verify_signature(payload: &[u8], header: &str, secret: &str, now: i64) -> Result<(), PaymentError> {
    let mut timestamp: Option<i64> = None;
    let mut signatures: Vec<&str> = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", v)) => timestamp = v.parse().ok(),
            Some(("v1", v)) => signatures.push(v),
            _ => {}
        }
    }
    let timestamp = timestamp.ok_or_else(|| PaymentError::InvalidSignature("missing timestamp".into()))?;
    if signatures.is_empty() {
        return Err(PaymentError::InvalidSignature("missing v1 signature".into()));
    }
    if now.abs_diff(timestamp) > WEBHOOK_TOLERANCE_SECS.unsigned_abs() {
        return Err(PaymentError::InvalidSignature("timestamp outside tolerance".into()));
    }

    let matched = signatures.iter().any(|candidate| {
        let Ok(expected) = hex::decode(candidate) else { return false };
        signed_mac(payload, secret, timestamp).is_ok_and(|mac| mac.verify_slice(&expected).is_ok())
    });
    if matched { Ok(()) } else { Err(PaymentError::InvalidSignature("no matching signature".into())) }
}

/// Builds the header value a processor would send for `payload`.
pub fn sign_payload(payload: &[u8], secret: &str, timestamp: i64) -> Result<String, PaymentError> {
    let mac = signed_mac(payload, secret, timestamp)?;
    Ok(format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes())))
}

fn signed_mac(payload: &[u8], secret: &str, timestamp: i64) -> Result<HmacSha256, PaymentError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| PaymentError::InvalidSignature(e.to_string()))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac)
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: Option<String>,
}

pub struct StripeGateway {
    http: Client,
    api_base: String,
    secret_key: SecretString,
    webhook_secret: SecretString,
}

impl StripeGateway {
    pub fn new(config: &PaymentsConfig) -> Self {
        Self {
            http: Client::new(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            secret_key: config.secret_key.clone(),
            webhook_secret: config.webhook_secret.clone(),
        }
    }

    async fn parse<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T, PaymentError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }
        let message = response
            .json::<ApiErrorBody>()
            .await
            .ok()
            .and_then(|b| b.error.message)
            .unwrap_or_else(|| status.to_string());
        warn!(status = %status.as_u16(), message = %message, "Payment processor request failed");
        Err(PaymentError::Api { status: status.as_u16(), message })
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_intent(&self, request: &IntentRequest) -> Result<PaymentIntent, PaymentError> {
        let amount = request.amount.cents().to_string();
        let order_id = request.order_id.to_string();
        let form = [
            ("amount", amount.as_str()),
            ("currency", "usd"),
            ("automatic_payment_methods[enabled]", "true"),
            ("receipt_email", request.receipt_email.as_str()),
            ("metadata[order_id]", order_id.as_str()),
            ("metadata[order_number]", request.order_number.as_str()),
        ];
        let response = self
            .http
            .post(format!("{}/v1/payment_intents", self.api_base))
            .bearer_auth(self.secret_key.expose_secret())
            .header("Idempotency-Key", format!("intent-{order_id}-{amount}"))
            .form(&form)
            .send()
            .await?;
        let intent: PaymentIntent = Self::parse(response).await?;
        info!(intent_id = %intent.id, order_id = %order_id, amount = %amount, "Payment intent created");
        Ok(intent)
    }

    async fn retrieve_intent(&self, intent_id: &str) -> Result<PaymentIntent, PaymentError> {
        let response = self
            .http
            .get(format!("{}/v1/payment_intents/{intent_id}", self.api_base))
            .bearer_auth(self.secret_key.expose_secret())
            .send()
            .await?;
        Self::parse(response).await
    }

    async fn refund(&self, intent_id: &str) -> Result<(), PaymentError> {
        let response = self
            .http
            .post(format!("{}/v1/refunds", self.api_base))
            .bearer_auth(self.secret_key.expose_secret())
            .form(&[("payment_intent", intent_id)])
            .send()
            .await?;
        let _: Value = Self::parse(response).await?;
        info!(intent_id = %intent_id, "Payment refunded");
        Ok(())
    }

    async fn cancel_intent(&self, intent_id: &str) -> Result<(), PaymentError> {
        let response = self
            .http
            .post(format!("{}/v1/payment_intents/{intent_id}/cancel", self.api_base))
            .bearer_auth(self.secret_key.expose_secret())
            .send()
            .await?;
        let _: Value = Self::parse(response).await?;
        info!(intent_id = %intent_id, "Payment intent cancelled");
        Ok(())
    }

    fn verify_webhook(&self, payload: &[u8], signature_header: &str) -> Result<WebhookEvent, PaymentError> {
        verify_signature(payload, signature_header, self.webhook_secret.expose_secret(), Utc::now().timestamp())?;
        Ok(serde_json::from_slice(payload)?)
    }
}

/// Used when no processor keys are configured; every call fails with 503.
pub struct DisabledGateway;

#[async_trait]
impl PaymentGateway for DisabledGateway {
    async fn create_intent(&self, _: &IntentRequest) -> Result<PaymentIntent, PaymentError> { Err(PaymentError::NotConfigured) }
    async fn retrieve_intent(&self, _: &str) -> Result<PaymentIntent, PaymentError> { Err(PaymentError::NotConfigured) }
    async fn refund(&self, _: &str) -> Result<(), PaymentError> { Err(PaymentError::NotConfigured) }
    async fn cancel_intent(&self, _: &str) -> Result<(), PaymentError> { Err(PaymentError::NotConfigured) }
    fn verify_webhook(&self, _: &[u8], _: &str) -> Result<WebhookEvent, PaymentError> { Err(PaymentError::NotConfigured) }
}

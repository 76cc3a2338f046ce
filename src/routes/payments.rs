//! Payment intents and processor webhooks.

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use super::orders::{load_order, refund};
use super::{ApiJson, ApiPath};
use crate::auth::AuthUser;
use crate::domain::aggregates::{Order, OrderStatus, Payment, PaymentIntentStatus, PaymentStatus};
use crate::domain::events::{DomainEvent, OrderEvent, PaymentEvent};
use crate::domain::value_objects::Money;
use crate::error::{AppError, AppResult};
use crate::services::payments::{IntentRequest, PaymentError, PaymentIntent, WebhookEvent};
use crate::state::AppState;
use crate::store::{Filter, Query, Sort};

pub const SIGNATURE_HEADER: &str = "stripe-signature";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/payments/intent", post(create_intent))
        .route("/api/payments/order/:order_id", get(payment_for_order))
        .route("/api/payments/webhook", post(webhook))
}

#[derive(Debug, Deserialize)]
pub struct CreateIntentRequest {
    pub order_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct IntentResponse {
    pub payment_intent_id: String,
    pub client_secret: Option<String>,
    pub amount: Money,
    pub currency: String,
}

impl From<PaymentIntent> for IntentResponse {
    fn from(intent: PaymentIntent) -> Self {
        Self {
            payment_intent_id: intent.id,
            client_secret: intent.client_secret,
            amount: Money::from_cents(intent.amount),
            currency: intent.currency,
        }
    }
}

/// Starts checkout for an order. A live intent already attached to the
/// order is handed back instead of creating another.
async fn create_intent(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiJson(req): ApiJson<CreateIntentRequest>,
) -> AppResult<Json<IntentResponse>> {
    let mut order = load_order(&state, req.order_id).await?;
    if order.user_id != auth.id {
        return Err(AppError::NotFound("Order"));
    }
    if order.payment_status == PaymentStatus::Paid || order.payment_status == PaymentStatus::Refunded {
        return Err(AppError::Conflict("Order is already paid".into()));
    }
    if order.status == OrderStatus::Cancelled {
        return Err(AppError::validation("Cancelled orders cannot be paid"));
    }

    if let Some(intent_id) = &order.payment_intent_id {
        let existing = state.payments.retrieve_intent(intent_id).await?;
        match PaymentIntentStatus::from_processor(&existing.status) {
            PaymentIntentStatus::Succeeded | PaymentIntentStatus::Processing => {
                return Err(AppError::Conflict("Payment for this order is already being processed".into()));
            }
            status if !status.is_final() => return Ok(Json(existing.into())),
            _ => {}
        }
    }

    let request = IntentRequest {
        order_id: order.id,
        order_number: order.order_number.clone(),
        amount: order.totals.total,
        receipt_email: order.email.clone(),
    };
    let intent = state.payments.create_intent(&request).await?;
    let payment = Payment::create(
        order.id,
        order.user_id,
        intent.id.clone(),
        order.totals.total,
        PaymentIntentStatus::from_processor(&intent.status),
    );
    state.repo::<Payment>().insert(&payment).await?;

    order.payment_intent_id = Some(intent.id.clone());
    order.touch();
    state.repo::<Order>().save(&order).await?;
    tracing::info!(order_id = %order.id, intent_id = %intent.id, amount = %order.totals.total, "Payment intent attached to order");
    Ok(Json(intent.into()))
}

async fn payment_for_order(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(order_id): ApiPath<Uuid>,
) -> AppResult<Json<Payment>> {
    let order = load_order(&state, order_id).await?;
    auth.ensure_can_access(order.user_id)?;
    let query = Query::new(Filter::new().eq("order_id", order_id)).sort(Sort::desc("created_at"));
    let payment = state.repo::<Payment>().find(&query).await?.into_iter().next();
    payment.map(Json).ok_or(AppError::NotFound("Payment"))
}

async fn webhook(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> AppResult<Json<Value>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| PaymentError::InvalidSignature("missing signature header".into()))?;
    let event = state.payments.verify_webhook(&body, signature).inspect_err(|e| {
        tracing::warn!(error = %e, "Rejected payment webhook");
    })?;

    match event.event_type.as_str() {
        "payment_intent.succeeded" => payment_succeeded(&state, &event).await?,
        "payment_intent.payment_failed" => payment_failed(&state, &event).await?,
        other => tracing::debug!(event_id = %event.id, event_type = %other, "Ignoring webhook event"),
    }
    Ok(Json(json!({ "received": true })))
}

async fn payment_for_intent(state: &AppState, intent: &PaymentIntent) -> AppResult<Option<Payment>> {
    let payment = state.repo::<Payment>().find_one(Filter::new().eq("intent_id", &intent.id)).await?;
    if payment.is_none() {
        tracing::warn!(intent_id = %intent.id, "Webhook for unknown payment intent");
    }
    Ok(payment)
}

async fn payment_succeeded(state: &AppState, event: &WebhookEvent) -> AppResult<()> {
    let intent = event.payment_intent()?;
    let Some(mut payment) = payment_for_intent(state, &intent).await? else { return Ok(()) };
    if matches!(payment.status, PaymentIntentStatus::Succeeded | PaymentIntentStatus::Refunded) {
        return Ok(());
    }
    payment.set_status(PaymentIntentStatus::Succeeded);
    payment.failure_message = None;
    state.repo::<Payment>().save(&payment).await?;

    let mut order = load_order(state, payment.order_id).await?;
    if order.status == OrderStatus::Cancelled {
        tracing::warn!(order_id = %order.id, intent_id = %intent.id, "Payment landed on a cancelled order; refunding");
        refund(state, &mut order, &intent.id).await?;
        state.repo::<Order>().save(&order).await?;
        return Ok(());
    }
    let previous = order.status;
    order.mark_paid()?;
    state.repo::<Order>().save(&order).await?;
    tracing::info!(order_id = %order.id, intent_id = %intent.id, "Payment succeeded");

    state
        .events
        .publish(DomainEvent::Payment(PaymentEvent::Succeeded {
            order_id: order.id,
            intent_id: intent.id.clone(),
            amount: payment.amount,
        }))
        .await;
    if order.status != previous {
        state
            .events
            .publish(DomainEvent::Order(OrderEvent::StatusChanged { order_id: order.id, from: previous, to: order.status }))
            .await;
    }
    Ok(())
}

async fn payment_failed(state: &AppState, event: &WebhookEvent) -> AppResult<()> {
    let intent = event.payment_intent()?;
    let Some(mut payment) = payment_for_intent(state, &intent).await? else { return Ok(()) };
    payment.set_status(PaymentIntentStatus::Failed);
    payment.failure_message = intent.last_payment_error.as_ref().and_then(|e| e.message.clone());
    state.repo::<Payment>().save(&payment).await?;

    let mut order = load_order(state, payment.order_id).await?;
    if order.payment_status != PaymentStatus::Paid {
        order.mark_payment_failed();
        state.repo::<Order>().save(&order).await?;
    }
    tracing::warn!(
        order_id = %order.id,
        intent_id = %intent.id,
        reason = payment.failure_message.as_deref().unwrap_or("unknown"),
        "Payment failed"
    );

    state
        .events
        .publish(DomainEvent::Payment(PaymentEvent::Failed { order_id: order.id, intent_id: intent.id.clone() }))
        .await;
    Ok(())
}

//! Order placement, customer order history and the shared status workflow.

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use super::{non_blank, ApiJson, ApiPath, ApiQuery, Paginated};
use crate::auth::AuthUser;
use crate::domain::aggregates::{
    Address, Cart, LineItem, Order, OrderError, OrderStatus, Payment, PaymentIntentStatus, PaymentStatus, Product, User,
};
use crate::domain::events::{DomainEvent, OrderEvent, PaymentEvent};
use crate::error::{AppError, AppResult};
use crate::services::mail;
use crate::state::AppState;
use crate::store::{Filter, Pagination, Query, Repository, Sort};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/orders", post(place_order).get(list_orders))
        .route("/api/orders/:id", get(get_order))
        .route("/api/orders/:id/cancel", post(cancel_order))
}

#[derive(Debug, Deserialize)]
pub struct OrderItemRequest {
    pub product_id: Uuid,
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct PlaceOrderRequest {
    /// When empty the order is built from the caller's cart.
    #[serde(default)]
    pub items: Vec<OrderItemRequest>,
    /// Falls back to the caller's default address.
    pub shipping_address: Option<Address>,
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OrderListParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub status: Option<String>,
}

pub(crate) fn parse_status(value: &str) -> AppResult<OrderStatus> {
    OrderStatus::parse(value).ok_or_else(|| AppError::validation(format!("unknown order status: {value}")))
}

pub(crate) async fn load_order(state: &AppState, id: Uuid) -> AppResult<Order> {
    state.repo::<Order>().get(id).await?.ok_or(AppError::NotFound("Order"))
}

fn line_item(product: &Product, quantity: u32) -> LineItem {
    LineItem {
        product_id: product.id,
        name: product.name.clone(),
        sku: product.sku.to_string(),
        unit_price: product.price,
        discount_percent: product.discount_percent,
        quantity,
        free_shipping: product.shipping.free_shipping,
        line_total: product.priced_line(quantity).net(),
    }
}

fn requested_quantity(quantity: i64) -> AppResult<u32> {
    if quantity <= 0 {
        return Err(AppError::validation("quantity must be at least 1"));
    }
    u32::try_from(quantity).map_err(|_| AppError::validation("quantity is too large"))
}

/// Takes each line's quantity out of stock. On the first line that cannot be
/// covered, lines already taken are put back and the order is refused.
async fn reserve_stock(products: &Repository<Product>, items: &[LineItem]) -> AppResult<()> {
    for (taken, item) in items.iter().enumerate() {
        match products.increment(item.product_id, "stock", -i64::from(item.quantity), Some(0)).await {
            Ok(true) => {}
            Ok(false) => {
                release_stock(products, &items[..taken]).await;
                return Err(AppError::Conflict(format!("Insufficient stock for {}", item.name)));
            }
            Err(e) => {
                release_stock(products, &items[..taken]).await;
                return Err(e.into());
            }
        }
    }
    Ok(())
}

/// Puts line quantities back into stock. Failures are logged, not returned.
pub(crate) async fn release_stock(products: &Repository<Product>, items: &[LineItem]) {
    for item in items {
        match products.increment(item.product_id, "stock", i64::from(item.quantity), None).await {
            Ok(true) => {}
            Ok(false) => tracing::warn!(product_id = %item.product_id, quantity = item.quantity, "Restock skipped; product no longer exists"),
            Err(e) => tracing::error!(product_id = %item.product_id, quantity = item.quantity, error = %e, "Restock failed"),
        }
    }
}

async fn place_order(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiJson(req): ApiJson<PlaceOrderRequest>,
) -> AppResult<(StatusCode, Json<Order>)> {
    let user = state.repo::<User>().get(auth.id).await?.ok_or(AppError::NotFound("User"))?;

    let from_cart = req.items.is_empty();
    let requested: Vec<(Uuid, u32)> = if from_cart {
        let cart = state.repo::<Cart>().get(auth.id).await?.unwrap_or_else(|| Cart::for_user(auth.id));
        cart.items.iter().map(|i| (i.product_id, i.quantity)).filter(|(_, q)| *q > 0).collect()
    } else {
        req.items
            .iter()
            .map(|i| requested_quantity(i.quantity).map(|q| (i.product_id, q)))
            .collect::<AppResult<_>>()?
    };
    if requested.is_empty() {
        return Err(OrderError::NoItems.into());
    }

    let address = req
        .shipping_address
        .or_else(|| user.default_address.clone())
        .ok_or_else(|| AppError::validation("shipping_address is required"))?;
    address.validate()?;

    let products = state.repo::<Product>();
    let mut items = Vec::with_capacity(requested.len());
    for (product_id, quantity) in requested {
        let product = products.get(product_id).await?.ok_or(AppError::NotFound("Product"))?;
        if !product.is_active() {
            return Err(AppError::validation(format!("{} is not available", product.name)));
        }
        product.check_stock(quantity)?;
        items.push(line_item(&product, quantity));
    }

    let order = Order::create(user.id, user.email.as_str(), items, address, non_blank(req.notes))?;
    reserve_stock(&products, &order.items).await?;
    if let Err(e) = state.repo::<Order>().insert(&order).await {
        release_stock(&products, &order.items).await;
        return Err(e.into());
    }
    tracing::info!(
        order_id = %order.id,
        order_number = %order.order_number,
        user_id = %user.id,
        total = %order.totals.total,
        items = order.items.len(),
        "Order placed"
    );

    if from_cart {
        if let Err(e) = state.repo::<Cart>().upsert(&Cart::for_user(user.id)).await {
            tracing::warn!(user_id = %user.id, error = %e, "Failed to clear cart after order");
        }
    }

    state
        .events
        .publish(DomainEvent::Order(OrderEvent::Placed {
            order_id: order.id,
            order_number: order.order_number.clone(),
            user_id: user.id,
            total: order.totals.total,
        }))
        .await;
    if user.notifications.order_updates {
        mail::deliver(state.mailer.as_ref(), &order.email, mail::order_confirmation(&order)).await;
    }
    Ok((StatusCode::CREATED, Json(order)))
}

async fn list_orders(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiQuery(params): ApiQuery<OrderListParams>,
) -> AppResult<Json<Paginated<Order>>> {
    let pagination = Pagination::new(params.page, params.limit);
    let mut filter = Filter::new().eq("user_id", auth.id);
    if let Some(status) = non_blank(params.status) {
        filter = filter.eq("status", parse_status(&status)?);
    }
    let query = Query::new(filter).sort(Sort::desc("created_at")).page(pagination.to_page());
    let (orders, total) = state.repo::<Order>().page(&query).await?;
    Ok(Json(Paginated::new(orders, pagination, total)))
}

async fn get_order(State(state): State<AppState>, auth: AuthUser, ApiPath(id): ApiPath<Uuid>) -> AppResult<Json<Order>> {
    let order = load_order(&state, id).await?;
    auth.ensure_can_access(order.user_id)?;
    Ok(Json(order))
}

async fn cancel_order(State(state): State<AppState>, auth: AuthUser, ApiPath(id): ApiPath<Uuid>) -> AppResult<Json<Order>> {
    let mut order = load_order(&state, id).await?;
    auth.ensure_can_access(order.user_id)?;
    if !order.can_customer_cancel() {
        return Err(AppError::validation("Only pending orders can be cancelled"));
    }
    change_status(&state, &mut order, OrderStatus::Cancelled, Some("Cancelled by customer".into()), None).await?;
    Ok(Json(order))
}

/// Moves an order to `next`, handling the side effects of the transition:
/// cancelling restocks every line, refunds a paid order and voids an
/// unpaid intent.
pub(crate) async fn change_status(
    state: &AppState,
    order: &mut Order,
    next: OrderStatus,
    note: Option<String>,
    tracking_number: Option<String>,
) -> AppResult<()> {
    let previous = order.status;
    if !previous.can_transition_to(next) {
        return Err(OrderError::InvalidTransition { from: previous, to: next }.into());
    }
    let mut refunded = false;
    if next == OrderStatus::Cancelled {
        match (order.payment_status, order.payment_intent_id.clone()) {
            (PaymentStatus::Paid, Some(intent_id)) => {
                refund(state, order, &intent_id).await?;
                refunded = true;
            }
            (PaymentStatus::Paid, None) => tracing::warn!(order_id = %order.id, "Paid order has no payment intent; skipping refund"),
            (_, Some(intent_id)) => void_intent(state, order.id, &intent_id).await,
            (_, None) => {}
        }
    }

    order.transition(next, non_blank(note))?;
    if next == OrderStatus::Shipped {
        if let Some(number) = non_blank(tracking_number) {
            order.tracking_number = Some(number);
        }
    }
    if let Err(e) = state.repo::<Order>().save(order).await {
        if refunded {
            tracing::error!(
                order_id = %order.id,
                intent_id = order.payment_intent_id.as_deref().unwrap_or_default(),
                error = %e,
                "Refund issued but the order could not be updated; it still shows as paid"
            );
        }
        return Err(e.into());
    }
    if next == OrderStatus::Cancelled {
        release_stock(&state.repo::<Product>(), &order.items).await;
    }
    tracing::info!(order_id = %order.id, from = %previous, to = %next, "Order status changed");

    state
        .events
        .publish(DomainEvent::Order(OrderEvent::StatusChanged { order_id: order.id, from: previous, to: next }))
        .await;
    notify_status(state, order).await;
    Ok(())
}

/// Refunds `intent_id` at the processor, then records it on the payment and
/// the order. The order itself is not saved here.
pub(crate) async fn refund(state: &AppState, order: &mut Order, intent_id: &str) -> AppResult<()> {
    state.payments.refund(intent_id).await?;
    order.payment_status = PaymentStatus::Refunded;
    order.touch();

    let payments = state.repo::<Payment>();
    if let Some(mut payment) = payments.find_one(Filter::new().eq("intent_id", intent_id)).await? {
        payment.set_status(PaymentIntentStatus::Refunded);
        payments.save(&payment).await?;
    }
    tracing::info!(order_id = %order.id, intent_id = %intent_id, "Order refunded");
    state
        .events
        .publish(DomainEvent::Payment(PaymentEvent::Refunded { order_id: order.id, intent_id: intent_id.to_string() }))
        .await;
    Ok(())
}

/// Cancels an unpaid intent so it can no longer be charged. A failure is
/// logged; a charge that still lands is refunded when its webhook arrives.
async fn void_intent(state: &AppState, order_id: Uuid, intent_id: &str) {
    if let Err(e) = state.payments.cancel_intent(intent_id).await {
        tracing::warn!(order_id = %order_id, intent_id = %intent_id, error = %e, "Could not cancel payment intent");
        return;
    }
    let payments = state.repo::<Payment>();
    match payments.find_one(Filter::new().eq("intent_id", intent_id)).await {
        Ok(Some(mut payment)) => {
            payment.set_status(PaymentIntentStatus::Canceled);
            if let Err(e) = payments.save(&payment).await {
                tracing::warn!(intent_id = %intent_id, error = %e, "Could not record cancelled intent");
            }
        }
        Ok(None) => {}
        Err(e) => tracing::warn!(intent_id = %intent_id, error = %e, "Could not load payment for cancelled intent"),
    }
}

async fn notify_status(state: &AppState, order: &Order) {
    match state.repo::<User>().get(order.user_id).await {
        Ok(Some(user)) if user.notifications.order_updates => {
            mail::deliver(state.mailer.as_ref(), &order.email, mail::status_update(order)).await;
        }
        Ok(_) => {}
        Err(e) => tracing::warn!(order_id = %order.id, error = %e, "Could not load customer for status email"),
    }
}

//! Domain events
use serde::Serialize;
use uuid::Uuid;

use crate::domain::aggregates::OrderStatus;
use crate::domain::value_objects::Money;

#[derive(Clone, Debug, Serialize)]
#[serde(untagged)]
pub enum DomainEvent {
    Product(ProductEvent),
    Order(OrderEvent),
    Payment(PaymentEvent),
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProductEvent {
    Created { product_id: Uuid, sku: String },
    StockAdjusted { product_id: Uuid, delta: i64 },
    Deleted { product_id: Uuid },
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    Placed { order_id: Uuid, order_number: String, user_id: Uuid, total: Money },
    StatusChanged { order_id: Uuid, from: OrderStatus, to: OrderStatus },
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PaymentEvent {
    Succeeded { order_id: Uuid, intent_id: String, amount: Money },
    Failed { order_id: Uuid, intent_id: String },
    Refunded { order_id: Uuid, intent_id: String },
}

impl DomainEvent {
    /// NATS subject the event is published on.
    pub fn subject(&self) -> &'static str {
        match self {
            Self::Product(ProductEvent::Created { .. }) => "storefront.product.created",
            Self::Product(ProductEvent::StockAdjusted { .. }) => "storefront.product.stock_adjusted",
            Self::Product(ProductEvent::Deleted { .. }) => "storefront.product.deleted",
            Self::Order(OrderEvent::Placed { .. }) => "storefront.order.placed",
            Self::Order(OrderEvent::StatusChanged { .. }) => "storefront.order.status_changed",
            Self::Payment(PaymentEvent::Succeeded { .. }) => "storefront.payment.succeeded",
            Self::Payment(PaymentEvent::Failed { .. }) => "storefront.payment.failed",
            Self::Payment(PaymentEvent::Refunded { .. }) => "storefront.payment.refunded",
        }
    }
}

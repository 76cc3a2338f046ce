//! Order Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;
use validator::Validate;

use crate::domain::pricing::{compute_totals, PricedLine, Totals};
use crate::domain::value_objects::Money;
use crate::store::{Collection, Document};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub user_id: Uuid,
    pub email: String,
    pub items: Vec<LineItem>,
    pub shipping_address: Address,
    pub totals: Totals,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub payment_intent_id: Option<String>,
    pub tracking_number: Option<String>,
    pub tracking: Vec<TrackingEvent>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Snapshot of a product at the moment the order was placed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub product_id: Uuid,
    pub name: String,
    pub sku: String,
    pub unit_price: Money,
    pub discount_percent: u8,
    pub quantity: u32,
    #[serde(default)]
    pub free_shipping: bool,
    pub line_total: Money,
}

impl LineItem {
    pub fn priced(&self) -> PricedLine {
        PricedLine { unit_price: self.unit_price, quantity: self.quantity, discount_percent: self.discount_percent, free_shipping: self.free_shipping }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct Address {
    #[validate(length(min = 1, message = "full_name is required"))]
    pub full_name: String,
    #[validate(length(min = 1, message = "street is required"))]
    pub street: String,
    #[serde(default)]
    pub street2: Option<String>,
    #[validate(length(min = 1, message = "city is required"))]
    pub city: String,
    #[serde(default)]
    pub state: Option<String>,
    #[validate(length(min = 1, message = "postal_code is required"))]
    pub postal_code: String,
    #[validate(length(min = 2, message = "country is required"))]
    pub country: String,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackingEvent { pub status: OrderStatus, pub note: Option<String>, pub at: DateTime<Utc> }

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus { #[default] Pending, Processing, Shipped, Delivered, Cancelled }

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus { #[default] Pending, Paid, Failed, Refunded }

impl OrderStatus {
    pub const ALL: [OrderStatus; 5] = [Self::Pending, Self::Processing, Self::Shipped, Self::Delivered, Self::Cancelled];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> { Self::ALL.into_iter().find(|s| s.as_str() == value.trim().to_lowercase()) }

    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Processing) | (Pending, Cancelled) | (Processing, Shipped) | (Processing, Cancelled) | (Shipped, Delivered)
        )
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(self.as_str()) }
}

impl Document for Order {
    const COLLECTION: Collection = Collection::Orders;
    fn id(&self) -> Uuid { self.id }
}

impl Order {
    pub fn create(user_id: Uuid, email: impl Into<String>, items: Vec<LineItem>, shipping_address: Address, notes: Option<String>) -> Result<Self, OrderError> {
        if items.is_empty() { return Err(OrderError::NoItems); }
        let now = Utc::now();
        let lines: Vec<PricedLine> = items.iter().map(LineItem::priced).collect();
        Ok(Self {
            id: Uuid::new_v4(), order_number: generate_order_number(), user_id, email: email.into(),
            totals: compute_totals(&lines), items, shipping_address, status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending, payment_intent_id: None, tracking_number: None,
            tracking: vec![TrackingEvent { status: OrderStatus::Pending, note: Some("Order placed".into()), at: now }],
            notes, created_at: now, updated_at: now,
        })
    }

    pub fn total(&self) -> Money { self.totals.total }

    pub fn transition(&mut self, next: OrderStatus, note: Option<String>) -> Result<(), OrderError> {
        if !self.status.can_transition_to(next) {
            return Err(OrderError::InvalidTransition { from: self.status, to: next });
        }
        self.status = next;
        self.tracking.push(TrackingEvent { status: next, note, at: Utc::now() });
        self.touch();
        Ok(())
    }

    /// Customers may only withdraw orders nobody has started working on.
    pub fn can_customer_cancel(&self) -> bool { self.status == OrderStatus::Pending }

    pub fn mark_paid(&mut self) -> Result<(), OrderError> {
        self.payment_status = PaymentStatus::Paid;
        if self.status == OrderStatus::Pending {
            self.transition(OrderStatus::Processing, Some("Payment received".into()))?;
        }
        self.touch();
        Ok(())
    }

    pub fn mark_payment_failed(&mut self) { self.payment_status = PaymentStatus::Failed; self.touch(); }

    pub fn touch(&mut self) { self.updated_at = Utc::now(); }
}

/// `ORD-` followed by eight random uppercase hex digits.
pub fn generate_order_number() -> String { format!("ORD-{:08X}", rand::random::<u32>()) }

#[derive(Debug, Clone, Error)]
pub enum OrderError {
    #[error("order has no items")]
    NoItems,
    #[error("cannot change order status from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },
}

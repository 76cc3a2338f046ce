//! Payment Aggregate
//!
//! Local mirror of a payment intent held by the hosted processor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::value_objects::Money;
use crate::store::{Collection, Document};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub intent_id: String,
    pub amount: Money,
    pub currency: String,
    pub status: PaymentIntentStatus,
    pub failure_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentIntentStatus {
    #[default]
    RequiresPaymentMethod,
    RequiresConfirmation,
    RequiresAction,
    Processing,
    Succeeded,
    Failed,
    Canceled,
    Refunded,
}

impl PaymentIntentStatus {
    /// Maps the processor's status string; unknown values fall back to processing.
    pub fn from_processor(status: &str) -> Self {
        match status {
            "requires_payment_method" => Self::RequiresPaymentMethod,
            "requires_confirmation" => Self::RequiresConfirmation,
            "requires_action" => Self::RequiresAction,
            "succeeded" => Self::Succeeded,
            "canceled" => Self::Canceled,
            _ => Self::Processing,
        }
    }

    pub fn is_final(self) -> bool { matches!(self, Self::Succeeded | Self::Canceled | Self::Refunded) }
}

impl Document for Payment {
    const COLLECTION: Collection = Collection::Payments;
    fn id(&self) -> Uuid { self.id }
}

impl Payment {
    pub fn create(order_id: Uuid, user_id: Uuid, intent_id: impl Into<String>, amount: Money, status: PaymentIntentStatus) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(), order_id, user_id, intent_id: intent_id.into(), amount, currency: "usd".into(),
            status, failure_message: None, created_at: now, updated_at: now,
        }
    }

    pub fn set_status(&mut self, status: PaymentIntentStatus) { self.status = status; self.updated_at = Utc::now(); }
}

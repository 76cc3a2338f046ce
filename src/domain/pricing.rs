//! Order and cart totals.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::value_objects::Money;

pub const TAX_RATE: Decimal = Decimal::from_parts(8, 0, 0, false, 2);
pub const FLAT_SHIPPING: Money = Money::cents_const(999);
pub const FREE_SHIPPING_THRESHOLD: Money = Money::cents_const(10_000);

/// One priced line as seen by the calculator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PricedLine {
    pub unit_price: Money,
    pub quantity: u32,
    pub discount_percent: u8,
    pub free_shipping: bool,
}

impl PricedLine {
    pub fn gross(&self) -> Money { self.unit_price.multiply(self.quantity) }
    pub fn discount(&self) -> Money { self.gross().percent(self.discount_percent) }
    pub fn net(&self) -> Money { self.gross() - self.discount() }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    pub subtotal: Money,
    pub discount: Money,
    pub shipping: Money,
    pub tax: Money,
    pub total: Money,
}

pub fn compute_totals(lines: &[PricedLine]) -> Totals {
    let subtotal: Money = lines.iter().map(PricedLine::gross).sum();
    let discount: Money = lines.iter().map(PricedLine::discount).sum();
    let discounted = subtotal - discount;

    let free_shipping = lines.is_empty()
        || lines.iter().all(|l| l.free_shipping)
        || discounted >= FREE_SHIPPING_THRESHOLD;
    let shipping = if free_shipping { Money::ZERO } else { FLAT_SHIPPING };
    let tax = discounted.scale(TAX_RATE);

    Totals { subtotal, discount, shipping, tax, total: discounted + shipping + tax }
}

//! Value Objects for the storefront

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, Sub};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// SKU (Stock Keeping Unit) value object
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Sku(String);

impl Sku {
    pub fn new(value: impl Into<String>) -> Result<Self, SkuError> {
        let value = value.into().trim().to_uppercase();
        if value.is_empty() { return Err(SkuError::Empty); }
        if value.len() > 50 { return Err(SkuError::TooLong); }
        Ok(Self(value))
    }

    /// Random `SKU-XXXXXXXX` code for products created without one.
    pub fn generate() -> Self { Self(format!("SKU-{:08X}", rand::random::<u32>())) }

    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for Sku {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

impl TryFrom<String> for Sku {
    type Error = SkuError;
    fn try_from(value: String) -> Result<Self, Self::Error> { Self::new(value) }
}

impl From<Sku> for String {
    fn from(sku: Sku) -> Self { sku.0 }
}

#[derive(Debug, Clone, Error)]
pub enum SkuError {
    #[error("SKU empty")]
    Empty,
    #[error("SKU too long")]
    TooLong,
}

/// Money value object. Always USD, always rounded to cents.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    pub fn new(amount: Decimal) -> Self { Self(amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)) }

    pub fn from_cents(cents: i64) -> Self { Self(Decimal::new(cents, 2)) }

    /// Const constructor for fixed prices.
    pub const fn cents_const(cents: u32) -> Self { Self(Decimal::from_parts(cents, 0, 0, false, 2)) }

    pub fn amount(&self) -> Decimal { self.0 }

    /// Smallest currency unit, as payment processors expect.
    pub fn cents(&self) -> i64 {
        let cents = self.0 * Decimal::ONE_HUNDRED;
        i64::try_from(cents.trunc()).unwrap_or(i64::MAX)
    }

    pub fn multiply(&self, qty: u32) -> Money { Money::new(self.0 * Decimal::from(qty)) }

    /// `rate` is a fraction, e.g. 0.08 for 8%.
    pub fn scale(&self, rate: Decimal) -> Money { Money::new(self.0 * rate) }

    pub fn percent(&self, pct: u8) -> Money { self.scale(Decimal::from(pct) / Decimal::ONE_HUNDRED) }

    pub fn is_negative(&self) -> bool { self.0.is_sign_negative() && !self.0.is_zero() }
}

impl Add for Money {
    type Output = Money;
    fn add(self, rhs: Money) -> Money { Money(self.0 + rhs.0) }
}

impl Sub for Money {
    type Output = Money;
    fn sub(self, rhs: Money) -> Money { Money(self.0 - rhs.0) }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money { iter.fold(Money::ZERO, Add::add) }
}

impl From<Decimal> for Money {
    fn from(amount: Decimal) -> Self { Money::new(amount) }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "${:.2}", self.0) }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> { Serialize::serialize(&self.0, serializer) }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        <Decimal as Deserialize>::deserialize(deserializer).map(Money::new)
    }
}

/// Lowercased, trimmed e-mail address.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Email(String);

impl Email {
    pub fn parse(value: &str) -> Result<Self, EmailError> {
        let value = value.trim().to_lowercase();
        let valid = match value.split_once('@') {
            Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.'),
            None => false,
        };
        if !valid || value.contains(char::is_whitespace) { return Err(EmailError(value)); }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str { &self.0 }
}

impl TryFrom<String> for Email {
    type Error = EmailError;
    fn try_from(value: String) -> Result<Self, Self::Error> { Self::parse(&value) }
}

impl From<Email> for String {
    fn from(email: Email) -> Self { email.0 }
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

#[derive(Debug, Clone, Error)]
#[error("invalid email address: {0}")]
pub struct EmailError(String);

/// URL-safe identifier derived from a display name.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut dash = false;
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            dash = false;
        } else if !dash && !slug.is_empty() {
            slug.push('-');
            dash = true;
        }
    }
    while slug.ends_with('-') { slug.pop(); }
    slug
}

/// Binary image embedded in a document; base64 in JSON.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageBlob {
    pub content_type: String,
    #[serde(default)]
    pub alt: Option<String>,
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

impl ImageBlob {
    pub fn validate(&self) -> Result<(), ImageError> {
        if !self.content_type.starts_with("image/") { return Err(ImageError::ContentType(self.content_type.clone())); }
        if self.data.is_empty() { return Err(ImageError::Empty); }
        if self.data.len() > MAX_IMAGE_BYTES { return Err(ImageError::TooLarge(self.data.len())); }
        Ok(())
    }
}

#[derive(Debug, Clone, Error)]
pub enum ImageError {
    #[error("unsupported image content type: {0}")]
    ContentType(String),
    #[error("image data is empty")]
    Empty,
    #[error("image is {0} bytes, limit is 5 MiB")]
    TooLarge(usize),
}

pub mod base64_bytes {
    use super::*;

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        // Browsers send data URLs; keep only the payload.
        let payload = encoded.split_once(";base64,").map_or(encoded.as_str(), |(_, p)| p);
        STANDARD.decode(payload.trim()).map_err(serde::de::Error::custom)
    }
}

//! Product Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::pricing::PricedLine;
use crate::domain::value_objects::{slugify, ImageBlob, Money, Sku};
use crate::store::{Collection, Document};

pub const MAX_DISCOUNT_PERCENT: u8 = 90;
pub const LOW_STOCK_THRESHOLD: i64 = 5;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub sku: Sku,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub price: Money,
    #[serde(default)]
    pub discount_percent: u8,
    pub category_id: Option<Uuid>,
    pub brand: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub stock: i64,
    pub status: ProductStatus,
    #[serde(default)]
    pub featured: bool,
    #[serde(default)]
    pub images: Vec<ImageBlob>,
    #[serde(default)]
    pub shipping: ShippingInfo,
    #[serde(default)]
    pub specifications: Vec<Specification>,
    #[serde(default)]
    pub rating: RatingSummary,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus { #[default] Draft, Active, Archived }

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ShippingInfo {
    pub weight_grams: Option<u32>,
    pub dimensions: Option<Dimensions>,
    #[serde(default)]
    pub free_shipping: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Dimensions { pub length_cm: f64, pub width_cm: f64, pub height_cm: f64 }

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Specification { pub name: String, pub value: String }

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RatingSummary { pub average: f64, pub count: u32 }

impl RatingSummary {
    pub fn from_ratings(ratings: &[u8]) -> Self {
        if ratings.is_empty() { return Self::default(); }
        let sum: u32 = ratings.iter().map(|r| u32::from(*r)).sum();
        let average = f64::from(sum) / ratings.len() as f64;
        Self { average: (average * 10.0).round() / 10.0, count: ratings.len() as u32 }
    }
}

impl Document for Product {
    const COLLECTION: Collection = Collection::Products;
    fn id(&self) -> Uuid { self.id }
}

impl Product {
    pub fn create(sku: Sku, name: impl Into<String>, price: Money) -> Self {
        let name = name.into();
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(), sku, slug: slugify(&name), name, description: String::new(),
            price, discount_percent: 0, category_id: None, brand: None, tags: vec![], stock: 0,
            status: ProductStatus::Draft, featured: false, images: vec![], shipping: ShippingInfo::default(),
            specifications: vec![], rating: RatingSummary::default(), created_at: now, updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool { self.status == ProductStatus::Active }
    pub fn is_in_stock(&self) -> bool { self.stock > 0 }
    pub fn is_low_stock(&self) -> bool { self.stock <= LOW_STOCK_THRESHOLD }

    /// Unit price after the product discount.
    pub fn sale_price(&self) -> Money { self.price - self.price.percent(self.discount_percent) }

    pub fn priced_line(&self, quantity: u32) -> PricedLine {
        PricedLine {
            unit_price: self.price,
            quantity,
            discount_percent: self.discount_percent,
            free_shipping: self.shipping.free_shipping,
        }
    }

    pub fn check_stock(&self, quantity: u32) -> Result<(), ProductError> {
        if i64::from(quantity) > self.stock {
            return Err(ProductError::InsufficientInventory { name: self.name.clone(), available: self.stock.max(0) });
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ProductError> {
        if self.name.trim().is_empty() { return Err(ProductError::MissingName); }
        if self.price.is_negative() { return Err(ProductError::NegativePrice); }
        if self.stock < 0 { return Err(ProductError::NegativeStock); }
        if self.discount_percent > MAX_DISCOUNT_PERCENT { return Err(ProductError::Discount(self.discount_percent)); }
        if self.slug.is_empty() { return Err(ProductError::MissingName); }
        Ok(())
    }

    pub fn image_url(&self, index: usize) -> String { format!("/api/products/{}/images/{index}", self.id) }

    pub fn touch(&mut self) { self.updated_at = Utc::now(); }
}

/// Product as returned by list and detail endpoints: images become URLs.
#[derive(Clone, Debug, Serialize)]
pub struct ProductView {
    pub id: Uuid,
    pub sku: String,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub price: Money,
    pub discount_percent: u8,
    pub sale_price: Money,
    pub category_id: Option<Uuid>,
    pub brand: Option<String>,
    pub tags: Vec<String>,
    pub stock: i64,
    pub in_stock: bool,
    pub low_stock: bool,
    pub status: ProductStatus,
    pub featured: bool,
    pub images: Vec<ImageRef>,
    pub shipping: ShippingInfo,
    pub specifications: Vec<Specification>,
    pub rating: RatingSummary,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ImageRef {
    pub url: String,
    pub content_type: String,
    pub alt: Option<String>,
}

impl From<&Product> for ProductView {
    fn from(p: &Product) -> Self {
        let images = p
            .images
            .iter()
            .enumerate()
            .map(|(i, img)| ImageRef { url: p.image_url(i), content_type: img.content_type.clone(), alt: img.alt.clone() })
            .collect();
        Self {
            id: p.id, sku: p.sku.to_string(), name: p.name.clone(), slug: p.slug.clone(), description: p.description.clone(),
            price: p.price, discount_percent: p.discount_percent, sale_price: p.sale_price(), category_id: p.category_id,
            brand: p.brand.clone(), tags: p.tags.clone(), stock: p.stock, in_stock: p.is_in_stock(), low_stock: p.is_low_stock(),
            status: p.status, featured: p.featured, images, shipping: p.shipping.clone(),
            specifications: p.specifications.clone(), rating: p.rating, created_at: p.created_at, updated_at: p.updated_at,
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum ProductError {
    #[error("name is required")]
    MissingName,
    #[error("price must not be negative")]
    NegativePrice,
    #[error("stock must not be negative")]
    NegativeStock,
    #[error("discount_percent must be at most {MAX_DISCOUNT_PERCENT}, got {0}")]
    Discount(u8),
    #[error("insufficient stock for {name}: {available} available")]
    InsufficientInventory { name: String, available: i64 },
}

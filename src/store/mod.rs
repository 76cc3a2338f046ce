//! Document store
//!
//! Every entity is a JSON document keyed by UUID inside a named collection.
//! Backends implement [`DocumentStore`]; handlers go through the typed
//! [`Repository`] wrapper.

pub mod memory;
pub mod postgres;
pub mod query;

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

pub use memory::MemoryDocumentStore;
pub use postgres::PgDocumentStore;
pub use query::{Condition, Filter, Page, PageMeta, Pagination, Query, Sort, SortDirection};

/// Named document collections. Each maps to one table in PostgreSQL.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Collection {
    Products,
    Categories,
    Orders,
    Carts,
    Wishlists,
    Users,
    Reviews,
    Payments,
}

impl Collection {
    pub fn name(self) -> &'static str {
        match self {
            Self::Products => "products",
            Self::Categories => "categories",
            Self::Orders => "orders",
            Self::Carts => "carts",
            Self::Wishlists => "wishlists",
            Self::Users => "users",
            Self::Reviews => "reviews",
            Self::Payments => "payments",
        }
    }

    pub fn singular(self) -> &'static str {
        match self {
            Self::Products => "Product",
            Self::Categories => "Category",
            Self::Orders => "Order",
            Self::Carts => "Cart",
            Self::Wishlists => "Wishlist",
            Self::Users => "User",
            Self::Reviews => "Review",
            Self::Payments => "Payment",
        }
    }

    /// Field sets that must be unique across the collection, matching the
    /// unique indexes in `migrations/`.
    pub fn unique_keys(self) -> &'static [&'static [&'static str]] {
        match self {
            Self::Products | Self::Categories => &[&["slug"]],
            Self::Orders => &[&["order_number"]],
            Self::Users => &[&["email"]],
            Self::Reviews => &[&["product_id", "user_id"]],
            Self::Payments => &[&["intent_id"]],
            Self::Carts | Self::Wishlists => &[],
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(self.name()) }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("document encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("duplicate document in {0}")]
    Duplicate(Collection),

    #[error("invalid field path: {0}")]
    InvalidField(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Raw, untyped access to collections of JSON documents.
///
/// Every method touches a single document or runs a single query, so each
/// call is atomic on its own. Nothing spans documents.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn insert(&self, collection: Collection, id: Uuid, doc: Value) -> StoreResult<()>;

    async fn get(&self, collection: Collection, id: Uuid) -> StoreResult<Option<Value>>;

    /// Returns `false` when no document with `id` exists.
    async fn replace(&self, collection: Collection, id: Uuid, doc: Value) -> StoreResult<bool>;

    async fn delete(&self, collection: Collection, id: Uuid) -> StoreResult<bool>;

    async fn find(&self, collection: Collection, query: &Query) -> StoreResult<Vec<Value>>;

    async fn count(&self, collection: Collection, filter: &Filter) -> StoreResult<u64>;

    /// Atomically adds `delta` to the integer at `field`. When `floor` is
    /// set and the result would drop below it, nothing is written and
    /// `false` is returned. Also `false` when the document is missing.
    async fn increment(
        &self,
        collection: Collection,
        id: Uuid,
        field: &str,
        delta: i64,
        floor: Option<i64>,
    ) -> StoreResult<bool>;

    async fn ping(&self) -> StoreResult<()> { Ok(()) }
}

/// A type stored as a document in a fixed collection.
pub trait Document: Serialize + DeserializeOwned + Send + Sync {
    const COLLECTION: Collection;
    fn id(&self) -> Uuid;
}

/// Typed view of one collection.
pub struct Repository<T> {
    store: Arc<dyn DocumentStore>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Repository<T> {
    fn clone(&self) -> Self { Self { store: self.store.clone(), _marker: PhantomData } }
}

impl<T: Document> Repository<T> {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self { Self { store, _marker: PhantomData } }

    pub async fn get(&self, id: Uuid) -> StoreResult<Option<T>> {
        match self.store.get(T::COLLECTION, id).await? {
            Some(doc) => Ok(Some(serde_json::from_value(doc)?)),
            None => Ok(None),
        }
    }

    pub async fn insert(&self, doc: &T) -> StoreResult<()> {
        self.store.insert(T::COLLECTION, doc.id(), serde_json::to_value(doc)?).await
    }

    pub async fn save(&self, doc: &T) -> StoreResult<bool> {
        self.store.replace(T::COLLECTION, doc.id(), serde_json::to_value(doc)?).await
    }

    /// Replaces the document, inserting it when it does not exist yet.
    pub async fn upsert(&self, doc: &T) -> StoreResult<()> {
        if !self.save(doc).await? {
            self.insert(doc).await?;
        }
        Ok(())
    }

    pub async fn delete(&self, id: Uuid) -> StoreResult<bool> { self.store.delete(T::COLLECTION, id).await }

    pub async fn find(&self, query: &Query) -> StoreResult<Vec<T>> {
        self.store
            .find(T::COLLECTION, query)
            .await?
            .into_iter()
            .map(|doc| serde_json::from_value(doc).map_err(StoreError::from))
            .collect()
    }

    pub async fn find_one(&self, filter: Filter) -> StoreResult<Option<T>> {
        let query = Query::new(filter).page(Page { skip: 0, limit: 1 });
        Ok(self.find(&query).await?.into_iter().next())
    }

    pub async fn count(&self, filter: &Filter) -> StoreResult<u64> { self.store.count(T::COLLECTION, filter).await }

    /// Runs the query and the matching count for a paginated listing.
    pub async fn page(&self, query: &Query) -> StoreResult<(Vec<T>, u64)> {
        let total = self.count(&query.filter).await?;
        let items = self.find(query).await?;
        Ok((items, total))
    }

    pub async fn increment(&self, id: Uuid, field: &str, delta: i64, floor: Option<i64>) -> StoreResult<bool> {
        self.store.increment(T::COLLECTION, id, field, delta, floor).await
    }
}

/// Splits a dotted field path (`shipping.free_shipping`) into segments.
pub(crate) fn field_path(field: &str) -> StoreResult<Vec<String>> {
    let segments: Vec<String> = field.split('.').map(str::to_string).collect();
    let valid = segments
        .iter()
        .all(|s| !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
    if valid { Ok(segments) } else { Err(StoreError::InvalidField(field.to_string())) }
}

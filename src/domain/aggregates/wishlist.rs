//! Wishlist Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::store::{Collection, Document};

/// One wishlist per user; the document id is the user id.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Wishlist {
    pub id: Uuid,
    pub items: Vec<WishlistItem>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WishlistItem { pub product_id: Uuid, pub added_at: DateTime<Utc> }

impl Document for Wishlist {
    const COLLECTION: Collection = Collection::Wishlists;
    fn id(&self) -> Uuid { self.id }
}

impl Wishlist {
    pub fn for_user(user_id: Uuid) -> Self { Self { id: user_id, items: vec![], updated_at: Utc::now() } }

    pub fn contains(&self, product_id: Uuid) -> bool { self.items.iter().any(|i| i.product_id == product_id) }

    /// Returns `false` when the product was already listed.
    pub fn add(&mut self, product_id: Uuid) -> bool {
        if self.contains(product_id) { return false; }
        self.items.push(WishlistItem { product_id, added_at: Utc::now() });
        self.updated_at = Utc::now();
        true
    }

    pub fn remove(&mut self, product_id: Uuid) -> bool {
        let before = self.items.len();
        self.items.retain(|i| i.product_id != product_id);
        self.updated_at = Utc::now();
        self.items.len() != before
    }
}

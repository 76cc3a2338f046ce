//! Review Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::store::{Collection, Document};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Review {
    pub id: Uuid,
    pub product_id: Uuid,
    pub user_id: Uuid,
    pub author: String,
    pub rating: u8,
    pub title: Option<String>,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

impl Document for Review {
    const COLLECTION: Collection = Collection::Reviews;
    fn id(&self) -> Uuid { self.id }
}

impl Review {
    pub fn create(product_id: Uuid, user_id: Uuid, author: impl Into<String>, rating: u8, title: Option<String>, comment: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(), product_id, user_id, author: author.into(), rating: rating.clamp(1, 5),
            title, comment: comment.into(), created_at: Utc::now(),
        }
    }
}

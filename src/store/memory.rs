//! In-process document store used by tests and `STORE=memory` runs.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::query::{Filter, Query};
use super::{field_path, Collection, DocumentStore, StoreError, StoreResult};

#[derive(Default)]
pub struct MemoryDocumentStore {
    collections: RwLock<HashMap<Collection, Vec<(Uuid, Value)>>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self { Self::default() }
}

/// Fails when another document already holds one of the collection's unique keys.
/// Documents missing a key field never collide, like NULLs under a unique index.
fn check_unique(collection: Collection, docs: &[(Uuid, Value)], id: Uuid, doc: &Value) -> StoreResult<()> {
    for fields in collection.unique_keys() {
        let key: Option<Vec<&Value>> = fields.iter().map(|f| doc.get(*f).filter(|v| !v.is_null())).collect();
        let Some(key) = key else { continue };
        let taken = docs
            .iter()
            .filter(|(other, _)| *other != id)
            .any(|(_, other)| fields.iter().zip(&key).all(|(f, v)| other.get(*f) == Some(*v)));
        if taken {
            return Err(StoreError::Duplicate(collection));
        }
    }
    Ok(())
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn insert(&self, collection: Collection, id: Uuid, doc: Value) -> StoreResult<()> {
        let mut guard = self.collections.write().await;
        let docs = guard.entry(collection).or_default();
        if docs.iter().any(|(existing, _)| *existing == id) {
            return Err(StoreError::Duplicate(collection));
        }
        check_unique(collection, docs, id, &doc)?;
        docs.push((id, doc));
        Ok(())
    }

    async fn get(&self, collection: Collection, id: Uuid) -> StoreResult<Option<Value>> {
        let guard = self.collections.read().await;
        Ok(guard.get(&collection).and_then(|docs| docs.iter().find(|(k, _)| *k == id).map(|(_, d)| d.clone())))
    }

    async fn replace(&self, collection: Collection, id: Uuid, doc: Value) -> StoreResult<bool> {
        let mut guard = self.collections.write().await;
        let Some(docs) = guard.get_mut(&collection) else { return Ok(false) };
        let Some(index) = docs.iter().position(|(k, _)| *k == id) else { return Ok(false) };
        check_unique(collection, docs, id, &doc)?;
        docs[index].1 = doc;
        Ok(true)
    }

    async fn delete(&self, collection: Collection, id: Uuid) -> StoreResult<bool> {
        let mut guard = self.collections.write().await;
        let Some(docs) = guard.get_mut(&collection) else { return Ok(false) };
        let before = docs.len();
        docs.retain(|(k, _)| *k != id);
        Ok(docs.len() != before)
    }

    async fn find(&self, collection: Collection, query: &Query) -> StoreResult<Vec<Value>> {
        let guard = self.collections.read().await;
        let mut hits: Vec<Value> = guard
            .get(&collection)
            .map(|docs| docs.iter().filter(|(_, d)| query.filter.matches(d)).map(|(_, d)| d.clone()).collect())
            .unwrap_or_default();
        if let Some(sort) = &query.sort {
            // Stable sort keeps insertion order for ties, like the created_at tiebreak in SQL.
            hits.sort_by(|a, b| sort.compare(a, b));
        }
        if let Some(page) = query.page {
            let skip = usize::try_from(page.skip).unwrap_or(usize::MAX);
            let limit = usize::try_from(page.limit).unwrap_or(usize::MAX);
            hits = hits.into_iter().skip(skip).take(limit).collect();
        }
        Ok(hits)
    }

    async fn count(&self, collection: Collection, filter: &Filter) -> StoreResult<u64> {
        let guard = self.collections.read().await;
        let n = guard.get(&collection).map(|docs| docs.iter().filter(|(_, d)| filter.matches(d)).count()).unwrap_or(0);
        Ok(n as u64)
    }

    async fn increment(
        &self,
        collection: Collection,
        id: Uuid,
        field: &str,
        delta: i64,
        floor: Option<i64>,
    ) -> StoreResult<bool> {
        let path = field_path(field)?;
        let mut guard = self.collections.write().await;
        let Some((_, doc)) = guard.get_mut(&collection).and_then(|docs| docs.iter_mut().find(|(k, _)| *k == id)) else {
            return Ok(false);
        };
        let Some(slot) = path.iter().try_fold(doc, |node, key| node.get_mut(key.as_str())) else {
            return Err(StoreError::InvalidField(field.to_string()));
        };
        let current = slot.as_i64().ok_or_else(|| StoreError::InvalidField(field.to_string()))?;
        let next = current + delta;
        if floor.is_some_and(|min| next < min) {
            return Ok(false);
        }
        *slot = Value::from(next);
        Ok(true)
    }
}

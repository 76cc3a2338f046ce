//! PostgreSQL backend: one JSONB table per collection.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::PgPool;
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use super::query::{Condition, Filter, Query, SortDirection};
use super::{field_path, Collection, DocumentStore, StoreError, StoreResult};

#[derive(Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    pub fn new(pool: PgPool) -> Self { Self { pool } }

    pub fn pool(&self) -> &PgPool { &self.pool }
}

fn map_write_error(collection: Collection, err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Duplicate(collection),
        _ => StoreError::Database(err),
    }
}

/// Escapes LIKE metacharacters so user search text is matched literally.
fn like_pattern(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len() + 2);
    escaped.push('%');
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

pub(crate) fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &Filter) -> StoreResult<()> {
    qb.push(" WHERE TRUE");
    for condition in &filter.conditions {
        qb.push(" AND ");
        match condition {
            Condition::Eq { field, value } => {
                qb.push("doc #> ").push_bind(field_path(field)?).push(" = ").push_bind(value.clone());
            }
            Condition::Ne { field, value } => {
                qb.push("doc #> ").push_bind(field_path(field)?).push(" IS DISTINCT FROM ").push_bind(value.clone());
            }
            Condition::In { field, values } => {
                let path = field_path(field)?;
                qb.push("(doc #> ").push_bind(path.clone()).push(" IS NOT NULL AND ");
                qb.push_bind(Value::Array(values.clone()));
                qb.push("::jsonb @> jsonb_build_array(doc #> ").push_bind(path).push("))");
            }
            Condition::Gte { field, value } => {
                qb.push("(doc #>> ").push_bind(field_path(field)?).push(")::numeric >= ");
                qb.push_bind(value.to_string()).push("::numeric");
            }
            Condition::Lte { field, value } => {
                qb.push("(doc #>> ").push_bind(field_path(field)?).push(")::numeric <= ");
                qb.push_bind(value.to_string()).push("::numeric");
            }
            Condition::Search { fields, text } => {
                let pattern = like_pattern(text);
                qb.push("(");
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        qb.push(" OR ");
                    }
                    qb.push("doc #>> ").push_bind(field_path(field)?).push(" ILIKE ").push_bind(pattern.clone());
                }
                if fields.is_empty() {
                    qb.push("FALSE");
                }
                qb.push(")");
            }
            Condition::ArrayContains { field, value } => {
                qb.push("doc #> ").push_bind(field_path(field)?).push(" @> jsonb_build_array(");
                qb.push_bind(value.clone()).push("::jsonb)");
            }
        }
    }
    Ok(())
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn insert(&self, collection: Collection, id: Uuid, doc: Value) -> StoreResult<()> {
        let sql = format!("INSERT INTO {collection} (id, doc, created_at, updated_at) VALUES ($1, $2, NOW(), NOW())");
        sqlx::query(&sql)
            .bind(id)
            .bind(doc)
            .execute(&self.pool)
            .await
            .map_err(|e| map_write_error(collection, e))?;
        Ok(())
    }

    async fn get(&self, collection: Collection, id: Uuid) -> StoreResult<Option<Value>> {
        let sql = format!("SELECT doc FROM {collection} WHERE id = $1");
        Ok(sqlx::query_scalar::<_, Value>(&sql).bind(id).fetch_optional(&self.pool).await?)
    }

    async fn replace(&self, collection: Collection, id: Uuid, doc: Value) -> StoreResult<bool> {
        let sql = format!("UPDATE {collection} SET doc = $2, updated_at = NOW() WHERE id = $1");
        let result = sqlx::query(&sql)
            .bind(id)
            .bind(doc)
            .execute(&self.pool)
            .await
            .map_err(|e| map_write_error(collection, e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, collection: Collection, id: Uuid) -> StoreResult<bool> {
        let sql = format!("DELETE FROM {collection} WHERE id = $1");
        let result = sqlx::query(&sql).bind(id).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find(&self, collection: Collection, query: &Query) -> StoreResult<Vec<Value>> {
        let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT doc FROM {collection}"));
        push_filter(&mut qb, &query.filter)?;
        qb.push(" ORDER BY ");
        if let Some(sort) = &query.sort {
            qb.push("doc #> ").push_bind(field_path(&sort.field)?);
            qb.push(match sort.direction {
                SortDirection::Asc => " ASC NULLS FIRST, ",
                SortDirection::Desc => " DESC NULLS LAST, ",
            });
        }
        qb.push("created_at ASC");
        if let Some(page) = query.page {
            qb.push(" LIMIT ").push_bind(i64::try_from(page.limit).unwrap_or(i64::MAX));
            qb.push(" OFFSET ").push_bind(i64::try_from(page.skip).unwrap_or(i64::MAX));
        }
        Ok(qb.build_query_scalar::<Value>().fetch_all(&self.pool).await?)
    }

    async fn count(&self, collection: Collection, filter: &Filter) -> StoreResult<u64> {
        let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT COUNT(*) FROM {collection}"));
        push_filter(&mut qb, filter)?;
        let n: i64 = qb.build_query_scalar().fetch_one(&self.pool).await?;
        Ok(u64::try_from(n).unwrap_or(0))
    }

    async fn increment(
        &self,
        collection: Collection,
        id: Uuid,
        field: &str,
        delta: i64,
        floor: Option<i64>,
    ) -> StoreResult<bool> {
        let sql = format!(
            "UPDATE {collection} \
             SET doc = jsonb_set(doc, $2, to_jsonb((doc #>> $2)::bigint + $3)), updated_at = NOW() \
             WHERE id = $1 AND ($4::bigint IS NULL OR (doc #>> $2)::bigint + $3 >= $4)"
        );
        let result = sqlx::query(&sql)
            .bind(id)
            .bind(field_path(field)?)
            .bind(delta)
            .bind(floor)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

//! Filter, sort and pagination construction shared by all store backends.

use std::cmp::Ordering;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;

pub const DEFAULT_PAGE_SIZE: u32 = 12;
pub const MAX_PAGE_SIZE: u32 = 100;

/// A single predicate over a document. Field names are dotted paths.
#[derive(Clone, Debug, PartialEq)]
pub enum Condition {
    Eq { field: String, value: Value },
    Ne { field: String, value: Value },
    In { field: String, values: Vec<Value> },
    Gte { field: String, value: Decimal },
    Lte { field: String, value: Decimal },
    /// Case-insensitive substring match against any of `fields`.
    Search { fields: Vec<String>, text: String },
    /// The array at `field` contains `value`.
    ArrayContains { field: String, value: Value },
}

/// Conjunction of conditions. An empty filter matches everything.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Filter {
    pub conditions: Vec<Condition>,
}

impl Filter {
    pub fn new() -> Self { Self::default() }

    pub fn eq(mut self, field: &str, value: impl Serialize) -> Self {
        self.conditions.push(Condition::Eq { field: field.into(), value: to_json(value) });
        self
    }

    pub fn ne(mut self, field: &str, value: impl Serialize) -> Self {
        self.conditions.push(Condition::Ne { field: field.into(), value: to_json(value) });
        self
    }

    pub fn one_of<V: Serialize>(mut self, field: &str, values: impl IntoIterator<Item = V>) -> Self {
        let values = values.into_iter().map(to_json).collect();
        self.conditions.push(Condition::In { field: field.into(), values });
        self
    }

    pub fn gte(mut self, field: &str, value: Decimal) -> Self {
        self.conditions.push(Condition::Gte { field: field.into(), value });
        self
    }

    pub fn lte(mut self, field: &str, value: Decimal) -> Self {
        self.conditions.push(Condition::Lte { field: field.into(), value });
        self
    }

    /// Blank search text adds nothing.
    pub fn search(mut self, fields: &[&str], text: &str) -> Self {
        let text = text.trim();
        if !text.is_empty() {
            let fields = fields.iter().map(|f| f.to_string()).collect();
            self.conditions.push(Condition::Search { fields, text: text.to_string() });
        }
        self
    }

    pub fn array_contains(mut self, field: &str, value: impl Serialize) -> Self {
        self.conditions.push(Condition::ArrayContains { field: field.into(), value: to_json(value) });
        self
    }

    /// Evaluates the filter against an in-memory document.
    pub fn matches(&self, doc: &Value) -> bool { self.conditions.iter().all(|c| c.matches(doc)) }
}

impl Condition {
    pub fn matches(&self, doc: &Value) -> bool {
        match self {
            Self::Eq { field, value } => lookup(doc, field) == Some(value),
            Self::Ne { field, value } => lookup(doc, field) != Some(value),
            Self::In { field, values } => lookup(doc, field).is_some_and(|v| values.contains(v)),
            Self::Gte { field, value } => lookup(doc, field).and_then(as_decimal).is_some_and(|v| v >= *value),
            Self::Lte { field, value } => lookup(doc, field).and_then(as_decimal).is_some_and(|v| v <= *value),
            Self::Search { fields, text } => {
                let needle = text.to_lowercase();
                fields.iter().any(|f| lookup(doc, f).is_some_and(|v| text_contains(v, &needle)))
            }
            Self::ArrayContains { field, value } => {
                matches!(lookup(doc, field), Some(Value::Array(items)) if items.contains(value))
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Sort {
    pub field: String,
    pub direction: SortDirection,
}

impl Sort {
    pub fn asc(field: &str) -> Self { Self { field: field.into(), direction: SortDirection::Asc } }
    pub fn desc(field: &str) -> Self { Self { field: field.into(), direction: SortDirection::Desc } }

    pub fn compare(&self, a: &Value, b: &Value) -> Ordering {
        let ord = compare_values(lookup(a, &self.field), lookup(b, &self.field));
        match self.direction {
            SortDirection::Asc => ord,
            SortDirection::Desc => ord.reverse(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Page {
    pub skip: u64,
    pub limit: u64,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Query {
    pub filter: Filter,
    pub sort: Option<Sort>,
    pub page: Option<Page>,
}

impl Query {
    pub fn new(filter: Filter) -> Self { Self { filter, sort: None, page: None } }
    pub fn all() -> Self { Self::default() }
    pub fn sort(mut self, sort: Sort) -> Self { self.sort = Some(sort); self }
    pub fn page(mut self, page: Page) -> Self { self.page = Some(page); self }
}

/// Page/limit pair taken from a query string, already clamped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
}

impl Pagination {
    pub fn new(page: Option<u32>, limit: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn to_page(self) -> Page {
        Page { skip: u64::from(self.page - 1) * u64::from(self.limit), limit: u64::from(self.limit) }
    }

    pub fn meta(self, total: u64) -> PageMeta {
        PageMeta { page: self.page, limit: self.limit, total, total_pages: total.div_ceil(u64::from(self.limit)) }
    }
}

impl Default for Pagination {
    fn default() -> Self { Self::new(None, None) }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct PageMeta {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u64,
}

fn to_json(value: impl Serialize) -> Value { serde_json::to_value(value).unwrap_or(Value::Null) }

pub(crate) fn lookup<'a>(doc: &'a Value, field: &str) -> Option<&'a Value> {
    field.split('.').try_fold(doc, |node, key| node.get(key))
}

fn as_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => Decimal::from_str(&n.to_string())
            .ok()
            .or_else(|| n.as_f64().and_then(|f| Decimal::try_from(f).ok())),
        Value::String(s) => Decimal::from_str(s).ok(),
        _ => None,
    }
}

fn text_contains(value: &Value, needle: &str) -> bool {
    match value {
        Value::String(s) => s.to_lowercase().contains(needle),
        Value::Array(items) => items.iter().any(|v| text_contains(v, needle)),
        _ => false,
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            x.as_f64().partial_cmp(&y.as_f64()).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (None | Some(Value::Null), Some(v)) if !v.is_null() => Ordering::Less,
        (Some(v), None | Some(Value::Null)) if !v.is_null() => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc() -> Value {
        json!({
            "name": "Trail Running Shoe",
            "price": 89.5,
            "status": "active",
            "tags": ["outdoor", "Running"],
            "shipping": { "free_shipping": true }
        })
    }

    #[test]
    fn test_pagination_clamps_and_counts_pages() {
        let p = Pagination::new(Some(0), Some(500));
        assert_eq!(p, Pagination { page: 1, limit: MAX_PAGE_SIZE });

        let p = Pagination::new(Some(3), Some(10));
        assert_eq!(p.to_page(), Page { skip: 20, limit: 10 });
        assert_eq!(p.meta(21).total_pages, 3);
        assert_eq!(p.meta(0).total_pages, 0);
        assert_eq!(Pagination::default().limit, DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn test_filter_matches_nested_and_numeric_fields() {
        let d = doc();
        assert!(Filter::new().eq("shipping.free_shipping", true).matches(&d));
        assert!(Filter::new().gte("price", Decimal::new(50, 0)).lte("price", Decimal::new(8950, 2)).matches(&d));
        assert!(!Filter::new().gte("price", Decimal::new(90, 0)).matches(&d));
        assert!(Filter::new().one_of("status", ["draft", "active"]).matches(&d));
        assert!(!Filter::new().ne("status", "active").matches(&d));
    }

    #[test]
    fn test_search_is_case_insensitive_over_strings_and_arrays() {
        let d = doc();
        assert!(Filter::new().search(&["name"], "running").matches(&d));
        assert!(Filter::new().search(&["description", "tags"], "OUTDOOR").matches(&d));
        assert!(!Filter::new().search(&["name"], "sandal").matches(&d));
        assert!(Filter::new().search(&["name"], "   ").conditions.is_empty());
    }

    #[test]
    fn test_sort_orders_missing_values_first() {
        let a = json!({ "price": 10 });
        let b = json!({ "price": 2.5 });
        let c = json!({});
        assert_eq!(Sort::asc("price").compare(&a, &b), Ordering::Greater);
        assert_eq!(Sort::desc("price").compare(&a, &b), Ordering::Less);
        assert_eq!(Sort::asc("price").compare(&c, &b), Ordering::Less);
    }
}

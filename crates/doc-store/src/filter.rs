//! Document filters and updates.
//!
//! Field names may be dotted paths (`"address.city"`). A missing field reads
//! as `null`.

use std::cmp::Ordering;

use serde_json::{Map, Value};

use crate::{Result, StoreError};

/// A single predicate over one document field.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq(String, Value),
    Ne(String, Value),
    In(String, Vec<Value>),
    Gt(String, Value),
    Gte(String, Value),
    Lt(String, Value),
    Lte(String, Value),
    /// Array field does not contain the value. A missing field matches.
    NotContains(String, Value),
    /// Case-insensitive substring match against any of the listed string fields.
    Text(Vec<String>, String),
}

impl Condition {
    pub fn matches(&self, doc: &Value) -> bool {
        match self {
            Condition::Eq(field, value) => lookup(doc, field) == value,
            Condition::Ne(field, value) => lookup(doc, field) != value,
            Condition::In(field, values) => values.contains(lookup(doc, field)),
            Condition::Gt(field, value) => {
                compare_values(lookup(doc, field), value) == Some(Ordering::Greater)
            }
            Condition::Gte(field, value) => matches!(
                compare_values(lookup(doc, field), value),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Condition::Lt(field, value) => {
                compare_values(lookup(doc, field), value) == Some(Ordering::Less)
            }
            Condition::Lte(field, value) => matches!(
                compare_values(lookup(doc, field), value),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Condition::NotContains(field, value) => match lookup(doc, field) {
                Value::Array(items) => !items.contains(value),
                Value::Null => true,
                _ => false,
            },
            Condition::Text(fields, needle) => {
                let needle = needle.to_lowercase();
                fields.iter().any(|field| {
                    lookup(doc, field)
                        .as_str()
                        .is_some_and(|s| s.to_lowercase().contains(&needle))
                })
            }
        }
    }
}

/// Conjunction of conditions. The empty filter matches every document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<Condition>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Matches the document whose `id` field equals `id`.
    pub fn by_id(id: impl ToString) -> Self {
        Self::new().eq("id", id.to_string())
    }

    pub fn eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.conditions
            .push(Condition::Eq(field.to_string(), value.into()));
        self
    }

    pub fn ne(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.conditions
            .push(Condition::Ne(field.to_string(), value.into()));
        self
    }

    pub fn is_in<I, V>(mut self, field: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.conditions.push(Condition::In(
            field.to_string(),
            values.into_iter().map(Into::into).collect(),
        ));
        self
    }

    pub fn gt(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.conditions
            .push(Condition::Gt(field.to_string(), value.into()));
        self
    }

    pub fn gte(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.conditions
            .push(Condition::Gte(field.to_string(), value.into()));
        self
    }

    pub fn lt(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.conditions
            .push(Condition::Lt(field.to_string(), value.into()));
        self
    }

    pub fn lte(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.conditions
            .push(Condition::Lte(field.to_string(), value.into()));
        self
    }

    pub fn not_contains(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.conditions
            .push(Condition::NotContains(field.to_string(), value.into()));
        self
    }

    pub fn text(mut self, fields: &[&str], needle: impl Into<String>) -> Self {
        self.conditions.push(Condition::Text(
            fields.iter().map(|f| f.to_string()).collect(),
            needle.into(),
        ));
        self
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn matches(&self, doc: &Value) -> bool {
        self.conditions.iter().all(|c| c.matches(doc))
    }

    /// Builds a JSON object holding every non-null equality condition, suitable
    /// for a containment pre-filter (`body @> $1`). Documents it selects must
    /// still be checked with [`Filter::matches`].
    pub fn containment_document(&self) -> Value {
        let mut root = Value::Object(Map::new());
        for condition in &self.conditions {
            if let Condition::Eq(field, value) = condition
                && !value.is_null()
                && !value.is_array()
            {
                // Paths that collide with a scalar are left to the exact check.
                let _ = set_path(&mut root, field, value.clone());
            }
        }
        root
    }
}

/// One field mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOp {
    Set(String, Value),
    /// Adds to an integer field. A missing field counts as zero.
    Inc(String, i64),
    /// Appends to an array field. A missing field starts a new array.
    Push(String, Value),
}

/// Ordered list of mutations applied atomically by the store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Update {
    ops: Vec<UpdateOp>,
}

impl Update {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.ops.push(UpdateOp::Set(field.to_string(), value.into()));
        self
    }

    pub fn inc(mut self, field: &str, by: i64) -> Self {
        self.ops.push(UpdateOp::Inc(field.to_string(), by));
        self
    }

    pub fn push(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.ops.push(UpdateOp::Push(field.to_string(), value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[UpdateOp] {
        &self.ops
    }

    /// Applies every op to `doc` in order. On error `doc` may be partially
    /// modified, so callers apply to a copy.
    pub fn apply(&self, doc: &mut Value) -> Result<()> {
        for op in &self.ops {
            match op {
                UpdateOp::Set(field, value) => set_path(doc, field, value.clone())?,
                UpdateOp::Inc(field, by) => {
                    let current = match lookup(doc, field) {
                        Value::Null => 0,
                        Value::Number(n) => n.as_i64().ok_or_else(|| invalid(field, "not an integer"))?,
                        _ => return Err(invalid(field, "not a number")),
                    };
                    let next = current
                        .checked_add(*by)
                        .ok_or_else(|| invalid(field, "integer overflow"))?;
                    set_path(doc, field, Value::from(next))?;
                }
                UpdateOp::Push(field, value) => {
                    let mut items = match lookup(doc, field) {
                        Value::Null => Vec::new(),
                        Value::Array(items) => items.clone(),
                        _ => return Err(invalid(field, "not an array")),
                    };
                    items.push(value.clone());
                    set_path(doc, field, Value::Array(items))?;
                }
            }
        }
        Ok(())
    }
}

static NULL: Value = Value::Null;

/// Reads a dotted path, returning `null` when any segment is missing.
pub fn lookup<'a>(doc: &'a Value, path: &str) -> &'a Value {
    path.split('.')
        .try_fold(doc, |current, segment| current.get(segment))
        .unwrap_or(&NULL)
}

/// Orders two JSON scalars. Numbers compare numerically, strings
/// lexicographically, booleans false < true. Mixed or non-scalar pairs are
/// unordered, except that `null` sorts before everything.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Null, _) => Some(Ordering::Less),
        (_, Value::Null) => Some(Ordering::Greater),
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => x.as_f64()?.partial_cmp(&y.as_f64()?),
        },
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn set_path(doc: &mut Value, path: &str, value: Value) -> Result<()> {
    let mut segments = path.split('.').peekable();
    let mut current = doc;
    while let Some(segment) = segments.next() {
        if current.is_null() {
            *current = Value::Object(Map::new());
        }
        let object = current
            .as_object_mut()
            .ok_or_else(|| invalid(path, "parent is not an object"))?;
        if segments.peek().is_none() {
            object.insert(segment.to_string(), value);
            return Ok(());
        }
        current = object.entry(segment.to_string()).or_insert(Value::Null);
    }
    Ok(())
}

fn invalid(field: &str, reason: &str) -> StoreError {
    StoreError::InvalidUpdate {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn product() -> Value {
        json!({
            "id": "p1",
            "name": "Trail Blazer",
            "description": "A rugged mountain bike",
            "price": 129900,
            "quantity": 4,
            "kind": "mountain",
            "is_active": true,
            "applied_orders": ["o1"],
            "specs": { "frame": "aluminium" }
        })
    }

    #[test]
    fn empty_filter_matches_everything() {
        assert!(Filter::new().matches(&product()));
        assert!(Filter::new().matches(&json!({})));
    }

    #[test]
    fn equality_and_membership() {
        let doc = product();
        assert!(Filter::by_id("p1").matches(&doc));
        assert!(!Filter::by_id("p2").matches(&doc));
        assert!(Filter::new().is_in("kind", ["road", "mountain"]).matches(&doc));
        assert!(!Filter::new().is_in("kind", ["road"]).matches(&doc));
        assert!(Filter::new().ne("kind", "road").matches(&doc));
        assert!(Filter::new().eq("specs.frame", "aluminium").matches(&doc));
    }

    #[test]
    fn missing_field_reads_as_null() {
        let doc = product();
        assert!(Filter::new().eq("color", Value::Null).matches(&doc));
        assert!(!Filter::new().eq("color", "red").matches(&doc));
    }

    #[test]
    fn range_conditions_compare_numbers() {
        let doc = product();
        assert!(Filter::new().gte("price", 129900).matches(&doc));
        assert!(Filter::new().lt("price", 200000).matches(&doc));
        assert!(!Filter::new().gt("price", 129900).matches(&doc));
        assert!(Filter::new().lte("quantity", 4.5).matches(&doc));
        assert!(!Filter::new().gt("name", 3).matches(&doc));
    }

    #[test]
    fn not_contains_checks_array_membership() {
        let doc = product();
        assert!(!Filter::new().not_contains("applied_orders", "o1").matches(&doc));
        assert!(Filter::new().not_contains("applied_orders", "o2").matches(&doc));
        assert!(Filter::new().not_contains("missing", "o1").matches(&doc));
        assert!(!Filter::new().not_contains("name", "o1").matches(&doc));
    }

    #[test]
    fn text_is_case_insensitive_across_fields() {
        let doc = product();
        assert!(Filter::new().text(&["name", "description"], "RUGGED").matches(&doc));
        assert!(Filter::new().text(&["name", "description"], "blazer").matches(&doc));
        assert!(!Filter::new().text(&["name"], "rugged").matches(&doc));
    }

    #[test]
    fn containment_document_collects_scalar_equalities() {
        let filter = Filter::new()
            .eq("status", "created")
            .eq("address.city", "Lisbon")
            .eq("deleted_at", Value::Null)
            .gt("total", 10);
        assert_eq!(
            filter.containment_document(),
            json!({ "status": "created", "address": { "city": "Lisbon" } })
        );
    }

    #[test]
    fn update_set_inc_push() {
        let mut doc = product();
        Update::new()
            .set("name", "Trail Blazer II")
            .inc("quantity", -3)
            .push("applied_orders", "o2")
            .set("specs.gears", 12)
            .apply(&mut doc)
            .unwrap();
        assert_eq!(doc["name"], "Trail Blazer II");
        assert_eq!(doc["quantity"], 1);
        assert_eq!(doc["applied_orders"], json!(["o1", "o2"]));
        assert_eq!(doc["specs"]["gears"], 12);
        assert_eq!(doc["specs"]["frame"], "aluminium");
    }

    #[test]
    fn inc_and_push_create_missing_fields() {
        let mut doc = json!({ "id": "x" });
        Update::new()
            .inc("hits", 2)
            .push("tags", "new")
            .apply(&mut doc)
            .unwrap();
        assert_eq!(doc["hits"], 2);
        assert_eq!(doc["tags"], json!(["new"]));
    }

    #[test]
    fn inc_on_non_number_fails() {
        let mut doc = product();
        let err = Update::new().inc("name", 1).apply(&mut doc).unwrap_err();
        assert!(matches!(err, StoreError::InvalidUpdate { ref field, .. } if field == "name"));
    }

    #[test]
    fn push_on_non_array_fails() {
        let mut doc = product();
        assert!(Update::new().push("price", 1).apply(&mut doc).is_err());
    }

    #[test]
    fn null_sorts_first() {
        assert_eq!(
            compare_values(&Value::Null, &json!(1)),
            Some(Ordering::Less)
        );
        assert_eq!(compare_values(&json!("a"), &json!(1)), None);
    }
}

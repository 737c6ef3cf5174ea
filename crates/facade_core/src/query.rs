//! Backend-neutral query description.
//!
//! # Responsibility
//! - Describe equality filters and ad-hoc queries over one entity collection.
//! - Evaluate queries in memory for [`crate::store::memory::MemoryStore`].
//!
//! # Invariants
//! - Results are ordered by the requested sort keys, then by `id` ascending.
//! - `null` sorts before numbers, numbers before strings.
//! - Ordered comparisons against `null` never match.

use crate::model::entity::{EntityId, PropertyMap, ID_FIELD};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::cmp::Ordering;

static FIELD_NAME_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("field name pattern is a valid regex")
});

/// Returns whether `name` may be used as a field name or alias in rendered SQL.
pub fn is_valid_field_name(name: &str) -> bool {
    FIELD_NAME_PATTERN.is_match(name)
}

/// Comparison operator of a [`Condition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl Comparison {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
        }
    }

    fn accepts(self, ordering: Ordering) -> bool {
        match self {
            Self::Eq => ordering == Ordering::Equal,
            Self::Ne => ordering != Ordering::Equal,
            Self::Gt => ordering == Ordering::Greater,
            Self::Gte => ordering != Ordering::Less,
            Self::Lt => ordering == Ordering::Less,
            Self::Lte => ordering != Ordering::Greater,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// One `field <op> value` predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub field: String,
    pub comparison: Comparison,
    pub value: Value,
}

impl Condition {
    fn matches(&self, id: EntityId, body: &PropertyMap) -> bool {
        let actual = field_value(id, body, &self.field);
        match self.comparison {
            Comparison::Eq => values_equal(&actual, &self.value),
            Comparison::Ne => !values_equal(&actual, &self.value),
            _ if self.value.is_null() => false,
            comparison => compare_values(&actual, &self.value)
                .is_some_and(|ordering| comparison.accepts(ordering)),
        }
    }
}

/// Ordered equality filter map, e.g. `{"id": 7}` or `{"email": "a@b.c"}`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    entries: Vec<(String, Value)>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter matching a single identifier.
    pub fn by_id(id: EntityId) -> Self {
        Self::new().and(ID_FIELD, id)
    }

    /// Adds (or replaces) an equality entry.
    pub fn and(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        let field = field.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(name, _)| *name == field) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((field, value)),
        }
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(field, value)| (field.as_str(), value))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<PropertyMap> for Filter {
    fn from(value: PropertyMap) -> Self {
        value
            .into_iter()
            .fold(Self::new(), |filter, (field, value)| filter.and(field, value))
    }
}

/// Composable query over one entity collection.
///
/// Built by [`crate::EntityFacade::query`] and executed through
/// [`crate::EntityFacade::execute`]; the alias names the collection in
/// rendered SQL.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryBuilder {
    collection: &'static str,
    alias: String,
    conditions: Vec<Condition>,
    order: Vec<(String, SortDirection)>,
    limit: Option<u64>,
    offset: u64,
}

impl QueryBuilder {
    pub fn new(collection: &'static str, alias: impl Into<String>) -> Self {
        Self {
            collection,
            alias: alias.into(),
            conditions: Vec::new(),
            order: Vec::new(),
            limit: None,
            offset: 0,
        }
    }

    pub fn and_where(
        mut self,
        field: impl Into<String>,
        comparison: Comparison,
        value: impl Into<Value>,
    ) -> Self {
        self.conditions.push(Condition {
            field: field.into(),
            comparison,
            value: value.into(),
        });
        self
    }

    pub fn where_eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.and_where(field, Comparison::Eq, value)
    }

    /// Adds one equality condition per filter entry.
    pub fn filter(self, filter: &Filter) -> Self {
        filter
            .iter()
            .fold(self, |query, (field, value)| query.where_eq(field, value.clone()))
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.order.push((field.into(), direction));
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    /// Drops limit and offset, keeping filters and ordering.
    pub fn without_pagination(&self) -> Self {
        Self {
            limit: None,
            offset: 0,
            ..self.clone()
        }
    }

    pub fn collection(&self) -> &'static str {
        self.collection
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn ordering(&self) -> &[(String, SortDirection)] {
        &self.order
    }

    pub fn max_results(&self) -> Option<u64> {
        self.limit
    }

    pub fn first_result(&self) -> u64 {
        self.offset
    }

    /// Evaluates every condition against one stored document.
    pub fn matches(&self, id: EntityId, body: &PropertyMap) -> bool {
        self.conditions
            .iter()
            .all(|condition| condition.matches(id, body))
    }

    /// Orders two stored documents by the sort keys, then by id.
    pub fn compare(
        &self,
        (left_id, left): (EntityId, &PropertyMap),
        (right_id, right): (EntityId, &PropertyMap),
    ) -> Ordering {
        for (field, direction) in &self.order {
            let ordering = sort_order(
                &field_value(left_id, left, field),
                &field_value(right_id, right, field),
            );
            let ordering = match direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        left_id.cmp(&right_id)
    }
}

fn field_value(id: EntityId, body: &PropertyMap, field: &str) -> Value {
    if field == ID_FIELD {
        return Value::from(id);
    }
    body.get(field).cloned().unwrap_or(Value::Null)
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(_), Value::Number(_)) => {
            compare_values(left, right) == Some(Ordering::Equal)
        }
        _ => left == right,
    }
}

fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(a), Some(b)) => Some(a.cmp(&b)),
            _ => a.as_f64()?.partial_cmp(&b.as_f64()?),
        },
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) | Value::Number(_) => 1,
        Value::String(_) => 2,
        Value::Array(_) | Value::Object(_) => 3,
    }
}

fn sort_order(left: &Value, right: &Value) -> Ordering {
    type_rank(left)
        .cmp(&type_rank(right))
        .then_with(|| compare_values(left, right).unwrap_or(Ordering::Equal))
}

//! Specifications: storage-agnostic query operations.
//!
//! # Responsibility
//! - Provide the backend-agnostic construction surface (`filter`, `order`,
//!   `paginate`) and the chainable [`SpecList`] builder.
//! - Define the [`Specification`] seam each backend implements with its own
//!   closed variant set, and the left fold that compiles a list onto a native
//!   query.
//!
//! # Invariants
//! - Folding an empty list returns the initial query unchanged.
//! - Folding is left to right; nothing is reordered. Filters are conjunctive;
//!   for order and pagination the last specification wins.

use crate::error::{BackendError, BackendResult};
use crate::model::{resolve_field, Model};
use serde_json::Value;
use std::ops::{BitAnd, BitOr, Deref, Not};

pub mod document;
pub mod internal;
pub mod key;
pub mod sql;
pub(crate) mod value;

/// Comparison operator of a field filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    /// Operand is an array; matches when the field equals any element.
    In,
    NotIn,
    /// SQL-style pattern (`%` any run, `_` one character), ASCII case-insensitive.
    Like,
}

/// Boolean filter expression over model fields.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Compare {
        field: String,
        op: CompareOp,
        value: Value,
    },
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
}

impl Filter {
    pub fn compare(field: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Self {
        Self::Compare {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Eq, value)
    }

    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Ne, value)
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Gt, value)
    }

    pub fn gte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Gte, value)
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Lt, value)
    }

    pub fn lte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Lte, value)
    }

    pub fn is_in<V: Into<Value>>(field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        let values = values.into_iter().map(Into::into).collect::<Vec<Value>>();
        Self::compare(field, CompareOp::In, Value::Array(values))
    }

    pub fn not_in<V: Into<Value>>(
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        let values = values.into_iter().map(Into::into).collect::<Vec<Value>>();
        Self::compare(field, CompareOp::NotIn, Value::Array(values))
    }

    pub fn like(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::compare(field, CompareOp::Like, Value::String(pattern.into()))
    }

    /// Every field path referenced by this expression.
    pub fn fields(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::Compare { field, .. } => out.push(field.as_str()),
            Self::And(items) | Self::Or(items) => {
                for item in items {
                    item.collect_fields(out);
                }
            }
            Self::Not(inner) => inner.collect_fields(out),
        }
    }

    /// Checks operand shapes that do not depend on the backend.
    pub fn check_operands(&self) -> BackendResult<()> {
        match self {
            Self::Compare { field, op, value } => match op {
                CompareOp::In | CompareOp::NotIn if !value.is_array() => Err(
                    BackendError::invalid_query(format!("`{field}` in/not-in needs an array operand")),
                ),
                CompareOp::Like if !value.is_string() => Err(BackendError::invalid_query(
                    format!("`{field}` like needs a string pattern"),
                )),
                _ => Ok(()),
            },
            Self::And(items) | Self::Or(items) => items.iter().try_for_each(Filter::check_operands),
            Self::Not(inner) => inner.check_operands(),
        }
    }
}

impl BitAnd for Filter {
    type Output = Filter;

    fn bitand(self, rhs: Filter) -> Filter {
        match self {
            Filter::And(mut items) => {
                items.push(rhs);
                Filter::And(items)
            }
            other => Filter::And(vec![other, rhs]),
        }
    }
}

impl BitOr for Filter {
    type Output = Filter;

    fn bitor(self, rhs: Filter) -> Filter {
        match self {
            Filter::Or(mut items) => {
                items.push(rhs);
                Filter::Or(items)
            }
            other => Filter::Or(vec![other, rhs]),
        }
    }
}

impl Not for Filter {
    type Output = Filter;

    fn not(self) -> Filter {
        match self {
            Filter::Not(inner) => *inner,
            other => Filter::Not(Box::new(other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

/// One sort key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

impl OrderBy {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Desc,
        }
    }

    /// `"balance"` sorts ascending, `"-balance"` descending.
    pub fn parse(key: &str) -> Self {
        match key.strip_prefix('-') {
            Some(field) => Self::desc(field),
            None => Self::asc(key),
        }
    }
}

/// Backend-agnostic query operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Spec {
    Filter(Filter),
    Order(Vec<OrderBy>),
    Paginate { offset: u64, limit: Option<u64> },
}

impl From<Filter> for Spec {
    fn from(value: Filter) -> Self {
        Spec::Filter(value)
    }
}

/// Equality filter on one field.
pub fn filter(field: impl Into<String>, value: impl Into<Value>) -> Spec {
    Spec::Filter(Filter::eq(field, value))
}

/// Arbitrary filter expression.
pub fn filter_where(expression: Filter) -> Spec {
    Spec::Filter(expression)
}

/// Single sort key; a leading `-` sorts descending.
pub fn order(key: &str) -> Spec {
    Spec::Order(vec![OrderBy::parse(key)])
}

pub fn order_by(keys: impl IntoIterator<Item = OrderBy>) -> Spec {
    Spec::Order(keys.into_iter().collect())
}

pub fn paginate(offset: u64, limit: u64) -> Spec {
    Spec::Paginate {
        offset,
        limit: Some(limit),
    }
}

pub fn offset(offset: u64) -> Spec {
    Spec::Paginate {
        offset,
        limit: None,
    }
}

pub fn limit(limit: u64) -> Spec {
    Spec::Paginate {
        offset: 0,
        limit: Some(limit),
    }
}

/// Identity lookup used by `is_modified`/`refresh`.
pub fn identity<M: Model>(id: &str) -> Spec {
    filter(M::ID_FIELD, id)
}

/// Rejects specifications that reference undeclared fields or carry
/// malformed operands.
pub fn validate_specs<M: Model>(specs: &[Spec]) -> BackendResult<()> {
    for spec in specs {
        match spec {
            Spec::Filter(expression) => {
                expression.check_operands()?;
                for field in expression.fields() {
                    resolve_field::<M>(field)?;
                }
            }
            Spec::Order(keys) => {
                for key in keys {
                    resolve_field::<M>(&key.field)?;
                }
            }
            Spec::Paginate { .. } => {}
        }
    }
    Ok(())
}

/// Ordered, chainable list of specifications.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpecList {
    specs: Vec<Spec>,
}

impl SpecList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(filter(field, value))
    }

    pub fn filter_where(self, expression: Filter) -> Self {
        self.with(Spec::Filter(expression))
    }

    pub fn order(self, key: &str) -> Self {
        self.with(order(key))
    }

    pub fn order_by(self, keys: impl IntoIterator<Item = OrderBy>) -> Self {
        self.with(order_by(keys))
    }

    pub fn paginate(self, offset: u64, limit: u64) -> Self {
        self.with(paginate(offset, limit))
    }

    pub fn with(mut self, spec: Spec) -> Self {
        self.specs.push(spec);
        self
    }

    pub fn push(&mut self, spec: Spec) {
        self.specs.push(spec);
    }

    pub fn as_slice(&self) -> &[Spec] {
        &self.specs
    }

    pub fn into_vec(self) -> Vec<Spec> {
        self.specs
    }
}

impl Deref for SpecList {
    type Target = [Spec];

    fn deref(&self) -> &[Spec] {
        &self.specs
    }
}

impl From<Vec<Spec>> for SpecList {
    fn from(specs: Vec<Spec>) -> Self {
        Self { specs }
    }
}

impl FromIterator<Spec> for SpecList {
    fn from_iter<T: IntoIterator<Item = Spec>>(iter: T) -> Self {
        Self {
            specs: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for SpecList {
    type Item = Spec;
    type IntoIter = std::vec::IntoIter<Spec>;

    fn into_iter(self) -> Self::IntoIter {
        self.specs.into_iter()
    }
}

/// One compiled, backend-specific query operation.
pub trait Specification<Q> {
    fn apply(&self, query: Q) -> BackendResult<Q>;
}

/// Compiles agnostic specifications into one backend's variant set and folds
/// them onto that backend's native query.
pub trait SpecificationList {
    type Query;
    type Specification: Specification<Self::Query>;

    fn compile(&self, spec: &Spec) -> Self::Specification;

    fn apply(&self, specs: &[Spec], query: Self::Query) -> BackendResult<Self::Query> {
        specs
            .iter()
            .try_fold(query, |query, spec| self.compile(spec).apply(query))
    }
}

//! In-memory specification variants: filter, sort and slice decoded models.
//!
//! Used directly by the in-memory repository and as the second pass of the
//! key-value repository.

use super::value::{compare_operand, compare_records, like_regex, values_equal};
use super::{CompareOp, Direction, Filter, OrderBy, Spec, Specification, SpecificationList};
use crate::error::{BackendError, BackendResult};
use crate::model::{field_value, to_record, Model, Record};
use serde_json::Value;
use std::cmp::Ordering;
use std::marker::PhantomData;

/// Native query of the in-memory evaluator.
///
/// Filters narrow `models` as they are applied; order and pagination are
/// recorded (last one wins) and resolved by [`InternalQuery::finish`].
#[derive(Debug, Clone, PartialEq)]
pub struct InternalQuery<M> {
    models: Vec<M>,
    order: Vec<OrderBy>,
    offset: u64,
    limit: Option<u64>,
}

impl<M: Model> InternalQuery<M> {
    pub fn new(models: Vec<M>) -> Self {
        Self {
            models,
            order: Vec::new(),
            offset: 0,
            limit: None,
        }
    }

    /// Sorts, then slices the surviving models.
    pub fn finish(self) -> BackendResult<Vec<M>> {
        let mut models = self.models;
        if !self.order.is_empty() {
            let keys: Vec<(&str, Direction)> = self
                .order
                .iter()
                .map(|key| (key.field.as_str(), key.direction))
                .collect();
            let mut keyed = models
                .into_iter()
                .map(|model| to_record(&model).map(|record| (record, model)))
                .collect::<BackendResult<Vec<(Record, M)>>>()?;
            keyed.sort_by(|(left, _), (right, _)| compare_records(&keys, left, right));
            models = keyed.into_iter().map(|(_, model)| model).collect();
        }

        let skip = usize::try_from(self.offset).unwrap_or(usize::MAX);
        let take = self
            .limit
            .map_or(usize::MAX, |limit| usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(models.into_iter().skip(skip).take(take).collect())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InternalSpecification {
    Filter(Filter),
    Order(Vec<OrderBy>),
    Paginate { offset: u64, limit: Option<u64> },
}

impl<M: Model> Specification<InternalQuery<M>> for InternalSpecification {
    fn apply(&self, mut query: InternalQuery<M>) -> BackendResult<InternalQuery<M>> {
        match self {
            Self::Filter(expression) => {
                let mut kept = Vec::with_capacity(query.models.len());
                for model in query.models {
                    if matches(expression, &to_record(&model)?)? {
                        kept.push(model);
                    }
                }
                query.models = kept;
            }
            Self::Order(keys) => query.order = keys.clone(),
            Self::Paginate { offset, limit } => {
                query.offset = *offset;
                query.limit = *limit;
            }
        }
        Ok(query)
    }
}

/// Evaluates `expression` against one record.
pub fn matches(expression: &Filter, record: &Record) -> BackendResult<bool> {
    match expression {
        Filter::Compare { field, op, value } => {
            let actual = field_value(record, field).unwrap_or(&Value::Null);
            compare(field, *op, actual, value)
        }
        Filter::And(items) => {
            for item in items {
                if !matches(item, record)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        Filter::Or(items) => {
            for item in items {
                if matches(item, record)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Filter::Not(inner) => Ok(!matches(inner, record)?),
    }
}

fn compare(field: &str, op: CompareOp, actual: &Value, operand: &Value) -> BackendResult<bool> {
    let matched = match op {
        CompareOp::Eq => values_equal(actual, operand),
        CompareOp::Ne => !values_equal(actual, operand),
        CompareOp::Gt => compare_operand(actual, operand) == Some(Ordering::Greater),
        CompareOp::Gte => matches!(
            compare_operand(actual, operand),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        CompareOp::Lt => compare_operand(actual, operand) == Some(Ordering::Less),
        CompareOp::Lte => matches!(
            compare_operand(actual, operand),
            Some(Ordering::Less | Ordering::Equal)
        ),
        CompareOp::In | CompareOp::NotIn => {
            let candidates = operand.as_array().ok_or_else(|| {
                BackendError::invalid_query(format!("`{field}` in/not-in needs an array operand"))
            })?;
            let found = candidates
                .iter()
                .any(|candidate| values_equal(actual, candidate));
            found == (op == CompareOp::In)
        }
        CompareOp::Like => {
            let pattern = operand.as_str().ok_or_else(|| {
                BackendError::invalid_query(format!("`{field}` like needs a string pattern"))
            })?;
            match actual.as_str() {
                Some(text) => like_regex(pattern)?.is_match(text),
                None => false,
            }
        }
    };
    Ok(matched)
}

/// Specification list for in-memory model vectors.
#[derive(Debug)]
pub struct InternalSpecificationList<M> {
    _model: PhantomData<fn() -> M>,
}

impl<M> Default for InternalSpecificationList<M> {
    fn default() -> Self {
        Self {
            _model: PhantomData,
        }
    }
}

impl<M: Model> SpecificationList for InternalSpecificationList<M> {
    type Query = InternalQuery<M>;
    type Specification = InternalSpecification;

    fn compile(&self, spec: &Spec) -> InternalSpecification {
        match spec {
            Spec::Filter(expression) => InternalSpecification::Filter(expression.clone()),
            Spec::Order(keys) => InternalSpecification::Order(keys.clone()),
            Spec::Paginate { offset, limit } => InternalSpecification::Paginate {
                offset: *offset,
                limit: *limit,
            },
        }
    }
}

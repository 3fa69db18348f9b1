//! Document specification variants compiled onto Mongo-style query documents.
//!
//! # Invariants
//! - A second filter never replaces the first; both are joined with `$and`.
//! - `Order` replaces the sort document; `Paginate` replaces skip/limit.

use super::value::like_pattern;
use super::{CompareOp, Direction, Filter, OrderBy, Spec, Specification, SpecificationList};
use crate::error::BackendResult;
use crate::session::document::Document;
use serde_json::{json, Value};

/// Native query of the document backend.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentQuery {
    pub filter: Document,
    /// `(field, 1 | -1)` pairs, most significant first.
    pub sort: Vec<(String, i32)>,
    pub skip: u64,
    pub limit: Option<u64>,
}

impl DocumentQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Query matching every document carrying one of `ids`.
    pub fn by_ids(id_field: &str, ids: Vec<Value>) -> Self {
        let mut filter = Document::new();
        filter.insert(id_field.to_string(), json!({ "$in": ids }));
        Self {
            filter,
            ..Self::default()
        }
    }

    fn and_filter(&mut self, condition: Document) {
        if self.filter.is_empty() {
            self.filter = condition;
            return;
        }
        let previous = std::mem::take(&mut self.filter);
        self.filter
            .insert("$and".to_string(), json!([previous, condition]));
    }
}

/// Compiles one filter expression into a query document.
pub fn compile_filter(expression: &Filter) -> Document {
    let mut out = Document::new();
    match expression {
        Filter::Compare { field, op, value } => {
            out.insert(field.clone(), compile_operator(*op, value));
        }
        Filter::And(items) => {
            if !items.is_empty() {
                out.insert("$and".to_string(), group(items));
            }
        }
        Filter::Or(items) => {
            if items.is_empty() {
                out.insert("$nor".to_string(), json!([{}]));
            } else {
                out.insert("$or".to_string(), group(items));
            }
        }
        Filter::Not(inner) => {
            out.insert("$nor".to_string(), json!([compile_filter(inner)]));
        }
    }
    out
}

fn group(items: &[Filter]) -> Value {
    Value::Array(
        items
            .iter()
            .map(|item| Value::Object(compile_filter(item)))
            .collect(),
    )
}

fn compile_operator(op: CompareOp, value: &Value) -> Value {
    match op {
        CompareOp::Eq => json!({ "$eq": value }),
        CompareOp::Ne => json!({ "$ne": value }),
        CompareOp::Gt => json!({ "$gt": value }),
        CompareOp::Gte => json!({ "$gte": value }),
        CompareOp::Lt => json!({ "$lt": value }),
        CompareOp::Lte => json!({ "$lte": value }),
        CompareOp::In => json!({ "$in": value }),
        CompareOp::NotIn => json!({ "$nin": value }),
        CompareOp::Like => {
            let pattern = value.as_str().map(like_pattern).unwrap_or_default();
            json!({ "$regex": pattern, "$options": "s" })
        }
    }
}

fn compile_sort(keys: &[OrderBy]) -> Vec<(String, i32)> {
    keys.iter()
        .map(|key| {
            let direction = match key.direction {
                Direction::Asc => 1,
                Direction::Desc => -1,
            };
            (key.field.clone(), direction)
        })
        .collect()
}

/// Document variant set.
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentSpecification {
    Filter(Document),
    Sort(Vec<(String, i32)>),
    Paginate { skip: u64, limit: Option<u64> },
}

impl Specification<DocumentQuery> for DocumentSpecification {
    fn apply(&self, mut query: DocumentQuery) -> BackendResult<DocumentQuery> {
        match self {
            Self::Filter(condition) => query.and_filter(condition.clone()),
            Self::Sort(keys) => query.sort = keys.clone(),
            Self::Paginate { skip, limit } => {
                query.skip = *skip;
                query.limit = *limit;
            }
        }
        Ok(query)
    }
}

#[derive(Debug, Default)]
pub struct DocumentSpecificationList;

impl SpecificationList for DocumentSpecificationList {
    type Query = DocumentQuery;
    type Specification = DocumentSpecification;

    fn compile(&self, spec: &Spec) -> DocumentSpecification {
        match spec {
            Spec::Filter(expression) => DocumentSpecification::Filter(compile_filter(expression)),
            Spec::Order(keys) => DocumentSpecification::Sort(compile_sort(keys)),
            Spec::Paginate { offset, limit } => DocumentSpecification::Paginate {
                skip: *offset,
                limit: *limit,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{compile_filter, DocumentQuery, DocumentSpecificationList};
    use crate::spec::{filter, filter_where, order, paginate, Filter, SpecificationList};
    use serde_json::{json, Value};

    fn compile(specs: &[crate::spec::Spec]) -> DocumentQuery {
        DocumentSpecificationList
            .apply(specs, DocumentQuery::new())
            .unwrap()
    }

    #[test]
    fn empty_list_returns_initial_query() {
        assert_eq!(compile(&[]), DocumentQuery::new());
    }

    #[test]
    fn filters_are_joined_with_and() {
        let query = compile(&[filter("username", "bob"), filter_where(Filter::gt("balance", 5))]);
        assert_eq!(
            Value::Object(query.filter),
            json!({
                "$and": [
                    { "username": { "$eq": "bob" } },
                    { "balance": { "$gt": 5 } }
                ]
            })
        );
    }

    #[test]
    fn order_and_pagination_last_wins() {
        let query = compile(&[order("username"), order("-balance"), paginate(0, 1), paginate(4, 2)]);
        assert_eq!(query.sort, vec![("balance".to_string(), -1)]);
        assert_eq!(query.skip, 4);
        assert_eq!(query.limit, Some(2));
    }

    #[test]
    fn composite_operators_translate() {
        let expression = (Filter::is_in("id", ["a", "b"]) | Filter::like("email", "%@x.io"))
            & !Filter::eq("username", "eve");
        assert_eq!(
            Value::Object(compile_filter(&expression)),
            json!({
                "$and": [
                    { "$or": [
                        { "id": { "$in": ["a", "b"] } },
                        { "email": { "$regex": "^.*@[xX]\\.[iI][oO]$", "$options": "s" } }
                    ] },
                    { "$nor": [ { "username": { "$eq": "eve" } } ] }
                ]
            })
        );
    }
}

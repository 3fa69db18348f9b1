//! Document-store session contract and the embedded in-process client.
//!
//! # Responsibility
//! - Define the query/execute primitives the document repository consumes.
//! - Provide `MemoryDocumentClient`, an in-process store that evaluates the
//!   Mongo-style query documents produced by the document specifications.
//!
//! # Invariants
//! - Documents are JSON objects; the identity lives in a regular field.
//! - `abort_transaction` restores the state captured by `start_transaction`.

use crate::error::{BackendError, BackendResult};
use crate::model::field_value;
use crate::spec::document::DocumentQuery;
use crate::spec::value::{compare_operand, compare_records, values_equal};
use crate::spec::Direction;
use parking_lot::Mutex;
use regex::RegexBuilder;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

/// One stored document.
pub type Document = Map<String, Value>;

/// Primitives of a document-store session.
///
/// Writes take `&self`; implementations own their synchronization.
pub trait DocumentSession {
    /// Documents matching `query`, sorted and paginated.
    fn find(&self, collection: &str, query: &DocumentQuery) -> BackendResult<Vec<Document>>;
    /// Number of documents `find` would return.
    fn count_documents(&self, collection: &str, query: &DocumentQuery) -> BackendResult<u64>;
    /// Collection size without evaluating a filter.
    fn estimated_document_count(&self, collection: &str) -> BackendResult<u64>;
    /// Replaces the first document matching `filter`; inserts when nothing
    /// matches and `upsert` is set. Returns the number of documents written.
    fn replace_one(
        &self,
        collection: &str,
        filter: &Document,
        replacement: Document,
        upsert: bool,
    ) -> BackendResult<u64>;
    /// Assigns `set` on every document matching `filter`.
    fn update_many(&self, collection: &str, filter: &Document, set: &Document) -> BackendResult<u64>;
    fn delete_many(&self, collection: &str, filter: &Document) -> BackendResult<u64>;
    fn start_transaction(&self) -> BackendResult<()>;
    fn commit_transaction(&self) -> BackendResult<()>;
    fn abort_transaction(&self) -> BackendResult<()>;
}

type Collections = HashMap<String, Vec<Document>>;

#[derive(Debug, Default)]
struct DocumentState {
    collections: Collections,
    snapshot: Option<Collections>,
}

/// Embedded document store for one database.
///
/// Clones share the same state.
#[derive(Debug, Clone)]
pub struct MemoryDocumentClient {
    database: String,
    state: Arc<Mutex<DocumentState>>,
}

impl MemoryDocumentClient {
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            state: Arc::new(Mutex::new(DocumentState::default())),
        }
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn in_transaction(&self) -> bool {
        self.state.lock().snapshot.is_some()
    }
}

impl DocumentSession for MemoryDocumentClient {
    fn find(&self, collection: &str, query: &DocumentQuery) -> BackendResult<Vec<Document>> {
        let state = self.state.lock();
        let Some(documents) = state.collections.get(collection) else {
            return Ok(Vec::new());
        };

        let mut found = Vec::new();
        for document in documents {
            if matches_document(&query.filter, document)? {
                found.push(document.clone());
            }
        }
        drop(state);

        if !query.sort.is_empty() {
            let keys: Vec<(&str, Direction)> = query
                .sort
                .iter()
                .map(|(field, direction)| {
                    let direction = if *direction < 0 {
                        Direction::Desc
                    } else {
                        Direction::Asc
                    };
                    (field.as_str(), direction)
                })
                .collect();
            found.sort_by(|left, right| compare_records(&keys, left, right));
        }

        let skip = usize::try_from(query.skip).unwrap_or(usize::MAX);
        let take = query
            .limit
            .map_or(usize::MAX, |limit| usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(found.into_iter().skip(skip).take(take).collect())
    }

    fn count_documents(&self, collection: &str, query: &DocumentQuery) -> BackendResult<u64> {
        Ok(self.find(collection, query)?.len() as u64)
    }

    fn estimated_document_count(&self, collection: &str) -> BackendResult<u64> {
        let state = self.state.lock();
        Ok(state.collections.get(collection).map_or(0, Vec::len) as u64)
    }

    fn replace_one(
        &self,
        collection: &str,
        filter: &Document,
        replacement: Document,
        upsert: bool,
    ) -> BackendResult<u64> {
        let mut state = self.state.lock();
        let documents = state.collections.entry(collection.to_string()).or_default();
        for document in documents.iter_mut() {
            if matches_document(filter, document)? {
                *document = replacement;
                return Ok(1);
            }
        }
        if upsert {
            documents.push(replacement);
            return Ok(1);
        }
        Ok(0)
    }

    fn update_many(&self, collection: &str, filter: &Document, set: &Document) -> BackendResult<u64> {
        let mut state = self.state.lock();
        let Some(documents) = state.collections.get_mut(collection) else {
            return Ok(0);
        };
        let mut updated = 0;
        for document in documents.iter_mut() {
            if matches_document(filter, document)? {
                for (field, value) in set {
                    document.insert(field.clone(), value.clone());
                }
                updated += 1;
            }
        }
        Ok(updated)
    }

    fn delete_many(&self, collection: &str, filter: &Document) -> BackendResult<u64> {
        let mut state = self.state.lock();
        let Some(documents) = state.collections.get_mut(collection) else {
            return Ok(0);
        };
        let mut kept = Vec::with_capacity(documents.len());
        let mut deleted = 0;
        for document in documents.drain(..) {
            if matches_document(filter, &document)? {
                deleted += 1;
            } else {
                kept.push(document);
            }
        }
        *documents = kept;
        Ok(deleted)
    }

    fn start_transaction(&self) -> BackendResult<()> {
        let mut state = self.state.lock();
        if state.snapshot.is_some() {
            return Err(BackendError::native("transaction already in progress"));
        }
        state.snapshot = Some(state.collections.clone());
        Ok(())
    }

    fn commit_transaction(&self) -> BackendResult<()> {
        let mut state = self.state.lock();
        if state.snapshot.take().is_none() {
            return Err(BackendError::native("no transaction started"));
        }
        Ok(())
    }

    fn abort_transaction(&self) -> BackendResult<()> {
        let mut state = self.state.lock();
        match state.snapshot.take() {
            Some(snapshot) => {
                state.collections = snapshot;
                Ok(())
            }
            None => Err(BackendError::native("no transaction started")),
        }
    }
}

/// Evaluates a Mongo-style filter document against one document.
pub fn matches_document(filter: &Document, document: &Document) -> BackendResult<bool> {
    for (key, condition) in filter {
        let matched = match key.as_str() {
            "$and" => {
                let mut all = true;
                for clause in clauses(key, condition)? {
                    if !matches_document(clause, document)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            "$or" => {
                let mut any = false;
                for clause in clauses(key, condition)? {
                    if matches_document(clause, document)? {
                        any = true;
                        break;
                    }
                }
                any
            }
            "$nor" => {
                let mut none = true;
                for clause in clauses(key, condition)? {
                    if matches_document(clause, document)? {
                        none = false;
                        break;
                    }
                }
                none
            }
            operator if operator.starts_with('$') => {
                return Err(BackendError::native(format!(
                    "unsupported top-level operator `{operator}`"
                )))
            }
            field => {
                let actual = field_value(document, field).unwrap_or(&Value::Null);
                matches_condition(field, actual, condition)?
            }
        };
        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

fn clauses<'a>(operator: &str, condition: &'a Value) -> BackendResult<Vec<&'a Document>> {
    let items = condition
        .as_array()
        .ok_or_else(|| BackendError::native(format!("`{operator}` needs an array of filters")))?;
    items
        .iter()
        .map(|item| {
            item.as_object()
                .ok_or_else(|| BackendError::native(format!("`{operator}` clauses must be documents")))
        })
        .collect()
}

fn matches_condition(field: &str, actual: &Value, condition: &Value) -> BackendResult<bool> {
    let operators = match condition {
        Value::Object(map) if map.keys().all(|key| key.starts_with('$')) && !map.is_empty() => map,
        literal => return Ok(values_equal(actual, literal)),
    };

    for (operator, operand) in operators {
        let matched = match operator.as_str() {
            "$eq" => values_equal(actual, operand),
            "$ne" => !values_equal(actual, operand),
            "$gt" => compare_operand(actual, operand) == Some(Ordering::Greater),
            "$gte" => matches!(
                compare_operand(actual, operand),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            "$lt" => compare_operand(actual, operand) == Some(Ordering::Less),
            "$lte" => matches!(
                compare_operand(actual, operand),
                Some(Ordering::Less | Ordering::Equal)
            ),
            "$in" | "$nin" => {
                let candidates = operand.as_array().ok_or_else(|| {
                    BackendError::native(format!("`{field}` {operator} needs an array"))
                })?;
                let found = candidates
                    .iter()
                    .any(|candidate| values_equal(actual, candidate));
                found == (operator == "$in")
            }
            "$regex" => {
                let pattern = operand.as_str().ok_or_else(|| {
                    BackendError::native(format!("`{field}` $regex needs a string"))
                })?;
                let options = operators
                    .get("$options")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                let regex = RegexBuilder::new(pattern)
                    .case_insensitive(options.contains('i'))
                    .dot_matches_new_line(options.contains('s'))
                    .build()?;
                actual.as_str().is_some_and(|text| regex.is_match(text))
            }
            "$options" => true,
            other => {
                return Err(BackendError::native(format!(
                    "unsupported operator `{other}` on `{field}`"
                )))
            }
        };
        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::{matches_document, Document, DocumentSession, MemoryDocumentClient};
    use crate::spec::document::DocumentQuery;
    use serde_json::{json, Value};

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn seeded() -> MemoryDocumentClient {
        let client = MemoryDocumentClient::new("test");
        for (id, name, balance) in [("a", "ann", 10), ("b", "bob", 20), ("c", "bob", 30)] {
            client
                .replace_one(
                    "users",
                    &doc(json!({ "id": id })),
                    doc(json!({ "id": id, "username": name, "balance": balance })),
                    true,
                )
                .unwrap();
        }
        client
    }

    #[test]
    fn operators_match_like_mongo() {
        let record = doc(json!({ "name": "Bob", "age": 30, "tags": ["x"], "meta": { "tier": 2 } }));
        assert!(matches_document(&doc(json!({ "name": "Bob" })), &record).unwrap());
        assert!(matches_document(&doc(json!({ "age": { "$gte": 30, "$lt": 31 } })), &record).unwrap());
        assert!(matches_document(&doc(json!({ "meta.tier": { "$in": [1, 2] } })), &record).unwrap());
        assert!(matches_document(&doc(json!({ "missing": { "$ne": 1 } })), &record).unwrap());
        assert!(matches_document(
            &doc(json!({ "name": { "$regex": "^b", "$options": "i" } })),
            &record
        )
        .unwrap());
        assert!(!matches_document(
            &doc(json!({ "$or": [{ "age": { "$lt": 10 } }, { "name": "Ann" }] })),
            &record
        )
        .unwrap());
        assert!(matches_document(&doc(json!({ "$nor": [{ "name": "Ann" }] })), &record).unwrap());
        assert!(matches_document(&doc(json!({ "age": { "$bogus": 1 } })), &record).is_err());
    }

    #[test]
    fn find_sorts_and_paginates() {
        let client = seeded();
        let query = DocumentQuery {
            filter: doc(json!({ "username": "bob" })),
            sort: vec![("balance".to_string(), -1)],
            skip: 0,
            limit: Some(1),
        };
        let found = client.find("users", &query).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0]["id"], json!("c"));
        let unpaged = DocumentQuery {
            filter: query.filter.clone(),
            ..DocumentQuery::default()
        };
        assert_eq!(client.count_documents("users", &unpaged).unwrap(), 2);
        assert_eq!(client.estimated_document_count("users").unwrap(), 3);
        assert_eq!(client.estimated_document_count("nobody").unwrap(), 0);
    }

    #[test]
    fn update_and_delete_many() {
        let client = seeded();
        let bobs = doc(json!({ "username": "bob" }));
        assert_eq!(
            client
                .update_many("users", &bobs, &doc(json!({ "balance": 0 })))
                .unwrap(),
            2
        );
        let zero = DocumentQuery {
            filter: doc(json!({ "balance": 0 })),
            ..DocumentQuery::default()
        };
        assert_eq!(client.count_documents("users", &zero).unwrap(), 2);
        assert_eq!(client.delete_many("users", &bobs).unwrap(), 2);
        assert_eq!(client.estimated_document_count("users").unwrap(), 1);
    }

    #[test]
    fn abort_restores_snapshot() {
        let client = seeded();
        client.start_transaction().unwrap();
        assert!(client.in_transaction());
        client.delete_many("users", &Document::new()).unwrap();
        assert_eq!(client.estimated_document_count("users").unwrap(), 0);
        client.abort_transaction().unwrap();
        assert_eq!(client.estimated_document_count("users").unwrap(), 3);
        assert!(client.commit_transaction().is_err());
    }
}

//! Document repository over a [`DocumentSession`].
//!
//! One model maps to one collection named `M::NAME`; documents are the serde
//! form of the model.

use super::{
    check_assignable, check_bulk_update, expect_one, run_logged, run_transaction_step, Repository,
    Transactional,
};
use crate::error::wrapper::ErrorWrapper;
use crate::error::{BackendResult, DataResult};
use crate::model::{apply_fields, from_record, to_record, Fields, Model};
use crate::session::document::{Document, DocumentSession};
use crate::spec::document::{DocumentQuery, DocumentSpecificationList};
use crate::spec::{validate_specs, Spec, SpecificationList};
use serde_json::{json, Value};
use std::marker::PhantomData;

const MODULE: &str = "document_repo";

pub struct DocumentRepository<'s, M, S: ?Sized> {
    session: &'s S,
    specifications: DocumentSpecificationList,
    wrapper: ErrorWrapper,
    _model: PhantomData<fn() -> M>,
}

impl<'s, M: Model, S: DocumentSession + ?Sized> DocumentRepository<'s, M, S> {
    pub fn new(session: &'s S) -> Self {
        Self {
            session,
            specifications: DocumentSpecificationList,
            wrapper: ErrorWrapper::default(),
            _model: PhantomData,
        }
    }

    pub fn with_error_wrapper(mut self, wrapper: ErrorWrapper) -> Self {
        self.wrapper = wrapper;
        self
    }

    fn run<T>(&self, operation: &'static str, body: impl FnOnce() -> BackendResult<T>) -> DataResult<T> {
        run_logged(&self.wrapper, MODULE, operation, M::NAME, body)
    }

    fn build(&self, specs: &[Spec]) -> BackendResult<DocumentQuery> {
        validate_specs::<M>(specs)?;
        self.specifications.apply(specs, DocumentQuery::new())
    }

    fn find(&self, query: &DocumentQuery) -> BackendResult<Vec<M>> {
        self.session
            .find(M::NAME, query)?
            .into_iter()
            .map(from_record)
            .collect()
    }

    /// Identities of the documents `query` selects, pagination included.
    fn matching_ids(&self, query: &DocumentQuery) -> BackendResult<Vec<Value>> {
        Ok(self
            .session
            .find(M::NAME, query)?
            .into_iter()
            .filter_map(|document| document.get(M::ID_FIELD).cloned())
            .collect())
    }

    fn write(&self, obj: &M) -> BackendResult<()> {
        self.session
            .replace_one(M::NAME, &identity_filter::<M>(obj.id()), to_record(obj)?, true)?;
        Ok(())
    }
}

fn identity_filter<M: Model>(id: &str) -> Document {
    let mut filter = Document::new();
    filter.insert(M::ID_FIELD.to_string(), json!({ "$eq": id }));
    filter
}

impl<M: Model, S: DocumentSession + ?Sized> Repository<M> for DocumentRepository<'_, M, S> {
    fn get(&self, specs: &[Spec]) -> DataResult<M> {
        self.run("get", || expect_one(self.find(&self.build(specs)?)?))
    }

    fn filter(&self, specs: &[Spec]) -> DataResult<Vec<M>> {
        self.run("filter", || self.find(&self.build(specs)?))
    }

    fn save(&self, obj: &M) -> DataResult<M> {
        self.run("save", || {
            self.write(obj)?;
            Ok(obj.clone())
        })
    }

    fn delete(&self, obj: Option<&M>, specs: &[Spec]) -> DataResult<()> {
        self.run("delete", || {
            if !specs.is_empty() {
                let ids = self.matching_ids(&self.build(specs)?)?;
                if !ids.is_empty() {
                    let targets = DocumentQuery::by_ids(M::ID_FIELD, ids);
                    self.session.delete_many(M::NAME, &targets.filter)?;
                }
            } else if let Some(obj) = obj {
                self.session
                    .delete_many(M::NAME, &identity_filter::<M>(obj.id()))?;
            }
            Ok(())
        })
    }

    fn update(&self, obj: Option<&mut M>, specs: &[Spec], fields: &Fields) -> DataResult<()> {
        self.run("update", || {
            if !specs.is_empty() {
                check_bulk_update::<M>(fields)?;
                let matched = self.find(&self.build(specs)?)?;
                check_assignable(&matched, fields)?;
                let ids: Vec<Value> = matched
                    .iter()
                    .map(|model| Value::String(model.id().to_string()))
                    .collect();
                if !ids.is_empty() {
                    let set: Document = fields
                        .iter()
                        .map(|(name, value)| (name.clone(), value.clone()))
                        .collect();
                    let targets = DocumentQuery::by_ids(M::ID_FIELD, ids);
                    self.session.update_many(M::NAME, &targets.filter, &set)?;
                }
            } else if let Some(obj) = obj {
                let updated = apply_fields(obj, fields)?;
                self.write(&updated)?;
                *obj = updated;
            }
            Ok(())
        })
    }

    fn count(&self, specs: &[Spec]) -> DataResult<u64> {
        self.run("count", || {
            if specs.is_empty() {
                return self.session.estimated_document_count(M::NAME);
            }
            self.session.count_documents(M::NAME, &self.build(specs)?)
        })
    }
}

impl<M: Model, S: DocumentSession + ?Sized> Transactional for DocumentRepository<'_, M, S> {
    fn begin(&self) -> DataResult<()> {
        run_transaction_step(&self.wrapper, MODULE, "begin", || {
            self.session.start_transaction()
        })
    }

    fn commit(&self) -> DataResult<()> {
        run_transaction_step(&self.wrapper, MODULE, "commit", || {
            self.session.commit_transaction()
        })
    }

    fn rollback(&self) -> DataResult<()> {
        run_transaction_step(&self.wrapper, MODULE, "rollback", || {
            self.session.abort_transaction()
        })
    }
}

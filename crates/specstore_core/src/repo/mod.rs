//! Repository contracts and backend implementations.
//!
//! # Responsibility
//! - Define the uniform read/write contract every backend honors.
//! - Route every operation through the error wrapper and the shared
//!   operation log.
//!
//! # Invariants
//! - `get` yields exactly one model or fails with `NotFound` /
//!   `MultipleResults`.
//! - Update and delete by specifications take precedence over the object
//!   form; with neither they are no-ops.
//! - Specification-mode `update` with no fields fails with `InvalidQuery`
//!   before the backend is touched.

use crate::error::wrapper::ErrorWrapper;
use crate::error::{BackendError, BackendResult, DataError, DataResult};
use crate::lazy::LazyCommand;
use crate::model::{apply_fields, model_from_fields, validate_fields, Fields, Model};
use crate::spec::{identity, Spec};
use log::{debug, error};
use std::time::Instant;

pub mod document_repo;
pub mod kv_repo;
pub mod memory_repo;
pub mod sql_repo;

/// Uniform data-access contract over one model type.
pub trait Repository<M: Model> {
    /// Exactly one model matching `specs`.
    fn get(&self, specs: &[Spec]) -> DataResult<M>;

    fn get_lazy(&self, specs: &[Spec]) -> LazyCommand<'_, M> {
        let specs = specs.to_vec();
        LazyCommand::new(move || self.get(&specs))
    }

    /// Every model matching `specs`, possibly none.
    fn filter(&self, specs: &[Spec]) -> DataResult<Vec<M>>;

    fn filter_lazy(&self, specs: &[Spec]) -> LazyCommand<'_, Vec<M>> {
        let specs = specs.to_vec();
        LazyCommand::new(move || self.filter(&specs))
    }

    /// Inserts or replaces `obj` by identity and returns the stored value.
    fn save(&self, obj: &M) -> DataResult<M>;

    /// Builds a model from field assignments and saves it.
    ///
    /// A UUID v4 identity is generated when the identity field is absent.
    fn save_fields(&self, fields: Fields) -> DataResult<M> {
        let model = ErrorWrapper::default().wrap(|| model_from_fields::<M>(fields))?;
        self.save(&model)
    }

    /// Deletes every match of `specs`, or `obj` by identity when `specs` is
    /// empty.
    fn delete(&self, obj: Option<&M>, specs: &[Spec]) -> DataResult<()>;

    /// Assigns `fields` on every match of `specs`, or on `obj` (in place and
    /// persisted) when `specs` is empty.
    fn update(&self, obj: Option<&mut M>, specs: &[Spec], fields: &Fields) -> DataResult<()>;

    /// Number of matches; the whole collection when `specs` is empty.
    fn count(&self, specs: &[Spec]) -> DataResult<u64>;

    fn count_lazy(&self, specs: &[Spec]) -> LazyCommand<'_, u64> {
        let specs = specs.to_vec();
        LazyCommand::new(move || self.count(&specs))
    }

    /// Whether the stored state of `obj` differs from `obj`.
    fn is_modified(&self, obj: &M) -> DataResult<bool> {
        let stored = self.get(&[identity::<M>(obj.id())])?;
        Ok(stored != *obj)
    }

    /// Overwrites `obj` with its stored state.
    fn refresh(&self, obj: &mut M) -> DataResult<()> {
        *obj = self.get(&[identity::<M>(obj.id())])?;
        Ok(())
    }
}

/// Transaction primitives of the session a repository is bound to.
pub trait Transactional {
    fn begin(&self) -> DataResult<()>;
    fn commit(&self) -> DataResult<()>;
    fn rollback(&self) -> DataResult<()>;

    /// Releases session resources held by the repository.
    fn close(&self) -> DataResult<()> {
        Ok(())
    }
}

/// Repository usable inside a unit of work.
pub trait TransactionalRepository<M: Model>: Repository<M> + Transactional {}

impl<M: Model, T: Repository<M> + Transactional + ?Sized> TransactionalRepository<M> for T {}

/// Backend-erased repository produced by the session factory.
pub type DynRepository<'s, M> = Box<dyn TransactionalRepository<M> + 's>;

impl<M: Model, R: Repository<M> + ?Sized> Repository<M> for Box<R> {
    fn get(&self, specs: &[Spec]) -> DataResult<M> {
        (**self).get(specs)
    }

    fn get_lazy(&self, specs: &[Spec]) -> LazyCommand<'_, M> {
        (**self).get_lazy(specs)
    }

    fn filter(&self, specs: &[Spec]) -> DataResult<Vec<M>> {
        (**self).filter(specs)
    }

    fn filter_lazy(&self, specs: &[Spec]) -> LazyCommand<'_, Vec<M>> {
        (**self).filter_lazy(specs)
    }

    fn save(&self, obj: &M) -> DataResult<M> {
        (**self).save(obj)
    }

    fn save_fields(&self, fields: Fields) -> DataResult<M> {
        (**self).save_fields(fields)
    }

    fn delete(&self, obj: Option<&M>, specs: &[Spec]) -> DataResult<()> {
        (**self).delete(obj, specs)
    }

    fn update(&self, obj: Option<&mut M>, specs: &[Spec], fields: &Fields) -> DataResult<()> {
        (**self).update(obj, specs, fields)
    }

    fn count(&self, specs: &[Spec]) -> DataResult<u64> {
        (**self).count(specs)
    }

    fn count_lazy(&self, specs: &[Spec]) -> LazyCommand<'_, u64> {
        (**self).count_lazy(specs)
    }

    fn is_modified(&self, obj: &M) -> DataResult<bool> {
        (**self).is_modified(obj)
    }

    fn refresh(&self, obj: &mut M) -> DataResult<()> {
        (**self).refresh(obj)
    }
}

impl<T: Transactional + ?Sized> Transactional for Box<T> {
    fn begin(&self) -> DataResult<()> {
        (**self).begin()
    }

    fn commit(&self) -> DataResult<()> {
        (**self).commit()
    }

    fn rollback(&self) -> DataResult<()> {
        (**self).rollback()
    }

    fn close(&self) -> DataResult<()> {
        (**self).close()
    }
}

/// Runs one repository operation through `wrapper` and logs its outcome.
///
/// Typed lookup outcomes and rejected queries log at debug; everything else
/// that fails logs at error.
pub(crate) fn run_logged<T>(
    wrapper: &ErrorWrapper,
    backend: &'static str,
    operation: &'static str,
    model: &'static str,
    body: impl FnOnce() -> BackendResult<T>,
) -> DataResult<T> {
    let started_at = Instant::now();
    let result = wrapper.wrap(body);
    let duration_ms = started_at.elapsed().as_millis();
    match &result {
        Ok(_) => debug!(
            "event=repo_{operation} module={backend} status=ok model={model} duration_ms={duration_ms}"
        ),
        Err(err @ DataError::DataLayer { .. }) => error!(
            "event=repo_{operation} module={backend} status=error model={model} duration_ms={duration_ms} error_code={} error={err}",
            err.kind()
        ),
        Err(err) => debug!(
            "event=repo_{operation} module={backend} status=error model={model} duration_ms={duration_ms} error_code={}",
            err.kind()
        ),
    }
    result
}

/// Reduces a result set to its single element.
pub(crate) fn expect_one<M: Model>(mut found: Vec<M>) -> BackendResult<M> {
    match found.len() {
        0 => Err(BackendError::not_found(format!(
            "no `{}` matches the given specifications",
            M::NAME
        ))),
        1 => found.pop().ok_or_else(|| BackendError::native("result set vanished")),
        count => Err(BackendError::multiple_results(format!(
            "{count} `{}` records match where one was expected",
            M::NAME
        ))),
    }
}

/// Validates the field set of a specification-mode update.
pub(crate) fn check_bulk_update<M: Model>(fields: &Fields) -> BackendResult<()> {
    if fields.is_empty() {
        return Err(BackendError::invalid_query(format!(
            "update of `{}` by specifications needs at least one field",
            M::NAME
        )));
    }
    if fields.contains_key(M::ID_FIELD) {
        return Err(BackendError::invalid_query(format!(
            "update of `{}` by specifications cannot assign the identity field `{}`",
            M::NAME,
            M::ID_FIELD
        )));
    }
    validate_fields::<M>(fields)
}

/// Verifies every matched model still decodes once `fields` are assigned.
///
/// Backends that write assignments without decoding (SQL `UPDATE`, document
/// `$set`) call this before writing.
pub(crate) fn check_assignable<M: Model>(matched: &[M], fields: &Fields) -> BackendResult<()> {
    for model in matched {
        apply_fields(model, fields)?;
    }
    Ok(())
}

/// Logs a transaction primitive of one backend session.
pub(crate) fn run_transaction_step(
    wrapper: &ErrorWrapper,
    backend: &'static str,
    step: &'static str,
    body: impl FnOnce() -> BackendResult<()>,
) -> DataResult<()> {
    let result = wrapper.wrap(body);
    match &result {
        Ok(()) => debug!("event=tx_{step} module={backend} status=ok"),
        Err(err) => error!("event=tx_{step} module={backend} status=error error={err}"),
    }
    result
}

#[cfg(test)]
mod tests {
    use super::{check_assignable, check_bulk_update, expect_one, run_logged};
    use crate::error::wrapper::ErrorWrapper;
    use crate::error::{BackendError, DataError, ErrorKind};
    use crate::model::{Field, Fields, Model};
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Tag {
        id: String,
        label: String,
    }

    impl Model for Tag {
        const NAME: &'static str = "tags";
        const FIELDS: &'static [Field] = &[Field::text("id"), Field::text("label")];

        fn id(&self) -> &str {
            &self.id
        }
    }

    fn tag(id: &str) -> Tag {
        Tag {
            id: id.into(),
            label: "x".into(),
        }
    }

    #[test]
    fn expect_one_classifies_cardinality() {
        assert_eq!(expect_one(vec![tag("a")]).unwrap(), tag("a"));
        assert!(matches!(
            expect_one::<Tag>(Vec::new()),
            Err(BackendError::Data(DataError::NotFound(_)))
        ));
        assert!(matches!(
            expect_one(vec![tag("a"), tag("b")]),
            Err(BackendError::Data(DataError::MultipleResults(_)))
        ));
    }

    #[test]
    fn bulk_update_requires_fields_and_keeps_identity() {
        assert!(check_bulk_update::<Tag>(&Fields::new()).is_err());

        let mut fields = Fields::new();
        fields.insert("id".into(), json!("other"));
        assert!(check_bulk_update::<Tag>(&fields).is_err());

        let mut fields = Fields::new();
        fields.insert("label".into(), json!("y"));
        check_bulk_update::<Tag>(&fields).unwrap();
    }

    #[test]
    fn assignments_must_keep_models_decodable() {
        let mut fields = Fields::new();
        fields.insert("label".into(), json!(null));
        check_bulk_update::<Tag>(&fields).unwrap();
        assert!(matches!(
            check_assignable(&[tag("a")], &fields),
            Err(BackendError::Data(DataError::InvalidQuery(_)))
        ));
        check_assignable::<Tag>(&[], &fields).unwrap();

        let mut fields = Fields::new();
        fields.insert("label".into(), json!("y"));
        check_assignable(&[tag("a"), tag("b")], &fields).unwrap();
    }

    #[test]
    fn run_logged_wraps_native_errors() {
        let wrapper = ErrorWrapper::default();
        let err = run_logged::<()>(&wrapper, "test", "get", "tags", || {
            Err(BackendError::native("boom"))
        })
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DataLayer);

        let err = run_logged::<()>(&wrapper, "test", "get", "tags", || {
            Err(BackendError::not_found("none"))
        })
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}

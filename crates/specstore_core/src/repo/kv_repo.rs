//! Key-value repository over a [`KeyValueSession`].
//!
//! Models are stored as JSON strings under `{NAME}:{id}`. Key patterns can
//! only express identity lookups, so the full specification list is always
//! applied a second time over the decoded models. Double filtering controls
//! whether the specifications also narrow the key pattern first.

use super::{
    check_bulk_update, expect_one, run_logged, run_transaction_step, Repository, Transactional,
};
use crate::error::wrapper::ErrorWrapper;
use crate::error::{BackendResult, DataResult};
use crate::model::{apply_fields, Fields, Model};
use crate::session::key_value::KeyValueSession;
use crate::spec::internal::{InternalQuery, InternalSpecificationList};
use crate::spec::key::{model_key, namespace_pattern, KeySpecificationList};
use crate::spec::{validate_specs, Spec, SpecificationList};
use log::debug;

const MODULE: &str = "kv_repo";

pub struct KeyValueRepository<'s, M, S: ?Sized> {
    session: &'s S,
    specifications: KeySpecificationList<M>,
    decoded: InternalSpecificationList<M>,
    use_double_filter: bool,
    wrapper: ErrorWrapper,
}

impl<'s, M: Model, S: KeyValueSession + ?Sized> KeyValueRepository<'s, M, S> {
    pub fn new(session: &'s S) -> Self {
        Self {
            session,
            specifications: KeySpecificationList::default(),
            decoded: InternalSpecificationList::default(),
            use_double_filter: true,
            wrapper: ErrorWrapper::default(),
        }
    }

    /// Disabling double filtering scans the whole model namespace; the
    /// specifications are still applied over the decoded models.
    pub fn with_double_filter(mut self, enabled: bool) -> Self {
        self.use_double_filter = enabled;
        self
    }

    pub fn with_error_wrapper(mut self, wrapper: ErrorWrapper) -> Self {
        self.wrapper = wrapper;
        self
    }

    pub fn uses_double_filter(&self) -> bool {
        self.use_double_filter
    }

    fn run<T>(&self, operation: &'static str, body: impl FnOnce() -> BackendResult<T>) -> DataResult<T> {
        run_logged(&self.wrapper, MODULE, operation, M::NAME, body)
    }

    fn find(&self, specs: &[Spec]) -> BackendResult<Vec<M>> {
        validate_specs::<M>(specs)?;
        let pattern = if self.use_double_filter {
            self.specifications.apply(specs, namespace_pattern::<M>())?
        } else {
            namespace_pattern::<M>()
        };
        let keys = self.session.keys(&pattern)?;
        debug!(
            "event=kv_scan module={MODULE} status=ok model={} keys={}",
            M::NAME,
            keys.len()
        );

        let mut models = Vec::with_capacity(keys.len());
        for value in self.session.mget(&keys)?.into_iter().flatten() {
            models.push(serde_json::from_str::<M>(&value)?);
        }

        self.decoded
            .apply(specs, InternalQuery::new(models))?
            .finish()
    }

    fn write_all(&self, models: &[M]) -> BackendResult<()> {
        let entries = models
            .iter()
            .map(|model| -> BackendResult<(String, String)> {
                Ok((model_key::<M>(model.id()), serde_json::to_string(model)?))
            })
            .collect::<BackendResult<Vec<_>>>()?;
        if !entries.is_empty() {
            self.session.mset(entries)?;
        }
        Ok(())
    }
}

impl<M: Model, S: KeyValueSession + ?Sized> Repository<M> for KeyValueRepository<'_, M, S> {
    fn get(&self, specs: &[Spec]) -> DataResult<M> {
        self.run("get", || expect_one(self.find(specs)?))
    }

    fn filter(&self, specs: &[Spec]) -> DataResult<Vec<M>> {
        self.run("filter", || self.find(specs))
    }

    fn save(&self, obj: &M) -> DataResult<M> {
        self.run("save", || {
            self.session
                .set(&model_key::<M>(obj.id()), serde_json::to_string(obj)?)?;
            Ok(obj.clone())
        })
    }

    fn delete(&self, obj: Option<&M>, specs: &[Spec]) -> DataResult<()> {
        self.run("delete", || {
            let keys = if !specs.is_empty() {
                self.find(specs)?
                    .iter()
                    .map(|model| model_key::<M>(model.id()))
                    .collect::<Vec<_>>()
            } else if let Some(obj) = obj {
                vec![model_key::<M>(obj.id())]
            } else {
                Vec::new()
            };
            if !keys.is_empty() {
                self.session.del(&keys)?;
            }
            Ok(())
        })
    }

    fn update(&self, obj: Option<&mut M>, specs: &[Spec], fields: &Fields) -> DataResult<()> {
        self.run("update", || {
            if !specs.is_empty() {
                check_bulk_update::<M>(fields)?;
                let updated = self
                    .find(specs)?
                    .iter()
                    .map(|model| apply_fields(model, fields))
                    .collect::<BackendResult<Vec<_>>>()?;
                self.write_all(&updated)?;
            } else if let Some(obj) = obj {
                let updated = apply_fields(obj, fields)?;
                self.write_all(std::slice::from_ref(&updated))?;
                *obj = updated;
            }
            Ok(())
        })
    }

    fn count(&self, specs: &[Spec]) -> DataResult<u64> {
        self.run("count", || {
            if specs.is_empty() {
                return Ok(self.session.keys(&namespace_pattern::<M>())?.len() as u64);
            }
            Ok(self.find(specs)?.len() as u64)
        })
    }
}

impl<M: Model, S: KeyValueSession + ?Sized> Transactional for KeyValueRepository<'_, M, S> {
    fn begin(&self) -> DataResult<()> {
        run_transaction_step(&self.wrapper, MODULE, "begin", || self.session.multi())
    }

    fn commit(&self) -> DataResult<()> {
        run_transaction_step(&self.wrapper, MODULE, "commit", || self.session.exec())
    }

    fn rollback(&self) -> DataResult<()> {
        run_transaction_step(&self.wrapper, MODULE, "rollback", || self.session.discard())
    }
}

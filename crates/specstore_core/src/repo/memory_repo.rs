//! In-memory repository over a shared [`MemoryStore`].

use super::{
    check_bulk_update, expect_one, run_logged, run_transaction_step, Repository, Transactional,
};
use crate::error::wrapper::ErrorWrapper;
use crate::error::{BackendResult, DataResult};
use crate::model::{apply_fields, from_record, to_record, Fields, Model};
use crate::session::memory::MemoryStore;
use crate::spec::internal::{InternalQuery, InternalSpecificationList};
use crate::spec::{validate_specs, Spec, SpecificationList};

const MODULE: &str = "memory_repo";

pub struct MemoryRepository<'s, M> {
    store: &'s MemoryStore,
    specifications: InternalSpecificationList<M>,
    wrapper: ErrorWrapper,
}

impl<'s, M: Model> MemoryRepository<'s, M> {
    pub fn new(store: &'s MemoryStore) -> Self {
        Self {
            store,
            specifications: InternalSpecificationList::default(),
            wrapper: ErrorWrapper::default(),
        }
    }

    pub fn with_error_wrapper(mut self, wrapper: ErrorWrapper) -> Self {
        self.wrapper = wrapper;
        self
    }

    fn run<T>(&self, operation: &'static str, body: impl FnOnce() -> BackendResult<T>) -> DataResult<T> {
        run_logged(&self.wrapper, MODULE, operation, M::NAME, body)
    }

    fn find(&self, specs: &[Spec]) -> BackendResult<Vec<M>> {
        validate_specs::<M>(specs)?;
        let models = self
            .store
            .records(M::NAME)
            .into_iter()
            .map(from_record)
            .collect::<BackendResult<Vec<M>>>()?;
        self.specifications
            .apply(specs, InternalQuery::new(models))?
            .finish()
    }

    fn write(&self, obj: &M) -> BackendResult<()> {
        self.store.upsert(M::NAME, obj.id(), to_record(obj)?);
        Ok(())
    }
}

impl<M: Model> Repository<M> for MemoryRepository<'_, M> {
    fn get(&self, specs: &[Spec]) -> DataResult<M> {
        self.run("get", || expect_one(self.find(specs)?))
    }

    fn filter(&self, specs: &[Spec]) -> DataResult<Vec<M>> {
        self.run("filter", || self.find(specs))
    }

    fn save(&self, obj: &M) -> DataResult<M> {
        self.run("save", || {
            self.write(obj)?;
            Ok(obj.clone())
        })
    }

    fn delete(&self, obj: Option<&M>, specs: &[Spec]) -> DataResult<()> {
        self.run("delete", || {
            let ids = if !specs.is_empty() {
                self.find(specs)?
                    .iter()
                    .map(|model| model.id().to_string())
                    .collect::<Vec<_>>()
            } else if let Some(obj) = obj {
                vec![obj.id().to_string()]
            } else {
                Vec::new()
            };
            self.store.remove(M::NAME, &ids);
            Ok(())
        })
    }

    fn update(&self, obj: Option<&mut M>, specs: &[Spec], fields: &Fields) -> DataResult<()> {
        self.run("update", || {
            if !specs.is_empty() {
                check_bulk_update::<M>(fields)?;
                for model in self.find(specs)? {
                    self.write(&apply_fields(&model, fields)?)?;
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
                return Ok(self.store.len(M::NAME) as u64);
            }
            Ok(self.find(specs)?.len() as u64)
        })
    }
}

impl<M: Model> Transactional for MemoryRepository<'_, M> {
    fn begin(&self) -> DataResult<()> {
        run_transaction_step(&self.wrapper, MODULE, "begin", || self.store.begin())
    }

    fn commit(&self) -> DataResult<()> {
        run_transaction_step(&self.wrapper, MODULE, "commit", || self.store.commit())
    }

    fn rollback(&self) -> DataResult<()> {
        run_transaction_step(&self.wrapper, MODULE, "rollback", || self.store.rollback())
    }
}

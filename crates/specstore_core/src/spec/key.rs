//! Key-value specification variants compiled onto a key glob.
//!
//! Only an equality filter on the identity field can be pushed into the key
//! pattern. Everything else leaves the pattern unchanged; the key-value
//! repository re-applies the full list in memory over the decoded models.

use super::value::glob_escape;
use super::{CompareOp, Filter, Spec, Specification, SpecificationList};
use crate::error::BackendResult;
use crate::model::Model;
use serde_json::Value;
use std::marker::PhantomData;

/// Key of one model instance: `{NAME}:{id}`.
pub fn model_key<M: Model>(id: &str) -> String {
    format!("{}:{}", M::NAME, id)
}

/// Glob matching every key of the model namespace.
pub fn namespace_pattern<M: Model>() -> String {
    format!("{}:*", glob_escape(M::NAME))
}

#[derive(Debug, Clone, PartialEq)]
pub enum KeySpecification {
    /// Narrows the glob to one exact key.
    MatchKey(String),
    /// Evaluated after decoding; the glob is unchanged.
    Deferred,
}

impl Specification<String> for KeySpecification {
    fn apply(&self, pattern: String) -> BackendResult<String> {
        match self {
            Self::MatchKey(key) => Ok(key.clone()),
            Self::Deferred => Ok(pattern),
        }
    }
}

#[derive(Debug)]
pub struct KeySpecificationList<M> {
    _model: PhantomData<fn() -> M>,
}

impl<M> Default for KeySpecificationList<M> {
    fn default() -> Self {
        Self {
            _model: PhantomData,
        }
    }
}

impl<M: Model> SpecificationList for KeySpecificationList<M> {
    type Query = String;
    type Specification = KeySpecification;

    fn compile(&self, spec: &Spec) -> KeySpecification {
        match spec {
            Spec::Filter(Filter::Compare {
                field,
                op: CompareOp::Eq,
                value: Value::String(id),
            }) if field == M::ID_FIELD => {
                KeySpecification::MatchKey(format!("{}:{}", glob_escape(M::NAME), glob_escape(id)))
            }
            _ => KeySpecification::Deferred,
        }
    }
}

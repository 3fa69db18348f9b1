//! Domain model contract shared by every backend.
//!
//! # Responsibility
//! - Declare the identity field and field list each backend encodes.
//! - Convert models to and from the JSON document shape used for field
//!   access, bulk field assignment and non-relational storage.
//!
//! # Invariants
//! - The identity field is listed in `FIELDS` and is the lookup/delete key on
//!   every backend.
//! - Field assignments are validated against `FIELDS` before they reach a
//!   backend.

use crate::error::{BackendError, BackendResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt::Debug;
use uuid::Uuid;

pub mod money;

/// Stored representation class of one model field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Integer,
    Real,
    Bool,
    /// Nested value kept as a JSON document (lists, sub-objects).
    Json,
}

/// One declared model field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub kind: FieldKind,
}

impl Field {
    pub const fn new(name: &'static str, kind: FieldKind) -> Self {
        Self { name, kind }
    }

    pub const fn text(name: &'static str) -> Self {
        Self::new(name, FieldKind::Text)
    }

    pub const fn integer(name: &'static str) -> Self {
        Self::new(name, FieldKind::Integer)
    }

    pub const fn real(name: &'static str) -> Self {
        Self::new(name, FieldKind::Real)
    }

    pub const fn boolean(name: &'static str) -> Self {
        Self::new(name, FieldKind::Bool)
    }

    pub const fn json(name: &'static str) -> Self {
        Self::new(name, FieldKind::Json)
    }

    /// Returns whether `value` can be stored in this field.
    ///
    /// `null` is accepted for every kind; optionality is the model's concern.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self.kind, value) {
            (_, Value::Null) => true,
            (FieldKind::Text, Value::String(_)) => true,
            (FieldKind::Integer, Value::Number(n)) => n.is_i64(),
            (FieldKind::Real, Value::Number(_)) => true,
            (FieldKind::Bool, Value::Bool(_)) => true,
            (FieldKind::Json, _) => true,
            _ => false,
        }
    }
}

/// Field assignments for `save_fields` and `update`.
pub type Fields = BTreeMap<String, Value>;

/// JSON object form of a model.
pub type Record = Map<String, Value>;

/// Entity stored through a repository.
pub trait Model: Serialize + DeserializeOwned + Clone + PartialEq + Debug + 'static {
    /// Table, collection or key namespace name.
    const NAME: &'static str;
    /// Identity field name.
    const ID_FIELD: &'static str = "id";
    /// Declared fields, identity included.
    const FIELDS: &'static [Field];

    /// Stable identity value.
    fn id(&self) -> &str;

    fn field(name: &str) -> Option<&'static Field> {
        Self::FIELDS.iter().find(|field| field.name == name)
    }
}

/// Resolves a possibly dotted field path to its declared root field.
///
/// Dotted paths (`meta.tier`) are only valid below `Json` fields.
pub fn resolve_field<M: Model>(path: &str) -> BackendResult<&'static Field> {
    let (root, nested) = match path.split_once('.') {
        Some((root, rest)) => (root, Some(rest)),
        None => (path, None),
    };
    let field = M::field(root).ok_or_else(|| {
        BackendError::invalid_query(format!("unknown field `{root}` for model `{}`", M::NAME))
    })?;
    if nested.is_some() && field.kind != FieldKind::Json {
        return Err(BackendError::invalid_query(format!(
            "field `{root}` of model `{}` has no nested fields",
            M::NAME
        )));
    }
    Ok(field)
}

/// Validates field assignments against the model declaration.
pub fn validate_fields<M: Model>(fields: &Fields) -> BackendResult<()> {
    for (name, value) in fields {
        let field = M::field(name).ok_or_else(|| {
            BackendError::invalid_query(format!("unknown field `{name}` for model `{}`", M::NAME))
        })?;
        if !field.accepts(value) {
            return Err(BackendError::invalid_query(format!(
                "value `{value}` does not fit field `{name}` ({:?}) of model `{}`",
                field.kind,
                M::NAME
            )));
        }
    }
    Ok(())
}

pub fn to_record<M: Model>(model: &M) -> BackendResult<Record> {
    match serde_json::to_value(model)? {
        Value::Object(record) => Ok(record),
        other => Err(BackendError::native(format!(
            "model `{}` must serialize to an object, got `{other}`",
            M::NAME
        ))),
    }
}

pub fn from_record<M: Model>(record: Record) -> BackendResult<M> {
    Ok(serde_json::from_value(Value::Object(record))?)
}

/// Returns a copy of `model` with `fields` assigned.
pub fn apply_fields<M: Model>(model: &M, fields: &Fields) -> BackendResult<M> {
    validate_fields::<M>(fields)?;
    let mut record = to_record(model)?;
    for (name, value) in fields {
        record.insert(name.clone(), value.clone());
    }
    serde_json::from_value(Value::Object(record)).map_err(|err| {
        BackendError::invalid_query(format!("cannot assign fields to `{}`: {err}", M::NAME))
    })
}

/// Builds a model from field assignments, generating an identity when absent.
pub fn model_from_fields<M: Model>(mut fields: Fields) -> BackendResult<M> {
    if !fields.contains_key(M::ID_FIELD) {
        fields.insert(
            M::ID_FIELD.to_string(),
            Value::String(Uuid::new_v4().to_string()),
        );
    }
    validate_fields::<M>(&fields)?;
    let record: Record = fields.into_iter().collect();
    serde_json::from_value(Value::Object(record)).map_err(|err| {
        BackendError::invalid_query(format!("cannot build `{}` from fields: {err}", M::NAME))
    })
}

/// Looks up a dotted path inside a record.
pub fn field_value<'a>(record: &'a Record, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = record.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

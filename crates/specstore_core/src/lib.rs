//! Storage-agnostic data access for specstore.
//!
//! Callers describe queries as ordered specification lists, run them through
//! a backend repository and group writes in a unit of work. The relational,
//! document, key-value and in-memory backends share one error taxonomy.

pub mod config;
pub mod db;
pub mod error;
pub mod lazy;
pub mod logging;
pub mod model;
pub mod repo;
pub mod session;
pub mod spec;
pub mod uow;

pub use config::{Backend, ConfigError, StoreConfig};
pub use error::wrapper::ErrorWrapper;
pub use error::{BackendError, BackendResult, DataError, DataResult, ErrorKind};
pub use lazy::LazyCommand;
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::money::Money;
pub use model::{Field, FieldKind, Fields, Model};
pub use repo::document_repo::DocumentRepository;
pub use repo::kv_repo::KeyValueRepository;
pub use repo::memory_repo::MemoryRepository;
pub use repo::sql_repo::SqlRepository;
pub use repo::{DynRepository, Repository, Transactional, TransactionalRepository};
pub use session::document::{Document, DocumentSession, MemoryDocumentClient};
pub use session::key_value::{KeyValueSession, MemoryKeyValueClient};
pub use session::memory::MemoryStore;
pub use session::{open_session, NativeSession};
pub use spec::document::DocumentQuery;
pub use spec::{
    CompareOp, Direction, Filter, OrderBy, Spec, SpecList, Specification, SpecificationList,
};
pub use uow::{DynUnitOfWork, UnitOfWork, UnitOfWorkScope, UowState};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

//! Native sessions and the configuration-driven factory.
//!
//! # Responsibility
//! - Open the native session of the configured backend.
//! - Build repositories and units of work bound to that session.
//!
//! # Invariants
//! - Repositories borrow the session; the caller owns it.
//! - Relational repositories are only built over verified model tables.

use crate::config::{Backend, ConfigError, StoreConfig};
use crate::db::{create_table, open_db, open_db_in_memory, DbError};
use crate::error::wrapper::ErrorWrapper;
use crate::error::{BackendError, DataError, DataResult};
use crate::model::Model;
use crate::repo::document_repo::DocumentRepository;
use crate::repo::kv_repo::KeyValueRepository;
use crate::repo::memory_repo::MemoryRepository;
use crate::repo::sql_repo::SqlRepository;
use crate::repo::DynRepository;
use crate::uow::{DynUnitOfWork, UnitOfWork};
use log::info;
use rusqlite::Connection;

pub mod document;
pub mod key_value;
pub mod memory;

use document::MemoryDocumentClient;
use key_value::MemoryKeyValueClient;
use memory::MemoryStore;

const IN_MEMORY_PATH: &str = ":memory:";

/// Session owned by the caller for the lifetime of its repositories.
pub enum NativeSession {
    Relational(Connection),
    Document(MemoryDocumentClient),
    KeyValue {
        client: MemoryKeyValueClient,
        use_double_filter: bool,
    },
    Memory(MemoryStore),
}

/// Opens the native session selected by `config`.
pub fn open_session(config: &StoreConfig) -> Result<NativeSession, ConfigError> {
    config.validate()?;
    let session = match config.backend {
        Backend::Relational => {
            let path = config.relational.path.as_deref().unwrap_or(IN_MEMORY_PATH);
            let conn = if path == IN_MEMORY_PATH {
                open_db_in_memory()
            } else {
                open_db(path)
            };
            NativeSession::Relational(conn.map_err(|err| session_error(Backend::Relational, err))?)
        }
        Backend::Document => NativeSession::Document(MemoryDocumentClient::new(
            config.document.database.clone().unwrap_or_default(),
        )),
        Backend::KeyValue => NativeSession::KeyValue {
            client: MemoryKeyValueClient::new(),
            use_double_filter: config.key_value.use_double_filter,
        },
        Backend::Memory => NativeSession::Memory(MemoryStore::new()),
    };
    info!(
        "event=session_open module=session status=ok backend={}",
        config.backend
    );
    Ok(session)
}

fn session_error(backend: Backend, err: DbError) -> ConfigError {
    ConfigError::Session {
        backend,
        source: ErrorWrapper::default().convert(BackendError::from(err)),
    }
}

impl NativeSession {
    pub fn backend(&self) -> Backend {
        match self {
            Self::Relational(_) => Backend::Relational,
            Self::Document(_) => Backend::Document,
            Self::KeyValue { .. } => Backend::KeyValue,
            Self::Memory(_) => Backend::Memory,
        }
    }

    /// Prepares storage for `M`: creates the table on the relational
    /// backend, nothing elsewhere.
    pub fn ensure_model<M: Model>(&self) -> DataResult<()> {
        match self {
            Self::Relational(conn) => ErrorWrapper::default().wrap(|| {
                create_table::<M>(conn)?;
                Ok(())
            }),
            _ => Ok(()),
        }
    }

    /// Repository for `M` bound to this session.
    pub fn repository<M: Model>(&self) -> DataResult<DynRepository<'_, M>> {
        let repository: DynRepository<'_, M> = match self {
            Self::Relational(conn) => Box::new(SqlRepository::<M>::try_new(conn)?),
            Self::Document(client) => Box::new(DocumentRepository::<M, _>::new(client)),
            Self::KeyValue {
                client,
                use_double_filter,
            } => Box::new(
                KeyValueRepository::<M, _>::new(client).with_double_filter(*use_double_filter),
            ),
            Self::Memory(store) => Box::new(MemoryRepository::<M>::new(store)),
        };
        Ok(repository)
    }

    /// Unit of work over a fresh repository for `M`.
    pub fn unit_of_work<M: Model>(&self) -> DataResult<DynUnitOfWork<'_, M>> {
        Ok(UnitOfWork::new(self.repository::<M>()?))
    }

    pub fn connection(&self) -> DataResult<&Connection> {
        match self {
            Self::Relational(conn) => Ok(conn),
            other => Err(DataError::data_layer(format!(
                "{} session has no SQL connection",
                other.backend()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{open_session, NativeSession};
    use crate::config::{Backend, ConfigError, StoreConfig};

    #[test]
    fn opens_every_backend_in_memory() {
        for backend in Backend::ALL {
            let session = open_session(&StoreConfig::in_memory(backend)).unwrap();
            assert_eq!(session.backend(), backend);
        }
    }

    #[test]
    fn key_value_session_carries_double_filter_flag() {
        let mut config = StoreConfig::in_memory(Backend::KeyValue);
        config.key_value.use_double_filter = false;
        match open_session(&config).unwrap() {
            NativeSession::KeyValue {
                use_double_filter, ..
            } => assert!(!use_double_filter),
            _ => panic!("expected key-value session"),
        }
    }

    #[test]
    fn invalid_config_is_rejected_before_opening() {
        let mut config = StoreConfig::in_memory(Backend::Relational);
        config.relational.path = None;
        assert!(matches!(
            open_session(&config),
            Err(ConfigError::Missing { .. })
        ));
    }

    #[test]
    fn only_relational_sessions_expose_a_connection() {
        let session = open_session(&StoreConfig::in_memory(Backend::Memory)).unwrap();
        assert!(session.connection().is_err());
        let session = open_session(&StoreConfig::in_memory(Backend::Relational)).unwrap();
        assert!(session.connection().is_ok());
    }
}

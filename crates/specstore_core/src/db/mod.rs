//! SQLite bootstrap for the relational backend.
//!
//! # Responsibility
//! - Open and configure SQLite connections.
//! - Create and verify model tables from `Model::FIELDS`.
//!
//! # Invariants
//! - Identifiers reaching SQL text are quoted by [`quote_ident`].
//! - A repository is only built over a connection whose table carries every
//!   declared column.

use thiserror::Error;

mod open;
mod schema;

pub use open::{open_db, open_db_in_memory};
pub use schema::{create_table, ensure_model_table};

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error("relational store requires table `{0}`")]
    MissingRequiredTable(&'static str),
    #[error("relational store requires column `{column}` in table `{table}`")]
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
    #[error("model `{model}` does not declare its identity field `{field}`")]
    MissingIdentityField {
        model: &'static str,
        field: &'static str,
    },
}

/// Quotes an SQL identifier, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

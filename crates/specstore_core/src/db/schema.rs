//! Model table creation and verification.

use super::{quote_ident, DbError, DbResult};
use crate::model::{FieldKind, Model};
use log::info;
use rusqlite::Connection;

/// Creates the model table if it does not exist.
///
/// The identity field becomes `TEXT PRIMARY KEY`; other columns follow
/// their declared [`FieldKind`].
pub fn create_table<M: Model>(conn: &Connection) -> DbResult<()> {
    if M::field(M::ID_FIELD).is_none() {
        return Err(DbError::MissingIdentityField {
            model: M::NAME,
            field: M::ID_FIELD,
        });
    }

    let columns = M::FIELDS
        .iter()
        .map(|field| {
            if field.name == M::ID_FIELD {
                format!("{} TEXT PRIMARY KEY NOT NULL", quote_ident(field.name))
            } else {
                format!("{} {}", quote_ident(field.name), column_type(field.kind))
            }
        })
        .collect::<Vec<_>>()
        .join(", ");

    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {} ({columns});",
        quote_ident(M::NAME)
    ))?;
    info!(
        "event=table_ready module=db status=ok table={} columns={}",
        M::NAME,
        M::FIELDS.len()
    );
    Ok(())
}

/// Verifies the connection carries the model table with every declared column.
pub fn ensure_model_table<M: Model>(conn: &Connection) -> DbResult<()> {
    if !table_exists(conn, M::NAME)? {
        return Err(DbError::MissingRequiredTable(M::NAME));
    }
    let existing = table_columns(conn, M::NAME)?;
    for field in M::FIELDS {
        if !existing.iter().any(|column| column == field.name) {
            return Err(DbError::MissingRequiredColumn {
                table: M::NAME,
                column: field.name,
            });
        }
    }
    Ok(())
}

fn column_type(kind: FieldKind) -> &'static str {
    match kind {
        FieldKind::Text | FieldKind::Json => "TEXT",
        FieldKind::Integer | FieldKind::Bool => "INTEGER",
        FieldKind::Real => "REAL",
    }
}

fn table_exists(conn: &Connection, table: &str) -> DbResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn table_columns(conn: &Connection, table: &str) -> DbResult<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({});", quote_ident(table)))?;
    let mut rows = stmt.query([])?;
    let mut columns = Vec::new();
    while let Some(row) = rows.next()? {
        columns.push(row.get::<_, String>(1)?);
    }
    Ok(columns)
}

//! Relational repository over a SQLite connection.
//!
//! # Responsibility
//! - Compile specifications into parameterized SQL and map rows to models.
//! - Drive `BEGIN`/`COMMIT`/`ROLLBACK` on the borrowed connection.
//!
//! # Invariants
//! - Construction fails when the model table or one of its columns is missing.
//! - Bulk update/delete target exactly the rows `filter` would return,
//!   pagination included.

use super::{
    check_assignable, check_bulk_update, expect_one, run_logged, run_transaction_step, Repository,
    Transactional,
};
use crate::db::{ensure_model_table, quote_ident};
use crate::error::wrapper::ErrorWrapper;
use crate::error::{BackendError, BackendResult, DataResult};
use crate::model::{apply_fields, from_record, to_record, FieldKind, Fields, Model, Record};
use crate::spec::sql::{from_sql_value, to_sql_value, SqlQuery, SqlSpecificationList};
use crate::spec::{validate_specs, Spec, SpecificationList};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection, Row};
use serde_json::Value;

const MODULE: &str = "sql_repo";

/// SQLite-backed repository for one model table.
#[derive(Debug)]
pub struct SqlRepository<'conn, M> {
    conn: &'conn Connection,
    specifications: SqlSpecificationList<M>,
    wrapper: ErrorWrapper,
}

impl<'conn, M: Model> SqlRepository<'conn, M> {
    /// Binds a repository to `conn` after verifying the model table.
    pub fn try_new(conn: &'conn Connection) -> DataResult<Self> {
        let wrapper = ErrorWrapper::default();
        run_logged(&wrapper, MODULE, "open", M::NAME, || {
            ensure_model_table::<M>(conn).map_err(BackendError::from)
        })?;
        Ok(Self {
            conn,
            specifications: SqlSpecificationList::default(),
            wrapper,
        })
    }

    pub fn with_error_wrapper(mut self, wrapper: ErrorWrapper) -> Self {
        self.wrapper = wrapper;
        self
    }

    pub fn connection(&self) -> &'conn Connection {
        self.conn
    }

    fn run<T>(&self, operation: &'static str, body: impl FnOnce() -> BackendResult<T>) -> DataResult<T> {
        run_logged(&self.wrapper, MODULE, operation, M::NAME, body)
    }

    fn build(&self, specs: &[Spec]) -> BackendResult<SqlQuery> {
        validate_specs::<M>(specs)?;
        self.specifications.apply(specs, SqlQuery::for_model::<M>())
    }

    fn select(&self, query: &SqlQuery) -> BackendResult<Vec<M>> {
        let mut stmt = self.conn.prepare(&query.select_sql())?;
        let mut rows = stmt.query(params_from_iter(query.params()))?;
        let mut models = Vec::new();
        while let Some(row) = rows.next()? {
            models.push(decode_row::<M>(row)?);
        }
        Ok(models)
    }

    fn write(&self, obj: &M) -> BackendResult<()> {
        let record = to_record(obj)?;
        let columns = M::FIELDS
            .iter()
            .map(|field| quote_ident(field.name))
            .collect::<Vec<_>>();
        let placeholders = vec!["?"; columns.len()].join(", ");
        let assignments = M::FIELDS
            .iter()
            .filter(|field| field.name != M::ID_FIELD)
            .map(|field| {
                let column = quote_ident(field.name);
                format!("{column} = excluded.{column}")
            })
            .collect::<Vec<_>>();
        let conflict = if assignments.is_empty() {
            "DO NOTHING".to_string()
        } else {
            format!("DO UPDATE SET {}", assignments.join(", "))
        };
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({placeholders}) ON CONFLICT({}) {conflict}",
            quote_ident(M::NAME),
            columns.join(", "),
            quote_ident(M::ID_FIELD)
        );

        let values = M::FIELDS
            .iter()
            .map(|field| {
                let value = record.get(field.name).unwrap_or(&Value::Null);
                to_sql_value(value, field.kind == FieldKind::Json)
            })
            .collect::<BackendResult<Vec<SqlValue>>>()?;
        self.conn.execute(&sql, params_from_iter(values))?;
        Ok(())
    }

    fn delete_matching(&self, specs: &[Spec]) -> BackendResult<usize> {
        let query = self.build(specs)?;
        let sql = format!(
            "DELETE FROM {} WHERE {} IN ({})",
            quote_ident(M::NAME),
            quote_ident(M::ID_FIELD),
            query.id_subquery(M::ID_FIELD)
        );
        Ok(self.conn.execute(&sql, params_from_iter(query.params()))?)
    }

    fn delete_by_id(&self, id: &str) -> BackendResult<usize> {
        let sql = format!(
            "DELETE FROM {} WHERE {} = ?",
            quote_ident(M::NAME),
            quote_ident(M::ID_FIELD)
        );
        Ok(self.conn.execute(&sql, [id])?)
    }

    fn update_matching(&self, specs: &[Spec], fields: &Fields) -> BackendResult<usize> {
        check_bulk_update::<M>(fields)?;
        let query = self.build(specs)?;
        check_assignable(&self.select(&query)?, fields)?;

        let mut assignments = Vec::with_capacity(fields.len());
        let mut params = Vec::with_capacity(fields.len() + query.params().len());
        for (name, value) in fields {
            let kind = M::field(name).map(|field| field.kind);
            assignments.push(format!("{} = ?", quote_ident(name)));
            params.push(to_sql_value(value, kind == Some(FieldKind::Json))?);
        }
        params.extend(query.params().iter().cloned());

        let sql = format!(
            "UPDATE {} SET {} WHERE {} IN ({})",
            quote_ident(M::NAME),
            assignments.join(", "),
            quote_ident(M::ID_FIELD),
            query.id_subquery(M::ID_FIELD)
        );
        Ok(self.conn.execute(&sql, params_from_iter(params))?)
    }
}

fn decode_row<M: Model>(row: &Row<'_>) -> BackendResult<M> {
    let mut record = Record::new();
    for (index, field) in M::FIELDS.iter().enumerate() {
        let value = from_sql_value(row.get_ref(index)?, field)?;
        record.insert(field.name.to_string(), value);
    }
    from_record(record)
}

impl<M: Model> Repository<M> for SqlRepository<'_, M> {
    fn get(&self, specs: &[Spec]) -> DataResult<M> {
        self.run("get", || expect_one(self.select(&self.build(specs)?)?))
    }

    fn filter(&self, specs: &[Spec]) -> DataResult<Vec<M>> {
        self.run("filter", || self.select(&self.build(specs)?))
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
                self.delete_matching(specs)?;
            } else if let Some(obj) = obj {
                self.delete_by_id(obj.id())?;
            }
            Ok(())
        })
    }

    fn update(&self, obj: Option<&mut M>, specs: &[Spec], fields: &Fields) -> DataResult<()> {
        self.run("update", || {
            if !specs.is_empty() {
                self.update_matching(specs, fields)?;
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
            let (sql, params) = if specs.is_empty() {
                (format!("SELECT COUNT(*) FROM {}", quote_ident(M::NAME)), Vec::new())
            } else {
                let query = self.build(specs)?;
                (query.count_sql(), query.params().to_vec())
            };
            let total: i64 = self
                .conn
                .query_row(&sql, params_from_iter(params), |row| row.get(0))?;
            u64::try_from(total).map_err(|err| BackendError::Native(Box::new(err)))
        })
    }
}

impl<M: Model> Transactional for SqlRepository<'_, M> {
    fn begin(&self) -> DataResult<()> {
        run_transaction_step(&self.wrapper, MODULE, "begin", || {
            Ok(self.conn.execute_batch("BEGIN DEFERRED;")?)
        })
    }

    fn commit(&self) -> DataResult<()> {
        run_transaction_step(&self.wrapper, MODULE, "commit", || {
            Ok(self.conn.execute_batch("COMMIT;")?)
        })
    }

    fn rollback(&self) -> DataResult<()> {
        run_transaction_step(&self.wrapper, MODULE, "rollback", || {
            if self.conn.is_autocommit() {
                return Ok(());
            }
            Ok(self.conn.execute_batch("ROLLBACK;")?)
        })
    }
}

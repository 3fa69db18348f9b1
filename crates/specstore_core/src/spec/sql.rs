//! Relational specification variants compiled onto a parameterized SQL
//! query builder.
//!
//! # Invariants
//! - Operands are always bound parameters; identifiers come from the model
//!   declaration and are quoted.
//! - Clause order in the generated SQL is fixed (WHERE, ORDER BY, LIMIT), so
//!   the fold order only decides which order/pagination spec wins.

use super::{CompareOp, Direction, Filter, OrderBy, Spec, Specification, SpecificationList};
use crate::db::quote_ident;
use crate::error::{BackendError, BackendResult};
use crate::model::{Field, FieldKind, Model};
use rusqlite::types::{Value as SqlValue, ValueRef};
use serde_json::{Number, Value};
use std::marker::PhantomData;

/// Buildable SELECT over one model table.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlQuery {
    table: &'static str,
    fields: &'static [Field],
    conditions: Vec<String>,
    params: Vec<SqlValue>,
    order_by: Vec<String>,
    limit: Option<u64>,
    offset: u64,
}

impl SqlQuery {
    pub fn for_model<M: Model>() -> Self {
        Self {
            table: M::NAME,
            fields: M::FIELDS,
            conditions: Vec::new(),
            params: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            offset: 0,
        }
    }

    pub fn conditions(&self) -> &[String] {
        &self.conditions
    }

    pub fn params(&self) -> &[SqlValue] {
        &self.params
    }

    pub fn where_clause(&self) -> String {
        if self.conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.conditions.join(" AND "))
        }
    }

    /// ORDER BY / LIMIT / OFFSET suffix.
    pub fn tail(&self) -> String {
        let mut sql = String::new();
        if !self.order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.order_by.join(", "));
        }
        match (self.limit, self.offset) {
            (Some(limit), 0) => sql.push_str(&format!(" LIMIT {limit}")),
            (Some(limit), offset) => sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}")),
            (None, 0) => {}
            (None, offset) => sql.push_str(&format!(" LIMIT -1 OFFSET {offset}")),
        }
        sql
    }

    pub fn select_sql(&self) -> String {
        let columns = self
            .fields
            .iter()
            .map(|field| quote_ident(field.name))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "SELECT {columns} FROM {}{}{}",
            quote_ident(self.table),
            self.where_clause(),
            self.tail()
        )
    }

    pub fn count_sql(&self) -> String {
        format!(
            "SELECT COUNT(*) FROM (SELECT 1 FROM {}{}{})",
            quote_ident(self.table),
            self.where_clause(),
            self.tail()
        )
    }

    /// Sub-select of matching identities, for bulk UPDATE / DELETE.
    pub fn id_subquery(&self, id_field: &str) -> String {
        format!(
            "SELECT {} FROM {}{}{}",
            quote_ident(id_field),
            quote_ident(self.table),
            self.where_clause(),
            self.tail()
        )
    }

    fn field(&self, name: &str) -> BackendResult<&'static Field> {
        self.fields
            .iter()
            .find(|field| field.name == name)
            .ok_or_else(|| {
                BackendError::invalid_query(format!(
                    "unknown column `{name}` for table `{}`",
                    self.table
                ))
            })
    }

    /// Column expression for a possibly dotted field path.
    ///
    /// Paths below a `Json` column become `json_extract(column, '$.path')`.
    fn column_expr(&mut self, path: &str) -> BackendResult<(String, bool)> {
        match path.split_once('.') {
            None => {
                let field = self.field(path)?;
                Ok((quote_ident(field.name), field.kind == FieldKind::Json))
            }
            Some((root, nested)) => {
                let field = self.field(root)?;
                if field.kind != FieldKind::Json {
                    return Err(BackendError::invalid_query(format!(
                        "column `{root}` has no nested fields"
                    )));
                }
                self.params.push(SqlValue::Text(format!("$.{nested}")));
                Ok((format!("json_extract({}, ?)", quote_ident(root)), false))
            }
        }
    }

    fn compile_filter(&mut self, expression: &Filter) -> BackendResult<String> {
        match expression {
            Filter::Compare { field, op, value } => self.compile_compare(field, *op, value),
            Filter::And(items) => self.compile_group(items, " AND ", "1"),
            Filter::Or(items) => self.compile_group(items, " OR ", "0"),
            Filter::Not(inner) => Ok(format!("NOT ({})", self.compile_filter(inner)?)),
        }
    }

    fn compile_group(
        &mut self,
        items: &[Filter],
        joiner: &str,
        empty: &str,
    ) -> BackendResult<String> {
        if items.is_empty() {
            return Ok(empty.to_string());
        }
        let parts = items
            .iter()
            .map(|item| self.compile_filter(item))
            .collect::<BackendResult<Vec<_>>>()?;
        Ok(format!("({})", parts.join(joiner)))
    }

    fn compile_compare(&mut self, field: &str, op: CompareOp, value: &Value) -> BackendResult<String> {
        if value.is_null() && matches!(op, CompareOp::Eq | CompareOp::Ne) {
            let (column, _) = self.column_expr(field)?;
            let test = if op == CompareOp::Eq { "IS NULL" } else { "IS NOT NULL" };
            return Ok(format!("{column} {test}"));
        }

        let (column, as_json) = self.column_expr(field)?;
        let sql = match op {
            CompareOp::Eq | CompareOp::Ne | CompareOp::Gt | CompareOp::Gte | CompareOp::Lt | CompareOp::Lte => {
                let symbol = match op {
                    CompareOp::Eq => "=",
                    CompareOp::Ne => "IS NOT",
                    CompareOp::Gt => ">",
                    CompareOp::Gte => ">=",
                    CompareOp::Lt => "<",
                    _ => "<=",
                };
                self.params.push(to_sql_value(value, as_json)?);
                format!("{column} {symbol} ?")
            }
            CompareOp::In | CompareOp::NotIn => {
                let candidates = value.as_array().ok_or_else(|| {
                    BackendError::invalid_query(format!("`{field}` in/not-in needs an array operand"))
                })?;
                let negate = op == CompareOp::NotIn;
                if candidates.is_empty() {
                    return Ok(if negate { "1" } else { "0" }.to_string());
                }
                for candidate in candidates {
                    self.params.push(to_sql_value(candidate, as_json)?);
                }
                let placeholders = vec!["?"; candidates.len()].join(", ");
                let keyword = if negate { "NOT IN" } else { "IN" };
                format!("{column} {keyword} ({placeholders})")
            }
            CompareOp::Like => {
                let pattern = value.as_str().ok_or_else(|| {
                    BackendError::invalid_query(format!("`{field}` like needs a string pattern"))
                })?;
                self.params.push(SqlValue::Text(pattern.to_string()));
                format!("{column} LIKE ?")
            }
        };
        Ok(sql)
    }

    fn compile_order(&mut self, keys: &[OrderBy]) -> BackendResult<Vec<String>> {
        let mut clauses = Vec::with_capacity(keys.len());
        for key in keys {
            let column = match key.field.split_once('.') {
                None => quote_ident(self.field(&key.field)?.name),
                Some((root, nested)) => {
                    let field = self.field(root)?;
                    if field.kind != FieldKind::Json {
                        return Err(BackendError::invalid_query(format!(
                            "column `{root}` has no nested fields"
                        )));
                    }
                    format!(
                        "json_extract({}, '$.{}')",
                        quote_ident(root),
                        nested.replace('\'', "''")
                    )
                }
            };
            let direction = match key.direction {
                Direction::Asc => "ASC",
                Direction::Desc => "DESC",
            };
            clauses.push(format!("{column} {direction}"));
        }
        Ok(clauses)
    }
}

/// Encodes a JSON operand or field value as a SQLite value.
pub fn to_sql_value(value: &Value, as_json: bool) -> BackendResult<SqlValue> {
    if as_json {
        return Ok(match value {
            Value::Null => SqlValue::Null,
            other => SqlValue::Text(serde_json::to_string(other)?),
        });
    }
    Ok(match value {
        Value::Null => SqlValue::Null,
        Value::Bool(flag) => SqlValue::Integer(i64::from(*flag)),
        Value::Number(number) => match number.as_i64() {
            Some(integer) => SqlValue::Integer(integer),
            None => SqlValue::Real(number.as_f64().ok_or_else(|| {
                BackendError::invalid_query(format!("number `{number}` does not fit SQLite"))
            })?),
        },
        Value::String(text) => SqlValue::Text(text.clone()),
        other => SqlValue::Text(serde_json::to_string(other)?),
    })
}

/// Decodes one stored column back into the JSON shape of its field.
pub fn from_sql_value(value: ValueRef<'_>, field: &Field) -> BackendResult<Value> {
    let decoded = match (value, field.kind) {
        (ValueRef::Null, _) => Value::Null,
        (ValueRef::Integer(flag), FieldKind::Bool) => Value::Bool(flag != 0),
        (ValueRef::Integer(integer), _) => Value::from(integer),
        (ValueRef::Real(real), _) => Number::from_f64(real)
            .map(Value::Number)
            .ok_or_else(|| {
                BackendError::native(format!("non-finite value in column `{}`", field.name))
            })?,
        (ValueRef::Text(bytes), FieldKind::Json) => serde_json::from_slice(bytes)?,
        (ValueRef::Text(bytes), _) => Value::String(
            std::str::from_utf8(bytes)
                .map_err(|err| {
                    BackendError::native(format!("invalid UTF-8 in column `{}`: {err}", field.name))
                })?
                .to_string(),
        ),
        (ValueRef::Blob(_), _) => {
            return Err(BackendError::native(format!(
                "unexpected blob in column `{}`",
                field.name
            )))
        }
    };
    Ok(decoded)
}

/// Relational variant set.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlSpecification {
    Filter(Filter),
    Order(Vec<OrderBy>),
    Paginate { offset: u64, limit: Option<u64> },
}

impl Specification<SqlQuery> for SqlSpecification {
    fn apply(&self, mut query: SqlQuery) -> BackendResult<SqlQuery> {
        match self {
            Self::Filter(expression) => {
                let condition = query.compile_filter(expression)?;
                query.conditions.push(condition);
            }
            Self::Order(keys) => {
                query.order_by = query.compile_order(keys)?;
            }
            Self::Paginate { offset, limit } => {
                query.offset = *offset;
                query.limit = *limit;
            }
        }
        Ok(query)
    }
}

#[derive(Debug)]
pub struct SqlSpecificationList<M> {
    _model: PhantomData<fn() -> M>,
}

impl<M> Default for SqlSpecificationList<M> {
    fn default() -> Self {
        Self {
            _model: PhantomData,
        }
    }
}

impl<M: Model> SpecificationList for SqlSpecificationList<M> {
    type Query = SqlQuery;
    type Specification = SqlSpecification;

    fn compile(&self, spec: &Spec) -> SqlSpecification {
        match spec {
            Spec::Filter(expression) => SqlSpecification::Filter(expression.clone()),
            Spec::Order(keys) => SqlSpecification::Order(keys.clone()),
            Spec::Paginate { offset, limit } => SqlSpecification::Paginate {
                offset: *offset,
                limit: *limit,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{SqlQuery, SqlSpecificationList};
    use crate::model::{Field, Model};
    use crate::spec::{filter, filter_where, offset, order, paginate, Filter, SpecificationList};
    use rusqlite::types::Value as SqlValue;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Account {
        id: String,
        owner: String,
        balance: i64,
        profile: serde_json::Value,
    }

    impl Model for Account {
        const NAME: &'static str = "accounts";
        const FIELDS: &'static [Field] = &[
            Field::text("id"),
            Field::text("owner"),
            Field::integer("balance"),
            Field::json("profile"),
        ];

        fn id(&self) -> &str {
            &self.id
        }
    }

    fn compile(specs: &[crate::spec::Spec]) -> SqlQuery {
        SqlSpecificationList::<Account>::default()
            .apply(specs, SqlQuery::for_model::<Account>())
            .unwrap()
    }

    #[test]
    fn empty_list_returns_initial_query() {
        let initial = SqlQuery::for_model::<Account>();
        assert_eq!(compile(&[]), initial);
        assert_eq!(
            initial.select_sql(),
            "SELECT \"id\", \"owner\", \"balance\", \"profile\" FROM \"accounts\""
        );
    }

    #[test]
    fn filters_order_and_pagination_compile_to_sql() {
        let query = compile(&[
            filter("owner", "bob"),
            filter_where(Filter::gte("balance", 10)),
            order("-balance"),
            paginate(20, 10),
        ]);

        assert_eq!(
            query.select_sql(),
            "SELECT \"id\", \"owner\", \"balance\", \"profile\" FROM \"accounts\" \
             WHERE \"owner\" = ? AND \"balance\" >= ? ORDER BY \"balance\" DESC LIMIT 10 OFFSET 20"
        );
        assert_eq!(
            query.params(),
            &[SqlValue::Text("bob".into()), SqlValue::Integer(10)]
        );
    }

    #[test]
    fn last_order_and_pagination_win() {
        let query = compile(&[order("owner"), order("-id"), paginate(0, 5), offset(3)]);
        assert_eq!(query.tail(), " ORDER BY \"id\" DESC LIMIT -1 OFFSET 3");
    }

    #[test]
    fn composite_null_and_set_filters() {
        let query = compile(&[filter_where(
            (Filter::eq("owner", serde_json::Value::Null) | Filter::is_in("balance", [1, 2]))
                & !Filter::like("owner", "a%"),
        )]);
        assert_eq!(
            query.conditions(),
            &["((\"owner\" IS NULL OR \"balance\" IN (?, ?)) AND NOT (\"owner\" LIKE ?))".to_string()]
        );
        assert_eq!(query.params().len(), 3);

        let query = compile(&[filter_where(Filter::is_in("balance", Vec::<i64>::new()))]);
        assert_eq!(query.conditions(), &["0".to_string()]);
    }

    #[test]
    fn nested_json_paths_use_json_extract() {
        let query = compile(&[filter("profile.tier", "gold"), order("profile.since")]);
        assert_eq!(
            query.where_clause(),
            " WHERE json_extract(\"profile\", ?) = ?"
        );
        assert_eq!(
            query.params(),
            &[SqlValue::Text("$.tier".into()), SqlValue::Text("gold".into())]
        );
        assert!(query.tail().contains("json_extract(\"profile\", '$.since') ASC"));
    }

    #[test]
    fn unknown_columns_are_rejected() {
        let result = SqlSpecificationList::<Account>::default()
            .apply(&[filter("nickname", "x")], SqlQuery::for_model::<Account>());
        assert!(result.is_err());
    }
}

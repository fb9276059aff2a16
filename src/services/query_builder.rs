//! Dialect-neutral statement builder.
//!
//! Statements are described in canonical terms and rendered through a
//! `&dyn Dialect`, which supplies identifiers, placeholders and pagination.
//! Parameters are collected in render order so placeholder numbering always
//! matches the bound values.

use crate::models::SqlValue;
use crate::services::dialect::{Dialect, InsertIdStrategy};

/// Rendered SQL plus its positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltQuery {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl BuiltQuery {
    pub fn new(sql: impl Into<String>, params: Vec<SqlValue>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    pub fn raw(sql: impl Into<String>) -> Self {
        Self::new(sql, Vec::new())
    }
}

/// Right-hand side of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Value(SqlValue),
    /// A `YYYY-MM-DD` string compared as a date
    Date(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Compare {
        lhs: String,
        op: &'static str,
        rhs: Operand,
    },
    In {
        lhs: String,
        values: Vec<SqlValue>,
    },
    /// `lhs IN (SELECT column FROM table WHERE filter)`
    InSelect {
        lhs: String,
        column: String,
        table: String,
        filter: Box<Condition>,
    },
    Any(Vec<Condition>),
    All(Vec<Condition>),
    /// Matches nothing
    Never,
}

impl Condition {
    pub fn eq(lhs: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        Condition::Compare {
            lhs: lhs.into(),
            op: "=",
            rhs: Operand::Value(value.into()),
        }
    }

    pub fn like(lhs: impl Into<String>, pattern: impl Into<String>) -> Self {
        Condition::Compare {
            lhs: lhs.into(),
            op: "LIKE",
            rhs: Operand::Value(SqlValue::Text(pattern.into())),
        }
    }

    pub fn date(lhs: impl Into<String>, op: &'static str, date: impl Into<String>) -> Self {
        Condition::Compare {
            lhs: lhs.into(),
            op,
            rhs: Operand::Date(date.into()),
        }
    }

    pub fn is_in(lhs: impl Into<String>, values: Vec<SqlValue>) -> Self {
        Condition::In {
            lhs: lhs.into(),
            values,
        }
    }

    /// OR-group. An empty group matches nothing; a single member is unwrapped.
    pub fn any(mut conditions: Vec<Condition>) -> Self {
        match conditions.len() {
            0 => Condition::Never,
            1 => conditions.remove(0),
            _ => Condition::Any(conditions),
        }
    }
}

/// Hands out placeholders while collecting the bound values.
struct ParamSink<'d> {
    dialect: &'d dyn Dialect,
    params: Vec<SqlValue>,
}

impl<'d> ParamSink<'d> {
    fn new(dialect: &'d dyn Dialect) -> Self {
        Self {
            dialect,
            params: Vec::new(),
        }
    }

    fn bind(&mut self, value: SqlValue) -> String {
        self.params.push(value);
        self.dialect.placeholder(self.params.len())
    }

    fn render(&mut self, condition: &Condition) -> String {
        match condition {
            Condition::Compare { lhs, op, rhs } => {
                let rhs = match rhs {
                    Operand::Value(value) => self.bind(value.clone()),
                    Operand::Date(date) => {
                        let placeholder = self.bind(SqlValue::Text(date.clone()));
                        self.dialect.date_param(&placeholder)
                    }
                };
                format!("{} {} {}", lhs, op, rhs)
            }
            Condition::In { values, .. } if values.is_empty() => "1 = 0".to_string(),
            Condition::In { lhs, values } => {
                let placeholders: Vec<String> =
                    values.iter().map(|v| self.bind(v.clone())).collect();
                format!("{} IN ({})", lhs, placeholders.join(", "))
            }
            Condition::InSelect {
                lhs,
                column,
                table,
                filter,
            } => {
                let filter = self.render(filter);
                format!("{} IN (SELECT {} FROM {} WHERE {})", lhs, column, table, filter)
            }
            Condition::Any(conditions) => self.render_group(conditions, " OR "),
            Condition::All(conditions) => self.render_group(conditions, " AND "),
            Condition::Never => "1 = 0".to_string(),
        }
    }

    fn render_group(&mut self, conditions: &[Condition], joiner: &str) -> String {
        let parts: Vec<String> = conditions.iter().map(|c| self.render(c)).collect();
        format!("({})", parts.join(joiner))
    }

    fn render_where(&mut self, conditions: &[Condition]) -> String {
        if conditions.is_empty() {
            return String::new();
        }
        let parts: Vec<String> = conditions.iter().map(|c| self.render(c)).collect();
        format!(" WHERE {}", parts.join(" AND "))
    }

    fn finish(self, sql: String) -> BuiltQuery {
        BuiltQuery::new(sql, self.params)
    }
}

/// SELECT with joins, filters, grouping, ordering and pagination, plus its COUNT companion.
#[derive(Clone)]
pub struct SelectQuery<'d> {
    dialect: &'d dyn Dialect,
    columns: Vec<(String, Option<String>)>,
    from: String,
    joins: Vec<String>,
    conditions: Vec<Condition>,
    group_by: Vec<String>,
    order_by: Vec<String>,
    page: Option<(u64, u64)>,
    order_fallback: Option<String>,
}

impl<'d> SelectQuery<'d> {
    /// `FROM <table> [alias]` for a canonical table name.
    pub fn from(dialect: &'d dyn Dialect, table: &str, alias: Option<&str>) -> Self {
        let quoted = dialect.quote_table(table);
        let from = match alias {
            Some(alias) => dialect.table_alias(&quoted, alias),
            None => quoted,
        };
        Self {
            dialect,
            columns: Vec::new(),
            from,
            joins: Vec::new(),
            conditions: Vec::new(),
            group_by: Vec::new(),
            order_by: Vec::new(),
            page: None,
            order_fallback: None,
        }
    }

    pub fn dialect(&self) -> &'d dyn Dialect {
        self.dialect
    }

    /// `alias.<column>` in this query's dialect.
    pub fn col(&self, alias: &str, canonical: &str) -> String {
        self.dialect.qualified(alias, canonical)
    }

    pub fn column(mut self, expr: impl Into<String>) -> Self {
        self.columns.push((expr.into(), None));
        self
    }

    pub fn column_as(mut self, expr: impl Into<String>, alias: &str) -> Self {
        self.columns.push((expr.into(), Some(alias.to_string())));
        self
    }

    fn join(mut self, kind: &str, table: &str, alias: &str, on: String) -> Self {
        let target = self.dialect.table_alias(&self.dialect.quote_table(table), alias);
        self.joins.push(format!("{} {} ON {}", kind, target, on));
        self
    }

    pub fn left_join(self, table: &str, alias: &str, on: String) -> Self {
        self.join("LEFT JOIN", table, alias, on)
    }

    pub fn inner_join(self, table: &str, alias: &str, on: String) -> Self {
        self.join("INNER JOIN", table, alias, on)
    }

    pub fn filter(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn filter_opt(self, condition: Option<Condition>) -> Self {
        match condition {
            Some(condition) => self.filter(condition),
            None => self,
        }
    }

    pub fn group_by(mut self, expr: impl Into<String>) -> Self {
        self.group_by.push(expr.into());
        self
    }

    pub fn order_by(mut self, expr: impl Into<String>, descending: bool) -> Self {
        let expr = expr.into();
        self.order_by
            .push(if descending { format!("{} DESC", expr) } else { expr });
        self
    }

    /// ORDER BY used when the dialect needs one for paging and none was given.
    pub fn order_fallback(mut self, expr: impl Into<String>) -> Self {
        self.order_fallback = Some(expr.into());
        self
    }

    pub fn paginate(mut self, limit: u64, offset: u64) -> Self {
        self.page = Some((limit, offset));
        self
    }

    pub fn build(&self) -> BuiltQuery {
        let mut sink = ParamSink::new(self.dialect);
        let mut sql = format!("SELECT {} FROM {}", self.projection(), self.from);
        for join in &self.joins {
            sql.push(' ');
            sql.push_str(join);
        }
        sql.push_str(&sink.render_where(&self.conditions));
        if !self.group_by.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&self.group_by.join(", "));
        }

        let mut order_by = self.order_by.clone();
        if let Some((limit, offset)) = self.page {
            if order_by.is_empty() && self.dialect.requires_order_for_paging() {
                order_by.push(self.fallback_order());
            }
            if !order_by.is_empty() {
                sql.push_str(" ORDER BY ");
                sql.push_str(&order_by.join(", "));
            }
            sql.push(' ');
            sql.push_str(&self.dialect.paginate(limit, offset));
        } else if !order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&order_by.join(", "));
        }

        sink.finish(sql)
    }

    /// `COUNT(*) AS total` over the same rows, ignoring ordering and pagination.
    pub fn count(&self) -> BuiltQuery {
        if !self.group_by.is_empty() {
            let mut inner = self.clone();
            inner.order_by.clear();
            inner.page = None;
            let inner = inner.build();
            return BuiltQuery::new(
                format!("SELECT COUNT(*) AS total FROM ({}) grouped", inner.sql),
                inner.params,
            );
        }

        let mut sink = ParamSink::new(self.dialect);
        let mut sql = format!("SELECT COUNT(*) AS total FROM {}", self.from);
        for join in &self.joins {
            sql.push(' ');
            sql.push_str(join);
        }
        sql.push_str(&sink.render_where(&self.conditions));
        sink.finish(sql)
    }

    fn projection(&self) -> String {
        if self.columns.is_empty() {
            return "*".to_string();
        }
        self.columns
            .iter()
            .map(|(expr, alias)| match alias {
                Some(alias) => format!("{} AS {}", expr, alias),
                None => expr.clone(),
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn fallback_order(&self) -> String {
        if let Some(expr) = &self.order_fallback {
            return expr.clone();
        }
        match self.columns.first() {
            Some((expr, _)) if expr != "*" && !expr.contains('(') => expr.clone(),
            _ => "(SELECT NULL)".to_string(),
        }
    }
}

/// INSERT of canonical column values, optionally reporting the generated id.
pub struct InsertQuery<'d> {
    dialect: &'d dyn Dialect,
    table: String,
    values: Vec<(String, SqlValue)>,
    returning: Option<String>,
}

impl<'d> InsertQuery<'d> {
    pub fn into_table(dialect: &'d dyn Dialect, table: &str) -> Self {
        Self {
            dialect,
            table: table.to_string(),
            values: Vec::new(),
            returning: None,
        }
    }

    pub fn value(mut self, column: &str, value: impl Into<SqlValue>) -> Self {
        self.values.push((column.to_string(), value.into()));
        self
    }

    /// Ask for the generated id in the result set where the dialect can do that.
    pub fn returning(mut self, id_column: &str) -> Self {
        self.returning = Some(id_column.to_string());
        self
    }

    /// Whether executing the statement yields the id as a row.
    pub fn returns_rows(&self) -> bool {
        self.returning.is_some()
            && matches!(
                self.dialect.insert_id_strategy(),
                InsertIdStrategy::Returning | InsertIdStrategy::Output
            )
    }

    pub fn build(&self) -> BuiltQuery {
        let mut sink = ParamSink::new(self.dialect);
        let columns: Vec<String> = self
            .values
            .iter()
            .map(|(column, _)| self.dialect.quote_column(column))
            .collect();
        let placeholders: Vec<String> = self
            .values
            .iter()
            .map(|(_, value)| sink.bind(value.clone()))
            .collect();

        let table = self.dialect.quote_table(&self.table);
        let columns = columns.join(", ");
        let placeholders = placeholders.join(", ");

        let sql = match (&self.returning, self.dialect.insert_id_strategy()) {
            (Some(id), InsertIdStrategy::Returning) => format!(
                "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
                table,
                columns,
                placeholders,
                self.dialect.quote_column(id)
            ),
            (Some(id), InsertIdStrategy::Output) => format!(
                "INSERT INTO {} ({}) OUTPUT INSERTED.{} VALUES ({})",
                table,
                columns,
                self.dialect.quote_column(id),
                placeholders
            ),
            _ => format!("INSERT INTO {} ({}) VALUES ({})", table, columns, placeholders),
        };

        sink.finish(sql)
    }
}

pub struct UpdateQuery<'d> {
    dialect: &'d dyn Dialect,
    table: String,
    sets: Vec<(String, SqlValue)>,
    conditions: Vec<Condition>,
}

impl<'d> UpdateQuery<'d> {
    pub fn table(dialect: &'d dyn Dialect, table: &str) -> Self {
        Self {
            dialect,
            table: table.to_string(),
            sets: Vec::new(),
            conditions: Vec::new(),
        }
    }

    pub fn set(mut self, column: &str, value: impl Into<SqlValue>) -> Self {
        self.sets.push((column.to_string(), value.into()));
        self
    }

    pub fn filter(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    pub fn build(&self) -> BuiltQuery {
        let mut sink = ParamSink::new(self.dialect);
        let sets: Vec<String> = self
            .sets
            .iter()
            .map(|(column, value)| {
                let column = self.dialect.quote_column(column);
                format!("{} = {}", column, sink.bind(value.clone()))
            })
            .collect();
        let mut sql = format!(
            "UPDATE {} SET {}",
            self.dialect.quote_table(&self.table),
            sets.join(", ")
        );
        sql.push_str(&sink.render_where(&self.conditions));
        sink.finish(sql)
    }
}

pub struct DeleteQuery<'d> {
    dialect: &'d dyn Dialect,
    table: String,
    conditions: Vec<Condition>,
}

impl<'d> DeleteQuery<'d> {
    pub fn from(dialect: &'d dyn Dialect, table: &str) -> Self {
        Self {
            dialect,
            table: table.to_string(),
            conditions: Vec::new(),
        }
    }

    pub fn filter(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn build(&self) -> BuiltQuery {
        let mut sink = ParamSink::new(self.dialect);
        let mut sql = format!("DELETE FROM {}", self.dialect.quote_table(&self.table));
        sql.push_str(&sink.render_where(&self.conditions));
        sink.finish(sql)
    }
}

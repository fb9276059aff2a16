//! SQL dialect capabilities.
//!
//! Every backend-specific piece of SQL (identifier translation and quoting,
//! placeholders, casts, date handling, pagination, catalog queries) lives
//! behind the [`Dialect`] trait. The query builder and the resource services
//! only ever talk to a `&dyn Dialect`.

pub mod mssql;
pub mod mysql;
pub mod names;
pub mod oracle;
pub mod postgres;

use std::sync::Arc;

use crate::models::ClientKind;

pub use mssql::MsSqlDialect;
pub use mysql::MySqlDialect;
pub use oracle::OracleDialect;
pub use postgres::PostgresDialect;

/// How a freshly inserted row's generated id is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertIdStrategy {
    /// `INSERT ... RETURNING id`
    Returning,
    /// `INSERT ... OUTPUT INSERTED.id VALUES ...`
    Output,
    /// Driver-reported last insert id
    LastInsertId,
    /// `MAX(id) + 1` computed before the insert and written explicitly
    MaxPlusOne,
}

pub trait Dialect: Send + Sync {
    fn client(&self) -> ClientKind;

    /// Dialect literal for a canonical column name, e.g. `CustomerId` → `customer_id`.
    fn column_name(&self, canonical: &str) -> String;

    /// Dialect literal for a canonical table name, possibly schema-qualified.
    fn table_name(&self, canonical: &str) -> String;

    /// Table name without schema, as stored in the catalog views.
    fn bare_table_name(&self, canonical: &str) -> String {
        let name = self.table_name(canonical);
        match name.rsplit_once('.') {
            Some((_, bare)) => bare.to_string(),
            None => name,
        }
    }

    fn quote_ident(&self, ident: &str) -> String;

    /// Placeholder for the 1-based parameter `index`.
    fn placeholder(&self, index: usize) -> String;

    fn table_alias(&self, table: &str, alias: &str) -> String {
        format!("{} AS {}", table, alias)
    }

    fn text_cast(&self, expr: &str) -> String;

    /// `YYYY-MM-DD` text form of a date/timestamp expression.
    fn date_text(&self, expr: &str) -> String;

    /// Truncates a timestamp expression to its date.
    fn date_trunc(&self, expr: &str) -> String;

    /// Wraps a placeholder bound to a `YYYY-MM-DD` string so it compares as a date.
    fn date_param(&self, placeholder: &str) -> String;

    fn concat(&self, parts: &[&str]) -> String;

    /// Trailing pagination clause.
    fn paginate(&self, limit: u64, offset: u64) -> String;

    /// Whether pagination is only valid after an ORDER BY.
    fn requires_order_for_paging(&self) -> bool {
        false
    }

    fn insert_id_strategy(&self) -> InsertIdStrategy;

    fn list_tables_sql(&self) -> String;

    /// Column catalog query taking the bare table name as its only parameter.
    /// Yields `column_name`, `data_type`, `is_nullable`, `column_default` (any case).
    fn columns_sql(&self) -> String;

    fn probe_sql(&self) -> &'static str {
        "SELECT 1"
    }

    /// Maps a result key as returned by this backend to its canonical PascalCase form.
    fn normalize_key(&self, raw: &str) -> String;

    fn quote_table(&self, canonical: &str) -> String {
        self.table_name(canonical)
            .split('.')
            .map(|part| self.quote_ident(part))
            .collect::<Vec<_>>()
            .join(".")
    }

    fn quote_column(&self, canonical: &str) -> String {
        self.quote_ident(&self.column_name(canonical))
    }

    /// `alias.<quoted column>`
    fn qualified(&self, alias: &str, canonical: &str) -> String {
        format!("{}.{}", alias, self.quote_column(canonical))
    }
}

pub fn dialect_for(client: ClientKind) -> Arc<dyn Dialect> {
    match client {
        ClientKind::MsSql => Arc::new(MsSqlDialect::new()),
        ClientKind::Postgres => Arc::new(PostgresDialect::new()),
        ClientKind::MySql => Arc::new(MySqlDialect::new()),
        ClientKind::Oracle => Arc::new(OracleDialect::new()),
    }
}

/// Rejects identifiers that could not possibly name a table or column.
pub fn is_safe_identifier(ident: &str) -> bool {
    let mut chars = ident.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    ident.len() <= 128 && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

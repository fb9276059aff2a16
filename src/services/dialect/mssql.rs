use super::{Dialect, InsertIdStrategy};
use crate::models::ClientKind;

/// SQL Server: canonical names used verbatim, bracket quoting, OFFSET/FETCH paging.
pub struct MsSqlDialect;

impl MsSqlDialect {
    pub fn new() -> Self {
        Self
    }
}

impl Default for MsSqlDialect {
    fn default() -> Self {
        Self::new()
    }
}

impl Dialect for MsSqlDialect {
    fn client(&self) -> ClientKind {
        ClientKind::MsSql
    }

    fn column_name(&self, canonical: &str) -> String {
        canonical.to_string()
    }

    fn table_name(&self, canonical: &str) -> String {
        canonical.to_string()
    }

    fn quote_ident(&self, ident: &str) -> String {
        format!("[{}]", ident.replace(']', "]]"))
    }

    fn placeholder(&self, index: usize) -> String {
        format!("@P{}", index)
    }

    fn text_cast(&self, expr: &str) -> String {
        format!("CAST({} AS NVARCHAR(4000))", expr)
    }

    fn date_text(&self, expr: &str) -> String {
        format!("CONVERT(VARCHAR(10), {}, 23)", expr)
    }

    fn date_trunc(&self, expr: &str) -> String {
        format!("CAST({} AS DATE)", expr)
    }

    fn date_param(&self, placeholder: &str) -> String {
        format!("CAST({} AS DATE)", placeholder)
    }

    fn concat(&self, parts: &[&str]) -> String {
        parts.join(" + ")
    }

    fn paginate(&self, limit: u64, offset: u64) -> String {
        format!("OFFSET {} ROWS FETCH NEXT {} ROWS ONLY", offset, limit)
    }

    fn requires_order_for_paging(&self) -> bool {
        true
    }

    fn insert_id_strategy(&self) -> InsertIdStrategy {
        InsertIdStrategy::Output
    }

    fn list_tables_sql(&self) -> String {
        "SELECT TABLE_NAME AS table_name FROM INFORMATION_SCHEMA.TABLES \
         WHERE TABLE_TYPE = 'BASE TABLE' ORDER BY TABLE_NAME"
            .to_string()
    }

    fn columns_sql(&self) -> String {
        "SELECT COLUMN_NAME AS column_name, DATA_TYPE AS data_type, \
         IS_NULLABLE AS is_nullable, COLUMN_DEFAULT AS column_default \
         FROM INFORMATION_SCHEMA.COLUMNS WHERE TABLE_NAME = @P1 ORDER BY ORDINAL_POSITION"
            .to_string()
    }

    fn normalize_key(&self, raw: &str) -> String {
        raw.to_string()
    }
}

use super::names::{lookup, upper_to_pascal, ORACLE_TABLES};
use super::{Dialect, InsertIdStrategy};
use crate::models::ClientKind;

/// Oracle: uppercase identifiers, no `AS` before table aliases, 12c row limiting.
pub struct OracleDialect;

impl OracleDialect {
    pub fn new() -> Self {
        Self
    }
}

impl Default for OracleDialect {
    fn default() -> Self {
        Self::new()
    }
}

impl Dialect for OracleDialect {
    fn client(&self) -> ClientKind {
        ClientKind::Oracle
    }

    fn column_name(&self, canonical: &str) -> String {
        canonical.to_uppercase()
    }

    fn table_name(&self, canonical: &str) -> String {
        lookup(ORACLE_TABLES, canonical)
            .map(str::to_string)
            .unwrap_or_else(|| canonical.to_uppercase())
    }

    fn quote_ident(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    fn placeholder(&self, index: usize) -> String {
        format!(":{}", index)
    }

    fn table_alias(&self, table: &str, alias: &str) -> String {
        format!("{} {}", table, alias)
    }

    fn text_cast(&self, expr: &str) -> String {
        format!("TO_CHAR({})", expr)
    }

    fn date_text(&self, expr: &str) -> String {
        format!("TO_CHAR({}, 'YYYY-MM-DD')", expr)
    }

    fn date_trunc(&self, expr: &str) -> String {
        format!("TRUNC({})", expr)
    }

    fn date_param(&self, placeholder: &str) -> String {
        format!("TO_DATE({}, 'YYYY-MM-DD')", placeholder)
    }

    fn concat(&self, parts: &[&str]) -> String {
        parts.join(" || ")
    }

    fn paginate(&self, limit: u64, offset: u64) -> String {
        format!("OFFSET {} ROWS FETCH NEXT {} ROWS ONLY", offset, limit)
    }

    fn insert_id_strategy(&self) -> InsertIdStrategy {
        InsertIdStrategy::MaxPlusOne
    }

    fn list_tables_sql(&self) -> String {
        "SELECT table_name FROM user_tables ORDER BY table_name".to_string()
    }

    fn columns_sql(&self) -> String {
        "SELECT column_name, data_type, nullable AS is_nullable, data_default AS column_default \
         FROM user_tab_columns WHERE table_name = :1 ORDER BY column_id"
            .to_string()
    }

    fn probe_sql(&self) -> &'static str {
        "SELECT 1 FROM DUAL"
    }

    fn normalize_key(&self, raw: &str) -> String {
        upper_to_pascal(raw)
    }
}

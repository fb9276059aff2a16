use super::names::{lookup, snake_to_pascal, PG_COLUMNS, PG_TABLES};
use super::{Dialect, InsertIdStrategy};
use crate::models::ClientKind;

/// PostgreSQL: snake_case identifiers in the `public` schema.
pub struct PostgresDialect;

impl PostgresDialect {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PostgresDialect {
    fn default() -> Self {
        Self::new()
    }
}

impl Dialect for PostgresDialect {
    fn client(&self) -> ClientKind {
        ClientKind::Postgres
    }

    fn column_name(&self, canonical: &str) -> String {
        lookup(PG_COLUMNS, canonical)
            .map(str::to_string)
            .unwrap_or_else(|| canonical.to_lowercase())
    }

    fn table_name(&self, canonical: &str) -> String {
        if let Some(mapped) = lookup(PG_TABLES, canonical) {
            return mapped.to_string();
        }
        if canonical.contains('.') {
            return canonical.to_lowercase();
        }
        format!("public.{}", canonical.to_lowercase())
    }

    fn quote_ident(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    fn placeholder(&self, index: usize) -> String {
        format!("${}", index)
    }

    fn text_cast(&self, expr: &str) -> String {
        format!("CAST({} AS TEXT)", expr)
    }

    fn date_text(&self, expr: &str) -> String {
        format!("TO_CHAR({}, 'YYYY-MM-DD')", expr)
    }

    fn date_trunc(&self, expr: &str) -> String {
        format!("CAST({} AS DATE)", expr)
    }

    fn date_param(&self, placeholder: &str) -> String {
        format!("CAST({} AS DATE)", placeholder)
    }

    fn concat(&self, parts: &[&str]) -> String {
        parts.join(" || ")
    }

    fn paginate(&self, limit: u64, offset: u64) -> String {
        format!("LIMIT {} OFFSET {}", limit, offset)
    }

    fn insert_id_strategy(&self) -> InsertIdStrategy {
        InsertIdStrategy::Returning
    }

    fn list_tables_sql(&self) -> String {
        "SELECT table_name FROM information_schema.tables \
         WHERE table_schema = 'public' AND table_type = 'BASE TABLE' ORDER BY table_name"
            .to_string()
    }

    fn columns_sql(&self) -> String {
        "SELECT column_name, data_type, is_nullable, column_default \
         FROM information_schema.columns \
         WHERE table_schema = 'public' AND table_name = $1 ORDER BY ordinal_position"
            .to_string()
    }

    fn normalize_key(&self, raw: &str) -> String {
        snake_to_pascal(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_casts_and_dates() {
        let d = PostgresDialect::new();
        assert_eq!(d.text_cast("i.total"), "CAST(i.total AS TEXT)");
        assert_eq!(d.date_text("x"), "TO_CHAR(x, 'YYYY-MM-DD')");
        assert_eq!(d.date_param("$1"), "CAST($1 AS DATE)");
        assert_eq!(d.concat(&["a", "' '", "b"]), "a || ' ' || b");
    }

    #[test]
    fn test_quote_escapes() {
        assert_eq!(PostgresDialect::new().quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_normalize_key() {
        let d = PostgresDialect::new();
        assert_eq!(d.normalize_key("invoice_date"), "InvoiceDate");
        assert_eq!(d.normalize_key("support_rep_id"), "SupportRepId");
    }
}

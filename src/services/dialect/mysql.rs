use super::{Dialect, InsertIdStrategy};
use crate::models::ClientKind;

/// MySQL: canonical names used verbatim, backtick quoting.
pub struct MySqlDialect;

impl MySqlDialect {
    pub fn new() -> Self {
        Self
    }
}

impl Default for MySqlDialect {
    fn default() -> Self {
        Self::new()
    }
}

impl Dialect for MySqlDialect {
    fn client(&self) -> ClientKind {
        ClientKind::MySql
    }

    fn column_name(&self, canonical: &str) -> String {
        canonical.to_string()
    }

    fn table_name(&self, canonical: &str) -> String {
        canonical.to_string()
    }

    fn quote_ident(&self, ident: &str) -> String {
        format!("`{}`", ident.replace('`', "``"))
    }

    fn placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    fn text_cast(&self, expr: &str) -> String {
        format!("CAST({} AS CHAR)", expr)
    }

    fn date_text(&self, expr: &str) -> String {
        format!("DATE_FORMAT({}, '%Y-%m-%d')", expr)
    }

    fn date_trunc(&self, expr: &str) -> String {
        format!("DATE({})", expr)
    }

    fn date_param(&self, placeholder: &str) -> String {
        placeholder.to_string()
    }

    fn concat(&self, parts: &[&str]) -> String {
        format!("CONCAT({})", parts.join(", "))
    }

    fn paginate(&self, limit: u64, offset: u64) -> String {
        format!("LIMIT {} OFFSET {}", limit, offset)
    }

    fn insert_id_strategy(&self) -> InsertIdStrategy {
        InsertIdStrategy::LastInsertId
    }

    fn list_tables_sql(&self) -> String {
        "SELECT table_name AS table_name FROM information_schema.tables \
         WHERE table_schema = DATABASE() AND table_type = 'BASE TABLE' ORDER BY table_name"
            .to_string()
    }

    fn columns_sql(&self) -> String {
        "SELECT column_name AS column_name, data_type AS data_type, \
         is_nullable AS is_nullable, column_default AS column_default \
         FROM information_schema.columns \
         WHERE table_schema = DATABASE() AND table_name = ? ORDER BY ordinal_position"
            .to_string()
    }

    fn normalize_key(&self, raw: &str) -> String {
        raw.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mysql_specifics() {
        let d = MySqlDialect::new();
        assert_eq!(d.concat(&["a", "' '", "b"]), "CONCAT(a, ' ', b)");
        assert_eq!(d.text_cast("x"), "CAST(x AS CHAR)");
        assert_eq!(d.date_trunc("x"), "DATE(x)");
        assert_eq!(d.paginate(10, 20), "LIMIT 10 OFFSET 20");
        assert_eq!(d.quote_ident("Invoice"), "`Invoice`");
    }
}

use serde::Serialize;
use sqlparser::ast::Statement;
use sqlparser::dialect::{Dialect, GenericDialect, MsSqlDialect, MySqlDialect, PostgreSqlDialect};
use sqlparser::parser::Parser;

use crate::api::middleware::AppError;
use crate::models::ClientKind;

/// Coarse classification of a console statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    Ddl,
    Other,
    /// The parser could not read the statement; the database decides.
    Unknown,
}

impl StatementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatementKind::Select => "select",
            StatementKind::Insert => "insert",
            StatementKind::Update => "update",
            StatementKind::Delete => "delete",
            StatementKind::Ddl => "ddl",
            StatementKind::Other => "other",
            StatementKind::Unknown => "unknown",
        }
    }

    pub fn is_read_only(&self) -> bool {
        *self == StatementKind::Select
    }

    fn of(stmt: &Statement) -> Self {
        match stmt {
            Statement::Query(_) => StatementKind::Select,
            Statement::Insert { .. } => StatementKind::Insert,
            Statement::Update { .. } => StatementKind::Update,
            Statement::Delete { .. } => StatementKind::Delete,
            Statement::Drop { .. }
            | Statement::CreateTable { .. }
            | Statement::CreateView { .. }
            | Statement::CreateIndex { .. }
            | Statement::AlterTable { .. }
            | Statement::Truncate { .. } => StatementKind::Ddl,
            _ => StatementKind::Other,
        }
    }
}

/// SQL validation for the raw query console
pub struct SqlValidator;

impl SqlValidator {
    fn dialect_for(client: ClientKind) -> Box<dyn Dialect> {
        match client {
            ClientKind::MsSql => Box::new(MsSqlDialect {}),
            ClientKind::Postgres => Box::new(PostgreSqlDialect {}),
            ClientKind::MySql => Box::new(MySqlDialect {}),
            ClientKind::Oracle => Box::new(GenericDialect {}),
        }
    }

    fn parse(client: ClientKind, sql: &str) -> Result<Vec<Statement>, AppError> {
        let dialect = Self::dialect_for(client);
        let statements = Parser::parse_sql(dialect.as_ref(), sql)
            .map_err(|e| AppError::InvalidSql(format!("SQL parsing error: {}", e)))?;
        if statements.is_empty() {
            return Err(AppError::InvalidSql("Empty SQL query".to_string()));
        }
        Ok(statements)
    }

    /// Kind of the first statement in `sql`, parsed with the connection's dialect.
    pub fn classify(client: ClientKind, sql: &str) -> Result<StatementKind, AppError> {
        let statements = Self::parse(client, sql)?;
        Ok(statements
            .first()
            .map(StatementKind::of)
            .unwrap_or(StatementKind::Unknown))
    }

    /// Every statement in the batch must be a query.
    pub fn validate_select_only(client: ClientKind, sql: &str) -> Result<StatementKind, AppError> {
        for stmt in Self::parse(client, sql)? {
            let kind = StatementKind::of(&stmt);
            if !kind.is_read_only() {
                return Err(AppError::InvalidSql(format!(
                    "{} statements are not allowed. Only SELECT queries are permitted.",
                    kind.as_str().to_uppercase()
                )));
            }
        }
        Ok(StatementKind::Select)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_common_statements() {
        let pg = ClientKind::Postgres;
        assert_eq!(SqlValidator::classify(pg, "SELECT * FROM customer").unwrap(), StatementKind::Select);
        assert_eq!(
            SqlValidator::classify(pg, "INSERT INTO genre (name) VALUES ('Lo-fi')").unwrap(),
            StatementKind::Insert
        );
        assert_eq!(
            SqlValidator::classify(pg, "UPDATE track SET unit_price = 1.29 WHERE track_id = 1").unwrap(),
            StatementKind::Update
        );
        assert_eq!(
            SqlValidator::classify(pg, "DELETE FROM invoice_line WHERE invoice_id = 1").unwrap(),
            StatementKind::Delete
        );
        assert_eq!(SqlValidator::classify(pg, "DROP TABLE offers").unwrap(), StatementKind::Ddl);
    }

    #[test]
    fn test_dialect_specific_syntax() {
        assert_eq!(
            SqlValidator::classify(ClientKind::MsSql, "SELECT TOP 5 [Name] FROM [Track]").unwrap(),
            StatementKind::Select
        );
        assert_eq!(
            SqlValidator::classify(ClientKind::MySql, "SELECT `Name` FROM `Artist` LIMIT 3").unwrap(),
            StatementKind::Select
        );
    }

    #[test]
    fn test_validate_select_only() {
        let pg = ClientKind::Postgres;
        assert!(SqlValidator::validate_select_only(pg, "SELECT 1").is_ok());
        assert!(SqlValidator::validate_select_only(pg, "WITH t AS (SELECT 1) SELECT * FROM t").is_ok());

        let err = SqlValidator::validate_select_only(pg, "SELECT 1; DELETE FROM customer").unwrap_err();
        assert!(err.to_string().contains("DELETE statements are not allowed"));
    }

    #[test]
    fn test_unparseable_and_empty_sql() {
        assert!(matches!(
            SqlValidator::classify(ClientKind::Postgres, "SELEC oops"),
            Err(AppError::InvalidSql(_))
        ));
        assert!(matches!(
            SqlValidator::classify(ClientKind::Postgres, ""),
            Err(AppError::InvalidSql(_))
        ));
    }
}

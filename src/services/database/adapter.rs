use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::time::{Duration, Instant};

use crate::api::middleware::AppError;
use crate::models::ClientKind;
use crate::services::query_builder::BuiltQuery;

/// Rows returned by a statement, keyed by the column names the driver reported.
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Value>,
    pub row_count: usize,
    pub execution_time_ms: u64,
}

impl QueryResult {
    pub fn new(columns: Vec<String>, rows: Vec<Value>, started: Instant) -> Self {
        Self {
            columns,
            row_count: rows.len(),
            rows,
            execution_time_ms: started.elapsed().as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecuteResult {
    pub rows_affected: u64,
    pub last_insert_id: Option<u64>,
}

/// One pooled backend. Every call is bounded by the adapter's query timeout.
#[async_trait::async_trait]
pub trait DatabaseAdapter: Send + Sync {
    fn client(&self) -> ClientKind;

    /// Runs a row-returning statement with bound parameters.
    async fn query(&self, query: &BuiltQuery) -> Result<QueryResult, AppError>;

    /// Every result set of a statement, for procedures that return several.
    async fn query_sets(&self, query: &BuiltQuery) -> Result<Vec<QueryResult>, AppError> {
        Ok(vec![self.query(query).await?])
    }

    /// Runs a statement that modifies data.
    async fn execute(&self, query: &BuiltQuery) -> Result<ExecuteResult, AppError>;

    /// Runs all statements in one transaction, returning rows affected per statement.
    /// Nothing is committed if any statement fails.
    async fn execute_transaction(&self, statements: &[BuiltQuery]) -> Result<Vec<u64>, AppError>;

    /// Runs arbitrary SQL text without parameters. Statements that return no rows
    /// produce an empty result.
    async fn execute_raw(&self, sql: &str) -> Result<QueryResult, AppError>;

    async fn test_connection(&self) -> Result<(), AppError>;
}

/// Bounds `future` by `timeout`, reporting expiry as a database error.
pub async fn with_timeout<T, F>(timeout: Duration, future: F) -> Result<T, AppError>
where
    F: Future<Output = Result<T, AppError>>,
{
    tokio::time::timeout(timeout, future)
        .await
        .map_err(|_| AppError::Database(format!("Query timeout after {} seconds", timeout.as_secs())))?
}

/// Timestamps are rendered as UTC ISO-8601 with millisecond precision.
pub fn datetime_json(value: chrono::NaiveDateTime) -> Value {
    Value::String(
        value
            .and_utc()
            .to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
    )
}

pub fn date_json(value: chrono::NaiveDate) -> Value {
    Value::String(value.format("%Y-%m-%d").to_string())
}

/// Non-finite floats have no JSON representation and become `null`.
pub fn float_json(value: f64) -> Value {
    serde_json::Number::from_f64(value)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

/// Short SQL excerpt for debug logs.
pub fn sql_preview(sql: &str) -> String {
    const MAX: usize = 200;
    let compact: String = sql.split_whitespace().collect::<Vec<_>>().join(" ");
    if compact.chars().count() <= MAX {
        compact
    } else {
        let cut: String = compact.chars().take(MAX).collect();
        format!("{}...", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_timeout_reports_database_error() {
        let result: Result<(), AppError> = with_timeout(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        match result {
            Err(AppError::Database(msg)) => assert!(msg.contains("timeout")),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_value_rendering() {
        let dt = chrono::NaiveDate::from_ymd_opt(2021, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(datetime_json(dt), Value::String("2021-01-01T00:00:00.000Z".into()));
        assert_eq!(date_json(dt.date()), Value::String("2021-01-01".into()));
        assert_eq!(float_json(f64::NAN), Value::Null);
        assert_eq!(float_json(1.98), serde_json::json!(1.98));
    }

    #[test]
    fn test_sql_preview_compacts_whitespace() {
        assert_eq!(sql_preview("SELECT  *\n FROM x"), "SELECT * FROM x");
        let long = "x".repeat(500);
        assert!(sql_preview(&long).ends_with("..."));
    }
}

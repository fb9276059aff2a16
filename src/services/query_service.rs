use crate::api::middleware::AppError;
use crate::models::{Query, QueryResponse};
use crate::services::database::adapter::sql_preview;
use crate::services::db_service::DbSession;
use crate::validation::{SqlValidator, StatementKind};

/// Runs statements typed into the admin SQL console.
///
/// Statements are sent to the database verbatim. With `read_only` set, only
/// statements that parse as queries are let through.
pub struct QueryService {
    read_only: bool,
}

impl QueryService {
    pub fn new(read_only: bool) -> Self {
        Self { read_only }
    }

    /// Execute raw SQL on the session's connection.
    ///
    /// Rows come back keyed exactly as the driver reports them.
    pub async fn execute(&self, session: &DbSession, sql: &str) -> Result<QueryResponse, AppError> {
        let sql = sql.trim();
        if sql.is_empty() {
            return Err(AppError::Validation("SQL is required".to_string()));
        }

        let kind = self.statement_kind(session, sql)?;
        let mut query = Query::new(session.name.clone(), sql.to_string());
        tracing::info!("Running SQL on {}: {}", session.name, sql_preview(sql));

        query.mark_executing();
        match session.adapter.execute_raw(sql).await {
            Ok(result) => {
                let row_count = result.rows.len();
                query.mark_completed(row_count, result.execution_time_ms);
                tracing::info!(
                    "Query OK: {} rows in {} ms (conn: {})",
                    row_count,
                    result.execution_time_ms,
                    session.name
                );
                Ok(QueryResponse {
                    query_id: query.id,
                    rows: result.rows,
                    row_count,
                    time_ms: result.execution_time_ms,
                    statement_kind: kind.as_str().to_string(),
                })
            }
            Err(e) => {
                query.mark_failed(e.message().to_string());
                tracing::error!("SQL query {} failed: {}", query.id, e);
                Err(e)
            }
        }
    }

    fn statement_kind(&self, session: &DbSession, sql: &str) -> Result<StatementKind, AppError> {
        let client = session.profile.client;
        if self.read_only {
            return SqlValidator::validate_select_only(client, sql);
        }
        match SqlValidator::classify(client, sql) {
            Ok(kind) => Ok(kind),
            Err(e) => {
                // vendor syntax the parser does not know is still the database's call
                tracing::debug!("Could not classify statement: {}", e);
                Ok(StatementKind::Unknown)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ClientKind;
    use crate::services::database::testing::RecordingAdapter;
    use crate::services::db_service::testing::session;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_rows_are_returned_raw() {
        let adapter = Arc::new(RecordingAdapter::with_responder(ClientKind::Postgres, |_| {
            Ok(vec![json!({ "genre_id": 1, "name": "Rock" })])
        }));
        let s = session(ClientKind::Postgres, Arc::clone(&adapter));
        let response = QueryService::new(false)
            .execute(&s, "  SELECT * FROM genre  ")
            .await
            .unwrap();

        assert_eq!(response.rows, vec![json!({ "genre_id": 1, "name": "Rock" })]);
        assert_eq!(response.row_count, 1);
        assert_eq!(response.statement_kind, "select");
        assert!(!response.query_id.is_empty());
        assert_eq!(adapter.sql(), vec!["SELECT * FROM genre"]);
    }

    #[tokio::test]
    async fn test_read_only_rejects_writes() {
        let adapter = Arc::new(RecordingAdapter::new(ClientKind::MySql));
        let s = session(ClientKind::MySql, Arc::clone(&adapter));
        let err = QueryService::new(true)
            .execute(&s, "DELETE FROM Customer")
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::InvalidSql(_)));
        assert!(adapter.sql().is_empty());
    }

    #[tokio::test]
    async fn test_writes_allowed_by_default() {
        let adapter = Arc::new(RecordingAdapter::new(ClientKind::MsSql));
        let s = session(ClientKind::MsSql, Arc::clone(&adapter));
        let response = QueryService::new(false)
            .execute(&s, "UPDATE [Track] SET [UnitPrice] = 0.99 WHERE [TrackId] = 1")
            .await
            .unwrap();
        assert_eq!(response.statement_kind, "update");
        assert_eq!(response.row_count, 0);
    }

    #[tokio::test]
    async fn test_unparseable_sql_still_runs() {
        let adapter = Arc::new(RecordingAdapter::new(ClientKind::Oracle));
        let s = session(ClientKind::Oracle, Arc::clone(&adapter));
        let response = QueryService::new(false)
            .execute(&s, "FLASHBACK TABLE track TO BEFORE DROP")
            .await
            .unwrap();
        assert_eq!(response.statement_kind, "unknown");
        assert_eq!(adapter.sql().len(), 1);
    }

    #[tokio::test]
    async fn test_blank_and_failing_sql() {
        let adapter = Arc::new(RecordingAdapter::with_responder(ClientKind::Postgres, |_| {
            Err(AppError::Database("relation \"nope\" does not exist".into()))
        }));
        let s = session(ClientKind::Postgres, Arc::clone(&adapter));
        let service = QueryService::new(false);

        assert!(matches!(service.execute(&s, "   ").await, Err(AppError::Validation(_))));
        assert!(matches!(
            service.execute(&s, "SELECT * FROM nope").await,
            Err(AppError::Database(_))
        ));
    }
}

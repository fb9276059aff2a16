use serde_json::Value;

use super::fetch_page;
use super::search::{search_condition, SearchField, SearchTerm};
use crate::api::middleware::AppError;
use crate::models::{ColumnInfo, ListParams, SqlValue, TablePage};
use crate::services::db_service::DbSession;
use crate::services::dialect::is_safe_identifier;
use crate::services::normalizer::pick_str;
use crate::services::query_builder::{BuiltQuery, SelectQuery};

/// Physical table names visible to the connection.
pub async fn list_tables(session: &DbSession) -> Result<Vec<String>, AppError> {
    let sql = session.dialect().list_tables_sql();
    let result = session.adapter.query(&BuiltQuery::raw(sql)).await?;
    Ok(result
        .rows
        .iter()
        .filter_map(|row| pick_str(row, "table_name").map(str::to_string))
        .collect())
}

/// Catalog columns of `table` (canonical or physical name), in ordinal order.
pub async fn discover_columns(session: &DbSession, table: &str) -> Result<Vec<ColumnInfo>, AppError> {
    let d = session.dialect();
    let query = BuiltQuery::new(
        d.columns_sql(),
        vec![SqlValue::Text(d.bare_table_name(table))],
    );
    let result = session.adapter.query(&query).await?;
    Ok(result.rows.iter().filter_map(column_from_row).collect())
}

fn column_from_row(row: &Value) -> Option<ColumnInfo> {
    Some(ColumnInfo {
        name: pick_str(row, "column_name")?.to_string(),
        data_type: pick_str(row, "data_type").unwrap_or_default().to_string(),
        // YES on information_schema, Y on Oracle
        nullable: pick_str(row, "is_nullable").map_or(true, |n| n.to_uppercase().starts_with('Y')),
        default: pick_str(row, "column_default").map(|d| d.trim().to_string()),
    })
}

/// Generic paged browse of any table, searching over every discovered column.
pub async fn browse_table(session: &DbSession, table: &str, params: &ListParams) -> Result<TablePage, AppError> {
    if !is_safe_identifier(table) {
        return Err(AppError::Validation(format!("Invalid table name: {}", table)));
    }
    let d = session.dialect();
    let limit = params.limit(50);
    let offset = params.offset();

    let columns = discover_columns(session, table).await?;
    let Some(first) = columns.first() else {
        return Err(AppError::NotFound(format!("Table {} not found", table)));
    };
    let fields: Vec<SearchField> = columns
        .iter()
        .map(|c| SearchField::new(c.name.as_str(), d.quote_ident(&c.name), c.kind()))
        .collect();

    let filter = SearchTerm::from_params(params, 1).map(|s| search_condition(d, &fields, &s));
    let base = SelectQuery::from(d, table, None).filter_opt(filter);
    let query = base
        .clone()
        .order_fallback(d.quote_ident(&first.name))
        .paginate(limit, offset);

    tracing::debug!(
        "Table {} query: offset={}, limit={}, search={:?}, conn={}",
        table,
        offset,
        limit,
        params.search(),
        session.name
    );
    let fetched = fetch_page(session, &query.build(), &base.count()).await?;

    tracing::info!(
        "{} query OK: {} rows of {} in {}ms (conn: {})",
        table,
        fetched.rows.len(),
        fetched.total,
        fetched.time_ms,
        session.name
    );
    Ok(TablePage {
        row_count: fetched.rows.len(),
        rows: fetched.rows,
        columns: columns.iter().map(|c| d.normalize_key(&c.name)).collect(),
        total_rows: fetched.total,
        time_ms: fetched.time_ms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ClientKind;
    use crate::services::database::testing::RecordingAdapter;
    use crate::services::db_service::testing::session;
    use serde_json::json;
    use std::sync::Arc;

    fn catalog_adapter(client: ClientKind) -> Arc<RecordingAdapter> {
        Arc::new(RecordingAdapter::with_responder(client, |query| {
            if query.sql.contains("information_schema.columns") || query.sql.contains("user_tab_columns") {
                Ok(vec![
                    json!({ "column_name": "genre_id", "data_type": "integer", "is_nullable": "NO" }),
                    json!({ "column_name": "name", "data_type": "character varying", "is_nullable": "YES" }),
                ])
            } else if query.sql.starts_with("SELECT COUNT(*)") {
                Ok(vec![json!({ "total": 25 })])
            } else {
                Ok(vec![json!({ "genre_id": 1, "name": "Rock" })])
            }
        }))
    }

    #[tokio::test]
    async fn test_browse_normalizes_rows_and_columns() {
        let adapter = catalog_adapter(ClientKind::Postgres);
        let session = session(ClientKind::Postgres, Arc::clone(&adapter));
        let page = browse_table(&session, "Genre", &ListParams::default()).await.unwrap();

        assert_eq!(page.columns, vec!["GenreId", "Name"]);
        assert_eq!(page.rows[0], json!({ "GenreId": 1, "Name": "Rock" }));
        assert_eq!((page.row_count, page.total_rows), (1, 25));

        let catalog = &adapter.recorded()[0];
        assert_eq!(catalog.params, vec![SqlValue::Text("genre".into())]);
    }

    #[tokio::test]
    async fn test_browse_search_respects_column_kinds() {
        let adapter = catalog_adapter(ClientKind::Postgres);
        let session = session(ClientKind::Postgres, Arc::clone(&adapter));
        let params = ListParams {
            search: Some("rock".into()),
            ..Default::default()
        };
        browse_table(&session, "Genre", &params).await.unwrap();

        let data = adapter
            .recorded()
            .into_iter()
            .find(|q| q.sql.starts_with("SELECT * FROM"))
            .unwrap();
        assert_eq!(
            data.sql,
            "SELECT * FROM \"public\".\"genre\" WHERE LOWER(\"name\") LIKE $1 LIMIT 50 OFFSET 0"
        );
        assert_eq!(data.params, vec![SqlValue::Text("%rock%".into())]);
    }

    #[tokio::test]
    async fn test_mssql_browse_orders_by_first_column() {
        let adapter = Arc::new(RecordingAdapter::with_responder(ClientKind::MsSql, |query| {
            if query.sql.contains("INFORMATION_SCHEMA.COLUMNS") {
                Ok(vec![json!({ "COLUMN_NAME": "MediaTypeId", "DATA_TYPE": "int", "IS_NULLABLE": "NO" })])
            } else {
                Ok(vec![])
            }
        }));
        let session = session(ClientKind::MsSql, Arc::clone(&adapter));
        let params = ListParams {
            offset: Some("10".into()),
            ..Default::default()
        };
        browse_table(&session, "MediaType", &params).await.unwrap();
        assert!(adapter
            .sql()
            .iter()
            .any(|s| s.ends_with("ORDER BY [MediaTypeId] OFFSET 10 ROWS FETCH NEXT 50 ROWS ONLY")));
    }

    #[tokio::test]
    async fn test_unknown_and_unsafe_tables() {
        let adapter = Arc::new(RecordingAdapter::new(ClientKind::MySql));
        let session = session(ClientKind::MySql, adapter);
        let err = browse_table(&session, "Nope", &ListParams::default()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let err = browse_table(&session, "Track; DROP TABLE Track", &ListParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_list_tables_reads_any_key_case() {
        let adapter = Arc::new(RecordingAdapter::with_responder(ClientKind::Oracle, |_| {
            Ok(vec![json!({ "TABLE_NAME": "ALBUM" }), json!({ "TABLE_NAME": "ARTIST" })])
        }));
        let session = session(ClientKind::Oracle, adapter);
        assert_eq!(list_tables(&session).await.unwrap(), vec!["ALBUM", "ARTIST"]);
    }
}

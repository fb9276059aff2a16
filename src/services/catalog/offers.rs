use serde::Serialize;
use serde_json::{Map, Value};

use super::search::{search_condition, SearchField, SearchTerm};
use super::table_browser::{discover_columns, list_tables};
use crate::api::middleware::AppError;
use crate::models::{ColumnInfo, ListParams};
use crate::services::db_service::DbSession;
use crate::services::query_builder::SelectQuery;

const OFFER_TABLE_NAMES: [&str; 2] = ["offers", "offer"];

/// A page of the optional offers table, with its discovered structure.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OffersPage {
    pub success: bool,
    pub table_exists: bool,
    pub table_name: String,
    pub columns: Vec<ColumnInfo>,
    pub column_types: Map<String, Value>,
    /// Rows keyed exactly as the database reports them, matching `columns`
    pub rows: Vec<Value>,
    pub total_rows: i64,
    pub limit: u64,
    pub offset: u64,
    pub has_more: bool,
}

/// `None` when the connection has no offers table.
pub async fn list_offers(session: &DbSession, params: &ListParams) -> Result<Option<OffersPage>, AppError> {
    let Some(table_name) = find_offers_table(session).await? else {
        tracing::info!("No offers table on {}", session.name);
        return Ok(None);
    };
    tracing::info!("Found offers table: {}", table_name);

    let d = session.dialect();
    let limit = params.limit(50);
    let offset = params.offset();

    let mut columns = match discover_columns(session, &table_name).await {
        Ok(columns) => columns,
        Err(e) => {
            tracing::warn!("Could not get offers column info, proceeding with basic query: {}", e);
            Vec::new()
        }
    };

    let fields: Vec<SearchField> = columns
        .iter()
        .map(|c| SearchField::new(c.name.as_str(), d.quote_ident(&c.name), c.kind()))
        .collect();
    let filter = SearchTerm::from_params(params, 1)
        .filter(|_| !fields.is_empty())
        .map(|s| search_condition(d, &fields, &s));

    let base = SelectQuery::from(d, &table_name, None).filter_opt(filter);
    let mut query = base.clone().paginate(limit, offset);
    if let Some(first) = columns.first() {
        query = query.order_fallback(d.quote_ident(&first.name));
    }

    let data = query.build();
    let count = base.count();
    let (result, total) = futures::try_join!(session.adapter.query(&data), session.count(&count))?;
    let rows = result.rows;

    if columns.is_empty() {
        columns = infer_columns(rows.first());
    }
    let column_types = columns
        .iter()
        .map(|c| (c.name.clone(), Value::String(c.data_type.clone())))
        .collect();

    Ok(Some(OffersPage {
        success: true,
        table_exists: true,
        table_name,
        columns,
        column_types,
        rows,
        total_rows: total,
        limit,
        offset,
        has_more: offset.saturating_add(limit) < total.max(0) as u64,
    }))
}

async fn find_offers_table(session: &DbSession) -> Result<Option<String>, AppError> {
    let tables = list_tables(session).await?;
    Ok(OFFER_TABLE_NAMES.iter().find_map(|wanted| {
        tables
            .iter()
            .find(|table| table.eq_ignore_ascii_case(wanted))
            .cloned()
    }))
}

/// Column list guessed from a sample row when the catalog gave nothing.
fn infer_columns(sample: Option<&Value>) -> Vec<ColumnInfo> {
    let Some(Value::Object(row)) = sample else {
        return Vec::new();
    };
    row.iter()
        .map(|(name, value)| ColumnInfo {
            name: name.clone(),
            data_type: if value.is_number() { "numeric" } else { "text" }.to_string(),
            nullable: true,
            default: None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ClientKind, SqlValue};
    use crate::services::database::testing::RecordingAdapter;
    use crate::services::db_service::testing::session;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_missing_table_is_none() {
        let adapter = Arc::new(RecordingAdapter::with_responder(ClientKind::MySql, |_| {
            Ok(vec![json!({ "TABLE_NAME": "Album" }), json!({ "TABLE_NAME": "Offerings" })])
        }));
        let session = session(ClientKind::MySql, adapter);
        assert!(list_offers(&session, &ListParams::default()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_offers_page_keeps_physical_columns() {
        let adapter = Arc::new(RecordingAdapter::with_responder(ClientKind::Oracle, |query| {
            if query.sql.contains("user_tables") {
                Ok(vec![json!({ "TABLE_NAME": "ALBUM" }), json!({ "TABLE_NAME": "OFFERS" })])
            } else if query.sql.contains("user_tab_columns") {
                Ok(vec![
                    json!({ "COLUMN_NAME": "OFFERID", "DATA_TYPE": "NUMBER", "IS_NULLABLE": "N" }),
                    json!({ "COLUMN_NAME": "DESCRIPTION", "DATA_TYPE": "VARCHAR2", "IS_NULLABLE": "Y" }),
                ])
            } else if query.sql.starts_with("SELECT COUNT(*)") {
                Ok(vec![json!({ "TOTAL": 3 })])
            } else {
                Ok(vec![json!({ "OFFERID": 1, "DESCRIPTION": "Spring sale" })])
            }
        }));
        let session = session(ClientKind::Oracle, Arc::clone(&adapter));
        let params = ListParams {
            search: Some("sale".into()),
            limit: Some("2".into()),
            ..Default::default()
        };
        let page = list_offers(&session, &params).await.unwrap().unwrap();

        assert_eq!(page.table_name, "OFFERS");
        assert_eq!(page.rows[0]["OFFERID"], json!(1));
        assert_eq!(page.column_types["DESCRIPTION"], json!("VARCHAR2"));
        assert!(!page.columns[0].nullable);
        assert!(page.has_more);

        let data = adapter
            .recorded()
            .into_iter()
            .find(|q| q.sql.starts_with("SELECT * FROM"))
            .unwrap();
        assert!(
            data.sql.contains("WHERE (TO_CHAR(\"OFFERID\") LIKE :1 OR LOWER(\"DESCRIPTION\") LIKE :2)"),
            "{}",
            data.sql
        );
        assert_eq!(data.params, vec![SqlValue::Text("%sale%".into()); 2]);

        let json = serde_json::to_value(&page).unwrap();
        assert_eq!(json["tableExists"], json!(true));
        assert_eq!(json["totalRows"], json!(3));
    }

    #[tokio::test]
    async fn test_huge_offset_is_clamped() {
        let adapter = Arc::new(RecordingAdapter::with_responder(ClientKind::MySql, |query| {
            if query.sql.contains("information_schema.tables") {
                Ok(vec![json!({ "table_name": "Offers" })])
            } else if query.sql.starts_with("SELECT COUNT(*)") {
                Ok(vec![json!({ "total": 3 })])
            } else {
                Ok(Vec::new())
            }
        }));
        let session = session(ClientKind::MySql, Arc::clone(&adapter));
        let params = ListParams {
            offset: Some(u64::MAX.to_string()),
            ..Default::default()
        };
        let page = list_offers(&session, &params).await.unwrap().unwrap();

        assert_eq!(page.offset, i64::MAX as u64);
        assert!(!page.has_more);
        let data = adapter
            .recorded()
            .into_iter()
            .find(|q| q.sql.starts_with("SELECT * FROM"))
            .unwrap();
        assert!(data.sql.contains(&format!("OFFSET {}", i64::MAX)), "{}", data.sql);
    }

    #[test]
    fn test_infer_columns_from_sample_row() {
        let columns = infer_columns(Some(&json!({ "id": 1, "title": "x" })));
        assert_eq!(columns.len(), 2);
        assert!(columns.iter().any(|c| c.name == "id" && c.data_type == "numeric"));
    }
}

use serde_json::Value;

use super::search::{search_condition, SearchField, SearchTerm};
use super::fetch_page;
use crate::api::middleware::AppError;
use crate::models::{ListParams, Page};
use crate::services::db_service::DbSession;
use crate::services::normalizer::{pick, pick_str, project};
use crate::services::query_builder::SelectQuery;

const INVOICE_FIELDS: &[&str] = &[
    "InvoiceId",
    "CustomerId",
    "InvoiceDate",
    "BillingAddress",
    "BillingCity",
    "BillingState",
    "BillingCountry",
    "BillingPostalCode",
    "Total",
];

/// Invoices joined to their customer, newest first.
pub async fn list_invoices(session: &DbSession, params: &ListParams) -> Result<Page, AppError> {
    let d = session.dialect();
    let limit = params.limit(50);
    let offset = params.offset();

    let base = SelectQuery::from(d, "Invoice", Some("i")).left_join(
        "Customer",
        "c",
        format!("{} = {}", d.qualified("i", "CustomerId"), d.qualified("c", "CustomerId")),
    );

    let fields = [
        SearchField::numeric("InvoiceId", base.col("i", "InvoiceId")),
        SearchField::numeric("Total", base.col("i", "Total")),
        SearchField::text("BillingCity", base.col("i", "BillingCity")),
        SearchField::text("BillingCountry", base.col("i", "BillingCountry")),
        SearchField::text("FirstName", base.col("c", "FirstName")),
        SearchField::text("LastName", base.col("c", "LastName")),
        SearchField::text("Email", base.col("c", "Email")),
    ];
    let filter = SearchTerm::from_params(params, 2).map(|s| search_condition(d, &fields, &s));
    let base = base.filter_opt(filter);

    let mut query = base.clone();
    for field in INVOICE_FIELDS {
        query = query.column_as(d.qualified("i", field), field);
    }
    let query = query
        .column_as(d.qualified("c", "FirstName"), "CustomerFirstName")
        .column_as(d.qualified("c", "LastName"), "CustomerLastName")
        .column_as(d.qualified("c", "Email"), "CustomerEmail")
        .order_by(d.qualified("i", "InvoiceId"), true)
        .paginate(limit, offset);

    let fetched = fetch_page(session, &query.build(), &base.count()).await?;
    let rows: Vec<Value> = fetched.rows.iter().map(format_invoice).collect();

    tracing::info!(
        "Invoices query OK: {} rows of {} in {}ms (conn: {})",
        rows.len(),
        fetched.total,
        fetched.time_ms,
        session.name
    );
    Ok(Page::new(rows, fetched.total, fetched.time_ms))
}

fn format_invoice(row: &Value) -> Value {
    let mut invoice = project(row, INVOICE_FIELDS);
    let name = format!(
        "{} {}",
        pick_str(row, "CustomerFirstName").unwrap_or_default(),
        pick_str(row, "CustomerLastName").unwrap_or_default()
    );
    let name = name.trim();
    invoice.insert(
        "CustomerName".to_string(),
        Value::String(if name.is_empty() {
            "Unknown Customer".to_string()
        } else {
            name.to_string()
        }),
    );
    invoice.insert(
        "CustomerEmail".to_string(),
        pick(row, "CustomerEmail").cloned().unwrap_or(Value::Null),
    );
    Value::Object(invoice)
}

#[cfg(test)]
mod tests {
    use super::super::testing::{scripted, ALL_CLIENTS};
    use super::*;
    use crate::models::{ClientKind, SqlValue};
    use serde_json::json;

    fn params(pairs: &[(&str, &str)]) -> ListParams {
        let mut p = ListParams::default();
        for (key, value) in pairs {
            let value = Some(value.to_string());
            match *key {
                "search" => p.search = value,
                "exactMatch" => p.exact_match = value,
                "limit" => p.limit = value,
                "offset" => p.offset = value,
                _ => unreachable!(),
            }
        }
        p
    }

    #[tokio::test]
    async fn test_pagination_and_count_across_dialects() {
        for client in ALL_CLIENTS {
            let (session, adapter) = scripted(client, 412, vec![]);
            let page = list_invoices(&session, &params(&[("limit", "10"), ("offset", "20")]))
                .await
                .unwrap();
            assert_eq!(page.total_rows, 412, "{}", client);

            let sql = adapter.sql();
            let data = sql.iter().find(|s| !s.starts_with("SELECT COUNT(*)")).unwrap();
            let count = sql.iter().find(|s| s.starts_with("SELECT COUNT(*)")).unwrap();
            match client {
                ClientKind::MsSql | ClientKind::Oracle => {
                    assert!(data.ends_with("DESC OFFSET 20 ROWS FETCH NEXT 10 ROWS ONLY"), "{}", data)
                }
                _ => assert!(data.ends_with("DESC LIMIT 10 OFFSET 20"), "{}", data),
            }
            assert!(!count.contains("ORDER BY"));
            assert!(!count.contains("OFFSET"));
        }
    }

    #[tokio::test]
    async fn test_rows_are_formatted() {
        let rows = vec![
            json!({ "invoiceid": 5, "total": 3.96, "customerfirstname": "Luís", "customerlastname": "Gonçalves", "customeremail": "luisg@embraer.com.br" }),
            json!({ "invoiceid": 6, "total": 0.99 }),
        ];
        let (session, _) = scripted(ClientKind::Postgres, 2, rows);
        let page = list_invoices(&session, &ListParams::default()).await.unwrap();

        assert_eq!(page.row_count, 2);
        assert_eq!(page.rows[0]["InvoiceId"], json!(5));
        assert_eq!(page.rows[0]["CustomerName"], json!("Luís Gonçalves"));
        assert_eq!(page.rows[0]["CustomerEmail"], json!("luisg@embraer.com.br"));
        assert_eq!(page.rows[1]["CustomerName"], json!("Unknown Customer"));
        assert_eq!(page.rows[1]["BillingCity"], Value::Null);
    }

    #[tokio::test]
    async fn test_search_applies_to_both_queries() {
        let (session, adapter) = scripted(ClientKind::MsSql, 0, vec![]);
        list_invoices(&session, &params(&[("search", "Oslo")])).await.unwrap();
        for query in adapter.recorded() {
            assert!(query.sql.contains("LOWER(c.[Email]) LIKE"), "{}", query.sql);
            assert!(query.params.contains(&SqlValue::Text("%oslo%".into())));
        }

        let (session, adapter) = scripted(ClientKind::MsSql, 0, vec![]);
        list_invoices(&session, &params(&[("search", "O")])).await.unwrap();
        assert!(adapter.sql().iter().all(|s| !s.contains("WHERE")));
    }
}

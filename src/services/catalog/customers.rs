use serde_json::Value;

use super::search::{search_condition, SearchField, SearchTerm};
use crate::api::middleware::AppError;
use crate::models::{ListParams, CUSTOMER};
use crate::services::db_service::DbSession;
use crate::services::normalizer::project;
use crate::services::query_builder::SelectQuery;

/// Customer picker results are capped at this many rows.
pub const CUSTOMER_SEARCH_LIMIT: u64 = 20;

/// Customers matching a name, email or "first last" search.
pub async fn search_customers(session: &DbSession, params: &ListParams) -> Result<Vec<Value>, AppError> {
    let d = session.dialect();
    let first = d.quote_column("FirstName");
    let last = d.quote_column("LastName");
    let full_name = d.concat(&[first.as_str(), "' '", last.as_str()]);

    let fields = [
        SearchField::text("FirstName", first.as_str()),
        SearchField::text("LastName", last.as_str()),
        SearchField::text("Email", d.quote_column("Email")),
        SearchField::text("FullName", full_name),
    ];
    let filter = SearchTerm::from_params(params, 2).map(|s| search_condition(d, &fields, &s));

    let query = SelectQuery::from(d, "Customer", None)
        .filter_opt(filter)
        .order_by(last.as_str(), false)
        .order_by(first.as_str(), false)
        .order_by(d.quote_column("CustomerId"), false)
        .paginate(CUSTOMER_SEARCH_LIMIT, 0);

    let rows = session.query_rows(&query.build()).await?;
    let columns = CUSTOMER.columns();
    let customers: Vec<Value> = rows
        .iter()
        .map(|row| Value::Object(project(row, &columns)))
        .collect();

    tracing::info!(
        "Customer search \"{}\" returned {} results",
        params.search().unwrap_or_default(),
        customers.len()
    );
    Ok(customers)
}

#[cfg(test)]
mod tests {
    use super::super::testing::scripted;
    use super::*;
    use crate::models::{ClientKind, SqlValue};
    use serde_json::json;

    #[tokio::test]
    async fn test_full_name_search_per_dialect() {
        let params = ListParams {
            search: Some("Luís G".into()),
            ..Default::default()
        };
        let cases = [
            (ClientKind::MsSql, "LOWER([FirstName] + ' ' + [LastName])"),
            (ClientKind::MySql, "LOWER(CONCAT(`FirstName`, ' ', `LastName`))"),
            (ClientKind::Postgres, "LOWER(\"first_name\" || ' ' || \"last_name\")"),
            (ClientKind::Oracle, "LOWER(\"FIRSTNAME\" || ' ' || \"LASTNAME\")"),
        ];
        for (client, expected) in cases {
            let (session, adapter) = scripted(client, 0, vec![]);
            search_customers(&session, &params).await.unwrap();
            let query = &adapter.recorded()[0];
            assert!(query.sql.contains(expected), "{}: {}", client, query.sql);
            assert_eq!(query.params.len(), 4);
            assert!(query.params.iter().all(|p| *p == SqlValue::Text("%luís g%".into())));
        }
    }

    #[tokio::test]
    async fn test_results_are_capped_and_canonical() {
        let rows = vec![json!({ "CUSTOMERID": 1, "FIRSTNAME": "Luís", "POSTALCODE": "12227-000" })];
        let (session, adapter) = scripted(ClientKind::Oracle, 0, rows);
        let customers = search_customers(&session, &ListParams::default()).await.unwrap();

        assert_eq!(customers[0]["CustomerId"], json!(1));
        assert_eq!(customers[0]["PostalCode"], json!("12227-000"));
        assert_eq!(customers[0]["Company"], Value::Null);
        assert!(adapter.sql()[0].ends_with("FETCH NEXT 20 ROWS ONLY"));
    }
}

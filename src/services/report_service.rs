//! Invoice report: the invoice, its customer and the tracks bought.
//!
//! The slow demo mode exists to give a performance-tuning demo something to fix:
//! on SQL Server it calls `sp_InvoiceReport`, elsewhere (or when the procedure is
//! missing) it runs a deliberately inefficient query and then pauses.

use serde::Serialize;
use serde_json::Value;
use std::time::{Duration, Instant};

use crate::api::middleware::AppError;
use crate::models::{ClientKind, SqlValue, CUSTOMER, INVOICE};
use crate::services::db_service::DbSession;
use crate::services::dialect::Dialect;
use crate::services::normalizer::{normalize_rows, pick, pick_i64, project};
use crate::services::query_builder::{BuiltQuery, Condition, SelectQuery};
use crate::services::records;

const CUSTOMER_FIELDS: &[&str] = &[
    "CustomerId",
    "FirstName",
    "LastName",
    "Email",
    "Address",
    "City",
    "State",
    "Country",
    "PostalCode",
    "Phone",
    "Fax",
];

const TRACK_FIELDS: &[&str] = &[
    "TrackId",
    "TrackName",
    "Composer",
    "GenreId",
    "Milliseconds",
    "UnitPrice",
    "Quantity",
    "AlbumTitle",
    "ArtistName",
];

const SLOW_PROCEDURE: &str = "sp_InvoiceReport";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportMode {
    Standard,
    /// Slow demo path; the fallback query is followed by this pause
    SlowDemo(Duration),
}

impl ReportMode {
    pub fn slow_demo() -> Self {
        ReportMode::SlowDemo(Duration::from_secs(1))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMethod {
    Standard,
    StoredProcedure,
    SlowFallback,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceReport {
    pub invoice: Value,
    pub customer: Value,
    pub tracks: Vec<Value>,
    pub time_ms: u64,
    pub execution_method: ExecutionMethod,
    pub execution_details: String,
}

pub async fn invoice_report(session: &DbSession, invoice_id: i64, mode: ReportMode) -> Result<InvoiceReport, AppError> {
    let started = Instant::now();

    let invoice = records::fetch(session, &INVOICE, invoice_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Invoice not found.".to_string()))?;
    let customer = match pick_i64(&invoice, "CustomerId") {
        Some(customer_id) => records::fetch(session, &CUSTOMER, customer_id).await?,
        None => None,
    };
    let customer = Value::Object(project(&customer.unwrap_or(Value::Null), CUSTOMER_FIELDS));

    let (rows, method, details) = match mode {
        ReportMode::Standard => (
            session.query_rows(&standard_query(session.dialect(), invoice_id)).await?,
            ExecutionMethod::Standard,
            "Optimized JOIN Query with Album/Artist",
        ),
        ReportMode::SlowDemo(delay) => slow_tracks(session, invoice_id, delay).await?,
    };
    let tracks = rows
        .iter()
        .map(|row| Value::Object(project(row, TRACK_FIELDS)))
        .collect();

    let time_ms = started.elapsed().as_millis() as u64;
    tracing::info!(
        "Invoice report {} completed in {}ms ({}, {:?})",
        invoice_id,
        time_ms,
        session.name,
        method
    );
    Ok(InvoiceReport {
        invoice,
        customer,
        tracks,
        time_ms,
        execution_method: method,
        execution_details: details.to_string(),
    })
}

fn standard_query(d: &dyn Dialect, invoice_id: i64) -> BuiltQuery {
    SelectQuery::from(d, "InvoiceLine", Some("il"))
        .inner_join(
            "Track",
            "t",
            format!("{} = {}", d.qualified("il", "TrackId"), d.qualified("t", "TrackId")),
        )
        .left_join(
            "Album",
            "al",
            format!("{} = {}", d.qualified("t", "AlbumId"), d.qualified("al", "AlbumId")),
        )
        .left_join(
            "Artist",
            "ar",
            format!("{} = {}", d.qualified("al", "ArtistId"), d.qualified("ar", "ArtistId")),
        )
        .column_as(d.qualified("t", "TrackId"), "TrackId")
        .column_as(d.qualified("t", "Name"), "TrackName")
        .column_as(d.qualified("t", "Composer"), "Composer")
        .column_as(d.qualified("t", "GenreId"), "GenreId")
        .column_as(d.qualified("t", "Milliseconds"), "Milliseconds")
        .column_as(d.qualified("il", "UnitPrice"), "UnitPrice")
        .column_as(d.qualified("il", "Quantity"), "Quantity")
        .column_as(d.qualified("al", "Title"), "AlbumTitle")
        .column_as(d.qualified("ar", "Name"), "ArtistName")
        .filter(Condition::eq(d.qualified("il", "InvoiceId"), invoice_id))
        .order_by(d.qualified("t", "TrackId"), false)
        .build()
}

async fn slow_tracks(session: &DbSession, invoice_id: i64, delay: Duration) -> Result<(Vec<Value>, ExecutionMethod, &'static str), AppError> {
    let d = session.dialect();
    let mut details = "Inefficient Query (Demo Fallback)";

    if d.client() == ClientKind::MsSql {
        let call = BuiltQuery::new(
            format!("EXEC {} @InvoiceId = {}", SLOW_PROCEDURE, d.placeholder(1)),
            vec![SqlValue::Int(invoice_id)],
        );
        match session.adapter.query_sets(&call).await {
            Ok(sets) => {
                let tracks = sets
                    .into_iter()
                    .map(|set| set.rows)
                    .find(|rows| rows.first().is_some_and(looks_like_track));
                if let Some(rows) = tracks {
                    return Ok((
                        normalize_rows(d, rows),
                        ExecutionMethod::StoredProcedure,
                        SLOW_PROCEDURE,
                    ));
                }
                tracing::warn!("{} returned no tracks, using fallback query", SLOW_PROCEDURE);
            }
            Err(e) => {
                tracing::warn!("{} failed, using fallback query: {}", SLOW_PROCEDURE, e);
                details = "Inefficient Query (SP Error Fallback)";
            }
        }
    }

    let rows = session.query_rows(&slow_query(d, invoice_id)).await?;
    tokio::time::sleep(delay).await;
    Ok((rows, ExecutionMethod::SlowFallback, details))
}

fn looks_like_track(row: &Value) -> bool {
    ["TrackId", "TrackName"]
        .iter()
        .any(|key| pick(row, key).is_some())
}

/// Correlated subqueries instead of a join, on purpose.
fn slow_query(d: &dyn Dialect, invoice_id: i64) -> BuiltQuery {
    let lines = d.quote_table("InvoiceLine");
    let line_value = |alias: &str, column: &str, placeholder: String| {
        format!(
            "(SELECT {} FROM {} WHERE {} = {} AND {} = {}) AS {}",
            d.qualified(alias, column),
            d.table_alias(&lines, alias),
            d.qualified(alias, "TrackId"),
            d.qualified("t", "TrackId"),
            d.qualified(alias, "InvoiceId"),
            placeholder,
            column
        )
    };

    let sql = format!(
        "SELECT DISTINCT {} AS TrackId, {} AS TrackName, {} AS Composer, {} AS GenreId, \
         {} AS Milliseconds, {}, {} \
         FROM {} WHERE {} IN (SELECT DISTINCT {} FROM {} WHERE {} = {} AND EXISTS \
         (SELECT 1 FROM {} WHERE {} = {} AND {} = {})) ORDER BY {}",
        d.qualified("t", "TrackId"),
        d.qualified("t", "Name"),
        d.qualified("t", "Composer"),
        d.qualified("t", "GenreId"),
        d.qualified("t", "Milliseconds"),
        line_value("il_sub", "UnitPrice", d.placeholder(1)),
        line_value("il_sub2", "Quantity", d.placeholder(2)),
        d.table_alias(&d.quote_table("Track"), "t"),
        d.qualified("t", "TrackId"),
        d.qualified("il2", "TrackId"),
        d.table_alias(&lines, "il2"),
        d.qualified("il2", "InvoiceId"),
        d.placeholder(3),
        d.table_alias(&d.quote_table("Invoice"), "i2"),
        d.qualified("i2", "InvoiceId"),
        d.qualified("il2", "InvoiceId"),
        d.qualified("i2", "InvoiceId"),
        d.placeholder(4),
        d.qualified("t", "TrackId"),
    );
    BuiltQuery::new(sql, vec![SqlValue::Int(invoice_id); 4])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::database::testing::RecordingAdapter;
    use crate::services::db_service::testing::session;
    use serde_json::json;
    use std::sync::Arc;

    fn chinook(client: ClientKind, procedure: Option<Vec<Value>>) -> Arc<RecordingAdapter> {
        Arc::new(RecordingAdapter::with_responder(client, move |query| {
            let sql = query.sql.to_lowercase();
            if sql.starts_with("exec") {
                return procedure
                    .clone()
                    .ok_or_else(|| AppError::Database("Could not find stored procedure".into()));
            }
            if sql.contains("from [invoiceline]") || sql.contains("invoice_line") || sql.contains("`invoiceline`") {
                return Ok(vec![json!({ "TrackId": 1, "TrackName": "Balls to the Wall", "UnitPrice": 0.99, "Quantity": 1 })]);
            }
            if sql.contains("customer") {
                return Ok(vec![json!({ "CustomerId": 2, "FirstName": "Leonie", "LastName": "Köhler" })]);
            }
            Ok(vec![json!({ "InvoiceId": 1, "CustomerId": 2, "Total": 1.98 })])
        }))
    }

    #[tokio::test]
    async fn test_standard_report() {
        let adapter = chinook(ClientKind::MsSql, None);
        let s = session(ClientKind::MsSql, Arc::clone(&adapter));
        let report = invoice_report(&s, 1, ReportMode::Standard).await.unwrap();

        assert_eq!(report.execution_method, ExecutionMethod::Standard);
        assert_eq!(report.invoice["Total"], json!(1.98));
        assert_eq!(report.customer["FirstName"], json!("Leonie"));
        assert_eq!(report.customer["Fax"], Value::Null);
        assert_eq!(report.tracks[0]["TrackName"], json!("Balls to the Wall"));
        assert_eq!(report.tracks[0]["ArtistName"], Value::Null);

        let sql = adapter.sql();
        assert!(sql[2].contains("INNER JOIN [Track] AS t ON il.[TrackId] = t.[TrackId]"), "{}", sql[2]);
        assert!(sql[2].ends_with("WHERE il.[InvoiceId] = @P1 ORDER BY t.[TrackId]"));
    }

    #[tokio::test]
    async fn test_missing_invoice() {
        let s = session(ClientKind::MySql, Arc::new(RecordingAdapter::new(ClientKind::MySql)));
        let err = invoice_report(&s, 999, ReportMode::Standard).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_slow_demo_prefers_stored_procedure() {
        let sets = vec![json!({ "TrackId": 7, "TrackName": "Fast As a Shark" })];
        let adapter = chinook(ClientKind::MsSql, Some(sets));
        let s = session(ClientKind::MsSql, Arc::clone(&adapter));
        let report = invoice_report(&s, 1, ReportMode::SlowDemo(Duration::ZERO)).await.unwrap();

        assert_eq!(report.execution_method, ExecutionMethod::StoredProcedure);
        assert_eq!(report.execution_details, "sp_InvoiceReport");
        assert_eq!(report.tracks[0]["TrackId"], json!(7));
        assert!(adapter.sql().contains(&"EXEC sp_InvoiceReport @InvoiceId = @P1".to_string()));
    }

    #[tokio::test]
    async fn test_slow_demo_falls_back() {
        let adapter = chinook(ClientKind::MsSql, None);
        let s = session(ClientKind::MsSql, Arc::clone(&adapter));
        let report = invoice_report(&s, 1, ReportMode::SlowDemo(Duration::ZERO)).await.unwrap();
        assert_eq!(report.execution_method, ExecutionMethod::SlowFallback);
        assert_eq!(report.execution_details, "Inefficient Query (SP Error Fallback)");

        let adapter = chinook(ClientKind::Postgres, None);
        let s = session(ClientKind::Postgres, Arc::clone(&adapter));
        let report = invoice_report(&s, 1, ReportMode::SlowDemo(Duration::ZERO)).await.unwrap();
        assert_eq!(report.execution_details, "Inefficient Query (Demo Fallback)");
        let slow = adapter.recorded().pop().unwrap();
        assert!(slow.sql.starts_with("SELECT DISTINCT t.\"track_id\" AS TrackId"));
        assert!(slow.sql.contains("il2.\"invoice_id\" = $3"));
        assert_eq!(slow.params.len(), 4);
    }

    #[test]
    fn test_report_serializes_camel_case() {
        let report = InvoiceReport {
            invoice: json!({}),
            customer: Value::Object(project(&Value::Null, CUSTOMER_FIELDS)),
            tracks: vec![],
            time_ms: 3,
            execution_method: ExecutionMethod::SlowFallback,
            execution_details: String::new(),
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["executionMethod"], json!("slow_fallback"));
        assert_eq!(json["customer"]["Email"], Value::Null);
    }
}

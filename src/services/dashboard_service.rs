use chrono::{Datelike, NaiveDate, Utc};
use serde_json::{json, Value};

use crate::api::middleware::AppError;
use crate::services::db_service::DbSession;
use crate::services::normalizer::{pick, pick_f64};
use crate::services::query_builder::{Condition, SelectQuery};

const RECENT_CUSTOMERS: u64 = 10;

/// Reporting window for the sales and revenue tiles. Dates are UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Day,
    Month,
    Year,
    AllTime,
}

impl Period {
    /// Unknown values mean all time.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some("day") => Period::Day,
            Some("month") => Period::Month,
            Some("year") => Period::Year,
            _ => Period::AllTime,
        }
    }

    /// First day of the window containing `today`.
    pub fn start(&self, today: NaiveDate) -> Option<NaiveDate> {
        match self {
            Period::Day => Some(today),
            Period::Month => today.with_day(1),
            Period::Year => NaiveDate::from_ymd_opt(today.year(), 1, 1),
            Period::AllTime => None,
        }
    }

    /// Invoice date filter: the exact day for `Day`, on-or-after the start otherwise.
    fn condition(&self, session: &DbSession, today: NaiveDate) -> Option<Condition> {
        let start = self.start(today)?.format("%Y-%m-%d").to_string();
        let d = session.dialect();
        let date = d.date_trunc(&d.quote_column("InvoiceDate"));
        let op = if *self == Period::Day { "=" } else { ">=" };
        Some(Condition::date(date, op, start))
    }
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

pub async fn customer_count(session: &DbSession) -> Result<i64, AppError> {
    let query = SelectQuery::from(session.dialect(), "Customer", None).count();
    session.count(&query).await
}

pub async fn track_count(session: &DbSession) -> Result<i64, AppError> {
    let query = SelectQuery::from(session.dialect(), "Track", None).count();
    session.count(&query).await
}

/// Invoices dated within `period`.
pub async fn sales_count(session: &DbSession, period: Period) -> Result<i64, AppError> {
    let query = SelectQuery::from(session.dialect(), "Invoice", None)
        .filter_opt(period.condition(session, today()))
        .count();
    session.count(&query).await
}

/// Sum of invoice totals within `period`.
pub async fn revenue(session: &DbSession, period: Period) -> Result<f64, AppError> {
    let d = session.dialect();
    let query = SelectQuery::from(d, "Invoice", None)
        .column_as(format!("SUM({})", d.quote_column("Total")), "total")
        .filter_opt(period.condition(session, today()));
    let rows = session.query_rows(&query.build()).await?;
    Ok(rows
        .first()
        .and_then(|row| pick_f64(row, "total"))
        .unwrap_or(0.0))
}

/// Newest customers by id, keyed in camelCase.
pub async fn recent_customers(session: &DbSession) -> Result<Vec<Value>, AppError> {
    let d = session.dialect();
    let query = SelectQuery::from(d, "Customer", None)
        .column(d.quote_column("CustomerId"))
        .column(d.quote_column("FirstName"))
        .column(d.quote_column("LastName"))
        .column(d.quote_column("Email"))
        .column(d.quote_column("Country"))
        .order_by(d.quote_column("CustomerId"), true)
        .paginate(RECENT_CUSTOMERS, 0);
    let rows = session.query_rows(&query.build()).await?;

    let field = |row: &Value, name: &str| pick(row, name).cloned().unwrap_or(Value::Null);
    Ok(rows
        .iter()
        .map(|row| {
            json!({
                "customerId": field(row, "CustomerId"),
                "firstName": field(row, "FirstName"),
                "lastName": field(row, "LastName"),
                "email": field(row, "Email"),
                "country": field(row, "Country"),
            })
        })
        .collect())
}

/// US currency formatting: `$1,234.56`.
pub fn format_usd(amount: f64) -> String {
    let cents = (amount.abs() * 100.0).round() as u64;
    let dollars = (cents / 100).to_string();
    let mut grouped = String::with_capacity(dollars.len() + dollars.len() / 3);
    for (i, c) in dollars.chars().enumerate() {
        if i > 0 && (dollars.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    let sign = if amount < 0.0 && cents > 0 { "-" } else { "" };
    format!("{}${}.{:02}", sign, grouped, cents % 100)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ClientKind, SqlValue};
    use crate::services::database::testing::RecordingAdapter;
    use crate::services::db_service::testing::session;
    use std::sync::Arc;

    #[test]
    fn test_period_start() {
        let today = NaiveDate::from_ymd_opt(2025, 10, 22).unwrap();
        assert_eq!(Period::parse(Some("day")).start(today), Some(today));
        assert_eq!(
            Period::parse(Some("month")).start(today),
            NaiveDate::from_ymd_opt(2025, 10, 1)
        );
        assert_eq!(
            Period::parse(Some("year")).start(today),
            NaiveDate::from_ymd_opt(2025, 1, 1)
        );
        assert_eq!(Period::parse(Some("decade")), Period::AllTime);
        assert_eq!(Period::parse(None).start(today), None);
    }

    #[test]
    fn test_format_usd() {
        assert_eq!(format_usd(0.0), "$0.00");
        assert_eq!(format_usd(2328.6), "$2,328.60");
        assert_eq!(format_usd(1234567.891), "$1,234,567.89");
        assert_eq!(format_usd(-5.5), "-$5.50");
        assert_eq!(format_usd(999.999), "$1,000.00");
    }

    #[tokio::test]
    async fn test_sales_filters_by_period() {
        let adapter = Arc::new(RecordingAdapter::new(ClientKind::MsSql));
        let s = session(ClientKind::MsSql, Arc::clone(&adapter));
        sales_count(&s, Period::Day).await.unwrap();
        sales_count(&s, Period::AllTime).await.unwrap();

        let recorded = adapter.recorded();
        assert_eq!(
            recorded[0].sql,
            "SELECT COUNT(*) AS total FROM [Invoice] WHERE CAST([InvoiceDate] AS DATE) = CAST(@P1 AS DATE)"
        );
        assert_eq!(
            recorded[0].params,
            vec![SqlValue::Text(today().format("%Y-%m-%d").to_string())]
        );
        assert_eq!(recorded[1].sql, "SELECT COUNT(*) AS total FROM [Invoice]");
    }

    #[tokio::test]
    async fn test_revenue_reads_sum() {
        let adapter = Arc::new(RecordingAdapter::with_responder(ClientKind::Oracle, |_| {
            Ok(vec![json!({ "TOTAL": "2328.6" })])
        }));
        let s = session(ClientKind::Oracle, Arc::clone(&adapter));
        assert_eq!(revenue(&s, Period::Year).await.unwrap(), 2328.6);
        assert!(adapter.sql()[0].contains("TRUNC(\"INVOICEDATE\") >= TO_DATE(:1, 'YYYY-MM-DD')"));
    }

    #[tokio::test]
    async fn test_recent_customers_camel_case() {
        let adapter = Arc::new(RecordingAdapter::with_responder(ClientKind::Postgres, |_| {
            Ok(vec![json!({ "customer_id": 59, "first_name": "Puja", "last_name": "Srivastava", "email": "puja_srivastava@yahoo.in", "country": "India" })])
        }));
        let s = session(ClientKind::Postgres, Arc::clone(&adapter));
        let customers = recent_customers(&s).await.unwrap();
        assert_eq!(
            customers[0],
            json!({ "customerId": 59, "firstName": "Puja", "lastName": "Srivastava", "email": "puja_srivastava@yahoo.in", "country": "India" })
        );
        assert!(adapter.sql()[0].ends_with("ORDER BY \"customer_id\" DESC LIMIT 10 OFFSET 0"));
    }
}

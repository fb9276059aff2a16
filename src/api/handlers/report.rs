use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::api::handlers::connection::AppState;
use crate::api::middleware::AppError;
use crate::models::ConnParams;
use crate::services::dashboard_service::{self as dashboard, Period};
use crate::services::report_service::{invoice_report, InvoiceReport, ReportMode};

#[derive(Debug, Default, Deserialize)]
pub struct ReportParams {
    pub conn: Option<String>,
    pub demo: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PeriodParams {
    pub conn: Option<String>,
    pub period: Option<String>,
}

/// GET /api/report/invoice/{invoiceId}
pub async fn get_invoice_report(
    State(state): State<AppState>,
    Path(invoice_id): Path<String>,
    Query(params): Query<ReportParams>,
) -> Result<Json<InvoiceReport>, AppError> {
    let invoice_id: i64 = invoice_id
        .trim()
        .parse()
        .map_err(|_| AppError::Validation(format!("Invalid invoice id: {}", invoice_id)))?;

    let slow = params.demo.as_deref() == Some("slow") || state.config.demo.slow_queries;
    let mode = if slow { ReportMode::slow_demo() } else { ReportMode::Standard };
    tracing::debug!("Invoice report {} in {:?} mode", invoice_id, mode);

    let session = state.db.open(params.conn.as_deref()).await?;
    Ok(Json(invoice_report(&session, invoice_id, mode).await?))
}

/// GET /api/dashboard/customers
pub async fn customer_count(
    State(state): State<AppState>,
    Query(params): Query<ConnParams>,
) -> Result<Json<Value>, AppError> {
    let session = state.db.open(params.name()).await?;
    let count = dashboard::customer_count(&session).await?;
    Ok(Json(json!({ "count": count })))
}

/// GET /api/dashboard/top-tracks
pub async fn track_count(
    State(state): State<AppState>,
    Query(params): Query<ConnParams>,
) -> Result<Json<Value>, AppError> {
    let session = state.db.open(params.name()).await?;
    let count = dashboard::track_count(&session).await?;
    Ok(Json(json!({ "count": count })))
}

/// GET /api/dashboard/recent-sales
pub async fn recent_sales(
    State(state): State<AppState>,
    Query(params): Query<PeriodParams>,
) -> Result<Json<Value>, AppError> {
    let session = state.db.open(params.conn.as_deref()).await?;
    let period = params.period.as_deref().unwrap_or("alltime");
    let count = dashboard::sales_count(&session, Period::parse(Some(period))).await?;
    tracing::info!("Sales count for {}: {}", period, count);
    Ok(Json(json!({ "count": count, "period": period })))
}

/// GET /api/dashboard/revenue
pub async fn revenue(
    State(state): State<AppState>,
    Query(params): Query<PeriodParams>,
) -> Result<Json<Value>, AppError> {
    let session = state.db.open(params.conn.as_deref()).await?;
    let period = params.period.as_deref().unwrap_or("alltime");
    let total = dashboard::revenue(&session, Period::parse(Some(period))).await?;
    Ok(Json(json!({
        "total": total,
        "formatted": dashboard::format_usd(total),
        "period": period,
    })))
}

/// GET /api/dashboard/recent-customers
pub async fn recent_customers(
    State(state): State<AppState>,
    Query(params): Query<ConnParams>,
) -> Result<Json<Value>, AppError> {
    let session = state.db.open(params.name()).await?;
    let customers = dashboard::recent_customers(&session).await?;
    Ok(Json(json!({ "customers": customers })))
}

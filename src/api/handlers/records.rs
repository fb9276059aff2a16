use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::Instant;

use crate::api::handlers::connection::AppState;
use crate::api::middleware::AppError;
use crate::models::{ConnParams, EntitySpec, CUSTOMER, EMPLOYEE, INVOICE};
use crate::services::records::{self, parse_id};

#[derive(Debug, Default, Deserialize)]
pub struct DeleteParams {
    pub conn: Option<String>,
    pub cascade: Option<String>,
}

impl DeleteParams {
    fn cascade(&self) -> bool {
        self.cascade.as_deref() == Some("true")
    }
}

/// `?conn=` wins, then `conn` or `connection` in the JSON body.
fn conn_name<'a>(params: &'a ConnParams, body: &'a Map<String, Value>) -> Option<&'a str> {
    params.name().or_else(|| {
        ["conn", "connection"]
            .iter()
            .find_map(|key| body.get(*key).and_then(Value::as_str))
    })
}

/// Connection name for body-less requests such as DELETE, which may still carry a JSON body.
fn conn_from_raw_body(query_conn: Option<&str>, body: &Bytes) -> Option<String> {
    if let Some(name) = query_conn {
        return Some(name.to_string());
    }
    serde_json::from_slice::<ConnParams>(body)
        .ok()
        .and_then(|b| b.name().map(str::to_string))
}

fn elapsed(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

async fn fetch_or_404(
    state: &AppState,
    conn: Option<&str>,
    spec: &EntitySpec,
    raw_id: &str,
) -> Result<Value, AppError> {
    let id = parse_id(spec, raw_id)?;
    let session = state.db.open(conn).await?;
    records::fetch(&session, spec, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("{} not found", spec.label)))
}

// --- Customer ---

pub async fn create_customer(
    State(state): State<AppState>,
    Query(params): Query<ConnParams>,
    Json(body): Json<Map<String, Value>>,
) -> Result<Json<Value>, AppError> {
    let start = Instant::now();
    let session = state.db.open(conn_name(&params, &body)).await?;
    let customer_id = records::create(&session, &CUSTOMER, &body).await?;
    tracing::info!("Customer {:?} created on {}", customer_id, session.name);
    Ok(Json(json!({
        "success": true,
        "message": "Customer created successfully",
        "customerId": customer_id,
        "timeMs": elapsed(start),
    })))
}

pub async fn get_customer(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<ConnParams>,
) -> Result<Json<Value>, AppError> {
    let start = Instant::now();
    let customer = fetch_or_404(&state, params.name(), &CUSTOMER, &id).await?;
    Ok(Json(json!({ "success": true, "customer": customer, "timeMs": elapsed(start) })))
}

pub async fn update_customer(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<ConnParams>,
    Json(body): Json<Map<String, Value>>,
) -> Result<Json<Value>, AppError> {
    let start = Instant::now();
    let customer_id = parse_id(&CUSTOMER, &id)?;
    let session = state.db.open(conn_name(&params, &body)).await?;
    if records::update(&session, &CUSTOMER, customer_id, &body).await? == 0 {
        return Err(AppError::NotFound("Customer not found".to_string()));
    }
    Ok(Json(json!({
        "success": true,
        "message": "Customer updated successfully",
        "customerId": customer_id,
        "timeMs": elapsed(start),
    })))
}

/// `?cascade=true` also removes the customer's invoices and their lines.
pub async fn delete_customer(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<DeleteParams>,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let start = Instant::now();
    let customer_id = parse_id(&CUSTOMER, &id)?;
    let cascade = params.cascade();
    let conn = conn_from_raw_body(params.conn.as_deref(), &body);
    let session = state.db.open(conn.as_deref()).await?;
    if records::delete_customer(&session, customer_id, cascade).await? == 0 {
        return Err(AppError::NotFound("Customer not found".to_string()));
    }
    let message = if cascade {
        "Customer and related records deleted successfully"
    } else {
        "Customer deleted successfully"
    };
    Ok(Json(json!({
        "success": true,
        "message": message,
        "customerId": customer_id,
        "timeMs": elapsed(start),
    })))
}

// --- Invoice ---

/// Creates the invoice, then any `LineItems` in the body.
pub async fn create_invoice(
    State(state): State<AppState>,
    Query(params): Query<ConnParams>,
    Json(body): Json<Map<String, Value>>,
) -> Result<Json<Value>, AppError> {
    let start = Instant::now();
    let session = state.db.open(conn_name(&params, &body)).await?;
    let invoice_id = records::create_invoice(&session, &body).await?;
    Ok(Json(json!({
        "success": true,
        "data": invoice_id,
        "InvoiceId": invoice_id,
        "timeMs": elapsed(start),
    })))
}

pub async fn get_invoice(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<ConnParams>,
) -> Result<Json<Value>, AppError> {
    let start = Instant::now();
    let invoice = fetch_or_404(&state, params.name(), &INVOICE, &id).await?;
    Ok(Json(json!({ "success": true, "data": invoice, "timeMs": elapsed(start) })))
}

/// Responds with the number of rows changed.
pub async fn update_invoice(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<ConnParams>,
    Json(body): Json<Map<String, Value>>,
) -> Result<Json<Value>, AppError> {
    update_record(state, &INVOICE, &id, params, body).await
}

/// Deletes the invoice lines and the invoice in one transaction.
pub async fn delete_invoice(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<ConnParams>,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let start = Instant::now();
    let invoice_id = parse_id(&INVOICE, &id)?;
    let conn = conn_from_raw_body(params.name(), &body);
    let session = state.db.open(conn.as_deref()).await?;
    let deleted = records::delete_invoice(&session, invoice_id).await?;
    Ok(Json(json!({ "success": true, "data": deleted, "timeMs": elapsed(start) })))
}

// --- Employee ---

pub async fn create_employee(
    State(state): State<AppState>,
    Query(params): Query<ConnParams>,
    Json(body): Json<Map<String, Value>>,
) -> Result<Json<Value>, AppError> {
    let start = Instant::now();
    let session = state.db.open(conn_name(&params, &body)).await?;
    let employee_id = records::create(&session, &EMPLOYEE, &body).await?;
    Ok(Json(json!({ "success": true, "data": employee_id, "timeMs": elapsed(start) })))
}

pub async fn get_employee(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<ConnParams>,
) -> Result<Json<Value>, AppError> {
    let start = Instant::now();
    let employee = fetch_or_404(&state, params.name(), &EMPLOYEE, &id).await?;
    Ok(Json(json!({ "success": true, "data": employee, "timeMs": elapsed(start) })))
}

pub async fn update_employee(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<ConnParams>,
    Json(body): Json<Map<String, Value>>,
) -> Result<Json<Value>, AppError> {
    update_record(state, &EMPLOYEE, &id, params, body).await
}

pub async fn delete_employee(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<ConnParams>,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let start = Instant::now();
    let employee_id = parse_id(&EMPLOYEE, &id)?;
    let conn = conn_from_raw_body(params.name(), &body);
    let session = state.db.open(conn.as_deref()).await?;
    let deleted = records::delete(&session, &EMPLOYEE, employee_id).await?;
    Ok(Json(json!({ "success": true, "data": deleted, "timeMs": elapsed(start) })))
}

async fn update_record(
    state: AppState,
    spec: &EntitySpec,
    raw_id: &str,
    params: ConnParams,
    body: Map<String, Value>,
) -> Result<Json<Value>, AppError> {
    let start = Instant::now();
    let id = parse_id(spec, raw_id)?;
    let session = state.db.open(conn_name(&params, &body)).await?;
    let updated = records::update(&session, spec, id, &body).await?;
    tracing::info!("{} {} update on {}: {} rows", spec.label, id, session.name, updated);
    Ok(Json(json!({ "success": true, "data": updated, "timeMs": elapsed(start) })))
}

//! Single-record CRUD over the writable Chinook tables.
//!
//! Request bodies are JSON objects keyed by canonical field names (any casing).
//! Keys that do not name a writable field of the entity are ignored.

use serde_json::{Map, Value};

use crate::api::middleware::AppError;
use crate::models::{EntitySpec, SqlValue, CUSTOMER, INVOICE, INVOICE_LINE};
use crate::services::db_service::DbSession;
use crate::services::dialect::InsertIdStrategy;
use crate::services::normalizer::{pick_i64, project};
use crate::services::query_builder::{
    BuiltQuery, Condition, DeleteQuery, InsertQuery, SelectQuery, UpdateQuery,
};

/// Body key holding the line items of a new invoice.
pub const LINE_ITEMS_KEY: &str = "LineItems";

/// Parses a path id, rejecting anything that is not an integer.
pub fn parse_id(spec: &EntitySpec, raw: &str) -> Result<i64, AppError> {
    raw.trim()
        .parse()
        .map_err(|_| AppError::Validation(format!("Invalid {} id: {}", spec.label, raw)))
}

/// Writable values present in `body`, in the entity's field order.
///
/// Optional fields given as blank strings are stored as NULL. When `creating`,
/// every required field must be present and non-blank.
pub fn record_values(spec: &EntitySpec, body: &Map<String, Value>, creating: bool) -> Result<Vec<(&'static str, SqlValue)>, AppError> {
    let mut values: Vec<(&'static str, SqlValue)> = Vec::new();
    for field in spec.fields.iter().copied() {
        let Some(value) = body
            .iter()
            .find(|(key, _)| spec.field(key) == Some(field))
            .map(|(_, value)| value)
        else {
            continue;
        };
        let value = SqlValue::from_json(value).blank_to_null();
        if value.is_null() && spec.is_required(field) {
            return Err(AppError::Validation(format!("{} is required", field)));
        }
        values.push((field, value));
    }

    if creating {
        if let Some(missing) = spec
            .required
            .iter()
            .find(|field| !values.iter().any(|(present, _)| present == *field))
        {
            return Err(AppError::Validation(format!("{} is required", missing)));
        }
    }
    Ok(values)
}

/// One record with canonical keys, or `None`.
pub async fn fetch(session: &DbSession, spec: &EntitySpec, id: i64) -> Result<Option<Value>, AppError> {
    let d = session.dialect();
    let query = SelectQuery::from(d, spec.table, None).filter(Condition::eq(d.quote_column(spec.id_column), id));
    let rows = session.query_rows(&query.build()).await?;
    let columns = spec.columns();
    Ok(rows.first().map(|row| Value::Object(project(row, &columns))))
}

/// Inserts a record and returns its generated id when the backend reports one.
pub async fn create(session: &DbSession, spec: &EntitySpec, body: &Map<String, Value>) -> Result<Option<i64>, AppError> {
    let values = record_values(spec, body, true)?;
    insert_values(session, spec, values).await
}

async fn insert_values(session: &DbSession, spec: &EntitySpec, values: Vec<(&'static str, SqlValue)>) -> Result<Option<i64>, AppError> {
    let d = session.dialect();
    let mut insert = InsertQuery::into_table(d, spec.table);

    let mut assigned = None;
    if d.insert_id_strategy() == InsertIdStrategy::MaxPlusOne {
        let next = next_id(session, spec).await?;
        insert = insert.value(spec.id_column, next);
        assigned = Some(next);
    }
    for (column, value) in values {
        insert = insert.value(column, value);
    }
    let insert = insert.returning(spec.id_column);
    let built = insert.build();
    tracing::debug!("Insert into {}: {}", spec.table, built.sql);

    if insert.returns_rows() {
        let rows = session.query_rows(&built).await?;
        return Ok(rows.first().and_then(|row| pick_i64(row, spec.id_column)));
    }
    let result = session.execute(&built).await?;
    Ok(assigned.or_else(|| result.last_insert_id.map(|id| id as i64)))
}

/// `MAX(id) + 1` for backends without generated keys.
async fn next_id(session: &DbSession, spec: &EntitySpec) -> Result<i64, AppError> {
    let d = session.dialect();
    let query = SelectQuery::from(d, spec.table, None).column_as(
        format!("COALESCE(MAX({}), 0) + 1", d.quote_column(spec.id_column)),
        "next_id",
    );
    let rows = session.query_rows(&query.build()).await?;
    Ok(rows.first().and_then(|row| pick_i64(row, "next_id")).unwrap_or(1))
}

/// Updates the fields present in `body`; returns rows affected.
pub async fn update(session: &DbSession, spec: &EntitySpec, id: i64, body: &Map<String, Value>) -> Result<u64, AppError> {
    let d = session.dialect();
    let values = record_values(spec, body, false)?;
    let mut update = UpdateQuery::table(d, spec.table);
    for (column, value) in values {
        update = update.set(column, value);
    }
    if update.is_empty() {
        return Err(AppError::Validation(format!("No {} fields to update", spec.label)));
    }
    let update = update.filter(Condition::eq(d.quote_column(spec.id_column), id));
    Ok(session.execute(&update.build()).await?.rows_affected)
}

pub async fn delete(session: &DbSession, spec: &EntitySpec, id: i64) -> Result<u64, AppError> {
    let d = session.dialect();
    let query = DeleteQuery::from(d, spec.table).filter(Condition::eq(d.quote_column(spec.id_column), id));
    Ok(session.execute(&query.build()).await?.rows_affected)
}

/// `column IN (SELECT InvoiceId FROM Invoice WHERE CustomerId = id)`
fn customer_invoices(session: &DbSession, column: String, customer_id: i64) -> Condition {
    let d = session.dialect();
    Condition::InSelect {
        lhs: column,
        column: d.quote_column("InvoiceId"),
        table: d.quote_table(INVOICE.table),
        filter: Box::new(Condition::eq(d.quote_column("CustomerId"), customer_id)),
    }
}

/// Deletes a customer. With `cascade`, its invoices and their lines go too, in one
/// transaction; rows returned are the customers deleted.
pub async fn delete_customer(session: &DbSession, id: i64, cascade: bool) -> Result<u64, AppError> {
    if !cascade {
        return delete(session, &CUSTOMER, id).await;
    }
    let d = session.dialect();

    let system_log = DeleteQuery::from(d, "SystemLog")
        .filter(customer_invoices(session, d.quote_column("InvoiceId"), id))
        .build();
    if let Err(e) = session.execute(&system_log).await {
        tracing::warn!("SystemLog cleanup skipped for customer {}: {}", id, e);
    }

    let statements = [
        DeleteQuery::from(d, INVOICE_LINE.table)
            .filter(customer_invoices(session, d.quote_column("InvoiceId"), id))
            .build(),
        DeleteQuery::from(d, INVOICE.table)
            .filter(Condition::eq(d.quote_column("CustomerId"), id))
            .build(),
        DeleteQuery::from(d, CUSTOMER.table)
            .filter(Condition::eq(d.quote_column(CUSTOMER.id_column), id))
            .build(),
    ];
    let counts = session.transaction(&statements).await?;
    tracing::info!("Cascade delete of customer {}: rows affected {:?}", id, counts);
    Ok(counts.last().copied().unwrap_or(0))
}

/// Creates an invoice and, when `LineItems` is given, its lines.
///
/// Line insert failures are logged and do not undo the invoice. When the backend
/// reports no id, the customer's newest invoice is assumed to be the new one.
pub async fn create_invoice(session: &DbSession, body: &Map<String, Value>) -> Result<Option<i64>, AppError> {
    let values = record_values(&INVOICE, body, true)?;
    let customer_id = values
        .iter()
        .find(|(field, _)| *field == "CustomerId")
        .map(|(_, value)| value.clone());

    let mut invoice_id = insert_values(session, &INVOICE, values).await?;
    if invoice_id.is_none() {
        if let Some(customer_id) = customer_id {
            invoice_id = newest_invoice(session, customer_id).await.unwrap_or_else(|e| {
                tracing::warn!("Could not look up new invoice id: {}", e);
                None
            });
        }
    }

    let items = match body.get(LINE_ITEMS_KEY) {
        Some(Value::Array(items)) if !items.is_empty() => items,
        _ => return Ok(invoice_id),
    };
    let Some(id) = invoice_id else {
        tracing::warn!("Invoice created without a known id; {} line items skipped", items.len());
        return Ok(None);
    };
    match insert_lines(session, id, items).await {
        Ok(count) => tracing::info!("Created {} line items for invoice {}", count, id),
        Err(e) => tracing::error!("Failed to create line items for invoice {}: {}", id, e),
    }
    Ok(invoice_id)
}

async fn newest_invoice(session: &DbSession, customer_id: SqlValue) -> Result<Option<i64>, AppError> {
    let d = session.dialect();
    let query = SelectQuery::from(d, INVOICE.table, None)
        .column(d.quote_column(INVOICE.id_column))
        .filter(Condition::eq(d.quote_column("CustomerId"), customer_id))
        .order_by(d.quote_column(INVOICE.id_column), true)
        .paginate(1, 0);
    let rows = session.query_rows(&query.build()).await?;
    Ok(rows.first().and_then(|row| pick_i64(row, INVOICE.id_column)))
}

async fn insert_lines(session: &DbSession, invoice_id: i64, items: &[Value]) -> Result<usize, AppError> {
    let d = session.dialect();
    let mut next = match d.insert_id_strategy() {
        InsertIdStrategy::MaxPlusOne => Some(next_id(session, &INVOICE_LINE).await?),
        _ => None,
    };

    let mut statements: Vec<BuiltQuery> = Vec::with_capacity(items.len());
    for item in items {
        let mut line = item.as_object().cloned().unwrap_or_default();
        line.insert("InvoiceId".to_string(), Value::from(invoice_id));
        let values = record_values(&INVOICE_LINE, &line, true)?;

        let mut insert = InsertQuery::into_table(d, INVOICE_LINE.table);
        if let Some(id) = next.as_mut() {
            insert = insert.value(INVOICE_LINE.id_column, *id);
            *id += 1;
        }
        for (column, value) in values {
            insert = insert.value(column, value);
        }
        statements.push(insert.build());
    }
    session.transaction(&statements).await?;
    Ok(statements.len())
}

/// Deletes an invoice and its lines in one transaction; returns invoices deleted.
pub async fn delete_invoice(session: &DbSession, id: i64) -> Result<u64, AppError> {
    let d = session.dialect();
    let statements = [
        DeleteQuery::from(d, INVOICE_LINE.table)
            .filter(Condition::eq(d.quote_column("InvoiceId"), id))
            .build(),
        DeleteQuery::from(d, INVOICE.table)
            .filter(Condition::eq(d.quote_column(INVOICE.id_column), id))
            .build(),
    ];
    let counts = session.transaction(&statements).await?;
    Ok(counts.last().copied().unwrap_or(0))
}

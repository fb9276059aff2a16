use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};

use crate::api::handlers::connection::AppState;
use crate::api::middleware::AppError;
use crate::models::{ConnParams, ListParams, Page, TablePage, TrackPage};
use crate::services::catalog;

/// GET /api/invoices
pub async fn list_invoices(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Page>, AppError> {
    let session = state.db.open(params.conn.as_deref()).await?;
    Ok(Json(catalog::list_invoices(&session, &params).await?))
}

/// GET /api/artists
pub async fn list_artists(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Page>, AppError> {
    let session = state.db.open(params.conn.as_deref()).await?;
    Ok(Json(catalog::list_artists(&session, &params).await?))
}

/// GET /api/albums
pub async fn list_albums(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Page>, AppError> {
    let session = state.db.open(params.conn.as_deref()).await?;
    Ok(Json(catalog::list_albums(&session, &params).await?))
}

/// GET /api/customers: a bare array for the invoice form's customer picker
pub async fn search_customers(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Value>>, AppError> {
    let session = state.db.open(params.conn.as_deref()).await?;
    Ok(Json(catalog::search_customers(&session, &params).await?))
}

/// GET /api/tracks
pub async fn list_tracks(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<TrackPage>, AppError> {
    let session = state.db.open(params.conn.as_deref()).await?;
    Ok(Json(catalog::list_tracks(&session, &params).await?))
}

/// GET /api/table/{table}
pub async fn browse_table(
    State(state): State<AppState>,
    Path(table): Path<String>,
    Query(params): Query<ListParams>,
) -> Result<Json<TablePage>, AppError> {
    let session = state.db.open(params.conn.as_deref()).await?;
    Ok(Json(catalog::browse_table(&session, &table, &params).await?))
}

/// GET /api/tables
pub async fn list_tables(
    State(state): State<AppState>,
    Query(params): Query<ConnParams>,
) -> Result<Json<Value>, AppError> {
    let session = state.db.open(params.name()).await?;
    let tables = catalog::list_tables(&session).await?;
    Ok(Json(json!({ "tables": tables })))
}

/// GET /api/offers
pub async fn list_offers(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Response, AppError> {
    let session = state.db.open(params.conn.as_deref()).await?;
    match catalog::list_offers(&session, &params).await? {
        Some(page) => Ok(Json(page).into_response()),
        None => Ok((
            StatusCode::NOT_FOUND,
            Json(json!({
                "success": false,
                "error": "Offers table not found",
                "message": "The Offers table does not exist in the current database. Please create it using the provided demo scripts.",
                "tableExists": false,
            })),
        )
            .into_response()),
    }
}

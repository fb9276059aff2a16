use axum::{
    extract::{Query, State},
    Json,
};

use crate::api::handlers::connection::AppState;
use crate::api::middleware::AppError;
use crate::models::{ConnParams, QueryRequest, QueryResponse};

/// Execute raw SQL from the query console.
///
/// The connection comes from `?conn=` or, failing that, the request body.
pub async fn execute_query(
    State(state): State<AppState>,
    Query(params): Query<ConnParams>,
    Json(payload): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, AppError> {
    let conn = params.name().or(payload.conn.as_deref());
    let session = state.db.open(conn).await?;
    tracing::info!("Executing SQL query for connection: {}", session.name);

    let response = state.query_service.execute(&session, &payload.sql).await?;
    Ok(Json(response))
}

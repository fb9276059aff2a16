use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use std::sync::Arc;

use crate::api::middleware::AppError;
use crate::config::Config;
use crate::models::{ConnectionOverride, TestConnectionByNameRequest, UpdateConnectionRequest};
use crate::services::{ConnectionPoolManager, ConnectionRegistry, DbService, QueryService};

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub registry: Arc<ConnectionRegistry>,
    pub pool_manager: Arc<ConnectionPoolManager>,
    pub db: Arc<DbService>,
    pub query_service: Arc<QueryService>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(config: Config, registry: Arc<ConnectionRegistry>, pool_manager: Arc<ConnectionPoolManager>) -> Self {
        let db = Arc::new(DbService::new(Arc::clone(&registry), Arc::clone(&pool_manager)));
        let query_service = Arc::new(QueryService::new(config.query.read_only));
        Self {
            config,
            registry,
            pool_manager,
            db,
            query_service,
            started_at: Utc::now(),
        }
    }
}

async fn connection_summaries(registry: &ConnectionRegistry) -> Map<String, Value> {
    registry
        .list()
        .await
        .into_iter()
        .map(|(name, profile)| {
            let summary = serde_json::to_value(profile.summary(&name)).unwrap_or(Value::Null);
            (name, summary)
        })
        .collect()
}

/// List all connections, passwords withheld
pub async fn list_connections(State(state): State<AppState>) -> Json<Value> {
    let connections = connection_summaries(&state.registry).await;
    Json(json!({
        "connections": connections,
        "default": state.registry.default_name().await,
    }))
}

/// Re-read the connections file and drop every cached pool
pub async fn reload_connections(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let count = state.registry.reload().await?;
    let dropped = state.pool_manager.clear().await;
    tracing::info!("Reloaded {} connections, dropped {} cached pools", count, dropped);

    Ok(Json(json!({
        "success": true,
        "connections": connection_summaries(&state.registry).await,
    })))
}

/// Apply a session override to a named connection
pub async fn update_connection(
    State(state): State<AppState>,
    Json(payload): Json<UpdateConnectionRequest>,
) -> Json<Value> {
    let name = payload.name;
    match state.registry.apply_override(&name, payload.config).await {
        Ok(profile) => {
            if state.pool_manager.invalidate(&name).await {
                tracing::info!("Cleared cached pool for connection '{}'", name);
            }
            tracing::info!("Connection '{}' now points at {}", name, profile.describe());
            Json(json!({
                "success": true,
                "message": "Connection updated temporarily for this session",
            }))
        }
        Err(e) => {
            tracing::error!("Connection update failed: {}", e);
            Json(json!({ "success": false, "error": e.message() }))
        }
    }
}

/// Test an unsaved connection configuration
pub async fn test_connection(
    State(state): State<AppState>,
    Json(payload): Json<ConnectionOverride>,
) -> Json<Value> {
    let result = match payload.into_profile() {
        Ok(profile) => state.db.test_profile(&profile).await,
        Err(e) => Err(e),
    };
    test_outcome(result, "ad-hoc")
}

/// Test a stored connection, including any session override
pub async fn test_connection_by_name(
    State(state): State<AppState>,
    Json(payload): Json<TestConnectionByNameRequest>,
) -> Json<Value> {
    let name = payload.connection_name.trim();
    if name.is_empty() {
        return Json(json!({ "success": false, "error": "Connection name is required" }));
    }
    let Some(profile) = state.registry.get(name).await else {
        return Json(json!({
            "success": false,
            "error": format!("Connection \"{}\" not found", name),
        }));
    };
    test_outcome(state.db.test_profile(&profile).await, name)
}

fn test_outcome(result: Result<(), AppError>, name: &str) -> Json<Value> {
    match result {
        Ok(()) => {
            tracing::info!("Connection test successful for {}", name);
            Json(json!({ "success": true, "message": "Connection successful" }))
        }
        Err(e) => {
            tracing::warn!("Connection test failed for {}: {}", name, e);
            Json(json!({ "success": false, "error": e.message() }))
        }
    }
}

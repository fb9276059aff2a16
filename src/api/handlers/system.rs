use axum::{extract::State, Json};
use serde::Serialize;
use serde_json::Value;

use crate::api::handlers::connection::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStatus {
    pub success: bool,
    pub startup_time: String,
    /// Seconds since startup
    pub uptime: i64,
    pub version: &'static str,
    pub connections: usize,
    pub active_pools: Vec<String>,
    pub default_connection: String,
    pub read_only_queries: bool,
    pub features: Value,
}

/// GET /api/system/status, polled by the frontend
pub async fn system_status(State(state): State<AppState>) -> Json<SystemStatus> {
    let now = chrono::Utc::now();
    Json(SystemStatus {
        success: true,
        startup_time: state.started_at.to_rfc3339(),
        uptime: (now - state.started_at).num_seconds(),
        version: env!("CARGO_PKG_VERSION"),
        connections: state.registry.len().await,
        active_pools: state.pool_manager.pool_names().await,
        default_connection: state.registry.default_name().await,
        read_only_queries: state.config.query.read_only,
        features: serde_json::json!({
            "oracle": cfg!(feature = "oracle"),
            "slowQueryDemo": state.config.demo.slow_queries,
        }),
    })
}

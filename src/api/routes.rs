use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::path::Path;
use tower_http::{
    cors::CorsLayer,
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};

use crate::api::handlers::connection::{self, AppState};
use crate::api::handlers::{catalog, query, records, report, system};
use crate::api::middleware::log_requests;

/// Create router with application state
pub fn create_router(state: AppState) -> Router {
    let static_dir = Path::new(&state.config.server.static_dir).to_path_buf();
    let frontend = ServeDir::new(&static_dir).fallback(ServeFile::new(static_dir.join("index.html")));

    Router::new()
        .route("/health", get(health_check))
        // connections
        .route("/api/connections", get(connection::list_connections))
        .route("/api/connections/reload", post(connection::reload_connections))
        .route("/api/update-connection", post(connection::update_connection))
        .route("/api/test-connection", post(connection::test_connection))
        .route(
            "/api/test-connection-by-name",
            post(connection::test_connection_by_name),
        )
        // listings
        .route("/api/invoices", get(catalog::list_invoices))
        .route("/api/artists", get(catalog::list_artists))
        .route("/api/albums", get(catalog::list_albums))
        .route(
            "/api/customers",
            get(catalog::search_customers).post(records::create_customer),
        )
        .route("/api/tracks", get(catalog::list_tracks))
        .route("/api/table/{table}", get(catalog::browse_table))
        .route("/api/tables", get(catalog::list_tables))
        .route("/api/offers", get(catalog::list_offers))
        // reports
        .route(
            "/api/report/invoice/{invoice_id}",
            get(report::get_invoice_report),
        )
        .route("/api/dashboard/customers", get(report::customer_count))
        .route("/api/dashboard/recent-sales", get(report::recent_sales))
        .route("/api/dashboard/top-tracks", get(report::track_count))
        .route("/api/dashboard/revenue", get(report::revenue))
        .route(
            "/api/dashboard/recent-customers",
            get(report::recent_customers),
        )
        .route("/api/query", post(query::execute_query))
        // records
        .route(
            "/api/customers/{id}",
            get(records::get_customer)
                .put(records::update_customer)
                .delete(records::delete_customer),
        )
        .route("/api/invoice", post(records::create_invoice))
        .route(
            "/api/invoice/{id}",
            get(records::get_invoice)
                .put(records::update_invoice)
                .delete(records::delete_invoice),
        )
        .route("/api/employee", post(records::create_employee))
        .route(
            "/api/employee/{id}",
            get(records::get_employee)
                .put(records::update_employee)
                .delete(records::delete_employee),
        )
        .route("/api/system/status", get(system::system_status))
        .fallback_service(frontend)
        .layer(middleware::from_fn(log_requests))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}

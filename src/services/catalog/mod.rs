//! Read-only resource listings over the Chinook tables.
//!
//! Every listing builds one [`SelectQuery`](crate::services::query_builder::SelectQuery),
//! derives the page query and its COUNT companion from it, and runs both concurrently.

pub mod albums;
pub mod artists;
pub mod customers;
pub mod invoices;
pub mod offers;
pub mod search;
pub mod table_browser;
pub mod tracks;

pub use albums::list_albums;
pub use artists::list_artists;
pub use customers::search_customers;
pub use invoices::list_invoices;
pub use offers::{list_offers, OffersPage};
pub use search::{search_condition, SearchField, SearchTerm};
pub use table_browser::{browse_table, discover_columns, list_tables};
pub use tracks::list_tracks;

use serde_json::Value;
use std::time::Instant;

use crate::api::middleware::AppError;
use crate::services::db_service::DbSession;
use crate::services::query_builder::BuiltQuery;

/// Fetched page rows (canonical keys), the total row count, and elapsed milliseconds.
pub struct Fetched {
    pub rows: Vec<Value>,
    pub total: i64,
    pub time_ms: u64,
}

/// Runs the page query and the count query concurrently.
pub async fn fetch_page(session: &DbSession, data: &BuiltQuery, count: &BuiltQuery) -> Result<Fetched, AppError> {
    let started = Instant::now();
    let (rows, total) = futures::try_join!(session.query_rows(data), session.count(count))?;
    Ok(Fetched {
        rows,
        total,
        time_ms: started.elapsed().as_millis() as u64,
    })
}

#[cfg(test)]
pub(crate) mod testing {
    use serde_json::{json, Value};
    use std::sync::Arc;

    use crate::api::middleware::AppError;
    use crate::models::ClientKind;
    use crate::services::database::testing::RecordingAdapter;
    use crate::services::db_service::{testing::session, DbSession};
    use crate::services::query_builder::BuiltQuery;

    /// Recording session answering counts with `total` and other queries with `rows`.
    pub fn scripted(client: ClientKind, total: i64, rows: Vec<Value>) -> (DbSession, Arc<RecordingAdapter>) {
        let adapter = Arc::new(RecordingAdapter::with_responder(client, move |query: &BuiltQuery| {
            if query.sql.starts_with("SELECT COUNT(*)") {
                Ok::<_, AppError>(vec![json!({ "total": total })])
            } else {
                Ok(rows.clone())
            }
        }));
        (session(client, Arc::clone(&adapter)), adapter)
    }

    pub const ALL_CLIENTS: [ClientKind; 4] = [
        ClientKind::MsSql,
        ClientKind::Postgres,
        ClientKind::MySql,
        ClientKind::Oracle,
    ];
}

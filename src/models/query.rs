use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Upper bound for any page size requested by the client.
pub const MAX_PAGE_SIZE: u64 = 1000;

/// A raw SQL statement submitted through the query console.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    pub id: String,
    pub connection_name: String,
    pub query_text: String,
    pub status: QueryStatus,
    pub row_count: Option<usize>,
    pub execution_time_ms: Option<u64>,
    pub error_message: Option<String>,
    pub executed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum QueryStatus {
    Pending,
    Executing,
    Completed,
    Failed,
}

impl Query {
    pub fn new(connection_name: String, query_text: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            connection_name,
            query_text,
            status: QueryStatus::Pending,
            row_count: None,
            execution_time_ms: None,
            error_message: None,
            executed_at: None,
        }
    }

    pub fn mark_executing(&mut self) {
        self.status = QueryStatus::Executing;
    }

    pub fn mark_completed(&mut self, row_count: usize, execution_time_ms: u64) {
        self.status = QueryStatus::Completed;
        self.row_count = Some(row_count);
        self.execution_time_ms = Some(execution_time_ms);
        self.executed_at = Some(Utc::now());
    }

    pub fn mark_failed(&mut self, error_message: String) {
        self.status = QueryStatus::Failed;
        self.error_message = Some(error_message);
        self.executed_at = Some(Utc::now());
    }
}

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub sql: String,
    #[serde(default)]
    pub conn: Option<String>,
}

/// Query-string parameters shared by the list endpoints.
///
/// Numbers arrive as strings and are parsed leniently: anything that is not a
/// positive integer falls back to the endpoint default.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    pub conn: Option<String>,
    pub search: Option<String>,
    pub search_column: Option<String>,
    pub exact_match: Option<String>,
    pub limit: Option<String>,
    pub offset: Option<String>,
    pub album_id: Option<String>,
}

impl ListParams {
    pub fn limit(&self, default: u64) -> u64 {
        self.limit
            .as_deref()
            .and_then(|l| l.trim().parse::<u64>().ok())
            .filter(|l| *l > 0)
            .unwrap_or(default)
            .min(MAX_PAGE_SIZE)
    }

    pub fn offset(&self) -> u64 {
        self.offset
            .as_deref()
            .and_then(|o| o.trim().parse::<u64>().ok())
            .unwrap_or(0)
            .min(i64::MAX as u64)
    }

    pub fn exact_match(&self) -> bool {
        self.exact_match.as_deref() == Some("1")
    }

    /// Search term, if present and non-blank.
    pub fn search(&self) -> Option<&str> {
        self.search.as_deref().filter(|s| !s.trim().is_empty())
    }

    pub fn search_column(&self) -> Option<&str> {
        self.search_column.as_deref().filter(|s| !s.is_empty())
    }

    pub fn album_id(&self) -> Option<i64> {
        self.album_id.as_deref().and_then(|a| a.trim().parse().ok())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConnParams {
    pub conn: Option<String>,
    pub connection: Option<String>,
}

impl ConnParams {
    pub fn name(&self) -> Option<&str> {
        self.conn.as_deref().or(self.connection.as_deref())
    }
}

/// Standard page envelope: `{rows, rowCount, totalRows, timeMs}`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub rows: Vec<serde_json::Value>,
    pub row_count: usize,
    pub total_rows: i64,
    pub time_ms: u64,
}

impl Page {
    pub fn new(rows: Vec<serde_json::Value>, total_rows: i64, time_ms: u64) -> Self {
        Self {
            row_count: rows.len(),
            rows,
            total_rows,
            time_ms,
        }
    }
}

/// Generic table browse adds the discovered column names.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TablePage {
    pub rows: Vec<serde_json::Value>,
    pub columns: Vec<String>,
    pub row_count: usize,
    pub total_rows: i64,
    pub time_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrackPage {
    pub tracks: Vec<serde_json::Value>,
    pub total: i64,
    pub limit: u64,
    pub offset: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    pub query_id: String,
    pub rows: Vec<serde_json::Value>,
    pub row_count: usize,
    pub time_ms: u64,
    pub statement_kind: String,
}

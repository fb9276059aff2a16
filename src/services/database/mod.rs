// Database abstraction layer: one pooled adapter per configured connection
pub mod adapter;
pub mod mssql;
pub mod mysql;
#[cfg(feature = "oracle")]
pub mod oracle;
pub mod pg_types;
pub mod postgresql;

pub use adapter::{DatabaseAdapter, ExecuteResult, QueryResult};
pub use mssql::MsSqlAdapter;
pub use mysql::MySQLAdapter;
pub use postgresql::PostgreSQLAdapter;

use std::sync::Arc;
use std::time::Duration;

use crate::api::middleware::AppError;
use crate::models::{ClientKind, ConnectionProfile};

/// Pool sizing and statement timeout applied to every adapter.
#[derive(Debug, Clone, Copy)]
pub struct AdapterSettings {
    pub max_pool_size: usize,
    pub timeout: Duration,
}

impl Default for AdapterSettings {
    fn default() -> Self {
        Self {
            max_pool_size: 16,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Factory function to create the adapter for a profile's client.
/// Pools connect lazily, so this does not touch the network.
pub async fn create_adapter(
    profile: &ConnectionProfile,
    settings: AdapterSettings,
) -> Result<Arc<dyn DatabaseAdapter>, AppError> {
    let AdapterSettings {
        max_pool_size,
        timeout,
    } = settings;
    match profile.client {
        ClientKind::Postgres => Ok(Arc::new(PostgreSQLAdapter::new(
            profile,
            max_pool_size,
            timeout,
        )?)),
        ClientKind::MySql => Ok(Arc::new(MySQLAdapter::new(profile, max_pool_size, timeout))),
        ClientKind::MsSql => Ok(Arc::new(MsSqlAdapter::new(profile, max_pool_size, timeout)?)),
        ClientKind::Oracle => create_oracle_adapter(profile, settings),
    }
}

#[cfg(feature = "oracle")]
fn create_oracle_adapter(
    profile: &ConnectionProfile,
    settings: AdapterSettings,
) -> Result<Arc<dyn DatabaseAdapter>, AppError> {
    Ok(Arc::new(self::oracle::OracleAdapter::new(
        profile,
        settings.max_pool_size,
        settings.timeout,
    )?))
}

#[cfg(not(feature = "oracle"))]
fn create_oracle_adapter(
    _profile: &ConnectionProfile,
    _settings: AdapterSettings,
) -> Result<Arc<dyn DatabaseAdapter>, AppError> {
    Err(AppError::NotImplemented(
        "Oracle support is not compiled in; rebuild with --features oracle".to_string(),
    ))
}

/// In-memory adapter that records every statement it receives.
#[cfg(test)]
pub mod testing {
    use serde_json::{json, Value};
    use std::sync::Mutex;
    use std::time::Instant;

    use super::{DatabaseAdapter, ExecuteResult, QueryResult};
    use crate::api::middleware::AppError;
    use crate::models::ClientKind;
    use crate::services::query_builder::BuiltQuery;

    type Responder = Box<dyn Fn(&BuiltQuery) -> Result<Vec<Value>, AppError> + Send + Sync>;

    pub struct RecordingAdapter {
        client: ClientKind,
        responder: Responder,
        statements: Mutex<Vec<BuiltQuery>>,
        pub last_insert_id: Option<u64>,
    }

    impl RecordingAdapter {
        /// Answers counts with zero and everything else with no rows.
        pub fn new(client: ClientKind) -> Self {
            Self::with_responder(client, |query| {
                if query.sql.contains("COUNT(*)") {
                    Ok(vec![json!({ "total": 0 })])
                } else {
                    Ok(Vec::new())
                }
            })
        }

        pub fn with_responder<F>(client: ClientKind, responder: F) -> Self
        where
            F: Fn(&BuiltQuery) -> Result<Vec<Value>, AppError> + Send + Sync + 'static,
        {
            Self {
                client,
                responder: Box::new(responder),
                statements: Mutex::new(Vec::new()),
                last_insert_id: None,
            }
        }

        pub fn recorded(&self) -> Vec<BuiltQuery> {
            self.statements.lock().unwrap().clone()
        }

        pub fn sql(&self) -> Vec<String> {
            self.recorded().into_iter().map(|q| q.sql).collect()
        }

        fn respond(&self, query: BuiltQuery) -> Result<Vec<Value>, AppError> {
            let rows = (self.responder)(&query);
            self.statements.lock().unwrap().push(query);
            rows
        }
    }

    #[async_trait::async_trait]
    impl DatabaseAdapter for RecordingAdapter {
        fn client(&self) -> ClientKind {
            self.client
        }

        async fn query(&self, query: &BuiltQuery) -> Result<QueryResult, AppError> {
            let rows = self.respond(query.clone())?;
            Ok(QueryResult::new(Vec::new(), rows, Instant::now()))
        }

        async fn execute(&self, query: &BuiltQuery) -> Result<ExecuteResult, AppError> {
            self.respond(query.clone())?;
            Ok(ExecuteResult {
                rows_affected: 1,
                last_insert_id: self.last_insert_id,
            })
        }

        async fn execute_transaction(&self, statements: &[BuiltQuery]) -> Result<Vec<u64>, AppError> {
            let mut counts = Vec::with_capacity(statements.len());
            for statement in statements {
                self.respond(statement.clone())?;
                counts.push(1);
            }
            Ok(counts)
        }

        async fn execute_raw(&self, sql: &str) -> Result<QueryResult, AppError> {
            let rows = self.respond(BuiltQuery::raw(sql))?;
            Ok(QueryResult::new(Vec::new(), rows, Instant::now()))
        }

        async fn test_connection(&self) -> Result<(), AppError> {
            Ok(())
        }
    }
}

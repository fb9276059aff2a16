// PostgreSQL adapter using deadpool-postgres connection pooling
use deadpool_postgres::{Config as PgPoolConfig, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use std::time::{Duration, Instant};
use tokio_postgres::types::ToSql;
use tokio_postgres::NoTls;

use crate::api::middleware::AppError;
use crate::models::{ClientKind, ConnectionProfile};
use crate::services::database::adapter::{
    sql_preview, with_timeout, DatabaseAdapter, ExecuteResult, QueryResult,
};
use crate::services::database::pg_types::row_to_json;
use crate::services::query_builder::BuiltQuery;

pub struct PostgreSQLAdapter {
    pool: Pool,
    timeout: Duration,
}

impl PostgreSQLAdapter {
    pub fn new(profile: &ConnectionProfile, max_pool_size: usize, timeout: Duration) -> Result<Self, AppError> {
        let mut cfg = PgPoolConfig::new();
        cfg.host = Some(profile.host().to_string());
        cfg.port = profile.effective_port();
        cfg.dbname = Some(profile.database().to_string());
        cfg.user = Some(profile.user().to_string());
        cfg.password = Some(profile.password().to_string());
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });
        cfg.pool = Some(PoolConfig::new(max_pool_size));

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| {
                tracing::error!("Failed to create PostgreSQL pool: {}", e);
                AppError::Connection(format!("Failed to create connection pool: {}", e))
            })?;

        Ok(Self { pool, timeout })
    }

    async fn connection(&self) -> Result<deadpool_postgres::Client, AppError> {
        self.pool
            .get()
            .await
            .map_err(|e| AppError::Connection(format!("Failed to get connection from pool: {}", e)))
    }

    fn params(query: &BuiltQuery) -> Vec<&(dyn ToSql + Sync)> {
        query
            .params
            .iter()
            .map(|p| p as &(dyn ToSql + Sync))
            .collect()
    }
}

fn map_pg_error(e: tokio_postgres::Error) -> AppError {
    let details = if let Some(db_error) = e.as_db_error() {
        format!("{} (code {})", db_error.message(), db_error.code().code())
    } else {
        e.to_string()
    };
    AppError::Database(details)
}

#[async_trait::async_trait]
impl DatabaseAdapter for PostgreSQLAdapter {
    fn client(&self) -> ClientKind {
        ClientKind::Postgres
    }

    async fn query(&self, query: &BuiltQuery) -> Result<QueryResult, AppError> {
        tracing::debug!("pg query: {}", sql_preview(&query.sql));
        with_timeout(self.timeout, async {
            let client = self.connection().await?;
            let started = Instant::now();
            let rows = client
                .query(query.sql.as_str(), &Self::params(query))
                .await
                .map_err(map_pg_error)?;

            let columns = rows
                .first()
                .map(|row| row.columns().iter().map(|c| c.name().to_string()).collect())
                .unwrap_or_default();
            let rows = rows.iter().map(row_to_json).collect();
            Ok(QueryResult::new(columns, rows, started))
        })
        .await
    }

    async fn execute(&self, query: &BuiltQuery) -> Result<ExecuteResult, AppError> {
        tracing::debug!("pg execute: {}", sql_preview(&query.sql));
        with_timeout(self.timeout, async {
            let client = self.connection().await?;
            let rows_affected = client
                .execute(query.sql.as_str(), &Self::params(query))
                .await
                .map_err(map_pg_error)?;
            Ok(ExecuteResult {
                rows_affected,
                last_insert_id: None,
            })
        })
        .await
    }

    async fn execute_transaction(&self, statements: &[BuiltQuery]) -> Result<Vec<u64>, AppError> {
        with_timeout(self.timeout, async {
            let mut client = self.connection().await?;
            let tx = client.transaction().await.map_err(map_pg_error)?;
            let mut counts = Vec::with_capacity(statements.len());
            for statement in statements {
                tracing::debug!("pg tx: {}", sql_preview(&statement.sql));
                let count = tx
                    .execute(statement.sql.as_str(), &Self::params(statement))
                    .await
                    .map_err(map_pg_error)?;
                counts.push(count);
            }
            tx.commit().await.map_err(map_pg_error)?;
            Ok(counts)
        })
        .await
    }

    async fn execute_raw(&self, sql: &str) -> Result<QueryResult, AppError> {
        with_timeout(self.timeout, async {
            let client = self.connection().await?;
            let started = Instant::now();
            let rows = client.query(sql, &[]).await.map_err(map_pg_error)?;
            let columns = rows
                .first()
                .map(|row| row.columns().iter().map(|c| c.name().to_string()).collect())
                .unwrap_or_default();
            let rows = rows.iter().map(row_to_json).collect();
            Ok(QueryResult::new(columns, rows, started))
        })
        .await
    }

    async fn test_connection(&self) -> Result<(), AppError> {
        with_timeout(self.timeout, async {
            let client = self.connection().await?;
            client.query_one("SELECT 1", &[]).await.map_err(map_pg_error)?;
            Ok(())
        })
        .await
    }
}

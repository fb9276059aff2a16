// Oracle adapter. The driver is blocking, so every call runs on the blocking pool.
use chrono::NaiveDateTime;
use ::oracle::pool::{Pool, PoolBuilder};
use ::oracle::sql_type::{OracleType, ToSql};
use ::oracle::{Connection, ResultSet, Row};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::api::middleware::AppError;
use crate::models::{ClientKind, ConnectionProfile, SqlValue};
use crate::services::database::adapter::{
    datetime_json, float_json, sql_preview, with_timeout, DatabaseAdapter, ExecuteResult,
    QueryResult,
};
use crate::services::query_builder::BuiltQuery;

pub struct OracleAdapter {
    pool: Arc<Pool>,
    timeout: Duration,
}

impl OracleAdapter {
    pub fn new(profile: &ConnectionProfile, max_pool_size: usize, timeout: Duration) -> Result<Self, AppError> {
        let mut builder = PoolBuilder::new(
            profile.user(),
            profile.password(),
            profile.oracle_connect_string(),
        );
        builder.max_connections(max_pool_size.max(1) as u32);
        let pool = builder.build().map_err(|e| {
            tracing::error!("Failed to create Oracle pool: {}", e);
            AppError::Connection(format!("Failed to create connection pool: {}", e))
        })?;
        Ok(Self {
            pool: Arc::new(pool),
            timeout,
        })
    }

    /// Runs `work` with a pooled connection on the blocking thread pool.
    async fn run<T, F>(&self, work: F) -> Result<T, AppError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, AppError> + Send + 'static,
    {
        let pool = Arc::clone(&self.pool);
        with_timeout(self.timeout, async move {
            tokio::task::spawn_blocking(move || {
                let conn = pool.get().map_err(|e| {
                    AppError::Connection(format!("Failed to get Oracle connection: {}", e))
                })?;
                work(&conn)
            })
            .await?
        })
        .await
    }
}

fn map_oracle_error(e: ::oracle::Error) -> AppError {
    AppError::Database(e.to_string())
}

fn to_oracle_params(params: &[SqlValue]) -> Vec<Box<dyn ToSql>> {
    params
        .iter()
        .map(|p| -> Box<dyn ToSql> {
            match p {
                SqlValue::Null => Box::new(Option::<String>::None),
                SqlValue::Bool(b) => Box::new(i64::from(*b)),
                SqlValue::Int(i) => Box::new(*i),
                SqlValue::Float(f) => Box::new(*f),
                SqlValue::Text(s) => Box::new(s.clone()),
            }
        })
        .collect()
}

fn oracle_value_to_json(value: &::oracle::SqlValue, oracle_type: &OracleType) -> Value {
    if value.is_null().unwrap_or(true) {
        return Value::Null;
    }
    match oracle_type {
        OracleType::Number(_, 0) | OracleType::Int64 | OracleType::UInt64 => value
            .get::<i64>()
            .map(|i| json!(i))
            .unwrap_or(Value::Null),
        OracleType::Number(..)
        | OracleType::Float(_)
        | OracleType::BinaryFloat
        | OracleType::BinaryDouble => value.get::<f64>().map(float_json).unwrap_or(Value::Null),
        OracleType::Date
        | OracleType::Timestamp(_)
        | OracleType::TimestampTZ(_)
        | OracleType::TimestampLTZ(_) => value
            .get::<NaiveDateTime>()
            .map(datetime_json)
            .unwrap_or(Value::Null),
        _ => value.get::<String>().map(Value::String).unwrap_or(Value::Null),
    }
}

fn collect_rows(rows: ResultSet<'_, Row>, started: Instant) -> Result<QueryResult, AppError> {
    let info: Vec<(String, OracleType)> = rows
        .column_info()
        .iter()
        .map(|c| (c.name().to_string(), c.oracle_type().clone()))
        .collect();
    let mut out = Vec::new();
    for row in rows {
        let row = row.map_err(map_oracle_error)?;
        let mut object = Map::new();
        for ((name, oracle_type), value) in info.iter().zip(row.sql_values()) {
            object.insert(name.clone(), oracle_value_to_json(value, oracle_type));
        }
        out.push(Value::Object(object));
    }
    let columns = info.into_iter().map(|(name, _)| name).collect();
    Ok(QueryResult::new(columns, out, started))
}

fn execute_statement(conn: &Connection, statement: &BuiltQuery) -> Result<u64, AppError> {
    let params = to_oracle_params(&statement.params);
    let refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let stmt = conn
        .execute(&statement.sql, &refs)
        .map_err(map_oracle_error)?;
    stmt.row_count().map_err(map_oracle_error)
}

#[async_trait::async_trait]
impl DatabaseAdapter for OracleAdapter {
    fn client(&self) -> ClientKind {
        ClientKind::Oracle
    }

    async fn query(&self, query: &BuiltQuery) -> Result<QueryResult, AppError> {
        tracing::debug!("oracle query: {}", sql_preview(&query.sql));
        let query = query.clone();
        self.run(move |conn| {
            let started = Instant::now();
            let params = to_oracle_params(&query.params);
            let refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
            let rows = conn.query(&query.sql, &refs).map_err(map_oracle_error)?;
            collect_rows(rows, started)
        })
        .await
    }

    async fn execute(&self, query: &BuiltQuery) -> Result<ExecuteResult, AppError> {
        tracing::debug!("oracle execute: {}", sql_preview(&query.sql));
        let query = query.clone();
        self.run(move |conn| {
            let rows_affected = execute_statement(conn, &query)?;
            conn.commit().map_err(map_oracle_error)?;
            Ok(ExecuteResult {
                rows_affected,
                last_insert_id: None,
            })
        })
        .await
    }

    async fn execute_transaction(&self, statements: &[BuiltQuery]) -> Result<Vec<u64>, AppError> {
        let statements = statements.to_vec();
        self.run(move |conn| {
            let mut counts = Vec::with_capacity(statements.len());
            for statement in &statements {
                tracing::debug!("oracle tx: {}", sql_preview(&statement.sql));
                match execute_statement(conn, statement) {
                    Ok(count) => counts.push(count),
                    Err(e) => {
                        if let Err(rollback) = conn.rollback() {
                            tracing::warn!("Rollback failed: {}", rollback);
                        }
                        return Err(e);
                    }
                }
            }
            conn.commit().map_err(map_oracle_error)?;
            Ok(counts)
        })
        .await
    }

    async fn execute_raw(&self, sql: &str) -> Result<QueryResult, AppError> {
        let sql = sql.to_string();
        self.run(move |conn| {
            let started = Instant::now();
            let mut stmt = conn.statement(&sql).build().map_err(map_oracle_error)?;
            if stmt.is_query() {
                let rows = stmt.query(&[]).map_err(map_oracle_error)?;
                collect_rows(rows, started)
            } else {
                stmt.execute(&[]).map_err(map_oracle_error)?;
                conn.commit().map_err(map_oracle_error)?;
                Ok(QueryResult::new(Vec::new(), Vec::new(), started))
            }
        })
        .await
    }

    async fn test_connection(&self) -> Result<(), AppError> {
        self.run(|conn| conn.ping().map_err(map_oracle_error)).await
    }
}

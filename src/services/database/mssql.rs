// SQL Server adapter: tiberius clients pooled through deadpool's managed pool
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use deadpool::managed::{Manager, Metrics, Object, Pool, RecycleError, RecycleResult};
use serde_json::{json, Map, Value};
use std::borrow::Cow;
use std::time::{Duration, Instant};
use tiberius::{
    AuthMethod, Client, ColumnData, Config as TdsConfig, EncryptionLevel, FromSql, Row, SqlBrowser,
    ToSql,
};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

use crate::api::middleware::AppError;
use crate::models::{ClientKind, ConnectionProfile, SqlValue};
use crate::services::database::adapter::{
    date_json, datetime_json, float_json, sql_preview, with_timeout, DatabaseAdapter,
    ExecuteResult, QueryResult,
};
use crate::services::query_builder::BuiltQuery;

type TdsClient = Client<Compat<TcpStream>>;

impl ToSql for SqlValue {
    fn to_sql(&self) -> ColumnData<'_> {
        match self {
            SqlValue::Null => ColumnData::String(None),
            SqlValue::Bool(b) => ColumnData::Bit(Some(*b)),
            SqlValue::Int(i) => ColumnData::I64(Some(*i)),
            SqlValue::Float(f) => ColumnData::F64(Some(*f)),
            SqlValue::Text(s) => ColumnData::String(Some(Cow::Borrowed(s.as_str()))),
        }
    }
}

/// Opens TDS connections, resolving named instances through SQL Browser.
pub struct TiberiusManager {
    config: TdsConfig,
    named_instance: bool,
}

impl TiberiusManager {
    pub fn new(profile: &ConnectionProfile) -> Self {
        let mut config = TdsConfig::new();
        config.host(profile.host());
        if let Some(port) = profile.effective_port() {
            config.port(port);
        }
        if let Some(instance) = profile.instance_name() {
            config.instance_name(instance);
        }
        if !profile.database().is_empty() {
            config.database(profile.database());
        }
        config.authentication(AuthMethod::sql_server(profile.user(), profile.password()));
        if profile.trust_server_certificate {
            config.trust_cert();
        }
        config.encryption(if profile.encrypt {
            EncryptionLevel::Required
        } else {
            EncryptionLevel::Off
        });

        Self {
            config,
            named_instance: profile.instance_name().is_some(),
        }
    }
}

/// Run before a pooled client is reused. A request dropped between BEGIN and
/// COMMIT leaves its transaction open on the connection.
const RECYCLE_SQL: &str = "IF @@TRANCOUNT > 0 ROLLBACK TRANSACTION; SELECT 1";

impl Manager for TiberiusManager {
    type Type = TdsClient;
    type Error = tiberius::error::Error;

    async fn create(&self) -> Result<TdsClient, tiberius::error::Error> {
        let tcp = if self.named_instance {
            TcpStream::connect_named(&self.config).await?
        } else {
            TcpStream::connect(self.config.get_addr()).await?
        };
        tcp.set_nodelay(true)?;
        Client::connect(self.config.clone(), tcp.compat_write()).await
    }

    async fn recycle(
        &self,
        client: &mut TdsClient,
        _: &Metrics,
    ) -> RecycleResult<tiberius::error::Error> {
        client
            .simple_query(RECYCLE_SQL)
            .await
            .map_err(RecycleError::Backend)?
            .into_results()
            .await
            .map_err(RecycleError::Backend)?;
        Ok(())
    }
}

pub struct MsSqlAdapter {
    pool: Pool<TiberiusManager>,
    timeout: Duration,
}

impl MsSqlAdapter {
    pub fn new(profile: &ConnectionProfile, max_pool_size: usize, timeout: Duration) -> Result<Self, AppError> {
        let pool = Pool::builder(TiberiusManager::new(profile))
            .max_size(max_pool_size.max(1))
            .build()
            .map_err(|e| {
                tracing::error!("Failed to create SQL Server pool: {}", e);
                AppError::Connection(format!("Failed to create connection pool: {}", e))
            })?;
        Ok(Self { pool, timeout })
    }

    async fn connection(&self) -> Result<Object<TiberiusManager>, AppError> {
        self.pool
            .get()
            .await
            .map_err(|e| AppError::Connection(format!("Failed to get SQL Server connection: {}", e)))
    }

    fn params(query: &BuiltQuery) -> Vec<&dyn ToSql> {
        query.params.iter().map(|p| p as &dyn ToSql).collect()
    }

    fn rows_to_result(rows: Vec<Row>, started: Instant) -> QueryResult {
        let columns = rows
            .first()
            .map(|row| row.columns().iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default();
        let rows = rows.into_iter().map(row_to_json).collect();
        QueryResult::new(columns, rows, started)
    }
}

fn map_tds_error(e: tiberius::error::Error) -> AppError {
    match e {
        tiberius::error::Error::Server(token) => {
            AppError::Database(format!("{} (code {})", token.message(), token.code()))
        }
        other => AppError::Database(other.to_string()),
    }
}

fn temporal_json(data: &ColumnData<'static>) -> Value {
    let value = match data {
        ColumnData::Date(_) => NaiveDate::from_sql(data).ok().flatten().map(date_json),
        ColumnData::Time(_) => NaiveTime::from_sql(data)
            .ok()
            .flatten()
            .map(|t| json!(t.format("%H:%M:%S%.3f").to_string())),
        ColumnData::DateTimeOffset(_) => DateTime::<FixedOffset>::from_sql(data)
            .ok()
            .flatten()
            .map(|dt| datetime_json(dt.naive_utc())),
        _ => NaiveDateTime::from_sql(data).ok().flatten().map(datetime_json),
    };
    value.unwrap_or(Value::Null)
}

fn column_to_json(data: ColumnData<'static>) -> Value {
    match data {
        ColumnData::U8(v) => v.map(|v| json!(v)).unwrap_or(Value::Null),
        ColumnData::I16(v) => v.map(|v| json!(v)).unwrap_or(Value::Null),
        ColumnData::I32(v) => v.map(|v| json!(v)).unwrap_or(Value::Null),
        ColumnData::I64(v) => v.map(|v| json!(v)).unwrap_or(Value::Null),
        ColumnData::F32(v) => v.map(|v| float_json(f64::from(v))).unwrap_or(Value::Null),
        ColumnData::F64(v) => v.map(float_json).unwrap_or(Value::Null),
        ColumnData::Bit(v) => v.map(Value::Bool).unwrap_or(Value::Null),
        ColumnData::String(v) => v.map(|s| json!(s.into_owned())).unwrap_or(Value::Null),
        ColumnData::Guid(v) => v.map(|g| json!(g.to_string())).unwrap_or(Value::Null),
        ColumnData::Numeric(v) => v
            .map(|n| float_json(n.value() as f64 / 10f64.powi(i32::from(n.scale()))))
            .unwrap_or(Value::Null),
        ColumnData::Binary(v) => v
            .map(|b| json!(format!("<binary {} bytes>", b.len())))
            .unwrap_or(Value::Null),
        ColumnData::DateTime(_)
        | ColumnData::SmallDateTime(_)
        | ColumnData::DateTime2(_)
        | ColumnData::DateTimeOffset(_)
        | ColumnData::Date(_)
        | ColumnData::Time(_) => temporal_json(&data),
        _ => Value::Null,
    }
}

fn row_to_json(row: Row) -> Value {
    let names: Vec<String> = row.columns().iter().map(|c| c.name().to_string()).collect();
    let mut object = Map::new();
    for (name, data) in names.into_iter().zip(row) {
        object.insert(name, column_to_json(data));
    }
    Value::Object(object)
}

async fn run_transaction(client: &mut TdsClient, statements: &[BuiltQuery]) -> Result<Vec<u64>, AppError> {
    let mut counts = Vec::with_capacity(statements.len());
    for statement in statements {
        tracing::debug!("mssql tx: {}", sql_preview(&statement.sql));
        let result = client
            .execute(statement.sql.as_str(), &MsSqlAdapter::params(statement))
            .await
            .map_err(map_tds_error)?;
        counts.push(result.total());
    }
    Ok(counts)
}

async fn batch(client: &mut TdsClient, sql: &str) -> Result<(), AppError> {
    client
        .simple_query(sql)
        .await
        .map_err(map_tds_error)?
        .into_results()
        .await
        .map_err(map_tds_error)?;
    Ok(())
}

#[async_trait::async_trait]
impl DatabaseAdapter for MsSqlAdapter {
    fn client(&self) -> ClientKind {
        ClientKind::MsSql
    }

    async fn query(&self, query: &BuiltQuery) -> Result<QueryResult, AppError> {
        tracing::debug!("mssql query: {}", sql_preview(&query.sql));
        with_timeout(self.timeout, async {
            let mut client = self.connection().await?;
            let started = Instant::now();
            let rows = client
                .query(query.sql.as_str(), &Self::params(query))
                .await
                .map_err(map_tds_error)?
                .into_first_result()
                .await
                .map_err(map_tds_error)?;
            Ok(Self::rows_to_result(rows, started))
        })
        .await
    }

    async fn query_sets(&self, query: &BuiltQuery) -> Result<Vec<QueryResult>, AppError> {
        tracing::debug!("mssql query sets: {}", sql_preview(&query.sql));
        with_timeout(self.timeout, async {
            let mut client = self.connection().await?;
            let started = Instant::now();
            let sets = client
                .query(query.sql.as_str(), &Self::params(query))
                .await
                .map_err(map_tds_error)?
                .into_results()
                .await
                .map_err(map_tds_error)?;
            Ok(sets
                .into_iter()
                .map(|rows| Self::rows_to_result(rows, started))
                .collect())
        })
        .await
    }

    async fn execute(&self, query: &BuiltQuery) -> Result<ExecuteResult, AppError> {
        tracing::debug!("mssql execute: {}", sql_preview(&query.sql));
        with_timeout(self.timeout, async {
            let mut client = self.connection().await?;
            let result = client
                .execute(query.sql.as_str(), &Self::params(query))
                .await
                .map_err(map_tds_error)?;
            Ok(ExecuteResult {
                rows_affected: result.total(),
                last_insert_id: None,
            })
        })
        .await
    }

    async fn execute_transaction(&self, statements: &[BuiltQuery]) -> Result<Vec<u64>, AppError> {
        with_timeout(self.timeout, async {
            let mut client = self.connection().await?;
            batch(&mut client, "BEGIN TRANSACTION").await?;
            match run_transaction(&mut client, statements).await {
                Ok(counts) => {
                    batch(&mut client, "COMMIT TRANSACTION").await?;
                    Ok(counts)
                }
                Err(e) => {
                    if let Err(rollback) = batch(&mut client, "ROLLBACK TRANSACTION").await {
                        tracing::warn!("Rollback failed, discarding connection: {}", rollback);
                        drop(Object::take(client));
                    }
                    Err(e)
                }
            }
        })
        .await
    }

    async fn execute_raw(&self, sql: &str) -> Result<QueryResult, AppError> {
        with_timeout(self.timeout, async {
            let mut client = self.connection().await?;
            let started = Instant::now();
            let rows = client
                .simple_query(sql)
                .await
                .map_err(map_tds_error)?
                .into_first_result()
                .await
                .map_err(map_tds_error)?;
            Ok(Self::rows_to_result(rows, started))
        })
        .await
    }

    async fn test_connection(&self) -> Result<(), AppError> {
        with_timeout(self.timeout, async {
            let mut client = self.connection().await?;
            batch(&mut client, "SELECT 1").await
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tiberius::numeric::Numeric;

    #[test]
    fn test_sql_value_to_column_data() {
        assert!(matches!(SqlValue::Null.to_sql(), ColumnData::String(None)));
        assert!(matches!(SqlValue::Int(7).to_sql(), ColumnData::I64(Some(7))));
        assert!(matches!(SqlValue::Bool(true).to_sql(), ColumnData::Bit(Some(true))));
        match SqlValue::Text("Rock".into()).to_sql() {
            ColumnData::String(Some(s)) => assert_eq!(s, "Rock"),
            other => panic!("unexpected column data: {:?}", other),
        }
    }

    #[test]
    fn test_column_data_to_json() {
        assert_eq!(column_to_json(ColumnData::I32(Some(3))), json!(3));
        assert_eq!(column_to_json(ColumnData::I32(None)), Value::Null);
        assert_eq!(
            column_to_json(ColumnData::String(Some(Cow::Owned("AC/DC".into())))),
            json!("AC/DC")
        );
        assert_eq!(
            column_to_json(ColumnData::Numeric(Some(Numeric::new_with_scale(198, 2)))),
            json!(1.98)
        );
    }

    #[test]
    fn test_recycle_rolls_back_open_transaction() {
        let rollback = RECYCLE_SQL.find("ROLLBACK TRANSACTION").unwrap();
        let ping = RECYCLE_SQL.find("SELECT 1").unwrap();
        assert!(RECYCLE_SQL.starts_with("IF @@TRANCOUNT > 0"));
        assert!(rollback < ping);
    }

    #[test]
    fn test_manager_skips_port_for_named_instance() {
        let mut profile = ConnectionProfile::new(ClientKind::MsSql);
        profile.host = Some("db01".into());
        profile.instance_name = Some("SQLEXPRESS".into());
        let manager = TiberiusManager::new(&profile);
        assert!(manager.named_instance);

        profile.instance_name = None;
        let manager = TiberiusManager::new(&profile);
        assert!(!manager.named_instance);
        assert_eq!(manager.config.get_addr(), "db01:1433");
    }
}

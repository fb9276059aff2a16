// MySQL adapter using mysql_async's built-in pool
use chrono::{NaiveDate, NaiveDateTime};
use mysql_async::consts::ColumnType;
use mysql_async::prelude::*;
use mysql_async::{
    Conn, OptsBuilder, Params, Pool, PoolConstraints, PoolOpts, Row, TxOpts, Value as MySqlValue,
};
use serde_json::{json, Map, Value};
use std::time::{Duration, Instant};

use crate::api::middleware::AppError;
use crate::models::{ClientKind, ConnectionProfile, SqlValue};
use crate::services::database::adapter::{
    date_json, datetime_json, float_json, sql_preview, with_timeout, DatabaseAdapter,
    ExecuteResult, QueryResult,
};
use crate::services::query_builder::BuiltQuery;

pub struct MySQLAdapter {
    pool: Pool,
    timeout: Duration,
}

impl MySQLAdapter {
    pub fn new(profile: &ConnectionProfile, max_pool_size: usize, timeout: Duration) -> Self {
        let constraints = PoolConstraints::new(0, max_pool_size.max(1)).unwrap_or_default();
        let opts = OptsBuilder::default()
            .ip_or_hostname(profile.host())
            .tcp_port(profile.effective_port().unwrap_or(3306))
            .user(Some(profile.user()))
            .pass(Some(profile.password()))
            .db_name(Some(profile.database()))
            .pool_opts(PoolOpts::default().with_constraints(constraints));

        Self {
            pool: Pool::new(opts),
            timeout,
        }
    }

    async fn connection(&self) -> Result<Conn, AppError> {
        self.pool
            .get_conn()
            .await
            .map_err(|e| AppError::Connection(format!("Failed to get MySQL connection: {}", e)))
    }

    fn params(query: &BuiltQuery) -> Params {
        if query.params.is_empty() {
            Params::Empty
        } else {
            Params::Positional(query.params.iter().map(to_mysql_value).collect())
        }
    }

    fn rows_to_result(rows: Vec<Row>, started: Instant) -> QueryResult {
        let columns = rows
            .first()
            .map(|row| {
                row.columns_ref()
                    .iter()
                    .map(|c| c.name_str().to_string())
                    .collect()
            })
            .unwrap_or_default();
        let rows = rows.into_iter().map(row_to_json).collect();
        QueryResult::new(columns, rows, started)
    }
}

fn map_mysql_error(e: mysql_async::Error) -> AppError {
    AppError::Database(e.to_string())
}

fn to_mysql_value(value: &SqlValue) -> MySqlValue {
    match value {
        SqlValue::Null => MySqlValue::NULL,
        SqlValue::Bool(b) => MySqlValue::Int(i64::from(*b)),
        SqlValue::Int(i) => MySqlValue::Int(*i),
        SqlValue::Float(f) => MySqlValue::Double(*f),
        SqlValue::Text(s) => MySqlValue::Bytes(s.clone().into_bytes()),
    }
}

fn is_integer_type(column_type: ColumnType) -> bool {
    matches!(
        column_type,
        ColumnType::MYSQL_TYPE_TINY
            | ColumnType::MYSQL_TYPE_SHORT
            | ColumnType::MYSQL_TYPE_LONG
            | ColumnType::MYSQL_TYPE_LONGLONG
            | ColumnType::MYSQL_TYPE_INT24
            | ColumnType::MYSQL_TYPE_YEAR
    )
}

fn is_decimal_type(column_type: ColumnType) -> bool {
    matches!(
        column_type,
        ColumnType::MYSQL_TYPE_DECIMAL
            | ColumnType::MYSQL_TYPE_NEWDECIMAL
            | ColumnType::MYSQL_TYPE_FLOAT
            | ColumnType::MYSQL_TYPE_DOUBLE
    )
}

/// Text-protocol results arrive as bytes for every type, so the column type decides
/// how they are read back.
fn mysql_value_to_json(value: MySqlValue, column_type: ColumnType) -> Value {
    match value {
        MySqlValue::NULL => Value::Null,
        MySqlValue::Bytes(bytes) => {
            let text = match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(e) => return json!(format!("<binary {} bytes>", e.as_bytes().len())),
            };
            if is_integer_type(column_type) {
                return text.parse::<i64>().map(|i| json!(i)).unwrap_or(json!(text));
            }
            if is_decimal_type(column_type) {
                return text.parse::<f64>().map(float_json).unwrap_or(json!(text));
            }
            match column_type {
                ColumnType::MYSQL_TYPE_DATETIME | ColumnType::MYSQL_TYPE_TIMESTAMP => {
                    NaiveDateTime::parse_from_str(&text, "%Y-%m-%d %H:%M:%S%.f")
                        .map(datetime_json)
                        .unwrap_or(json!(text))
                }
                _ => json!(text),
            }
        }
        MySqlValue::Int(i) => json!(i),
        MySqlValue::UInt(u) => json!(u),
        MySqlValue::Float(f) => float_json(f64::from(f)),
        MySqlValue::Double(d) => float_json(d),
        MySqlValue::Date(y, m, d, h, min, s, micros) => {
            let date = NaiveDate::from_ymd_opt(i32::from(y), u32::from(m), u32::from(d));
            match (column_type, date) {
                (ColumnType::MYSQL_TYPE_DATE, Some(date)) => date_json(date),
                (_, Some(date)) => date
                    .and_hms_micro_opt(u32::from(h), u32::from(min), u32::from(s), micros)
                    .map(datetime_json)
                    .unwrap_or(Value::Null),
                (_, None) => json!(format!(
                    "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
                    y, m, d, h, min, s
                )),
            }
        }
        MySqlValue::Time(is_neg, d, h, m, s, _) => {
            let sign = if is_neg { "-" } else { "" };
            let total_hours = d * 24 + u32::from(h);
            json!(format!("{}{}:{:02}:{:02}", sign, total_hours, m, s))
        }
    }
}

fn row_to_json(row: Row) -> Value {
    let columns = row.columns();
    let values = row.unwrap();
    let mut object = Map::new();
    for (column, value) in columns.iter().zip(values) {
        object.insert(
            column.name_str().to_string(),
            mysql_value_to_json(value, column.column_type()),
        );
    }
    Value::Object(object)
}

#[async_trait::async_trait]
impl DatabaseAdapter for MySQLAdapter {
    fn client(&self) -> ClientKind {
        ClientKind::MySql
    }

    async fn query(&self, query: &BuiltQuery) -> Result<QueryResult, AppError> {
        tracing::debug!("mysql query: {}", sql_preview(&query.sql));
        with_timeout(self.timeout, async {
            let mut conn = self.connection().await?;
            let started = Instant::now();
            let rows: Vec<Row> = conn
                .exec(query.sql.as_str(), Self::params(query))
                .await
                .map_err(map_mysql_error)?;
            Ok(Self::rows_to_result(rows, started))
        })
        .await
    }

    async fn execute(&self, query: &BuiltQuery) -> Result<ExecuteResult, AppError> {
        tracing::debug!("mysql execute: {}", sql_preview(&query.sql));
        with_timeout(self.timeout, async {
            let mut conn = self.connection().await?;
            conn.exec_drop(query.sql.as_str(), Self::params(query))
                .await
                .map_err(map_mysql_error)?;
            Ok(ExecuteResult {
                rows_affected: conn.affected_rows(),
                last_insert_id: conn.last_insert_id(),
            })
        })
        .await
    }

    async fn execute_transaction(&self, statements: &[BuiltQuery]) -> Result<Vec<u64>, AppError> {
        with_timeout(self.timeout, async {
            let mut conn = self.connection().await?;
            let mut tx = conn
                .start_transaction(TxOpts::default())
                .await
                .map_err(map_mysql_error)?;
            let mut counts = Vec::with_capacity(statements.len());
            for statement in statements {
                tracing::debug!("mysql tx: {}", sql_preview(&statement.sql));
                tx.exec_drop(statement.sql.as_str(), Self::params(statement))
                    .await
                    .map_err(map_mysql_error)?;
                counts.push(tx.affected_rows());
            }
            tx.commit().await.map_err(map_mysql_error)?;
            Ok(counts)
        })
        .await
    }

    async fn execute_raw(&self, sql: &str) -> Result<QueryResult, AppError> {
        with_timeout(self.timeout, async {
            let mut conn = self.connection().await?;
            let started = Instant::now();
            let rows: Vec<Row> = conn.query(sql).await.map_err(map_mysql_error)?;
            Ok(Self::rows_to_result(rows, started))
        })
        .await
    }

    async fn test_connection(&self) -> Result<(), AppError> {
        with_timeout(self.timeout, async {
            let mut conn = self.connection().await?;
            conn.ping().await.map_err(map_mysql_error)?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_protocol_values_follow_column_type() {
        let bytes = |s: &str| MySqlValue::Bytes(s.as_bytes().to_vec());

        assert_eq!(
            mysql_value_to_json(bytes("42"), ColumnType::MYSQL_TYPE_LONG),
            json!(42)
        );
        assert_eq!(
            mysql_value_to_json(bytes("1.98"), ColumnType::MYSQL_TYPE_NEWDECIMAL),
            json!(1.98)
        );
        assert_eq!(
            mysql_value_to_json(bytes("2021-01-01 00:00:00"), ColumnType::MYSQL_TYPE_DATETIME),
            json!("2021-01-01T00:00:00.000Z")
        );
        assert_eq!(
            mysql_value_to_json(bytes("Brazil"), ColumnType::MYSQL_TYPE_VAR_STRING),
            json!("Brazil")
        );
    }

    #[test]
    fn test_binary_protocol_dates() {
        assert_eq!(
            mysql_value_to_json(
                MySqlValue::Date(2021, 1, 2, 0, 0, 0, 0),
                ColumnType::MYSQL_TYPE_DATE
            ),
            json!("2021-01-02")
        );
        assert_eq!(
            mysql_value_to_json(
                MySqlValue::Date(2021, 1, 2, 3, 4, 5, 0),
                ColumnType::MYSQL_TYPE_DATETIME
            ),
            json!("2021-01-02T03:04:05.000Z")
        );
    }

    #[test]
    fn test_params_conversion() {
        let query = BuiltQuery::new(
            "SELECT ?",
            vec![SqlValue::Int(1), SqlValue::Null, SqlValue::Text("a".into())],
        );
        match MySQLAdapter::params(&query) {
            Params::Positional(values) => {
                assert_eq!(values[0], MySqlValue::Int(1));
                assert_eq!(values[1], MySqlValue::NULL);
                assert_eq!(values[2], MySqlValue::Bytes(b"a".to_vec()));
            }
            other => panic!("unexpected params: {:?}", other),
        }
        assert!(matches!(MySQLAdapter::params(&BuiltQuery::raw("SELECT 1")), Params::Empty));
    }
}

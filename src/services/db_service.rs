use serde_json::Value;
use std::sync::Arc;

use crate::api::middleware::AppError;
use crate::models::ConnectionProfile;
use crate::services::connection_pool::ConnectionPoolManager;
use crate::services::database::{DatabaseAdapter, ExecuteResult};
use crate::services::dialect::{dialect_for, Dialect};
use crate::services::normalizer::{count_from_rows, normalize_rows};
use crate::services::query_builder::BuiltQuery;
use crate::services::registry::ConnectionRegistry;

/// A resolved connection: its profile, its dialect and a pooled adapter.
#[derive(Clone)]
pub struct DbSession {
    pub name: String,
    pub profile: ConnectionProfile,
    pub dialect: Arc<dyn Dialect>,
    pub adapter: Arc<dyn DatabaseAdapter>,
}

impl DbSession {
    pub fn new(name: impl Into<String>, profile: ConnectionProfile, adapter: Arc<dyn DatabaseAdapter>) -> Self {
        Self {
            name: name.into(),
            dialect: dialect_for(profile.client),
            profile,
            adapter,
        }
    }

    pub fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    /// Rows with keys mapped back to canonical names.
    pub async fn query_rows(&self, query: &BuiltQuery) -> Result<Vec<Value>, AppError> {
        let result = self.adapter.query(query).await?;
        Ok(normalize_rows(self.dialect(), result.rows))
    }

    pub async fn count(&self, query: &BuiltQuery) -> Result<i64, AppError> {
        let result = self.adapter.query(query).await?;
        Ok(count_from_rows(&result.rows))
    }

    pub async fn execute(&self, query: &BuiltQuery) -> Result<ExecuteResult, AppError> {
        self.adapter.execute(query).await
    }

    pub async fn transaction(&self, statements: &[BuiltQuery]) -> Result<Vec<u64>, AppError> {
        self.adapter.execute_transaction(statements).await
    }
}

/// Resolves connection names to sessions backed by cached pools.
pub struct DbService {
    registry: Arc<ConnectionRegistry>,
    pools: Arc<ConnectionPoolManager>,
}

impl DbService {
    pub fn new(registry: Arc<ConnectionRegistry>, pools: Arc<ConnectionPoolManager>) -> Self {
        Self { registry, pools }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn pools(&self) -> &Arc<ConnectionPoolManager> {
        &self.pools
    }

    /// Session for `conn`, or the default connection when it is absent or unknown.
    pub async fn open(&self, conn: Option<&str>) -> Result<DbSession, AppError> {
        let (name, profile) = self.registry.resolve(conn).await?;
        let adapter = self.pools.get_or_create(&name, &profile).await?;
        Ok(DbSession::new(name, profile, adapter))
    }

    /// Connects with an unsaved profile and runs the dialect's probe statement.
    pub async fn test_profile(&self, profile: &ConnectionProfile) -> Result<(), AppError> {
        tracing::info!(
            "Testing {} connection to {}",
            profile.client.label(),
            profile.describe()
        );
        let adapter = self.pools.build(profile).await?;
        let dialect = dialect_for(profile.client);
        adapter
            .execute_raw(dialect.probe_sql())
            .await
            .map_err(|e| AppError::Connection(e.message().to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use crate::models::ClientKind;
    use crate::services::database::testing::RecordingAdapter;

    /// Session over a recording adapter for the given dialect.
    pub fn session(client: ClientKind, adapter: Arc<RecordingAdapter>) -> DbSession {
        DbSession::new(
            format!("test_{}", client),
            ConnectionProfile::new(client),
            adapter,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ClientKind;
    use crate::services::database::testing::RecordingAdapter;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn service() -> DbService {
        let mut profiles = BTreeMap::new();
        profiles.insert("production_pg".to_string(), ConnectionProfile::new(ClientKind::Postgres));
        profiles.insert("mysql".to_string(), ConnectionProfile::new(ClientKind::MySql));
        let registry = Arc::new(ConnectionRegistry::new(profiles, "production_pg"));
        let pools = Arc::new(ConnectionPoolManager::with_factory(|profile| {
            Ok(Arc::new(RecordingAdapter::new(profile.client)) as Arc<dyn DatabaseAdapter>)
        }));
        DbService::new(registry, pools)
    }

    #[tokio::test]
    async fn test_open_falls_back_to_default() {
        let service = service();
        let session = service.open(Some("missing")).await.unwrap();
        assert_eq!(session.name, "production_pg");
        assert_eq!(session.dialect.client(), ClientKind::Postgres);

        let session = service.open(Some("mysql")).await.unwrap();
        assert_eq!(session.adapter.client(), ClientKind::MySql);
        assert_eq!(service.pools().pool_count().await, 2);
    }

    #[tokio::test]
    async fn test_rows_are_normalized() {
        let adapter = Arc::new(RecordingAdapter::with_responder(ClientKind::Postgres, |_| {
            Ok(vec![json!({ "customer_id": 1, "first_name": "Luís" })])
        }));
        let session = testing::session(ClientKind::Postgres, adapter);
        let rows = session.query_rows(&BuiltQuery::raw("SELECT 1")).await.unwrap();
        assert_eq!(rows[0]["CustomerId"], json!(1));
        assert_eq!(rows[0]["FirstName"], json!("Luís"));
    }

    #[tokio::test]
    async fn test_profile_probe_uses_dialect() {
        let service = service();
        let profile = ConnectionProfile::new(ClientKind::Oracle);
        tokio_test::assert_ok!(service.test_profile(&profile).await);
        assert_eq!(service.pools().pool_count().await, 0);
    }
}

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::api::middleware::AppError;
use crate::models::ConnectionProfile;
use crate::services::database::{create_adapter, AdapterSettings, DatabaseAdapter};

type AdapterFactory = dyn Fn(&ConnectionProfile) -> Result<Arc<dyn DatabaseAdapter>, AppError> + Send + Sync;

/// Connection pool manager that keeps one pooled adapter per connection name.
/// Entries are created on first use and dropped when the profile behind a name changes.
pub struct ConnectionPoolManager {
    pools: Arc<RwLock<HashMap<String, Arc<dyn DatabaseAdapter>>>>,
    settings: AdapterSettings,
    factory: Option<Arc<AdapterFactory>>,
}

impl ConnectionPoolManager {
    /// Create a new connection pool manager with default settings
    pub fn new() -> Self {
        Self::with_config(AdapterSettings::default().max_pool_size, AdapterSettings::default().timeout)
    }

    /// Create a connection pool manager with custom pool settings
    pub fn with_config(max_pool_size: usize, timeout: Duration) -> Self {
        Self {
            pools: Arc::new(RwLock::new(HashMap::new())),
            settings: AdapterSettings {
                max_pool_size,
                timeout,
            },
            factory: None,
        }
    }

    /// Builds adapters with `factory` instead of real drivers.
    pub fn with_factory<F>(factory: F) -> Self
    where
        F: Fn(&ConnectionProfile) -> Result<Arc<dyn DatabaseAdapter>, AppError> + Send + Sync + 'static,
    {
        let mut manager = Self::new();
        manager.factory = Some(Arc::new(factory));
        manager
    }

    pub fn settings(&self) -> AdapterSettings {
        self.settings
    }

    /// Get or create the adapter for the given connection name.
    /// This method is safe to call concurrently from multiple tasks
    pub async fn get_or_create(
        &self,
        name: &str,
        profile: &ConnectionProfile,
    ) -> Result<Arc<dyn DatabaseAdapter>, AppError> {
        // Fast path: check if pool already exists (read lock)
        {
            let pools = self.pools.read().await;
            if let Some(adapter) = pools.get(name) {
                tracing::debug!("Using existing connection pool for '{}'", name);
                return Ok(Arc::clone(adapter));
            }
        }

        // Slow path: create new pool (write lock)
        let mut pools = self.pools.write().await;

        // Double-check in case another task created the pool while we were waiting
        if let Some(adapter) = pools.get(name) {
            tracing::debug!("Pool for '{}' created by another task", name);
            return Ok(Arc::clone(adapter));
        }

        tracing::info!(
            "Creating {} connection pool '{}' for {} (max_size: {})",
            profile.client.label(),
            name,
            profile.describe(),
            self.settings.max_pool_size
        );

        let adapter = self.build(profile).await?;
        pools.insert(name.to_string(), Arc::clone(&adapter));
        Ok(adapter)
    }

    /// Builds an adapter that is not cached, for one-off connection tests.
    pub async fn build(&self, profile: &ConnectionProfile) -> Result<Arc<dyn DatabaseAdapter>, AppError> {
        match &self.factory {
            Some(factory) => factory(profile),
            None => create_adapter(profile, self.settings).await,
        }
    }

    /// Drop the pool for a connection whose profile changed
    pub async fn invalidate(&self, name: &str) -> bool {
        let mut pools = self.pools.write().await;
        let removed = pools.remove(name).is_some();

        if removed {
            tracing::info!("Removed connection pool for '{}'", name);
        }

        removed
    }

    /// Drop every pool, e.g. after the registry was reloaded
    pub async fn clear(&self) -> usize {
        let mut pools = self.pools.write().await;
        let count = pools.len();
        pools.clear();
        if count > 0 {
            tracing::info!("Closed {} connection pools", count);
        }
        count
    }

    /// Get the number of active pools
    pub async fn pool_count(&self) -> usize {
        let pools = self.pools.read().await;
        pools.len()
    }

    /// Names with a live pool, sorted
    pub async fn pool_names(&self) -> Vec<String> {
        let pools = self.pools.read().await;
        let mut names: Vec<String> = pools.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for ConnectionPoolManager {
    fn default() -> Self {
        Self::new()
    }
}

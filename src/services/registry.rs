//! Named connection profiles with session overrides.
//!
//! Base profiles come from a TOML file (or the built-in set). Overrides posted
//! from the settings screen are kept separately so that a reload replaces the
//! base profiles while the session changes survive until restart. Callers must
//! drop cached adapters after an override or reload; see
//! `ConnectionPoolManager::invalidate` and `ConnectionPoolManager::clear`.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

use crate::api::middleware::AppError;
use crate::models::{ClientKind, ConnectionOverride, ConnectionProfile};

#[derive(Debug, Default, Deserialize)]
struct ConnectionsFile {
    #[serde(default)]
    default: Option<String>,
    #[serde(default)]
    connections: BTreeMap<String, ConnectionProfile>,
}

#[derive(Debug)]
struct RegistryState {
    base: BTreeMap<String, ConnectionProfile>,
    overrides: BTreeMap<String, ConnectionOverride>,
    default: String,
}

impl RegistryState {
    fn effective(&self, name: &str) -> Option<ConnectionProfile> {
        match (self.base.get(name), self.overrides.get(name)) {
            (Some(base), Some(update)) => Some(base.apply(update)),
            (Some(base), None) => Some(base.clone()),
            (None, Some(update)) => update.clone().into_profile().ok(),
            (None, None) => None,
        }
    }

    fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.base.keys().cloned().collect();
        for name in self.overrides.keys() {
            if !self.base.contains_key(name) {
                names.push(name.clone());
            }
        }
        names
    }
}

pub struct ConnectionRegistry {
    source: Option<PathBuf>,
    state: RwLock<RegistryState>,
}

impl ConnectionRegistry {
    pub fn new(profiles: BTreeMap<String, ConnectionProfile>, default: impl Into<String>) -> Self {
        Self {
            source: None,
            state: RwLock::new(RegistryState {
                base: profiles,
                overrides: BTreeMap::new(),
                default: default.into(),
            }),
        }
    }

    /// Loads profiles from `path`, or the built-in profiles when the file does not exist.
    pub fn load(path: &Path, default: &str) -> Result<Self, AppError> {
        if !path.exists() {
            tracing::warn!(
                "Connections file {} not found, using built-in profiles",
                path.display()
            );
            return Ok(Self::new(builtin_profiles(), default));
        }

        let file = read_profiles(path)?;
        tracing::info!(
            "Loaded {} connection profiles from {}",
            file.connections.len(),
            path.display()
        );

        Ok(Self {
            source: Some(path.to_path_buf()),
            state: RwLock::new(RegistryState {
                base: file.connections,
                overrides: BTreeMap::new(),
                default: file.default.unwrap_or_else(|| default.to_string()),
            }),
        })
    }

    pub async fn default_name(&self) -> String {
        self.state.read().await.default.clone()
    }

    /// Profile for `name`, falling back to the default connection when the name is
    /// missing or unknown.
    pub async fn resolve(&self, name: Option<&str>) -> Result<(String, ConnectionProfile), AppError> {
        let state = self.state.read().await;

        if let Some(requested) = name.filter(|n| !n.is_empty()) {
            if let Some(profile) = state.effective(requested) {
                return Ok((requested.to_string(), profile));
            }
            tracing::warn!(
                "Unknown connection '{}', falling back to '{}'",
                requested,
                state.default
            );
        }

        state
            .effective(&state.default)
            .map(|profile| (state.default.clone(), profile))
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "Default connection '{}' is not configured",
                    state.default
                ))
            })
    }

    /// Strict lookup without fallback.
    pub async fn get(&self, name: &str) -> Option<ConnectionProfile> {
        self.state.read().await.effective(name)
    }

    pub async fn list(&self) -> Vec<(String, ConnectionProfile)> {
        let state = self.state.read().await;
        state
            .names()
            .into_iter()
            .filter_map(|name| state.effective(&name).map(|profile| (name, profile)))
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.names().len()
    }

    /// Records a session override and returns the resulting profile.
    pub async fn apply_override(
        &self,
        name: &str,
        update: ConnectionOverride,
    ) -> Result<ConnectionProfile, AppError> {
        if name.trim().is_empty() {
            return Err(AppError::Validation("Connection name is required".to_string()));
        }

        let mut state = self.state.write().await;
        let merged = match state.overrides.get(name) {
            Some(existing) => merge_overrides(existing.clone(), update),
            None => update,
        };

        let profile = match state.base.get(name) {
            Some(base) => base.apply(&merged),
            None => merged.clone().into_profile()?,
        };

        state.overrides.insert(name.to_string(), merged);
        tracing::info!("Session override applied to connection '{}'", name);
        Ok(profile)
    }

    /// Re-reads the profile file. Session overrides are kept.
    pub async fn reload(&self) -> Result<usize, AppError> {
        let Some(path) = &self.source else {
            return Ok(self.len().await);
        };

        let file = read_profiles(path)?;
        let mut state = self.state.write().await;
        state.base = file.connections;
        if let Some(default) = file.default {
            state.default = default;
        }
        let count = state.names().len();
        tracing::info!("Reloaded {} connection profiles from {}", count, path.display());
        Ok(count)
    }
}

fn read_profiles(path: &Path) -> Result<ConnectionsFile, AppError> {
    let file: ConnectionsFile = config::Config::builder()
        .add_source(config::File::from(path).format(config::FileFormat::Toml))
        .build()
        .and_then(|c| c.try_deserialize())
        .map_err(|e| {
            AppError::Validation(format!(
                "Failed to read connections file {}: {}",
                path.display(),
                e
            ))
        })?;

    let mut connections = BTreeMap::new();
    for (name, profile) in file.connections {
        let profile = profile.resolve_url().map_err(|e| {
            AppError::Validation(format!("Connection '{}': {}", name, e.message()))
        })?;
        connections.insert(name, profile);
    }

    Ok(ConnectionsFile {
        default: file.default,
        connections,
    })
}

fn merge_overrides(mut base: ConnectionOverride, update: ConnectionOverride) -> ConnectionOverride {
    base.client = update.client.or(base.client);
    base.display_name = update.display_name.or(base.display_name);
    base.host = update.host.or(base.host);
    base.port = update.port.or(base.port);
    base.database = update.database.or(base.database);
    base.user = update.user.or(base.user);
    base.password = update.password.or(base.password);
    base.instance_name = update.instance_name.or(base.instance_name);
    base.connect_string = update.connect_string.or(base.connect_string);
    base.options = match (base.options, update.options) {
        (Some(mut old), Some(new)) => {
            old.encrypt = new.encrypt.or(old.encrypt);
            old.trust_server_certificate = new.trust_server_certificate.or(old.trust_server_certificate);
            old.instance_name = new.instance_name.or(old.instance_name);
            Some(old)
        }
        (old, new) => new.or(old),
    };
    base
}

/// Profiles used when no connections file exists. Passwords are left empty and
/// must be supplied through the file or a session override.
pub fn builtin_profiles() -> BTreeMap<String, ConnectionProfile> {
    fn profile(
        client: ClientKind,
        display_name: &str,
        user: &str,
        database: Option<&str>,
        connect_string: Option<&str>,
    ) -> ConnectionProfile {
        let mut p = ConnectionProfile::new(client);
        p.display_name = Some(display_name.to_string());
        p.user = Some(user.to_string());
        p.database = database.map(str::to_string);
        p.connect_string = connect_string.map(str::to_string);
        if client != ClientKind::Oracle {
            p.host = Some("localhost".to_string());
        }
        if matches!(client, ClientKind::Postgres | ClientKind::MySql) {
            p.port = Some(client.default_port());
        }
        p
    }

    let entries = [
        ("production_mssql", profile(ClientKind::MsSql, "Production (SQL Server)", "Redgate", Some("Chinook_FullRestore"), None)),
        ("treated_mssql", profile(ClientKind::MsSql, "Treated (SQL Server)", "Redgate", Some("Chinook_Treated"), None)),
        ("production_pg", profile(ClientKind::Postgres, "Production (PostgreSQL)", "postgres", Some("chinook_fullrestore"), None)),
        ("treated_pg", profile(ClientKind::Postgres, "Treated (PostgreSQL)", "postgres", Some("chinook_treated"), None)),
        ("production_mysql", profile(ClientKind::MySql, "Production (MySQL)", "root", Some("chinook-fullrestore"), None)),
        ("treated_mysql", profile(ClientKind::MySql, "Treated (MySQL)", "root", Some("chinook-treated"), None)),
        ("production_oracle", profile(ClientKind::Oracle, "Production (Oracle)", "chinook", None, Some("localhost/PDBPROD"))),
        ("treated_oracle", profile(ClientKind::Oracle, "Treated (Oracle)", "chinook", None, Some("localhost/DEV1"))),
    ];

    entries
        .into_iter()
        .map(|(name, profile)| (name.to_string(), profile))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tokio_test::{assert_err, assert_ok};

    fn registry() -> ConnectionRegistry {
        ConnectionRegistry::new(builtin_profiles(), "production_mssql")
    }

    #[tokio::test]
    async fn test_resolve_falls_back_to_default() {
        let registry = registry();

        let (name, profile) = registry.resolve(Some("treated_pg")).await.unwrap();
        assert_eq!(name, "treated_pg");
        assert_eq!(profile.client, ClientKind::Postgres);

        let (name, _) = registry.resolve(Some("nope")).await.unwrap();
        assert_eq!(name, "production_mssql");

        let (name, _) = registry.resolve(None).await.unwrap();
        assert_eq!(name, "production_mssql");
    }

    #[tokio::test]
    async fn test_missing_default_is_not_found() {
        let registry = ConnectionRegistry::new(BTreeMap::new(), "production_mssql");
        assert_err!(registry.resolve(None).await);
    }

    #[tokio::test]
    async fn test_override_merges_and_accumulates() {
        let registry = registry();

        let first: ConnectionOverride =
            serde_json::from_value(serde_json::json!({"host": "10.0.0.5", "password": "pw"})).unwrap();
        assert_ok!(registry.apply_override("treated_pg", first).await);

        let second: ConnectionOverride =
            serde_json::from_value(serde_json::json!({"database": "chinook_staging"})).unwrap();
        let profile = registry.apply_override("treated_pg", second).await.unwrap();

        assert_eq!(profile.host(), "10.0.0.5");
        assert_eq!(profile.password(), "pw");
        assert_eq!(profile.database(), "chinook_staging");
        assert_eq!(registry.get("treated_pg").await.unwrap(), profile);
    }

    #[tokio::test]
    async fn test_override_can_add_session_connection() {
        let registry = registry();
        let update: ConnectionOverride =
            serde_json::from_value(serde_json::json!({"client": "pg", "host": "db"})).unwrap();
        assert_ok!(registry.apply_override("scratch", update).await);
        assert_eq!(registry.len().await, 9);

        let missing_client = ConnectionOverride::default();
        assert_err!(registry.apply_override("other", missing_client).await);
    }

    #[tokio::test]
    async fn test_load_and_reload_keep_overrides() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
default = "local_pg"

[connections.local_pg]
client = "pg"
host = "localhost"
port = 5432
database = "chinook"
user = "postgres"
password = "secret"
"#
        )
        .unwrap();
        let path = file.path().to_path_buf();

        let registry = ConnectionRegistry::load(&path, "production_mssql").unwrap();
        assert_eq!(registry.default_name().await, "local_pg");
        assert_eq!(registry.len().await, 1);

        let update: ConnectionOverride =
            serde_json::from_value(serde_json::json!({"host": "override-host"})).unwrap();
        registry.apply_override("local_pg", update).await.unwrap();

        std::fs::write(
            &path,
            r#"
[connections.local_pg]
client = "pg"
host = "localhost"
database = "chinook_v2"

[connections.local_mysql]
client = "mysql"
url = "mysql://root:pw@localhost:3306/chinook"
"#,
        )
        .unwrap();

        assert_eq!(registry.reload().await.unwrap(), 2);
        let pg = registry.get("local_pg").await.unwrap();
        assert_eq!(pg.host(), "override-host");
        assert_eq!(pg.database(), "chinook_v2");

        let mysql = registry.get("local_mysql").await.unwrap();
        assert_eq!(mysql.database(), "chinook");
        assert_eq!(mysql.user(), "root");
    }

    #[test]
    fn test_builtin_profiles_mirror_environments() {
        let profiles = builtin_profiles();
        assert_eq!(profiles.len(), 8);
        assert_eq!(
            profiles["production_oracle"].oracle_connect_string(),
            "localhost/PDBPROD"
        );
        assert_eq!(profiles["production_mssql"].effective_port(), Some(1433));
    }
}

use serde::{Deserialize, Deserializer, Serialize};
use url::Url;

use crate::api::middleware::AppError;

/// Database client a connection profile talks to. Wire names match the
/// driver names the frontend already stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClientKind {
    #[serde(rename = "mssql", alias = "sqlserver")]
    MsSql,
    #[serde(rename = "pg", alias = "postgres", alias = "postgresql")]
    Postgres,
    #[serde(rename = "mysql2", alias = "mysql")]
    MySql,
    #[serde(rename = "oracledb", alias = "oracle")]
    Oracle,
}

impl ClientKind {
    pub fn from_str(s: &str) -> Result<Self, AppError> {
        match s.to_lowercase().as_str() {
            "mssql" | "sqlserver" => Ok(ClientKind::MsSql),
            "pg" | "postgres" | "postgresql" => Ok(ClientKind::Postgres),
            "mysql" | "mysql2" => Ok(ClientKind::MySql),
            "oracle" | "oracledb" => Ok(ClientKind::Oracle),
            _ => Err(AppError::Validation(format!("Unsupported database client: {}", s))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ClientKind::MsSql => "mssql",
            ClientKind::Postgres => "pg",
            ClientKind::MySql => "mysql2",
            ClientKind::Oracle => "oracledb",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ClientKind::MsSql => "SQL Server",
            ClientKind::Postgres => "PostgreSQL",
            ClientKind::MySql => "MySQL",
            ClientKind::Oracle => "Oracle",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            ClientKind::MsSql => 1433,
            ClientKind::Postgres => 5432,
            ClientKind::MySql => 3306,
            ClientKind::Oracle => 1521,
        }
    }
}

impl std::fmt::Display for ClientKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_true() -> bool {
    true
}

/// A named, statically configured set of credentials for one database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionProfile {
    pub client: ClientKind,
    #[serde(default, alias = "displayName")]
    pub display_name: Option<String>,
    #[serde(default, alias = "server")]
    pub host: Option<String>,
    #[serde(default, deserialize_with = "lenient_port")]
    pub port: Option<u16>,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default, alias = "instanceName")]
    pub instance_name: Option<String>,
    /// Oracle EZConnect string (`host:port/service`)
    #[serde(default, alias = "connectString")]
    pub connect_string: Option<String>,
    #[serde(default = "default_true")]
    pub encrypt: bool,
    #[serde(default = "default_true", alias = "trustServerCertificate")]
    pub trust_server_certificate: bool,
    /// Alternative to the discrete fields, e.g. `postgresql://user:pw@host:5432/chinook`
    #[serde(default)]
    pub url: Option<String>,
}

impl ConnectionProfile {
    pub fn new(client: ClientKind) -> Self {
        Self {
            client,
            display_name: None,
            host: None,
            port: None,
            database: None,
            user: None,
            password: None,
            instance_name: None,
            connect_string: None,
            encrypt: true,
            trust_server_certificate: true,
            url: None,
        }
    }

    /// Fill unset fields from `url` when one is given.
    pub fn resolve_url(mut self) -> Result<Self, AppError> {
        let Some(raw) = self.url.clone() else {
            return Ok(self);
        };

        let parsed = Url::parse(&raw)
            .map_err(|e| AppError::Validation(format!("Invalid connection URL: {}", e)))?;
        let client = match parsed.scheme() {
            "postgres" | "postgresql" => ClientKind::Postgres,
            "mysql" => ClientKind::MySql,
            "mssql" | "sqlserver" => ClientKind::MsSql,
            "oracle" => ClientKind::Oracle,
            other => {
                return Err(AppError::Validation(format!(
                    "Unsupported connection URL scheme: {}",
                    other
                )))
            }
        };
        if client != self.client {
            return Err(AppError::Validation(format!(
                "Connection URL scheme {} does not match client {}",
                parsed.scheme(),
                self.client
            )));
        }

        if self.host.is_none() {
            self.host = parsed.host_str().map(str::to_string);
        }
        if self.port.is_none() {
            self.port = parsed.port();
        }
        if self.user.is_none() && !parsed.username().is_empty() {
            self.user = Some(parsed.username().to_string());
        }
        if self.password.is_none() {
            self.password = parsed.password().map(str::to_string);
        }
        if self.database.is_none() {
            let db = parsed.path().trim_start_matches('/');
            if !db.is_empty() {
                self.database = Some(db.to_string());
            }
        }

        Ok(self)
    }

    pub fn host(&self) -> &str {
        self.host.as_deref().unwrap_or("localhost")
    }

    /// SQL Server ignores the port when a named instance is configured.
    pub fn effective_port(&self) -> Option<u16> {
        if self.client == ClientKind::MsSql && self.instance_name().is_some() {
            return None;
        }
        Some(self.port.unwrap_or_else(|| self.client.default_port()))
    }

    pub fn instance_name(&self) -> Option<&str> {
        self.instance_name.as_deref().filter(|s| !s.trim().is_empty())
    }

    pub fn database(&self) -> &str {
        self.database.as_deref().unwrap_or("")
    }

    pub fn user(&self) -> &str {
        self.user.as_deref().unwrap_or("")
    }

    pub fn password(&self) -> &str {
        self.password.as_deref().unwrap_or("")
    }

    /// Connect string used by the Oracle client; built from host/port/database when not given.
    pub fn oracle_connect_string(&self) -> String {
        if let Some(cs) = self.connect_string.as_deref().filter(|s| !s.is_empty()) {
            return cs.to_string();
        }
        format!(
            "{}:{}/{}",
            self.host(),
            self.port.unwrap_or(1521),
            self.database.as_deref().filter(|s| !s.is_empty()).unwrap_or("XE")
        )
    }

    pub fn display_name(&self, fallback: &str) -> String {
        self.display_name
            .clone()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| fallback.to_string())
    }

    /// Target description safe for logs.
    pub fn describe(&self) -> String {
        match self.client {
            ClientKind::Oracle => format!("{}@{}", self.user(), self.oracle_connect_string()),
            _ => match (self.instance_name(), self.effective_port()) {
                (Some(instance), _) => {
                    format!("{}@{}\\{}/{}", self.user(), self.host(), instance, self.database())
                }
                (None, Some(port)) => {
                    format!("{}@{}:{}/{}", self.user(), self.host(), port, self.database())
                }
                (None, None) => format!("{}@{}/{}", self.user(), self.host(), self.database()),
            },
        }
    }

    pub fn apply(&self, update: &ConnectionOverride) -> ConnectionProfile {
        let mut profile = self.clone();
        if let Some(client) = update.client {
            profile.client = client;
        }
        if update.display_name.is_some() {
            profile.display_name = update.display_name.clone();
        }
        if update.host.is_some() {
            profile.host = update.host.clone();
        }
        if update.port.is_some() {
            profile.port = update.port;
        }
        if update.database.is_some() {
            profile.database = update.database.clone();
        }
        if update.user.is_some() {
            profile.user = update.user.clone();
        }
        if update.password.is_some() {
            profile.password = update.password.clone();
        }
        if update.connect_string.is_some() {
            profile.connect_string = update.connect_string.clone();
        }
        if let Some(instance) = update.instance_name() {
            profile.instance_name = Some(instance.to_string());
        }
        if let Some(options) = &update.options {
            if let Some(encrypt) = options.encrypt {
                profile.encrypt = encrypt;
            }
            if let Some(trust) = options.trust_server_certificate {
                profile.trust_server_certificate = trust;
            }
        }
        profile
    }

    pub fn summary(&self, name: &str) -> ProfileSummary {
        ProfileSummary {
            client: self.client,
            display_name: self.display_name(name),
            connection: ConnectionDetails {
                host: self.host.clone(),
                port: self.port,
                database: self.database.clone(),
                user: self.user.clone(),
                instance_name: self.instance_name.clone(),
                connect_string: self.connect_string.clone(),
                encrypt: self.encrypt,
                trust_server_certificate: self.trust_server_certificate,
                has_password: !self.password().is_empty(),
            },
        }
    }
}

/// Driver options nested under `options` in update requests.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionOptions {
    pub encrypt: Option<bool>,
    pub trust_server_certificate: Option<bool>,
    pub instance_name: Option<String>,
}

/// Session-scoped changes to a profile, as posted by the settings screen.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionOverride {
    pub client: Option<ClientKind>,
    pub display_name: Option<String>,
    #[serde(alias = "server")]
    pub host: Option<String>,
    #[serde(default, deserialize_with = "lenient_port")]
    pub port: Option<u16>,
    pub database: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub instance_name: Option<String>,
    pub connect_string: Option<String>,
    pub options: Option<ConnectionOptions>,
}

impl ConnectionOverride {
    fn instance_name(&self) -> Option<&str> {
        self.instance_name
            .as_deref()
            .or_else(|| self.options.as_ref().and_then(|o| o.instance_name.as_deref()))
    }

    /// Build a standalone profile, e.g. for a connection that exists only in the session.
    pub fn into_profile(self) -> Result<ConnectionProfile, AppError> {
        let client = self
            .client
            .ok_or_else(|| AppError::Validation("Connection client is required".to_string()))?;
        Ok(ConnectionProfile::new(client).apply(&self))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateConnectionRequest {
    pub name: String,
    pub config: ConnectionOverride,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestConnectionByNameRequest {
    #[serde(alias = "name")]
    pub connection_name: String,
}

/// Listing entry with the password withheld.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileSummary {
    pub client: ClientKind,
    pub display_name: String,
    pub connection: ConnectionDetails,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionDetails {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database: Option<String>,
    pub user: Option<String>,
    pub instance_name: Option<String>,
    pub connect_string: Option<String>,
    pub encrypt: bool,
    pub trust_server_certificate: bool,
    pub has_password: bool,
}

/// Ports arrive as numbers from config files and sometimes as strings from form posts.
fn lenient_port<'de, D>(deserializer: D) -> Result<Option<u16>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum PortValue {
        Number(u64),
        Text(String),
    }

    match Option::<PortValue>::deserialize(deserializer)? {
        None => Ok(None),
        Some(PortValue::Number(n)) => u16::try_from(n)
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("port out of range: {}", n))),
        Some(PortValue::Text(s)) if s.trim().is_empty() => Ok(None),
        Some(PortValue::Text(s)) => s
            .trim()
            .parse::<u16>()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid port: {}", s))),
    }
}

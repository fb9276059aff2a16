use serde::Deserialize;
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub connections: ConnectionsConfig,
    pub query: QueryConfig,
    pub pool: PoolConfig,
    pub demo: DemoConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Directory holding the built frontend, served for non-API paths
    pub static_dir: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub style: String,
    pub dir: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionsConfig {
    /// TOML file with `[connections.<name>]` profiles. Built-in profiles are used when absent.
    pub file: String,
    pub default: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueryConfig {
    pub timeout_secs: u64,
    /// Reject non-SELECT statements on the raw query endpoint
    pub read_only: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PoolConfig {
    pub max_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DemoConfig {
    pub slow_queries: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        // Try to load from .env file
        let _ = dotenv::dotenv();

        let mut builder = config::Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3001)?
            .set_default("server.static_dir", "dist")?
            .set_default("logging.level", "info")?
            .set_default("logging.style", "auto")?
            .set_default("logging.dir", "logs")?
            .set_default("connections.file", "connections.toml")?
            .set_default("connections.default", "production_mssql")?
            .set_default("query.timeout_secs", 30)?
            .set_default("query.read_only", false)?
            .set_default("pool.max_size", (num_cpus::get() * 4) as i64)?
            .set_default("demo.slow_queries", false)?;

        if let Ok(host) = env::var("HOST") {
            builder = builder.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            builder = builder.set_override("server.port", port.parse::<u16>().unwrap_or(3001))?;
        }

        if let Ok(static_dir) = env::var("STATIC_DIR") {
            builder = builder.set_override("server.static_dir", static_dir)?;
        }

        if let Ok(log_level) = env::var("RUST_LOG") {
            builder = builder.set_override("logging.level", log_level)?;
        }

        if let Ok(log_style) = env::var("RUST_LOG_STYLE") {
            builder = builder.set_override("logging.style", log_style)?;
        }

        if let Ok(log_dir) = env::var("LOG_DIR") {
            builder = builder.set_override("logging.dir", log_dir)?;
        }

        if let Ok(file) = env::var("CONNECTIONS_FILE") {
            builder = builder.set_override("connections.file", file)?;
        }

        if let Ok(default) = env::var("DEFAULT_CONNECTION") {
            builder = builder.set_override("connections.default", default)?;
        }

        if let Ok(timeout) = env::var("QUERY_TIMEOUT_SECS") {
            builder = builder.set_override("query.timeout_secs", timeout.parse::<u64>().unwrap_or(30))?;
        }

        if let Ok(read_only) = env::var("QUERY_READ_ONLY") {
            builder = builder.set_override("query.read_only", parse_flag(&read_only))?;
        }

        if let Ok(max_size) = env::var("POOL_MAX_SIZE") {
            if let Ok(max_size) = max_size.parse::<i64>() {
                builder = builder.set_override("pool.max_size", max_size)?;
            }
        }

        if let Ok(slow) = env::var("DEMO_SLOW_QUERIES") {
            builder = builder.set_override("demo.slow_queries", parse_flag(&slow))?;
        }

        builder.build()?.try_deserialize()
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn connections_file(&self) -> PathBuf {
        PathBuf::from(&self.connections.file)
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        env::remove_var("HOST");
        env::remove_var("PORT");
        env::remove_var("DEFAULT_CONNECTION");

        let config = Config::from_env();
        assert!(config.is_ok());

        let config = config.unwrap();
        assert_eq!(config.server.port, 3001);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.connections.default, "production_mssql");
        assert!(config.pool.max_size >= 4);
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("true"));
        assert!(parse_flag("1"));
        assert!(parse_flag(" TRUE "));
        assert!(!parse_flag("false"));
        assert!(!parse_flag(""));
    }
}

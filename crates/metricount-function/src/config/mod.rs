//! Function config loader.
//!
//! Connection parameters come from the environment and are mandatory; the
//! optional YAML file only carries tunables and is parsed strictly.

pub mod credentials;
pub mod schema;

use std::fs;
use std::time::Duration;

use metricount_core::error::{MetricError, Result};

use crate::db::TableName;

pub use credentials::ServiceAccountKey;
pub use schema::{ConnectionConfig, FileConfig, FunctionConfig, FunctionSection, RetrySection};

pub const ENV_ENDPOINT: &str = "endpoint";
pub const ENV_DATABASE: &str = "database";
pub const ENV_CREDENTIALS: &str = "METRICOUNT_CREDENTIALS";
pub const ENV_CONFIG: &str = "METRICOUNT_CONFIG";
pub const ENV_BACKEND_VERSION: &str = "BACKEND_VERSION";

const DEFAULT_CREDENTIALS_PATH: &str = "auth.sa";

pub fn load_from_file(path: &str) -> Result<FileConfig> {
    let s = fs::read_to_string(path)
        .map_err(|e| MetricError::Config(format!("read config {path} failed: {e}")))?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<FileConfig> {
    let cfg: FileConfig = serde_yaml::from_str(s)
        .map_err(|e| MetricError::Config(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Build the config from the process environment.
pub fn from_env() -> Result<FunctionConfig> {
    from_lookup(|key| std::env::var(key).ok())
}

/// Build the config from an arbitrary variable source.
pub fn from_lookup<F>(lookup: F) -> Result<FunctionConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let file = match lookup(ENV_CONFIG) {
        Some(path) => load_from_file(&path)?,
        None => FileConfig::default(),
    };

    let required = |key: &str| {
        lookup(key).filter(|v| !v.trim().is_empty()).ok_or_else(|| {
            MetricError::Config(format!(
                "missing required environment variables '{ENV_ENDPOINT}' or '{ENV_DATABASE}' (no {key})"
            ))
        })
    };
    let endpoint = required(ENV_ENDPOINT)?;
    let database = required(ENV_DATABASE)?;

    let credentials_path =
        lookup(ENV_CREDENTIALS).unwrap_or_else(|| DEFAULT_CREDENTIALS_PATH.to_string());
    let credentials = ServiceAccountKey::from_file(&credentials_path)?;

    Ok(FunctionConfig {
        connection: ConnectionConfig {
            endpoint,
            database,
            credentials,
            ready_timeout: Duration::from_millis(file.function.ready_timeout_ms),
        },
        table: TableName::parse(&file.function.table)?,
        listen: file.function.listen.clone(),
        retry: file.retry.policy(),
        backend_version: lookup(ENV_BACKEND_VERSION).unwrap_or_else(|| "default".into()),
    })
}

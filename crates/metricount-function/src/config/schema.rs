use std::time::Duration;

use serde::Deserialize;
use metricount_core::error::{MetricError, Result};

use crate::config::credentials::ServiceAccountKey;
use crate::db::{RetryPolicy, TableName};

/// Optional tunables file (`METRICOUNT_CONFIG`).
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub version: u32,

    #[serde(default)]
    pub function: FunctionSection,

    #[serde(default)]
    pub retry: RetrySection,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            version: 1,
            function: FunctionSection::default(),
            retry: RetrySection::default(),
        }
    }
}

impl FileConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(MetricError::Config(format!(
                "unsupported config version {}",
                self.version
            )));
        }
        self.function.validate()?;
        self.retry.validate()?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FunctionSection {
    #[serde(default = "default_table")]
    pub table: String,

    #[serde(default = "default_listen")]
    pub listen: String,

    #[serde(default = "default_ready_timeout_ms")]
    pub ready_timeout_ms: u64,
}

impl Default for FunctionSection {
    fn default() -> Self {
        Self {
            table: default_table(),
            listen: default_listen(),
            ready_timeout_ms: default_ready_timeout_ms(),
        }
    }
}

impl FunctionSection {
    pub fn validate(&self) -> Result<()> {
        TableName::parse(&self.table)?;
        if !(1000..=60000).contains(&self.ready_timeout_ms) {
            return Err(MetricError::Config(
                "function.ready_timeout_ms must be between 1000 and 60000".into(),
            ));
        }
        Ok(())
    }
}

fn default_table() -> String {
    "metrics".into()
}
fn default_listen() -> String {
    "0.0.0.0:8080".into()
}
fn default_ready_timeout_ms() -> u64 {
    5000
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetrySection {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_backoff_ms: default_base_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl RetrySection {
    pub fn validate(&self) -> Result<()> {
        if self.max_retries > 100 {
            return Err(MetricError::Config(
                "retry.max_retries must be at most 100".into(),
            ));
        }
        if self.base_backoff_ms > self.max_backoff_ms {
            return Err(MetricError::Config(
                "retry.base_backoff_ms must not exceed retry.max_backoff_ms".into(),
            ));
        }
        Ok(())
    }

    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_backoff: Duration::from_millis(self.base_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
        }
    }
}

fn default_max_retries() -> u32 {
    10
}
fn default_base_backoff_ms() -> u64 {
    10
}
fn default_max_backoff_ms() -> u64 {
    1000
}

/// Where and how to reach the database.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub endpoint: String,
    pub database: String,
    pub credentials: ServiceAccountKey,
    /// Bounded wait for the driver to become ready.
    pub ready_timeout: Duration,
}

/// Everything the function needs, resolved once at process start.
#[derive(Debug, Clone)]
pub struct FunctionConfig {
    pub connection: ConnectionConfig,
    pub table: TableName,
    pub listen: String,
    pub retry: RetryPolicy,
    /// Carried into log spans only.
    pub backend_version: String,
}

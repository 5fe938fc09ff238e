//! Service account key file (`auth.sa`).

use std::fmt;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use metricount_core::error::{MetricError, Result};

/// Authorized key issued for a service account.
///
/// Only the fields needed to sign token requests are kept; the rest of the
/// file (`created_at`, `public_key`, ...) is ignored.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub id: String,
    pub service_account_id: String,
    #[serde(default)]
    pub key_algorithm: Option<String>,
    pub private_key: String,
}

impl ServiceAccountKey {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let s = fs::read_to_string(path).map_err(|e| {
            MetricError::Config(format!("read credentials {} failed: {e}", path.display()))
        })?;
        Self::from_json(&s)
    }

    pub fn from_json(s: &str) -> Result<Self> {
        let key: ServiceAccountKey = serde_json::from_str(s)
            .map_err(|e| MetricError::Config(format!("invalid credentials file: {e}")))?;
        key.validate()?;
        Ok(key)
    }

    fn validate(&self) -> Result<()> {
        for (field, v) in [
            ("id", &self.id),
            ("service_account_id", &self.service_account_id),
            ("private_key", &self.private_key),
        ] {
            if v.trim().is_empty() {
                return Err(MetricError::Config(format!(
                    "credentials field {field} must not be empty"
                )));
            }
        }
        Ok(())
    }
}

impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("id", &self.id)
            .field("service_account_id", &self.service_account_id)
            .field("key_algorithm", &self.key_algorithm)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

//! Invocation envelope (JSON).
//!
//! The function runtime hands the handler a loosely-typed record; only the
//! three fields below are meaningful here, everything else is ignored. A field
//! of an unexpected JSON type never fails decoding: `MODE` and `httpMethod`
//! just stop matching, and `body` is rejected later on the upsert path.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{MetricError, Result};
use crate::protocol::metric::MetricName;

/// `MODE` value that switches the invocation into schema creation.
pub const MODE_INIT: &str = "init";

/// Function invocation record.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Event {
    /// `"init"` triggers schema creation and every other field is ignored.
    #[serde(
        rename = "MODE",
        default,
        deserialize_with = "string_or_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub mode: Option<String>,
    #[serde(
        rename = "httpMethod",
        default,
        deserialize_with = "string_or_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub http_method: Option<String>,
    /// JSON-encoded object carrying `metricName`. Kept as a raw value so a
    /// mistyped body only matters when it is actually read.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

/// Strings pass through; any other JSON type reads as absent.
fn string_or_none<'de, D>(de: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(de)? {
        Value::String(s) => Some(s),
        _ => None,
    })
}

impl Event {
    /// Convenience constructor for a POST with the given raw body.
    pub fn post(body: impl Into<String>) -> Self {
        Self {
            mode: None,
            http_method: Some("POST".into()),
            body: Some(Value::String(body.into())),
        }
    }

    pub fn init() -> Self {
        Self {
            mode: Some(MODE_INIT.into()),
            ..Self::default()
        }
    }

    pub fn is_init(&self) -> bool {
        self.mode.as_deref() == Some(MODE_INIT)
    }

    /// Validate an upsert invocation and extract the metric name.
    ///
    /// Order matters: the method is checked before the body is looked at, so a
    /// GET with garbage in the body is still a 405.
    pub fn metric_name(&self) -> Result<MetricName> {
        if self.http_method.as_deref() != Some("POST") {
            return Err(MetricError::MethodNotAllowed(
                self.http_method.clone().unwrap_or_else(|| "<none>".into()),
            ));
        }

        let raw = match &self.body {
            None | Some(Value::Null) => "{}",
            Some(Value::String(b)) if b.trim().is_empty() => "{}",
            Some(Value::String(b)) => b.as_str(),
            Some(_) => {
                return Err(MetricError::BadRequest(
                    "body must be a JSON-encoded string".into(),
                ))
            }
        };
        let body: Value = serde_json::from_str(raw)
            .map_err(|e| MetricError::BadRequest(format!("invalid json body: {e}")))?;

        match body.get("metricName") {
            Some(Value::String(name)) => MetricName::parse(name),
            _ => Err(MetricError::BadRequest(
                "metricName is required and must be a string".into(),
            )),
        }
    }
}

/// Response envelope returned to the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Response {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    /// JSON-encoded object or a raw string.
    pub body: String,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
}

impl Response {
    pub fn json<T: Serialize>(status_code: u16, body: &T) -> Self {
        let body = serde_json::to_string(body)
            .unwrap_or_else(|e| format!(r#"{{"error":"response encoding failed: {e}"}}"#));
        Self { status_code, body }
    }

    pub fn text(status_code: u16, body: impl Into<String>) -> Self {
        Self {
            status_code,
            body: body.into(),
        }
    }

    /// Render an error the way callers expect to see it.
    ///
    /// 400 carries the bare validation message, 405 is a raw string, anything
    /// else is a 500 with the full error description.
    pub fn from_error(err: &MetricError) -> Self {
        match err {
            MetricError::BadRequest(msg) => Self::json(400, &ErrorBody { error: msg }),
            MetricError::MethodNotAllowed(_) => Self::text(405, "Method Not Allowed"),
            other => Self::json(
                other.client_code().http_status(),
                &ErrorBody {
                    error: &other.to_string(),
                },
            ),
        }
    }
}

//! Metric counter model.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{MetricError, Result};
use crate::protocol::event::Response;

/// Maximum metric name length, in characters.
pub const MAX_METRIC_NAME_LEN: usize = 255;

/// A metric name that passed validation (1..=255 characters).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct MetricName(String);

impl MetricName {
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.is_empty() {
            return Err(MetricError::BadRequest(
                "metricName is required and must be a string".into(),
            ));
        }
        if raw.chars().count() > MAX_METRIC_NAME_LEN {
            return Err(MetricError::BadRequest("metricName too long".into()));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MetricName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One row of the metrics table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricCounter {
    #[serde(rename = "metricName")]
    pub metric_name: MetricName,
    pub count: u64,
    pub creation_time: DateTime<Utc>,
}

impl MetricCounter {
    /// Fresh row as written by the insert path.
    pub fn first(metric_name: MetricName, creation_time: DateTime<Utc>) -> Self {
        Self {
            metric_name,
            count: 1,
            creation_time,
        }
    }

    /// Same row with `count + 1`; `creation_time` is carried over untouched.
    pub fn incremented(&self) -> Result<Self> {
        let count = self.count.checked_add(1).ok_or_else(|| {
            MetricError::Internal(format!("counter overflow for metric {}", self.metric_name))
        })?;
        Ok(Self {
            metric_name: self.metric_name.clone(),
            count,
            creation_time: self.creation_time,
        })
    }
}

/// Which branch of the upsert committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// No row existed; one was inserted with `count = 1`.
    Created(MetricName),
    /// An existing row was bumped by one. The new value is not re-read.
    Incremented(MetricName),
}

impl UpsertOutcome {
    pub fn kind(&self) -> &'static str {
        match self {
            UpsertOutcome::Created(_) => "created",
            UpsertOutcome::Incremented(_) => "incremented",
        }
    }

    pub fn metric(&self) -> &MetricName {
        match self {
            UpsertOutcome::Created(m) | UpsertOutcome::Incremented(m) => m,
        }
    }

    pub fn into_response(self) -> Response {
        let (status, count) = match &self {
            UpsertOutcome::Created(_) => (201, Some(1)),
            UpsertOutcome::Incremented(_) => (200, None),
        };
        Response::json(
            status,
            &OutcomeBody {
                status: self.kind(),
                metric: self.metric().as_str(),
                count,
            },
        )
    }
}

// Field order is the wire order.
#[derive(Serialize)]
struct OutcomeBody<'a> {
    status: &'a str,
    metric: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    count: Option<u64>,
}

//! Protocol modules (invocation envelope + metric model).
//!
//! - `event`: the function invocation record and the response envelope.
//! - `metric`: the validated metric name, the counter row, and upsert outcomes.
//!
//! All parsers are panic-free: malformed invocations are reported as
//! `MetricError` so the handler can answer with a 4xx envelope.

pub mod event;
pub mod metric;

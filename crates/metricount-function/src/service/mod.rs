//! Function logic: schema creation, the upsert transaction, and the
//! invocation handler that ties them to a database connection.

pub mod handler;
pub mod schema_init;
pub mod upsert;

pub use handler::MetricCounterService;
pub use schema_init::{create_table, SCHEMA_CREATED};
pub use upsert::upsert_metric;

//! Table creation (`MODE=init`).

use metricount_core::error::Result;

use crate::db::{Session, TableName, TableSchema};

/// Body returned to the caller once the table exists.
pub const SCHEMA_CREATED: &str = "Schema created successfully";

/// Create the counter table if it does not exist yet. An existing table with
/// a different definition is a scheme error.
pub async fn create_table(session: &dyn Session, table: &TableName) -> Result<()> {
    let schema = TableSchema::metrics(table.clone());
    tracing::debug!(yql = %schema.to_yql(), "executing scheme query");
    session.execute_scheme(&schema).await?;
    tracing::info!(%table, "table ready");
    Ok(())
}

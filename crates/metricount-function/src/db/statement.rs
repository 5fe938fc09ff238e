//! Typed schema and data statements.
//!
//! Each value renders the YQL text a query-language driver would send, and the
//! embedded engine interprets the same value structurally.

use std::fmt;

use metricount_core::error::{MetricError, Result};
use metricount_core::protocol::metric::MetricName;

pub const COL_METRIC_NAME: &str = "metricName";
pub const COL_COUNT: &str = "count";
pub const COL_CREATION_TIME: &str = "creation_time";

/// Validated table identifier (may contain `/` for nested directories).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableName(String);

impl TableName {
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.is_empty() || raw.len() > 255 {
            return Err(MetricError::Config(
                "table name must be 1..=255 characters".into(),
            ));
        }
        if let Some(bad) = raw
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '/')))
        {
            return Err(MetricError::Config(format!(
                "table name {raw:?} contains invalid character {bad:?}"
            )));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Uint64,
    Timestamp,
}

impl ColumnType {
    pub fn yql(self) -> &'static str {
        match self {
            ColumnType::Text => "Text",
            ColumnType::Uint64 => "Uint64",
            ColumnType::Timestamp => "Timestamp",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub ty: ColumnType,
}

/// Storage hint: split partitions once they outgrow `partition_size_mb`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitioningPolicy {
    pub auto_by_size: bool,
    pub partition_size_mb: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub table: TableName,
    pub columns: Vec<Column>,
    pub primary_key: Vec<&'static str>,
    pub partitioning: PartitioningPolicy,
}

impl TableSchema {
    /// The counter table: one row per metric name.
    pub fn metrics(table: TableName) -> Self {
        Self {
            table,
            columns: vec![
                Column { name: COL_METRIC_NAME, ty: ColumnType::Text },
                Column { name: COL_COUNT, ty: ColumnType::Uint64 },
                Column { name: COL_CREATION_TIME, ty: ColumnType::Timestamp },
            ],
            primary_key: vec![COL_METRIC_NAME],
            partitioning: PartitioningPolicy {
                auto_by_size: true,
                partition_size_mb: 1024,
            },
        }
    }

    pub fn to_yql(&self) -> String {
        let mut out = format!("CREATE TABLE `{}` (\n", self.table);
        for c in &self.columns {
            out.push_str(&format!("    {} {},\n", c.name, c.ty.yql()));
        }
        out.push_str(&format!("    PRIMARY KEY ({})\n)\n", self.primary_key.join(", ")));
        out.push_str(&format!(
            "WITH (\n    AUTO_PARTITIONING_BY_SIZE = {},\n    AUTO_PARTITIONING_PARTITION_SIZE_MB = {}\n);",
            if self.partitioning.auto_by_size { "ENABLED" } else { "DISABLED" },
            self.partitioning.partition_size_mb
        ));
        out
    }
}

/// Data statements issued by the upsert transaction, bound to `$metric`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    /// Point read of the current count.
    SelectCount { table: TableName, metric: MetricName },
    /// `count = count + 1` on an existing row.
    IncrementCount { table: TableName, metric: MetricName },
    /// New row with `count = 1` and a server-assigned creation time.
    InsertCounter { table: TableName, metric: MetricName },
}

impl Statement {
    pub fn table(&self) -> &TableName {
        match self {
            Statement::SelectCount { table, .. }
            | Statement::IncrementCount { table, .. }
            | Statement::InsertCounter { table, .. } => table,
        }
    }

    pub fn metric(&self) -> &MetricName {
        match self {
            Statement::SelectCount { metric, .. }
            | Statement::IncrementCount { metric, .. }
            | Statement::InsertCounter { metric, .. } => metric,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Statement::SelectCount { .. } => "select",
            Statement::IncrementCount { .. } => "update",
            Statement::InsertCounter { .. } => "insert",
        }
    }

    pub fn to_yql(&self) -> String {
        let body = match self {
            Statement::SelectCount { table, .. } => format!(
                "SELECT {COL_COUNT} FROM `{table}` WHERE {COL_METRIC_NAME} = $metric;"
            ),
            Statement::IncrementCount { table, .. } => format!(
                "UPDATE `{table}` SET {COL_COUNT} = {COL_COUNT} + 1 WHERE {COL_METRIC_NAME} = $metric;"
            ),
            Statement::InsertCounter { table, .. } => format!(
                "INSERT INTO `{table}` ({COL_METRIC_NAME}, {COL_COUNT}, {COL_CREATION_TIME}) \
                 VALUES ($metric, 1, CurrentUtcTimestamp());"
            ),
        };
        format!("DECLARE $metric AS Text;\n{body}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountRow {
    pub count: u64,
}

/// Rows returned by a data statement. Writes return an empty set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultSet {
    pub rows: Vec<CountRow>,
}

impl ResultSet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

//! Embedded transactional engine.
//!
//! Implements the driver contracts in-process with serializable optimistic
//! concurrency control:
//!
//! - Every committed row carries a version.
//! - A transaction records the version (or absence) of each key it reads and
//!   buffers its writes privately.
//! - Commit re-validates the whole read set under the table lock. If any key
//!   changed since it was read, the transaction is aborted with
//!   `MetricError::Conflict`; otherwise its writes are applied atomically.
//!
//! Validation and apply happen in one critical section, so the committed
//! history is equivalent to running transactions one at a time in commit
//! order. A losing transaction is safe to re-run from scratch.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::Mutex;

use metricount_core::error::{MetricError, Result};
use metricount_core::protocol::metric::{MetricCounter, MetricName};

use crate::config::ConnectionConfig;
use crate::db::driver::{Connector, Driver, Session, Transaction, TxMode};
use crate::db::statement::{CountRow, ResultSet, Statement, TableName, TableSchema};

type TxId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransactionStatus {
    Active,
    Committed,
    Aborted,
}

struct VersionedRow {
    version: u64,
    row: MetricCounter,
}

struct TableState {
    schema: TableSchema,
    rows: HashMap<MetricName, VersionedRow>,
}

/// Counters exposed for tests and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EngineStats {
    pub connects: u64,
    pub stops: u64,
    pub sessions: u64,
    pub commits: u64,
    pub conflicts: u64,
    pub rollbacks: u64,
}

#[derive(Default)]
struct StatCells {
    connects: AtomicU64,
    stops: AtomicU64,
    sessions: AtomicU64,
    commits: AtomicU64,
    conflicts: AtomicU64,
    rollbacks: AtomicU64,
}

/// One database: a set of tables plus fault injection knobs.
pub struct MemoryEngine {
    database: String,
    tables: Mutex<HashMap<TableName, TableState>>,
    next_txid: AtomicU64,
    next_version: AtomicU64,
    fail_sessions: AtomicU32,
    fail_commits: AtomicU32,
    stats: StatCells,
}

impl MemoryEngine {
    pub fn new(database: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            database: database.into(),
            tables: Mutex::new(HashMap::new()),
            next_txid: AtomicU64::new(1),
            next_version: AtomicU64::new(1),
            fail_sessions: AtomicU32::new(0),
            fail_commits: AtomicU32::new(0),
            stats: StatCells::default(),
        })
    }

    /// Make the next `n` session requests fail with `Unavailable`.
    pub fn inject_unavailable(&self, n: u32) {
        self.fail_sessions.fetch_add(n, Ordering::SeqCst);
    }

    /// Make the next `n` commits fail with `Conflict`.
    pub fn inject_conflicts(&self, n: u32) {
        self.fail_commits.fetch_add(n, Ordering::SeqCst);
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            connects: self.stats.connects.load(Ordering::SeqCst),
            stops: self.stats.stops.load(Ordering::SeqCst),
            sessions: self.stats.sessions.load(Ordering::SeqCst),
            commits: self.stats.commits.load(Ordering::SeqCst),
            conflicts: self.stats.conflicts.load(Ordering::SeqCst),
            rollbacks: self.stats.rollbacks.load(Ordering::SeqCst),
        }
    }

    /// Committed row for `metric`, if any.
    pub async fn row(&self, table: &TableName, metric: &MetricName) -> Option<MetricCounter> {
        let tables = self.tables.lock().await;
        tables
            .get(table)
            .and_then(|t| t.rows.get(metric))
            .map(|r| r.row.clone())
    }

    pub async fn row_count(&self, table: &TableName) -> Option<usize> {
        let tables = self.tables.lock().await;
        tables.get(table).map(|t| t.rows.len())
    }

    pub async fn table_schema(&self, table: &TableName) -> Option<TableSchema> {
        let tables = self.tables.lock().await;
        tables.get(table).map(|t| t.schema.clone())
    }

    fn take_fault(cell: &AtomicU32) -> bool {
        cell.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn missing_table(&self, table: &TableName) -> MetricError {
        MetricError::SchemeError(format!(
            "table {table} not found in database {}",
            self.database
        ))
    }
}

/// Hands out drivers bound to one engine per database name.
#[derive(Default)]
pub struct MemoryConnector {
    engines: DashMap<String, Arc<MemoryEngine>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self {
            engines: DashMap::new(),
        }
    }

    /// The engine serving `database`, created on first use.
    pub fn engine(&self, database: &str) -> Arc<MemoryEngine> {
        self.engines
            .entry(database.to_string())
            .or_insert_with(|| MemoryEngine::new(database))
            .value()
            .clone()
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, cfg: &ConnectionConfig) -> Result<Box<dyn Driver>> {
        let engine = self.engine(&cfg.database);
        engine.stats.connects.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(endpoint = %cfg.endpoint, database = %cfg.database, "embedded driver connected");
        Ok(Box::new(MemoryDriver {
            engine,
            stopped: AtomicBool::new(false),
        }))
    }
}

pub struct MemoryDriver {
    engine: Arc<MemoryEngine>,
    stopped: AtomicBool,
}

#[async_trait]
impl Driver for MemoryDriver {
    async fn wait_ready(&self, _timeout: Duration) -> Result<()> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(MetricError::Unavailable("driver stopped".into()));
        }
        Ok(())
    }

    async fn session(&self) -> Result<Box<dyn Session>> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(MetricError::Unavailable("driver stopped".into()));
        }
        if MemoryEngine::take_fault(&self.engine.fail_sessions) {
            return Err(MetricError::Unavailable(format!(
                "database {} temporarily unreachable",
                self.engine.database
            )));
        }
        self.engine.stats.sessions.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemorySession {
            engine: Arc::clone(&self.engine),
        }))
    }

    async fn stop(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            self.engine.stats.stops.fetch_add(1, Ordering::SeqCst);
        }
    }
}

pub struct MemorySession {
    engine: Arc<MemoryEngine>,
}

#[async_trait]
impl Session for MemorySession {
    /// `CREATE TABLE`; an existing table with the same definition is accepted.
    async fn execute_scheme(&self, schema: &TableSchema) -> Result<()> {
        let mut tables = self.engine.tables.lock().await;
        if let Some(existing) = tables.get(&schema.table) {
            if existing.schema == *schema {
                tracing::debug!(table = %schema.table, "table already exists with the requested schema");
                return Ok(());
            }
            return Err(MetricError::SchemeError(format!(
                "table {} already exists in database {} with a different schema",
                schema.table, self.engine.database
            )));
        }
        tables.insert(
            schema.table.clone(),
            TableState {
                schema: schema.clone(),
                rows: HashMap::new(),
            },
        );
        Ok(())
    }

    async fn begin(&self, mode: TxMode) -> Result<Box<dyn Transaction>> {
        let id = self.engine.next_txid.fetch_add(1, Ordering::SeqCst);
        tracing::trace!(tx = id, ?mode, "begin transaction");
        Ok(Box::new(MemoryTransaction {
            engine: Arc::clone(&self.engine),
            id,
            status: TransactionStatus::Active,
            reads: HashMap::new(),
            writes: HashMap::new(),
        }))
    }
}

type RowKey = (TableName, MetricName);

pub struct MemoryTransaction {
    engine: Arc<MemoryEngine>,
    id: TxId,
    status: TransactionStatus,
    /// Version observed at first read; `None` means the row was absent.
    reads: HashMap<RowKey, Option<u64>>,
    /// Private workspace of uncommitted rows.
    writes: HashMap<RowKey, MetricCounter>,
}

impl MemoryTransaction {
    fn ensure_active(&self) -> Result<()> {
        if self.status != TransactionStatus::Active {
            return Err(MetricError::Internal(format!(
                "transaction {} is {:?}",
                self.id, self.status
            )));
        }
        Ok(())
    }

    /// Current view of a row (own write first, then committed state), with the
    /// committed version recorded in the read set.
    async fn read(&mut self, table: &TableName, metric: &MetricName) -> Result<Option<MetricCounter>> {
        let key = (table.clone(), metric.clone());
        let tables = self.engine.tables.lock().await;
        let state = tables
            .get(table)
            .ok_or_else(|| self.engine.missing_table(table))?;
        let committed = state.rows.get(metric);
        self.reads
            .entry(key.clone())
            .or_insert_with(|| committed.map(|r| r.version));

        if let Some(own) = self.writes.get(&key) {
            return Ok(Some(own.clone()));
        }
        Ok(committed.map(|r| r.row.clone()))
    }

    fn abort(&mut self) {
        self.status = TransactionStatus::Aborted;
        self.reads.clear();
        self.writes.clear();
    }
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn execute(&mut self, stmt: &Statement) -> Result<ResultSet> {
        self.ensure_active()?;
        tracing::trace!(tx = self.id, kind = stmt.kind(), yql = %stmt.to_yql(), "executing statement");
        let table = stmt.table();
        let metric = stmt.metric();
        let current = self.read(table, metric).await?;

        match stmt {
            Statement::SelectCount { .. } => Ok(ResultSet {
                rows: current.map(|r| CountRow { count: r.count }).into_iter().collect(),
            }),
            Statement::IncrementCount { .. } => {
                // UPDATE with no matching row touches nothing.
                if let Some(row) = current {
                    let next = row.incremented()?;
                    self.writes.insert((table.clone(), metric.clone()), next);
                }
                Ok(ResultSet::empty())
            }
            Statement::InsertCounter { .. } => {
                if current.is_some() {
                    return Err(MetricError::Conflict(format!(
                        "row {metric} already exists in table {table}"
                    )));
                }
                let row = MetricCounter::first(metric.clone(), Utc::now());
                self.writes.insert((table.clone(), metric.clone()), row);
                Ok(ResultSet::empty())
            }
        }
    }

    async fn commit(&mut self) -> Result<()> {
        self.ensure_active()?;
        let engine = Arc::clone(&self.engine);

        if MemoryEngine::take_fault(&engine.fail_commits) {
            self.abort();
            engine.stats.conflicts.fetch_add(1, Ordering::SeqCst);
            return Err(MetricError::Conflict(format!(
                "transaction {} locks invalidated",
                self.id
            )));
        }

        let mut tables = engine.tables.lock().await;

        let stale = self.reads.iter().find_map(|((table, metric), observed)| {
            let current = tables
                .get(table)
                .and_then(|t| t.rows.get(metric))
                .map(|r| r.version);
            (current != *observed).then(|| {
                format!(
                    "transaction {} locks invalidated: row {metric} in {table} changed",
                    self.id
                )
            })
        });
        if let Some(msg) = stale {
            drop(tables);
            self.abort();
            engine.stats.conflicts.fetch_add(1, Ordering::SeqCst);
            return Err(MetricError::Conflict(msg));
        }

        for ((table, metric), row) in self.writes.drain() {
            let state = tables
                .get_mut(&table)
                .ok_or_else(|| engine.missing_table(&table))?;
            let version = engine.next_version.fetch_add(1, Ordering::SeqCst);
            state.rows.insert(metric, VersionedRow { version, row });
        }
        drop(tables);

        self.reads.clear();
        self.status = TransactionStatus::Committed;
        engine.stats.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.ensure_active()?;
        self.abort();
        self.engine.stats.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

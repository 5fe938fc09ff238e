//! Database client contracts.
//!
//! The function never talks to a concrete client directly: it asks a
//! `Connector` for a `Driver`, borrows `Session`s from it inside the retry
//! driver, and stops the driver before returning.

use std::time::Duration;

use async_trait::async_trait;
use metricount_core::error::Result;

use crate::config::ConnectionConfig;
use crate::db::statement::{ResultSet, Statement, TableSchema};

/// Transaction isolation requested by `Session::begin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxMode {
    /// Outcome equals some serial order of all committed transactions.
    SerializableReadWrite,
}

/// Opens drivers for a configured endpoint/database.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, cfg: &ConnectionConfig) -> Result<Box<dyn Driver>>;
}

/// A connected client. Must be stopped by whoever connected it.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Wait until the driver can serve sessions, at most `timeout`.
    async fn wait_ready(&self, timeout: Duration) -> Result<()>;
    /// Take a session from the pool.
    async fn session(&self) -> Result<Box<dyn Session>>;
    /// Release every resource held by the driver. Idempotent.
    async fn stop(&self);
}

#[async_trait]
pub trait Session: Send + Sync {
    async fn execute_scheme(&self, schema: &TableSchema) -> Result<()>;
    async fn begin(&self, mode: TxMode) -> Result<Box<dyn Transaction>>;
}

/// An open transaction. After `commit` or `rollback` every call fails.
#[async_trait]
pub trait Transaction: Send {
    async fn execute(&mut self, stmt: &Statement) -> Result<ResultSet>;
    async fn commit(&mut self) -> Result<()>;
    async fn rollback(&mut self) -> Result<()>;
}

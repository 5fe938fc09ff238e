//! Database layer: client contracts, typed statements, the retry driver, and
//! the embedded engine.

pub mod driver;
pub mod memory;
pub mod retry;
pub mod statement;

pub use driver::{Connector, Driver, Session, Transaction, TxMode};
pub use memory::{EngineStats, MemoryConnector, MemoryEngine};
pub use retry::{retry_operation, retry_operation_observed, RetryPolicy};
pub use statement::{ResultSet, Statement, TableName, TableSchema};

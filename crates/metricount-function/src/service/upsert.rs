//! Create-or-increment of one counter row.
//!
//! `Start -> ReadExisting -> {UpdateExisting | InsertNew} -> Committed | RolledBack`
//!
//! The whole sequence runs in one serializable read-write transaction. Two
//! callers racing on the same name cannot both commit a decision made on the
//! same read: the loser aborts with a conflict and the retry driver re-runs
//! this function from the read step.

use metricount_core::error::Result;
use metricount_core::protocol::metric::{MetricName, UpsertOutcome};

use crate::db::{Session, Statement, TableName, Transaction, TxMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UpsertState {
    ReadExisting,
    UpdateExisting,
    InsertNew,
    Committed,
    RolledBack,
}

/// Increment `metric`, creating its row with `count = 1` if absent.
///
/// On any failure the transaction is rolled back best-effort and the
/// original error is returned; a failing rollback is only logged.
pub async fn upsert_metric(
    session: &dyn Session,
    table: &TableName,
    metric: &MetricName,
) -> Result<UpsertOutcome> {
    let mut tx = session.begin(TxMode::SerializableReadWrite).await?;

    match run(tx.as_mut(), table, metric).await {
        Ok(outcome) => {
            tracing::trace!(%metric, state = ?UpsertState::Committed, "upsert finished");
            Ok(outcome)
        }
        Err(err) => {
            if let Err(rb) = tx.rollback().await {
                tracing::debug!(%metric, error = %rb, "rollback failed");
            }
            tracing::trace!(%metric, state = ?UpsertState::RolledBack, error = %err, "upsert finished");
            Err(err)
        }
    }
}

async fn run(
    tx: &mut dyn Transaction,
    table: &TableName,
    metric: &MetricName,
) -> Result<UpsertOutcome> {
    tracing::trace!(%metric, state = ?UpsertState::ReadExisting, "upsert step");
    let existing = tx
        .execute(&Statement::SelectCount {
            table: table.clone(),
            metric: metric.clone(),
        })
        .await?;

    if !existing.is_empty() {
        tracing::trace!(%metric, state = ?UpsertState::UpdateExisting, "upsert step");
        tx.execute(&Statement::IncrementCount {
            table: table.clone(),
            metric: metric.clone(),
        })
        .await?;
        // The new value is not re-read; that would cost another round trip.
        tx.commit().await?;
        return Ok(UpsertOutcome::Incremented(metric.clone()));
    }

    tracing::trace!(%metric, state = ?UpsertState::InsertNew, "upsert step");
    tx.execute(&Statement::InsertCounter {
        table: table.clone(),
        metric: metric.clone(),
    })
    .await?;
    tx.commit().await?;
    Ok(UpsertOutcome::Created(metric.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Connector, MemoryConnector, TableSchema};

    #[tokio::test]
    async fn insert_then_increment() {
        let connector = MemoryConnector::new();
        let engine = connector.engine("db");
        let cfg = crate::test_support::connection("db");
        let driver = connector.connect(&cfg).await.unwrap();
        let session = driver.session().await.unwrap();

        let table = TableName::parse("metrics").unwrap();
        session.execute_scheme(&TableSchema::metrics(table.clone())).await.unwrap();
        let metric = MetricName::parse("page_views").unwrap();

        let first = upsert_metric(session.as_ref(), &table, &metric).await.unwrap();
        assert_eq!(first, UpsertOutcome::Created(metric.clone()));
        let second = upsert_metric(session.as_ref(), &table, &metric).await.unwrap();
        assert_eq!(second, UpsertOutcome::Incremented(metric.clone()));

        let row = engine.row(&table, &metric).await.unwrap();
        assert_eq!(row.count, 2);
        driver.stop().await;
    }

    #[tokio::test]
    async fn failed_commit_is_not_rolled_back_twice() {
        let connector = MemoryConnector::new();
        let engine = connector.engine("db");
        let cfg = crate::test_support::connection("db");
        let driver = connector.connect(&cfg).await.unwrap();
        let session = driver.session().await.unwrap();

        let table = TableName::parse("metrics").unwrap();
        session.execute_scheme(&TableSchema::metrics(table.clone())).await.unwrap();
        let metric = MetricName::parse("signups").unwrap();

        engine.inject_conflicts(1);
        let err = upsert_metric(session.as_ref(), &table, &metric).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(engine.row(&table, &metric).await.is_none());
        // Commit already aborted the transaction; the rollback attempt fails quietly.
        assert_eq!(engine.stats().rollbacks, 0);
    }

    #[tokio::test]
    async fn missing_table_rolls_back() {
        let connector = MemoryConnector::new();
        let engine = connector.engine("db");
        let cfg = crate::test_support::connection("db");
        let driver = connector.connect(&cfg).await.unwrap();
        let session = driver.session().await.unwrap();

        let table = TableName::parse("metrics").unwrap();
        let metric = MetricName::parse("signups").unwrap();
        let err = upsert_metric(session.as_ref(), &table, &metric).await.unwrap_err();
        assert!(!err.is_retryable());
        assert_eq!(engine.stats().rollbacks, 1);
    }
}

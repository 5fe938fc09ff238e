//! Invocation handler.
//!
//! One invocation opens one driver, runs one retried operation, and stops the
//! driver before answering, whichever way the operation ended. Requests that
//! fail method or body validation never open a driver.

use std::sync::Arc;
use std::time::Instant;

use tracing::Instrument;

use metricount_core::error::{MetricError, Result};
use metricount_core::protocol::event::{Event, Response};
use metricount_core::protocol::metric::{MetricName, UpsertOutcome};

use crate::config::FunctionConfig;
use crate::db::{retry_operation_observed, Connector, Driver};
use crate::obs::FunctionMetrics;
use crate::service::schema_init::{create_table, SCHEMA_CREATED};
use crate::service::upsert::upsert_metric;

#[derive(Clone)]
pub struct MetricCounterService {
    cfg: Arc<FunctionConfig>,
    connector: Arc<dyn Connector>,
    metrics: Arc<FunctionMetrics>,
}

impl MetricCounterService {
    pub fn new(
        cfg: Arc<FunctionConfig>,
        connector: Arc<dyn Connector>,
        metrics: Arc<FunctionMetrics>,
    ) -> Self {
        Self {
            cfg,
            connector,
            metrics,
        }
    }

    pub fn cfg(&self) -> &FunctionConfig {
        &self.cfg
    }

    pub fn metrics(&self) -> Arc<FunctionMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Entry point: never fails, every error becomes a response envelope.
    pub async fn handle(&self, event: Event) -> Response {
        let mode = if event.is_init() { "init" } else { "upsert" };
        let span = tracing::info_span!(
            "invoke",
            mode,
            method = event.http_method.as_deref().unwrap_or("-"),
            backend_version = %self.cfg.backend_version,
        );

        let resp = async {
            let result = if event.is_init() {
                self.create_schema()
                    .await
                    .map(|()| Response::text(200, SCHEMA_CREATED))
            } else {
                match event.metric_name() {
                    Ok(metric) => self.upsert(&metric).await.map(UpsertOutcome::into_response),
                    Err(e) => Err(e),
                }
            };

            result.unwrap_or_else(|e| {
                self.metrics.errors.inc(&[("kind", e.kind())]);
                match e.client_code().http_status() {
                    500 => tracing::error!(error = %e, "invocation failed"),
                    _ => tracing::info!(error = %e, "invocation rejected"),
                }
                Response::from_error(&e)
            })
        }
        .instrument(span)
        .await;

        let status = resp.status_code.to_string();
        self.metrics
            .invocations
            .inc(&[("mode", mode), ("status", status.as_str())]);
        resp
    }

    /// SchemaInit: create the counter table inside the retry driver.
    pub async fn create_schema(&self) -> Result<()> {
        let driver = self.open_driver().await?;
        let table = &self.cfg.table;
        let res = self
            .timed("init", async {
                retry_operation_observed(
                    &self.cfg.retry,
                    driver.as_ref(),
                    |e| self.note_retry(e),
                    |session| async move { create_table(session.as_ref(), table).await },
                )
                .await
            })
            .await;
        self.close_driver(driver.as_ref()).await;
        res
    }

    /// Upsert: one serializable create-or-increment, retried on conflict.
    pub async fn upsert(&self, metric: &MetricName) -> Result<UpsertOutcome> {
        let driver = self.open_driver().await?;
        let table = &self.cfg.table;
        let res = self
            .timed("upsert", async {
                retry_operation_observed(
                    &self.cfg.retry,
                    driver.as_ref(),
                    |e| self.note_retry(e),
                    |session| async move { upsert_metric(session.as_ref(), table, metric).await },
                )
                .await
            })
            .await;
        self.close_driver(driver.as_ref()).await;

        if let Ok(outcome) = &res {
            self.metrics.upsert_outcomes.inc(&[("outcome", outcome.kind())]);
            tracing::info!(metric = %outcome.metric(), outcome = outcome.kind(), "metric upserted");
        }
        res
    }

    /// Connect and wait for readiness; a driver that never gets ready is
    /// stopped before the error is returned.
    async fn open_driver(&self) -> Result<Box<dyn Driver>> {
        let conn = &self.cfg.connection;
        let driver = self.connector.connect(conn).await?;
        self.metrics.drivers_open.inc(&[]);

        let ready = tokio::time::timeout(conn.ready_timeout, driver.wait_ready(conn.ready_timeout))
            .await
            .unwrap_or_else(|_| {
                Err(MetricError::Unavailable(format!(
                    "driver not ready within {} ms",
                    conn.ready_timeout.as_millis()
                )))
            });
        if let Err(e) = ready {
            self.close_driver(driver.as_ref()).await;
            return Err(e);
        }
        Ok(driver)
    }

    async fn close_driver(&self, driver: &dyn Driver) {
        driver.stop().await;
        self.metrics.drivers_open.dec(&[]);
    }

    fn note_retry(&self, err: &MetricError) {
        self.metrics.tx_retries.inc(&[("reason", err.kind())]);
    }

    async fn timed<T>(&self, op: &str, fut: impl std::future::Future<Output = T>) -> T {
        let started = Instant::now();
        let out = fut.await;
        self.metrics.tx_duration.observe(&[("op", op)], started.elapsed());
        out
    }
}

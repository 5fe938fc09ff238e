//! Shared application state for the function host.

use std::sync::Arc;

use crate::config::FunctionConfig;
use crate::db::Connector;
use crate::obs::FunctionMetrics;
use crate::service::MetricCounterService;

#[derive(Clone)]
pub struct AppState {
    service: MetricCounterService,
}

impl AppState {
    /// Wire the service to a connector. The config was validated when it was built.
    pub fn new(cfg: FunctionConfig, connector: Arc<dyn Connector>) -> Self {
        let metrics = Arc::new(FunctionMetrics::default());
        Self {
            service: MetricCounterService::new(Arc::new(cfg), connector, metrics),
        }
    }

    pub fn cfg(&self) -> &FunctionConfig {
        self.service.cfg()
    }

    pub fn service(&self) -> &MetricCounterService {
        &self.service
    }

    pub fn metrics(&self) -> Arc<FunctionMetrics> {
        self.service.metrics()
    }
}

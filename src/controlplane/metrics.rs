//! Controller Metrics
//!
//! Prometheus collectors for the provisioning controller. Each controller owns
//! its own registry so that several controllers (e.g. in tests) never collide.

use crate::error::{Error, Result};
use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

/// Outcome label values
pub const OUTCOME_SUCCESS: &str = "success";
pub const OUTCOME_EXISTING: &str = "existing";

/// Metrics recorded by the controller
#[derive(Clone)]
pub struct ControllerMetrics {
    registry: Registry,
    /// Requests by operation and outcome
    requests: IntCounterVec,
    /// Address block allocations by result
    ip_allocations: IntCounterVec,
    /// Address blocks currently held by in-flight requests
    pending_ip_ranges: IntGauge,
}

impl ControllerMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let requests = IntCounterVec::new(
            Opts::new(
                "filer_provisioner_requests_total",
                "Controller requests by operation and outcome",
            ),
            &["operation", "outcome"],
        )
        .map_err(metrics_error)?;

        let ip_allocations = IntCounterVec::new(
            Opts::new(
                "filer_provisioner_ip_allocations_total",
                "Reserved address block allocations by result",
            ),
            &["result"],
        )
        .map_err(metrics_error)?;

        let pending_ip_ranges = IntGauge::new(
            "filer_provisioner_pending_ip_ranges",
            "Address blocks held by in-flight create requests",
        )
        .map_err(metrics_error)?;

        registry
            .register(Box::new(requests.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(ip_allocations.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(pending_ip_ranges.clone()))
            .map_err(metrics_error)?;

        Ok(Self {
            registry,
            requests,
            ip_allocations,
            pending_ip_ranges,
        })
    }

    /// Record a finished request; `outcome` is a status code or one of the
    /// `OUTCOME_*` values
    pub fn record_request(&self, operation: &str, outcome: &str) {
        self.requests.with_label_values(&[operation, outcome]).inc();
    }

    pub fn record_ip_allocation(&self, result: &str) {
        self.ip_allocations.with_label_values(&[result]).inc();
    }

    pub fn set_pending_ip_ranges(&self, pending: usize) {
        self.pending_ip_ranges.set(pending as i64);
    }

    /// Number of recorded requests for an operation/outcome pair
    pub fn request_count(&self, operation: &str, outcome: &str) -> u64 {
        self.requests.with_label_values(&[operation, outcome]).get()
    }

    /// Render all collectors in the Prometheus text format
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(metrics_error)?;
        String::from_utf8(buffer).map_err(|e| Error::Internal(e.to_string()))
    }
}

fn metrics_error(e: prometheus::Error) -> Error {
    Error::Internal(format!("metrics: {}", e))
}

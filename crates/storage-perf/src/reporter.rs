//! Result reporting
//!
//! Reporting is **fire-and-forget**: a reporter that cannot deliver logs a
//! warning and returns. A dashboard outage must never fail a run whose
//! measurement already passed or hide one that failed.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use opentelemetry::metrics::Histogram;
use opentelemetry::{global, KeyValue};
use serde::Serialize;
use tracing::{info, warn};

use crate::claim::InterfaceKind;
use crate::config::PerfConfig;
use crate::measurement::{Measurement, OperationKind};

/// Sink for measured durations
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ResultReporter: Send + Sync {
    /// Record one measured duration
    async fn report(&self, interface: InterfaceKind, operation: OperationKind, duration_secs: f64);
}

/// Report a measurement through any reporter
pub async fn report_measurement(reporter: &dyn ResultReporter, measurement: &Measurement) {
    reporter
        .report(
            measurement.interface(),
            measurement.operation(),
            measurement.duration().as_secs_f64(),
        )
        .await;
}

/// Writes each result as a structured log event
pub struct LogReporter;

#[async_trait]
impl ResultReporter for LogReporter {
    async fn report(&self, interface: InterfaceKind, operation: OperationKind, duration_secs: f64) {
        info!(
            interface = %interface,
            operation = %operation,
            duration_secs,
            "measurement recorded"
        );
    }
}

/// Histogram of measured durations
///
/// Labels:
/// - `interface`: block, shared-filesystem
/// - `operation`: deletion, bulk_deletion
pub static OPERATION_DURATION: LazyLock<Histogram<f64>> = LazyLock::new(|| {
    global::meter("storage_perf")
        .f64_histogram("storage_perf_operation_duration_seconds")
        .with_description("Measured storage operation duration in seconds")
        .with_unit("s")
        .build()
});

/// Records results on the global OpenTelemetry meter
pub struct MetricsReporter;

#[async_trait]
impl ResultReporter for MetricsReporter {
    async fn report(&self, interface: InterfaceKind, operation: OperationKind, duration_secs: f64) {
        OPERATION_DURATION.record(
            duration_secs,
            &[
                KeyValue::new("interface", interface.as_str()),
                KeyValue::new("operation", operation.as_str()),
            ],
        );
    }
}

/// JSON body posted to the timing dashboard
#[derive(Debug, Serialize, PartialEq)]
pub struct DashboardResult {
    /// Storage interface
    pub interface: &'static str,
    /// Operation kind
    pub operation: &'static str,
    /// Measured duration
    pub duration_seconds: f64,
    /// RFC 3339 time of the report
    pub reported_at: String,
}

impl DashboardResult {
    /// Build the payload for one result
    pub fn new(interface: InterfaceKind, operation: OperationKind, duration_secs: f64) -> Self {
        Self {
            interface: interface.as_str(),
            operation: operation.as_str(),
            duration_seconds: duration_secs,
            reported_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Posts results to an HTTP timing dashboard
pub struct DashboardReporter {
    http: reqwest::Client,
    url: String,
}

impl DashboardReporter {
    /// Create a reporter posting to `url`
    pub fn new(url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "failed to build dashboard HTTP client, using defaults");
                reqwest::Client::new()
            });
        Self {
            http,
            url: url.into(),
        }
    }
}

#[async_trait]
impl ResultReporter for DashboardReporter {
    async fn report(&self, interface: InterfaceKind, operation: OperationKind, duration_secs: f64) {
        let body = DashboardResult::new(interface, operation, duration_secs);
        let response = self.http.post(&self.url).json(&body).send().await;
        match response.and_then(|r| r.error_for_status()) {
            Ok(_) => info!(url = %self.url, %interface, %operation, "pushed result to dashboard"),
            Err(e) => warn!(url = %self.url, error = %e, "failed to push result to dashboard"),
        }
    }
}

/// Reports to every inner reporter in order
#[derive(Default)]
pub struct FanoutReporter {
    reporters: Vec<Arc<dyn ResultReporter>>,
}

impl FanoutReporter {
    /// Create an empty fanout
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a reporter
    pub fn with(mut self, reporter: Arc<dyn ResultReporter>) -> Self {
        self.reporters.push(reporter);
        self
    }

    /// Logs and metrics always; the dashboard when configured
    pub fn from_config(config: &PerfConfig) -> Self {
        let mut fanout = Self::new()
            .with(Arc::new(LogReporter))
            .with(Arc::new(MetricsReporter));
        if let Some(url) = &config.dashboard_url {
            fanout = fanout.with(Arc::new(DashboardReporter::new(url.clone())));
        }
        fanout
    }

    /// Number of inner reporters
    pub fn len(&self) -> usize {
        self.reporters.len()
    }

    /// True if there are no inner reporters
    pub fn is_empty(&self) -> bool {
        self.reporters.is_empty()
    }
}

#[async_trait]
impl ResultReporter for FanoutReporter {
    async fn report(&self, interface: InterfaceKind, operation: OperationKind, duration_secs: f64) {
        for reporter in &self.reporters {
            reporter.report(interface, operation, duration_secs).await;
        }
    }
}

//! Timing probe: when did the storage backend start and finish a deletion
//!
//! Wall-clock timing on the harness side would include API round trips and
//! poll intervals. The backend's own record is what we measure against. For
//! Ceph CSI that record is the external-provisioner sidecar log, which
//! prints one line when it starts deleting a volume and one when it is done:
//!
//! ```text
//! 2024-04-09T10:20:30.123456789Z I0409 10:20:30.123456  1 controller.go:1471] delete "pvc-1f0e": started
//! 2024-04-09T10:20:32.654321000Z I0409 10:20:32.654321  1 controller.go:1486] delete "pvc-1f0e": succeeded
//! ```
//!
//! The leading RFC 3339 stamp is added by the kubelet when logs are requested
//! with timestamps. Without it the klog header is used, which carries no year;
//! the year is taken from the time of reading, stepping back one year for
//! headers that would otherwise lie in the future (a December line read in
//! January).

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, ListParams, LogParams};
use kube::Client;
#[cfg(test)]
use mockall::automock;
use tracing::{debug, warn};

use crate::claim::InterfaceKind;
use crate::config::ProvisionerLogConfig;
use crate::Error;

/// Lifecycle events the harness measures between
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LifecycleEventKind {
    /// Backend began deleting the volume
    DeletionStarted,
    /// Backend finished deleting the volume
    DeletionCompleted,
}

impl LifecycleEventKind {
    /// The provisioner log marker for a resource
    pub fn log_marker(&self, resource: &str) -> String {
        match self {
            LifecycleEventKind::DeletionStarted => format!("delete \"{}\": started", resource),
            LifecycleEventKind::DeletionCompleted => {
                format!("delete \"{}\": succeeded", resource)
            }
        }
    }

    /// Event name as used in errors and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleEventKind::DeletionStarted => "DeletionStarted",
            LifecycleEventKind::DeletionCompleted => "DeletionCompleted",
        }
    }
}

impl fmt::Display for LifecycleEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recorded lifecycle event
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LifecycleEvent {
    /// Resource the event belongs to
    pub resource: String,
    /// What happened
    pub kind: LifecycleEventKind,
    /// When the backend recorded it
    pub timestamp: DateTime<Utc>,
}

/// Source of backend-recorded event timestamps
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TimingProbe: Send + Sync {
    /// Timestamp of `kind` for `resource`; `Error::EventNotFound` if unrecorded
    async fn event_timestamp(
        &self,
        interface: InterfaceKind,
        resource: &str,
        kind: LifecycleEventKind,
    ) -> Result<DateTime<Utc>, Error>;
}

/// Reads deletion timestamps from CSI provisioner pod logs
pub struct ProvisionerLogProbe {
    client: Client,
    config: ProvisionerLogConfig,
}

impl ProvisionerLogProbe {
    /// Create a log reader for the configured provisioner pods
    pub fn new(client: Client, config: ProvisionerLogConfig) -> Self {
        Self { client, config }
    }

    async fn provisioner_logs(&self, interface: InterfaceKind) -> Result<Vec<String>, Error> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), &self.config.namespace);
        let selector = self.config.selector(interface);
        let list = pods.list(&ListParams::default().labels(selector)).await?;

        let params = LogParams {
            container: Some(self.config.container.clone()),
            timestamps: true,
            ..Default::default()
        };

        let mut logs = Vec::with_capacity(list.items.len());
        for pod in list.items {
            let Some(name) = pod.metadata.name else {
                continue;
            };
            match pods.logs(&name, &params).await {
                Ok(text) => logs.push(text),
                // A restarting replica should not hide the leader's log
                Err(e) => warn!(pod = %name, error = %e, "failed to read provisioner log"),
            }
        }
        debug!(interface = %interface, selector, pods = logs.len(), "read provisioner logs");
        Ok(logs)
    }
}

#[async_trait]
impl TimingProbe for ProvisionerLogProbe {
    async fn event_timestamp(
        &self,
        interface: InterfaceKind,
        resource: &str,
        kind: LifecycleEventKind,
    ) -> Result<DateTime<Utc>, Error> {
        let logs = self.provisioner_logs(interface).await?;
        if logs.is_empty() {
            return Err(Error::event_not_found(
                resource,
                kind.as_str(),
                format!(
                    "no readable provisioner pods matching '{}' in {}",
                    self.config.selector(interface),
                    self.config.namespace
                ),
            ));
        }

        let read_at = Utc::now();
        logs.iter()
            .filter_map(|log| find_event_timestamp(log, resource, kind, read_at))
            .min()
            .ok_or_else(|| {
                Error::event_not_found(
                    resource,
                    kind.as_str(),
                    format!("no '{}' line in provisioner logs", kind.log_marker(resource)),
                )
            })
    }
}

/// Earliest timestamp of `kind` for `resource` in one log read at `read_at`
pub fn find_event_timestamp(
    log: &str,
    resource: &str,
    kind: LifecycleEventKind,
    read_at: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let marker = kind.log_marker(resource);
    log.lines()
        .filter(|line| line.contains(&marker))
        .filter_map(|line| parse_line_timestamp(line, read_at))
        .min()
}

/// Timestamp of a provisioner log line
///
/// Prefers the kubelet RFC 3339 prefix, falls back to the klog header
/// (`Lmmdd hh:mm:ss.uuuuuu`), dated relative to `read_at`.
pub fn parse_line_timestamp(line: &str, read_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let mut tokens = line.split_whitespace();
    let first = tokens.next()?;

    if let Ok(ts) = DateTime::parse_from_rfc3339(first) {
        return Some(ts.with_timezone(&Utc));
    }

    let time = tokens.next()?;
    let year = read_at.year();
    // A log line cannot postdate its reading; allow a day of clock skew
    match parse_klog_header(first, time, year) {
        Some(ts) if ts <= read_at + Duration::days(1) => Some(ts),
        _ => parse_klog_header(first, time, year - 1),
    }
}

fn parse_klog_header(level_date: &str, time: &str, year: i32) -> Option<DateTime<Utc>> {
    let mut chars = level_date.chars();
    if !matches!(chars.next()?, 'I' | 'W' | 'E' | 'F') {
        return None;
    }
    let digits = chars.as_str();
    if digits.len() != 4 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let month: u32 = digits[..2].parse().ok()?;
    let day: u32 = digits[2..].parse().ok()?;

    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    let time = NaiveTime::parse_from_str(time, "%H:%M:%S%.f").ok()?;
    Some(NaiveDateTime::new(date, time).and_utc())
}

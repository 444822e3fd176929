//! Harness configuration
//!
//! Every size, limit and count a scenario uses lives here with a documented
//! default, so a deployment can override them from a YAML file instead of
//! editing code. Durations are plain seconds to keep the file format obvious.
//!
//! Resolution order (highest priority first):
//! 1. Explicit path (e.g. `--config`)
//! 2. `STORAGE_PERF_CONFIG` environment variable
//! 3. Built-in defaults

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::claim::InterfaceKind;
use crate::{Error, Result};

/// Environment variable naming a config file
pub const CONFIG_ENV: &str = "STORAGE_PERF_CONFIG";

/// Top-level harness configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerfConfig {
    /// Namespace claims are created in
    pub namespace: String,
    /// StorageClass for block claims
    pub block_storage_class: String,
    /// StorageClass for shared-filesystem claims
    pub filesystem_storage_class: String,
    /// Claim size used when a scenario is not given one
    pub default_size: String,
    /// Name prefix for claims created by the driver
    pub name_prefix: String,
    /// Number of claims in the bulk-deletion scenario
    pub bulk_count: usize,
    /// Width of the worker pool waiting for claims to bind
    pub pool_width: usize,
    /// Seconds to wait for a claim to bind
    pub bind_timeout_secs: u64,
    /// Seconds to wait for a claim or volume to disappear
    pub delete_timeout_secs: u64,
    /// Milliseconds between polls of the API server
    pub poll_interval_ms: u64,
    /// Duration limits
    pub thresholds: Thresholds,
    /// Where deletion timestamps are read from
    pub provisioner: ProvisionerLogConfig,
    /// Timing dashboard endpoint; reporting is log-only when unset
    pub dashboard_url: Option<String>,
    /// Many-files scale scenario
    pub many_files: ManyFilesConfig,
}

impl Default for PerfConfig {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            block_storage_class: "ocs-storagecluster-ceph-rbd".to_string(),
            filesystem_storage_class: "ocs-storagecluster-cephfs".to_string(),
            default_size: "1Gi".to_string(),
            name_prefix: "perf-pvc".to_string(),
            bulk_count: 120,
            pool_width: 5,
            bind_timeout_secs: 120,
            delete_timeout_secs: 180,
            poll_interval_ms: 1000,
            thresholds: Thresholds::default(),
            provisioner: ProvisionerLogConfig::default(),
            dashboard_url: None,
            many_files: ManyFilesConfig::default(),
        }
    }
}

/// Duration limits, in seconds
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Single block claim deletion
    pub block_deletion_secs: f64,
    /// Single shared-filesystem claim deletion (CephFS runs a little over 3s)
    pub filesystem_deletion_secs: f64,
    /// First delete-start to last delete-complete of a bulk deletion
    pub bulk_deletion_secs: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            block_deletion_secs: 3.0,
            filesystem_deletion_secs: 4.0,
            bulk_deletion_secs: 180.0,
        }
    }
}

impl Thresholds {
    /// Limit for deleting one claim of the given interface
    pub fn single_deletion(&self, interface: InterfaceKind) -> Duration {
        let secs = match interface {
            InterfaceKind::Block => self.block_deletion_secs,
            InterfaceKind::SharedFilesystem => self.filesystem_deletion_secs,
        };
        limit_duration(secs)
    }

    /// Limit for a bulk deletion
    pub fn bulk_deletion(&self) -> Duration {
        limit_duration(self.bulk_deletion_secs)
    }
}

/// Seconds to a limit; out-of-range values saturate instead of panicking
fn limit_duration(secs: f64) -> Duration {
    if secs.is_nan() || secs <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}

/// Location of the CSI provisioner logs that record deletion times
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisionerLogConfig {
    /// Namespace the CSI provisioner pods run in
    pub namespace: String,
    /// Container holding the external-provisioner sidecar
    pub container: String,
    /// Label selector for block provisioner pods
    pub block_selector: String,
    /// Label selector for shared-filesystem provisioner pods
    pub filesystem_selector: String,
}

impl Default for ProvisionerLogConfig {
    fn default() -> Self {
        Self {
            namespace: "openshift-storage".to_string(),
            container: "csi-provisioner".to_string(),
            block_selector: "app=csi-rbdplugin-provisioner".to_string(),
            filesystem_selector: "app=csi-cephfsplugin-provisioner".to_string(),
        }
    }
}

impl ProvisionerLogConfig {
    /// Label selector for the given interface's provisioner
    pub fn selector(&self, interface: InterfaceKind) -> &str {
        match interface {
            InterfaceKind::Block => &self.block_selector,
            InterfaceKind::SharedFilesystem => &self.filesystem_selector,
        }
    }
}

/// Many-files scale scenario settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManyFilesConfig {
    /// Claim name
    pub claim_name: String,
    /// Pod name
    pub pod_name: String,
    /// Claim size
    pub size: String,
    /// Number of files to create
    pub file_count: u64,
    /// Files created per exec call
    pub batch_size: u64,
    /// Mount path inside the pod
    pub mount_path: String,
    /// Pod image
    pub image: String,
    /// Node to pin the pod to
    pub node_name: Option<String>,
    /// Seconds to wait for the pod to run
    pub pod_timeout_secs: u64,
}

impl Default for ManyFilesConfig {
    fn default() -> Self {
        Self {
            claim_name: "cephfs-pvc".to_string(),
            pod_name: "cephfs-test-pod".to_string(),
            size: "20Gi".to_string(),
            file_count: 1_000_000,
            batch_size: 100_000,
            mount_path: "/var/lib/www/html".to_string(),
            image: "docker.io/nginxinc/nginx-unprivileged:alpine".to_string(),
            node_name: None,
            pod_timeout_secs: 300,
        }
    }
}

impl PerfConfig {
    /// Load configuration from a YAML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&data)
            .map_err(|e| Error::config(format!("failed to parse {}: {}", path.display(), e)))
    }

    /// Parse configuration from YAML; missing fields take their defaults
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: PerfConfig =
            serde_yaml::from_str(yaml).map_err(|e| Error::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve configuration using the priority chain
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            if !path.is_empty() {
                return Self::from_file(&PathBuf::from(path));
            }
        }
        Ok(Self::default())
    }

    /// Render as YAML
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| Error::config(e.to_string()))
    }

    /// Reject values no scenario can run with
    pub fn validate(&self) -> Result<()> {
        if self.namespace.is_empty() {
            return Err(Error::config_for_field("namespace", "must not be empty"));
        }
        if self.bulk_count == 0 {
            return Err(Error::config_for_field("bulk_count", "must be at least 1"));
        }
        if self.pool_width == 0 {
            return Err(Error::config_for_field("pool_width", "must be at least 1"));
        }
        if self.poll_interval_ms == 0 {
            return Err(Error::config_for_field(
                "poll_interval_ms",
                "must be at least 1",
            ));
        }
        let limits = [
            ("thresholds.block_deletion_secs", self.thresholds.block_deletion_secs),
            (
                "thresholds.filesystem_deletion_secs",
                self.thresholds.filesystem_deletion_secs,
            ),
            ("thresholds.bulk_deletion_secs", self.thresholds.bulk_deletion_secs),
        ];
        for (field, value) in limits {
            if !value.is_finite() || value <= 0.0 {
                return Err(Error::config_for_field(field, "must be a positive number"));
            }
            if Duration::try_from_secs_f64(value).is_err() {
                return Err(Error::config_for_field(field, "is too large"));
            }
        }
        if self.many_files.batch_size == 0 {
            return Err(Error::config_for_field(
                "many_files.batch_size",
                "must be at least 1",
            ));
        }
        Ok(())
    }

    /// StorageClass for the given interface
    pub fn storage_class(&self, interface: InterfaceKind) -> &str {
        match interface {
            InterfaceKind::Block => &self.block_storage_class,
            InterfaceKind::SharedFilesystem => &self.filesystem_storage_class,
        }
    }

    /// Bind wait timeout
    pub fn bind_timeout(&self) -> Duration {
        Duration::from_secs(self.bind_timeout_secs)
    }

    /// Delete wait timeout
    pub fn delete_timeout(&self) -> Duration {
        Duration::from_secs(self.delete_timeout_secs)
    }

    /// API poll interval
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

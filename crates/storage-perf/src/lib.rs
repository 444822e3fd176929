//! Storage performance harness: times bulk volume claim lifecycles against
//! a Kubernetes storage platform and fails on regressions

#![deny(missing_docs)]

pub mod claim;
pub mod cleanup;
pub mod client;
pub mod config;
pub mod driver;
pub mod error;
pub mod measurement;
pub mod poll;
pub mod populate;
pub mod probe;
pub mod reporter;
pub mod scenario;
pub mod telemetry;
pub mod threshold;

#[cfg(test)]
mod testing;

pub use claim::{ClaimPhase, ClaimSpec, InterfaceKind, ReclaimPolicy, VolumeClaim};
pub use cleanup::{CleanupFailure, CleanupOutcome, CleanupRegistrar, TrackedResource};
pub use client::{KubeResourceClient, ResourceClient};
pub use config::PerfConfig;
pub use driver::{BulkLifecycleDriver, ProvisioningFailure};
pub use error::Error;
pub use measurement::{Measurement, OperationKind};
pub use probe::{ProvisionerLogProbe, TimingProbe};
pub use reporter::ResultReporter;
pub use threshold::ThresholdEvaluator;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Label key marking resources created by the harness
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Value of [`LABEL_MANAGED_BY`] on harness resources
pub const LABEL_MANAGED_BY_VALUE: &str = "storage-perf";

//! Threshold evaluation

use std::time::Duration;

use tracing::{info, warn};

use crate::config::Thresholds;
use crate::measurement::{Measurement, OperationKind};
use crate::Error;

/// Compares measurements against configured limits
#[derive(Clone, Debug, Default)]
pub struct ThresholdEvaluator {
    thresholds: Thresholds,
}

impl ThresholdEvaluator {
    /// Create an evaluator over the given limits
    pub fn new(thresholds: Thresholds) -> Self {
        Self { thresholds }
    }

    /// Configured limit for a measurement's interface and operation
    pub fn limit_for(&self, measurement: &Measurement) -> Duration {
        match measurement.operation() {
            OperationKind::SingleDeletion => {
                self.thresholds.single_deletion(measurement.interface())
            }
            OperationKind::BulkDeletion => self.thresholds.bulk_deletion(),
        }
    }

    /// Fail with `Error::Performance` iff the measurement exceeds `limit`
    ///
    /// A measurement equal to the limit passes.
    pub fn check(&self, measurement: &Measurement, limit: Duration) -> Result<(), Error> {
        if measurement.duration() > limit {
            warn!(
                kind = %measurement.resource_kind(),
                measured_secs = measurement.duration().as_secs_f64(),
                limit_secs = limit.as_secs_f64(),
                "measurement exceeds limit"
            );
            return Err(Error::performance(
                measurement.duration(),
                limit,
                measurement.resource_kind(),
            ));
        }
        info!(
            kind = %measurement.resource_kind(),
            measured_secs = measurement.duration().as_secs_f64(),
            limit_secs = limit.as_secs_f64(),
            "measurement within limit"
        );
        Ok(())
    }

    /// Check against the configured limit
    pub fn check_configured(&self, measurement: &Measurement) -> Result<(), Error> {
        self.check(measurement, self.limit_for(measurement))
    }
}

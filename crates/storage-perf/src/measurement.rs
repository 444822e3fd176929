//! Measurements derived from lifecycle events

use std::fmt;
use std::time::Duration;

use crate::claim::InterfaceKind;
use crate::probe::LifecycleEvent;
use crate::Error;

/// What a measurement timed
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// Deleting one claim
    SingleDeletion,
    /// Deleting many claims back to back
    BulkDeletion,
}

impl OperationKind {
    /// Name used in reports and dashboards
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::SingleDeletion => "deletion",
            OperationKind::BulkDeletion => "bulk_deletion",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Elapsed time between two lifecycle events
///
/// For bulk deletions this is the first resource's start to the last
/// resource's completion. It assumes the backend processes deletions in
/// submission order; when it does not, the value is an upper bound rather
/// than an exact cost.
#[derive(Clone, Debug, PartialEq)]
pub struct Measurement {
    interface: InterfaceKind,
    operation: OperationKind,
    duration: Duration,
    resource_count: usize,
}

impl Measurement {
    /// Build a measurement from a start and an end event
    ///
    /// Fails with `Error::EventOrder` if `end` precedes `start`.
    pub fn between(
        interface: InterfaceKind,
        operation: OperationKind,
        start: &LifecycleEvent,
        end: &LifecycleEvent,
        resource_count: usize,
    ) -> Result<Self, Error> {
        let duration = (end.timestamp - start.timestamp).to_std().map_err(|_| {
            Error::event_order(
                &start.resource,
                &end.resource,
                format!(
                    "{} of {} at {} precedes {} of {} at {}",
                    end.kind,
                    end.resource,
                    end.timestamp.to_rfc3339(),
                    start.kind,
                    start.resource,
                    start.timestamp.to_rfc3339()
                ),
            )
        })?;
        Ok(Self::new(interface, operation, duration, resource_count))
    }

    /// Build a measurement from a known duration
    pub fn new(
        interface: InterfaceKind,
        operation: OperationKind,
        duration: Duration,
        resource_count: usize,
    ) -> Self {
        Self {
            interface,
            operation,
            duration,
            resource_count,
        }
    }

    /// Interface measured
    pub fn interface(&self) -> InterfaceKind {
        self.interface
    }

    /// Operation measured
    pub fn operation(&self) -> OperationKind {
        self.operation
    }

    /// Measured duration
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Number of resources the measurement covers
    pub fn resource_count(&self) -> usize {
        self.resource_count
    }

    /// Label naming the measured thing, e.g. "block bulk_deletion"
    pub fn resource_kind(&self) -> String {
        format!("{} {}", self.interface, self.operation)
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} claim(s): {:.3}s",
            self.resource_kind(),
            self.resource_count,
            self.duration.as_secs_f64()
        )
    }
}

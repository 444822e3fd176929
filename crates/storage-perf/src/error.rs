//! Error types for the storage performance harness
//!
//! Errors carry structured fields so a failed run can be triaged without
//! re-running it. Two classes matter to callers: performance regressions
//! (the thing this harness exists to detect) and infrastructure failures
//! (timeouts, rejected requests, missing log records). Dashboards keep the
//! two apart, so every variant answers which class it belongs to.

use std::time::Duration;

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for harness operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// A create request for a claim was rejected
    #[error("provisioning error for {namespace}/{claim}: {message}")]
    Provisioning {
        /// Name of the claim that could not be created
        claim: String,
        /// Namespace the claim was requested in
        namespace: String,
        /// Description of what failed
        message: String,
    },

    /// A resource never reached the expected state
    #[error("timed out after {timeout:?} waiting for {resource} to become {expected}")]
    StateTimeout {
        /// Namespaced name of the stuck resource
        resource: String,
        /// The state that was expected (e.g. "Bound", "deleted")
        expected: String,
        /// How long the harness waited
        timeout: Duration,
    },

    /// A measured duration exceeded its configured limit
    #[error(
        "performance regression [{resource_kind}]: measured {measured:.3?} exceeds limit {limit:.3?}"
    )]
    Performance {
        /// The measured duration
        measured: Duration,
        /// The configured limit
        limit: Duration,
        /// What was measured (e.g. "block single-deletion")
        resource_kind: String,
    },

    /// The timing probe found no record of a lifecycle event
    #[error("no {event} event recorded for {resource}: {message}")]
    EventNotFound {
        /// Resource the event was looked up for
        resource: String,
        /// Event kind (e.g. "DeletionStarted")
        event: String,
        /// Where the probe looked
        message: String,
    },

    /// Two lifecycle events were recorded in an impossible order
    #[error("event ordering violation between {first} and {last}: {message}")]
    EventOrder {
        /// Resource whose event should come first
        first: String,
        /// Resource whose event should come last
        last: String,
        /// Description of the violation
        message: String,
    },

    /// Bulk deletion did not remove every claim
    #[error("deletion failed for {failed} resource(s): {message}")]
    Deletion {
        /// Number of resources that could not be deleted
        failed: usize,
        /// Description of what failed
        message: String,
    },

    /// An external command (kubectl) failed
    #[error("command failed: {command} - {message}")]
    Command {
        /// The command line that failed
        command: String,
        /// stderr or spawn error
        message: String,
    },

    /// Invalid harness configuration
    #[error("config error: {message}")]
    Config {
        /// Description of what's invalid
        message: String,
        /// The offending field (e.g. "thresholds.bulk_deletion_secs")
        field: Option<String>,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g. "probe", "reporter")
        context: String,
    },
}

impl Error {
    /// Create a provisioning error for a claim
    pub fn provisioning(
        claim: impl Into<String>,
        namespace: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Provisioning {
            claim: claim.into(),
            namespace: namespace.into(),
            message: msg.into(),
        }
    }

    /// Create a state timeout error naming the stuck resource
    pub fn state_timeout(
        resource: impl Into<String>,
        expected: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self::StateTimeout {
            resource: resource.into(),
            expected: expected.into(),
            timeout,
        }
    }

    /// Create a performance error
    pub fn performance(measured: Duration, limit: Duration, kind: impl Into<String>) -> Self {
        Self::Performance {
            measured,
            limit,
            resource_kind: kind.into(),
        }
    }

    /// Create an event-not-found error
    pub fn event_not_found(
        resource: impl Into<String>,
        event: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::EventNotFound {
            resource: resource.into(),
            event: event.into(),
            message: msg.into(),
        }
    }

    /// Create an event ordering error
    pub fn event_order(
        first: impl Into<String>,
        last: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::EventOrder {
            first: first.into(),
            last: last.into(),
            message: msg.into(),
        }
    }

    /// Create a deletion error
    pub fn deletion(failed: usize, msg: impl Into<String>) -> Self {
        Self::Deletion {
            failed,
            message: msg.into(),
        }
    }

    /// Create a command error
    pub fn command(command: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Command {
            command: command.into(),
            message: msg.into(),
        }
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
            field: None,
        }
    }

    /// Create a config error for a specific field
    pub fn config_for_field(field: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// Create an internal error with the given message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: UNKNOWN_CONTEXT.to_string(),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// True for a measured duration over its limit
    pub fn is_performance_regression(&self) -> bool {
        matches!(self, Error::Performance { .. })
    }

    /// True for failures caused by the environment rather than by slowness
    ///
    /// Config errors are neither: they are caller mistakes.
    pub fn is_infrastructure(&self) -> bool {
        match self {
            Error::Kube { .. }
            | Error::Provisioning { .. }
            | Error::StateTimeout { .. }
            | Error::EventNotFound { .. }
            | Error::EventOrder { .. }
            | Error::Deletion { .. }
            | Error::Command { .. }
            | Error::Internal { .. } => true,
            Error::Performance { .. } | Error::Config { .. } => false,
        }
    }

    /// Short machine-readable name of the failure class
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Kube { .. } => "kube",
            Error::Provisioning { .. } => "provisioning",
            Error::StateTimeout { .. } => "state_timeout",
            Error::Performance { .. } => "performance",
            Error::EventNotFound { .. } => "event_not_found",
            Error::EventOrder { .. } => "event_order",
            Error::Deletion { .. } => "deletion",
            Error::Command { .. } => "command",
            Error::Config { .. } => "config",
            Error::Internal { .. } => "internal",
        }
    }

    /// True if this is a Kubernetes 404
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Kube { source: kube::Error::Api(ae) } if ae.code == 404)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Story: a slow deletion is reported as one clear regression
    #[test]
    fn story_performance_error_names_measurement_and_limit() {
        let err = Error::performance(
            Duration::from_millis(3500),
            Duration::from_secs(3),
            "block single-deletion",
        );
        let msg = err.to_string();
        assert!(msg.contains("block single-deletion"));
        assert!(msg.contains("3.500s"));
        assert!(msg.contains("3.000s"));
        assert!(err.is_performance_regression());
        assert!(!err.is_infrastructure());
        assert_eq!(err.kind(), "performance");
    }

    /// Story: a claim that never binds is infra flakiness, not a regression
    #[test]
    fn story_timeouts_are_infrastructure_failures() {
        let err = Error::state_timeout("default/pvc-7", "Bound", Duration::from_secs(60));
        assert!(err.to_string().contains("default/pvc-7"));
        assert!(err.to_string().contains("Bound"));
        assert!(err.is_infrastructure());
        assert!(!err.is_performance_regression());
    }

    #[test]
    fn test_provisioning_error_references_claim() {
        let err = Error::provisioning("perf-pvc-42", "default", "quota exceeded");
        assert!(err.to_string().contains("default/perf-pvc-42"));
        assert!(err.to_string().contains("quota exceeded"));
        assert_eq!(err.kind(), "provisioning");
    }

    #[test]
    fn test_config_errors_are_neither_class() {
        let err = Error::config_for_field("pool_width", "must be positive");
        assert!(!err.is_infrastructure());
        assert!(!err.is_performance_regression());
        match &err {
            Error::Config { field, .. } => assert_eq!(field.as_deref(), Some("pool_width")),
            _ => panic!("Expected Config variant"),
        }
    }

    #[test]
    fn test_internal_error_default_context() {
        let err = Error::internal("unexpected state");
        assert!(err.to_string().contains("[unknown]"));
        let err = Error::internal_with_context("probe", "no pods");
        assert!(err.to_string().contains("[probe]"));
    }

    #[test]
    fn test_event_errors_mention_resources() {
        let err = Error::event_not_found("pvc-1", "DeletionStarted", "no provisioner log line");
        assert!(err.to_string().contains("DeletionStarted"));
        let err = Error::event_order("pvc-1", "pvc-120", "last completed before first started");
        assert!(err.to_string().contains("pvc-120"));
        assert!(err.is_infrastructure());
    }
}

//! Error types for the CLI

use storage_perf::telemetry::TelemetryError;

/// CLI Result type
pub type Result<T> = std::result::Result<T, Error>;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Failure reported by the harness library
    #[error(transparent)]
    Harness(#[from] storage_perf::Error),

    /// Log or metric pipeline could not be installed
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),

    /// Kubeconfig unreadable or unusable for building a client
    #[error("kubeconfig error: {message}")]
    Kubeconfig { message: String },

    /// A scenario ran and failed; `kind` keeps the library failure class
    #[error("{scenario} failed ({kind}): {message}")]
    ScenarioFailed {
        scenario: String,
        kind: &'static str,
        message: String,
    },
}

impl Error {
    /// Create a kubeconfig error
    pub fn kubeconfig(message: impl Into<String>) -> Self {
        Error::Kubeconfig {
            message: message.into(),
        }
    }

    /// Wrap a scenario's primary failure, keeping its failure class
    pub fn scenario_failed(scenario: impl Into<String>, source: &storage_perf::Error) -> Self {
        Error::ScenarioFailed {
            scenario: scenario.into(),
            kind: source.kind(),
            message: source.to_string(),
        }
    }
}

//! Result and error types for Vigil.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for Vigil operations
pub type VigilResult<T> = Result<T, VigilError>;

/// Errors that can occur while driving a scenario
#[derive(Debug, Error)]
pub enum VigilError {
    /// Operation attempted after the session was torn down
    #[error("Session {session} is closed")]
    SessionClosed {
        /// Session identifier
        session: String,
    },

    /// Browser could not be launched or attached
    #[error("Driver unavailable: {message}")]
    DriverUnavailable {
        /// Error message
        message: String,
    },

    /// A condition detected an unrecoverable negative state
    #[error("Condition '{condition}' failed: {reason} (observed: {last_observed})")]
    ConditionFailed {
        /// Condition description
        condition: String,
        /// Reason reported by the condition
        reason: String,
        /// Rendered snapshot of the page when the failure was seen
        last_observed: String,
    },

    /// Polling exhausted its budget without satisfaction
    #[error(
        "Condition '{condition}' timed out after {elapsed_ms}ms ({attempts} attempts, observed: {last_observed})"
    )]
    ConditionTimedOut {
        /// Condition description
        condition: String,
        /// Time spent polling
        elapsed_ms: u64,
        /// Number of evaluations
        attempts: u32,
        /// Rendered snapshot of the page at the last attempt
        last_observed: String,
    },

    /// Every alternative of a locator resolved to nothing
    #[error("No element matches {locator}")]
    LocatorNotFound {
        /// Rendered locator
        locator: String,
    },

    /// A driver action (navigate, click, type) failed
    #[error("Driver error during {action}: {message}")]
    Driver {
        /// Action being performed
        action: String,
        /// Error message
        message: String,
    },

    /// A flow stopped at one of its steps
    #[error("Flow '{flow}' failed at step {step} ({label}): {source}")]
    FlowStep {
        /// Flow name
        flow: String,
        /// Zero-based step index
        step: usize,
        /// Step label
        label: String,
        /// Underlying error
        source: Box<VigilError>,
    },

    /// A flow referenced a parameter that was not supplied
    #[error("Flow '{flow}' requires parameter '{name}'")]
    MissingParam {
        /// Flow name
        flow: String,
        /// Parameter name
        name: String,
    },

    /// Invalid configuration
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// Scenario body panicked
    #[error("Scenario panicked: {message}")]
    ScenarioPanicked {
        /// Panic payload
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl VigilError {
    /// Create a configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a driver action error
    #[must_use]
    pub fn driver(action: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Driver {
            action: action.into(),
            message: message.into(),
        }
    }

    /// Create a driver-unavailable error
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::DriverUnavailable {
            message: message.into(),
        }
    }

    /// Classify the error for reports.
    ///
    /// Flow step errors report the kind of their underlying cause.
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::SessionClosed { .. } => FailureKind::SessionClosed,
            Self::DriverUnavailable { .. } => FailureKind::DriverUnavailable,
            Self::ConditionFailed { .. } => FailureKind::ConditionFailed,
            Self::ConditionTimedOut { .. } => FailureKind::ConditionTimedOut,
            Self::LocatorNotFound { .. } => FailureKind::LocatorNotFound,
            Self::FlowStep { source, .. } => source.kind(),
            Self::ScenarioPanicked { .. } => FailureKind::Panicked,
            Self::Driver { .. }
            | Self::MissingParam { .. }
            | Self::Config { .. }
            | Self::Io(_)
            | Self::Yaml(_)
            | Self::Json(_) => FailureKind::Other,
        }
    }
}

/// Failure classification carried into scenario reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Operation after teardown
    SessionClosed,
    /// Browser could not be launched
    DriverUnavailable,
    /// State appeared and signaled an error
    ConditionFailed,
    /// State never appeared
    ConditionTimedOut,
    /// One-shot lookup found nothing
    LocatorNotFound,
    /// Scenario body panicked
    Panicked,
    /// Teardown reported an error
    Teardown,
    /// Anything else
    Other,
}

impl FailureKind {
    /// Short label for summaries
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::SessionClosed => "session-closed",
            Self::DriverUnavailable => "driver-unavailable",
            Self::ConditionFailed => "condition-failed",
            Self::ConditionTimedOut => "timed-out",
            Self::LocatorNotFound => "locator-not-found",
            Self::Panicked => "panicked",
            Self::Teardown => "teardown",
            Self::Other => "error",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

//! Errors returned by chaos actions

use std::time::Duration;

use chaos_common::duration::DurationError;
use thiserror::Error;

/// Failure to start or stop a disruptive action
#[derive(Debug, Error)]
pub enum ActionError {
    /// The target pod does not exist
    #[error("target pod {namespace}/{name} not found")]
    TargetNotFound {
        /// Namespace that was searched
        namespace: String,
        /// Name of the missing pod
        name: String,
    },

    /// The target is not a pod
    #[error("unsupported target kind {kind:?}: only Pod targets are supported")]
    UnsupportedTarget {
        /// Kind named in the experiment
        kind: String,
    },

    /// A parameter value cannot be used
    #[error("invalid parameter {name}={value:?}: {reason}")]
    InvalidParameter {
        /// Parameter key
        name: String,
        /// Offending value
        value: String,
        /// Why it was rejected
        reason: String,
    },

    /// The experiment duration cannot be parsed
    #[error("invalid duration: {0}")]
    InvalidDuration(#[from] DurationError),

    /// Kubernetes API error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// The remote command ran and reported failure
    #[error("command failed: {message}, stderr: {stderr}")]
    Exec {
        /// Failure reported by the exec session
        message: String,
        /// Captured standard error
        stderr: String,
    },

    /// Shutdown was requested while the command was running
    #[error("command cancelled by shutdown")]
    Cancelled,

    /// The command did not finish within its deadline
    #[error("command timed out after {0:?}")]
    TimedOut(Duration),
}

impl ActionError {
    pub(crate) fn invalid_parameter(
        name: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidParameter {
            name: name.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// True when the action was interrupted rather than failing on its own
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

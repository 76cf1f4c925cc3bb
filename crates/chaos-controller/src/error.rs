//! Reconcile errors and their retry classification

use chaos_common::crd::ObjectKey;
use chaos_common::duration::DurationError;
use thiserror::Error;

/// Error returned from a single `sync` pass
///
/// Outcomes that end in a Failed phase are not errors: they are written to
/// status and the pass succeeds. What remains here is either worth retrying
/// (store conflicts, transient API failures, an unparseable duration on a
/// Running experiment) or an invariant violation that retrying cannot fix.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Status write or other store failure
    #[error(transparent)]
    Store(#[from] chaos_common::Error),

    /// `spec.duration` of a Running experiment does not parse
    #[error("invalid duration {duration:?} on {key}: {source}")]
    InvalidDuration {
        /// Experiment key
        key: ObjectKey,
        /// The raw duration string
        duration: String,
        /// Parse failure
        source: DurationError,
    },

    /// A Running experiment without `startTime`
    #[error("{key} is Running but has no startTime")]
    MissingStartTime {
        /// Experiment key
        key: ObjectKey,
    },

    /// A phase this controller never writes
    #[error("{key} has unrecognized phase {phase:?}")]
    UnknownPhase {
        /// Experiment key
        key: ObjectKey,
        /// The phase string found in status
        phase: String,
    },

    /// Shutdown interrupted a Start or Stop
    #[error("{key}: interrupted by shutdown")]
    Interrupted {
        /// Experiment key
        key: ObjectKey,
    },

    /// The reconcile task panicked
    #[error("{key}: reconcile panicked: {message}")]
    Panicked {
        /// Experiment key
        key: ObjectKey,
        /// Panic payload, when it was a string
        message: String,
    },
}

impl ReconcileError {
    /// Whether the key should be re-queued with backoff
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Store(e) => e.is_retryable(),
            Self::InvalidDuration { .. } => true,
            Self::MissingStartTime { .. }
            | Self::UnknownPhase { .. }
            | Self::Interrupted { .. }
            | Self::Panicked { .. } => false,
        }
    }
}

//! Error types shared by the chaos controller crates
//!
//! Errors carry the experiment key (or resource name) they relate to so that
//! log lines and status messages can be traced back to a single object.

use thiserror::Error;

/// Main error type for store operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Optimistic-concurrency conflict: the object changed since it was read
    #[error("conflict writing {resource}: the object has been modified")]
    Conflict {
        /// Key of the resource that was being written
        resource: String,
    },

    /// The resource no longer exists in the store
    #[error("{resource} not found")]
    NotFound {
        /// Key of the missing resource
        resource: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g., "create_client", "crd")
        context: String,
    },
}

impl Error {
    /// Create a conflict error for the given resource key
    pub fn conflict(resource: impl Into<String>) -> Self {
        Self::Conflict {
            resource: resource.into(),
        }
    }

    /// Create a not-found error for the given resource key
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Map a kube error for `resource`, turning 404 and 409 into their typed variants
    pub fn from_kube(resource: impl Into<String>, source: kube::Error) -> Self {
        match &source {
            kube::Error::Api(ae) if ae.code == 404 => Self::not_found(resource),
            kube::Error::Api(ae) if ae.code == 409 => Self::conflict(resource),
            _ => Self::Kube { source },
        }
    }

    /// Check if this error is retryable
    ///
    /// Conflicts are retried after re-reading the object. Other 4xx responses
    /// and malformed payloads need a spec change, so they are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => match source {
                kube::Error::Api(ae) => {
                    ae.code == 409 || ae.code == 429 || !(400..500).contains(&ae.code)
                }
                _ => true,
            },
            Error::Conflict { .. } => true,
            Error::NotFound { .. } => false,
            Error::Serialization { .. } => false,
            Error::Internal { .. } => true,
        }
    }

    /// True for optimistic-concurrency conflicts
    pub fn is_conflict(&self) -> bool {
        match self {
            Error::Conflict { .. } => true,
            Error::Kube {
                source: kube::Error::Api(ae),
            } => ae.code == 409,
            _ => false,
        }
    }

    /// True when the referenced object does not exist
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound { .. } => true,
            Error::Kube {
                source: kube::Error::Api(ae),
            } => ae.code == 404,
            _ => false,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::serialization(e.to_string())
    }
}

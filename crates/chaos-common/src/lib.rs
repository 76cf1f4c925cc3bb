//! Common types for the chaos controller: the ChaosExperiment CRD, errors, and utilities

#![deny(missing_docs)]

pub mod crd;
pub mod duration;
pub mod error;
pub mod kube_utils;
pub mod retry;
pub mod telemetry;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// API group for chaos resources
pub const CHAOS_API_GROUP: &str = "chaos.engineering";

/// Field manager used for every status write made by the controller
pub const CONTROLLER_FIELD_MANAGER: &str = "chaos-controller";

/// Default number of concurrent reconcile workers
pub const DEFAULT_WORKER_COUNT: usize = 2;

/// Default interval between full cache resyncs (seconds)
pub const DEFAULT_RESYNC_INTERVAL_SECS: u64 = 30;

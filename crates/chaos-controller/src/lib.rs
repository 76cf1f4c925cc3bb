//! Chaos controller: drives ChaosExperiment resources from Pending to a terminal phase
//!
//! - [`queue`]: deduplicating work queue with per-key backoff
//! - [`reconciler`]: the per-experiment state machine
//! - [`registry`]: actions currently applied by this process
//! - [`controller`]: watch, resync and worker pool wiring

#![deny(missing_docs)]

pub mod clock;
pub mod controller;
pub mod error;
pub mod queue;
pub mod reconciler;
pub mod registry;
pub mod store;

pub use clock::{Clock, SystemClock};
#[cfg(any(test, feature = "test-util"))]
pub use clock::ManualClock;
pub use controller::{process_key, run, ControllerConfig};
pub use error::ReconcileError;
pub use queue::WorkQueue;
pub use reconciler::{Reconciler, SyncOutcome};
pub use registry::{ActiveAction, ActiveActions};
pub use store::{ExperimentCache, ExperimentStore, KubeExperimentStore};

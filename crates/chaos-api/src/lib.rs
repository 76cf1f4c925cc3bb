//! Management API for ChaosExperiment resources
//!
//! A thin CRUD layer over the experiment store. Reconciliation is entirely
//! the controller's job; this crate only validates and forwards.

#![deny(missing_docs)]

pub mod error;
pub mod server;
pub mod store;
pub mod types;

pub use error::Error;
pub use server::{router, serve, with_dashboard, ApiState};
pub use store::{ExperimentApi, KubeExperimentApi};
pub use types::{CreateExperimentRequest, ExperimentSummary};

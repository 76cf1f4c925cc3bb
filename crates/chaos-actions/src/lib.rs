//! Disruptive actions for chaos experiments
//!
//! Each experiment type maps to a [`ChaosAction`] that knows how to inflict
//! and reverse one kind of fault against a target pod. Actions talk to the
//! cluster through two seams: [`TargetClient`] for pod lookup and deletion,
//! and [`RemoteExecutor`] for running shell commands inside the pod.

#![deny(missing_docs)]

pub mod action;
pub mod error;
pub mod exec;
pub mod target;

pub use action::{
    create_action, ActionContext, ActionFactory, ChaosAction, DefaultActionFactory, ExperimentType,
    UnknownExperimentType,
};
pub use error::ActionError;
pub use exec::{ExecOutput, KubeExecutor, RemoteExecutor};
pub use target::{resolve_target, KubeTargetClient, ResolvedTarget, TargetClient};

#[cfg(test)]
pub(crate) mod fixtures;

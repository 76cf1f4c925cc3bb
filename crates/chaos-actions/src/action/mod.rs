//! Action capability and the factory that resolves experiment types
//!
//! Stop is a pure function of the stored experiment: every variant can reverse
//! its effect from the spec alone, so a fresh instance from the factory can
//! stop an experiment started by an earlier controller process.

mod cpu_hog;
mod memory_hog;
mod network_latency;
mod pod_failure;
mod stress;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chaos_common::crd::ChaosExperiment;
use kube::Client;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub use cpu_hog::CpuHog;
pub use memory_hog::MemoryHog;
pub use network_latency::NetworkLatency;
pub use pod_failure::PodFailure;

use crate::error::ActionError;
use crate::exec::{KubeExecutor, RemoteExecutor};
use crate::target::{resolve_target, KubeTargetClient, ResolvedTarget, TargetClient};

/// Deadline for short remote commands (tc, pkill)
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// A disruptive action that can be applied to and removed from a target
#[async_trait]
pub trait ChaosAction: Send + Sync {
    /// Experiment type this action implements
    fn experiment_type(&self) -> ExperimentType;

    /// Inflict the fault described by `experiment`
    async fn start(
        &self,
        experiment: &ChaosExperiment,
        cancel: &CancellationToken,
    ) -> Result<(), ActionError>;

    /// Reverse the fault; succeeds when there is nothing left to undo
    async fn stop(
        &self,
        experiment: &ChaosExperiment,
        cancel: &CancellationToken,
    ) -> Result<(), ActionError>;
}

/// Supported experiment types
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ExperimentType {
    /// Delete the target pod
    PodFailure,
    /// Add egress latency on the pod's interface
    NetworkLatency,
    /// Saturate CPU cores
    CpuHog,
    /// Allocate and hold memory
    MemoryHog,
}

impl ExperimentType {
    /// All supported types
    pub const ALL: [ExperimentType; 4] = [
        Self::PodFailure,
        Self::NetworkLatency,
        Self::CpuHog,
        Self::MemoryHog,
    ];

    /// Tag used in `spec.experimentType`
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PodFailure => "pod-failure",
            Self::NetworkLatency => "network-latency",
            Self::CpuHog => "cpu-hog",
            Self::MemoryHog => "memory-hog",
        }
    }
}

impl fmt::Display for ExperimentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An experiment type tag that no action implements
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("Unknown experiment type: {0}")]
pub struct UnknownExperimentType(pub String);

impl FromStr for ExperimentType {
    type Err = UnknownExperimentType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownExperimentType(s.to_string()))
    }
}

/// Cluster access shared by every action variant
#[derive(Clone)]
pub struct ActionContext {
    pub(crate) targets: Arc<dyn TargetClient>,
    pub(crate) executor: Arc<dyn RemoteExecutor>,
    pub(crate) command_timeout: Duration,
}

impl ActionContext {
    /// Context over the given seams with the default command timeout
    pub fn new(targets: Arc<dyn TargetClient>, executor: Arc<dyn RemoteExecutor>) -> Self {
        Self {
            targets,
            executor,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    /// Override the deadline for short commands
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }
}

/// Resolve the target for a reversal; a vanished pod has nothing to undo
pub(crate) async fn resolve_for_stop(
    ctx: &ActionContext,
    experiment: &ChaosExperiment,
) -> Result<Option<ResolvedTarget>, ActionError> {
    match resolve_target(ctx.targets.as_ref(), experiment).await {
        Ok(target) => Ok(Some(target)),
        Err(ActionError::TargetNotFound { namespace, name }) => {
            debug!(
                experiment = %experiment.key(),
                pod = %name,
                namespace = %namespace,
                "Target pod is gone, nothing to reverse"
            );
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Instantiate the action for `experiment_type`
pub fn create_action(experiment_type: ExperimentType, ctx: ActionContext) -> Arc<dyn ChaosAction> {
    match experiment_type {
        ExperimentType::PodFailure => Arc::new(PodFailure::new(ctx)),
        ExperimentType::NetworkLatency => Arc::new(NetworkLatency::new(ctx)),
        ExperimentType::CpuHog => Arc::new(CpuHog::new(ctx)),
        ExperimentType::MemoryHog => Arc::new(MemoryHog::new(ctx)),
    }
}

/// Resolves an experiment type tag to an action
pub trait ActionFactory: Send + Sync {
    /// `None` when no action implements `experiment_type`
    fn create(&self, experiment_type: &str) -> Option<Arc<dyn ChaosAction>>;
}

/// Factory for the four built-in actions
#[derive(Clone)]
pub struct DefaultActionFactory {
    ctx: ActionContext,
}

impl DefaultActionFactory {
    /// Factory over explicit seams
    pub fn new(ctx: ActionContext) -> Self {
        Self { ctx }
    }

    /// Factory backed by a kube client
    pub fn from_client(client: Client) -> Self {
        Self::new(ActionContext::new(
            Arc::new(KubeTargetClient::new(client.clone())),
            Arc::new(KubeExecutor::new(client)),
        ))
    }
}

impl ActionFactory for DefaultActionFactory {
    fn create(&self, experiment_type: &str) -> Option<Arc<dyn ChaosAction>> {
        let experiment_type = experiment_type.parse().ok()?;
        Some(create_action(experiment_type, self.ctx.clone()))
    }
}

//! Abrupt pod termination

use async_trait::async_trait;
use chaos_common::crd::ChaosExperiment;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::{ActionContext, ChaosAction, ExperimentType};
use crate::error::ActionError;
use crate::target::resolve_target;

/// Deletes the target pod
///
/// Recovery is left to whatever owns the pod (ReplicaSet, StatefulSet, ...),
/// so there is nothing to reverse.
pub struct PodFailure {
    ctx: ActionContext,
}

impl PodFailure {
    /// Create the action
    pub fn new(ctx: ActionContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl ChaosAction for PodFailure {
    fn experiment_type(&self) -> ExperimentType {
        ExperimentType::PodFailure
    }

    async fn start(
        &self,
        experiment: &ChaosExperiment,
        cancel: &CancellationToken,
    ) -> Result<(), ActionError> {
        let target = resolve_target(self.ctx.targets.as_ref(), experiment).await?;
        if cancel.is_cancelled() {
            return Err(ActionError::Cancelled);
        }

        info!(
            experiment = %experiment.key(),
            pod = %target.name,
            namespace = %target.namespace,
            "Deleting target pod"
        );
        self.ctx
            .targets
            .delete_pod(&target.namespace, &target.name)
            .await
    }

    async fn stop(
        &self,
        _experiment: &ChaosExperiment,
        _cancel: &CancellationToken,
    ) -> Result<(), ActionError> {
        Ok(())
    }
}

//! CPU saturation

use async_trait::async_trait;
use chaos_common::crd::ChaosExperiment;
use tokio_util::sync::CancellationToken;

use super::stress::{positive_integer, run_stress, stop_stress};
use super::{ActionContext, ChaosAction, ExperimentType};
use crate::error::ActionError;

/// Parameter holding the number of busy-looping workers
pub const CPU_CORES_PARAM: &str = "cpuCores";
const DEFAULT_CPU_CORES: &str = "1";

/// Spins `cpuCores` workers for the experiment duration
pub struct CpuHog {
    ctx: ActionContext,
}

impl CpuHog {
    /// Create the action
    pub fn new(ctx: ActionContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl ChaosAction for CpuHog {
    fn experiment_type(&self) -> ExperimentType {
        ExperimentType::CpuHog
    }

    async fn start(
        &self,
        experiment: &ChaosExperiment,
        cancel: &CancellationToken,
    ) -> Result<(), ActionError> {
        let cores = positive_integer(
            CPU_CORES_PARAM,
            experiment.parameter(CPU_CORES_PARAM, DEFAULT_CPU_CORES),
        )?;
        run_stress(&self.ctx, experiment, &format!("--cpu {}", cores), cancel).await
    }

    async fn stop(
        &self,
        experiment: &ChaosExperiment,
        cancel: &CancellationToken,
    ) -> Result<(), ActionError> {
        stop_stress(&self.ctx, experiment, cancel).await
    }
}

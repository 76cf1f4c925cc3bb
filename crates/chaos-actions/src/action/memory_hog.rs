//! Memory pressure

use async_trait::async_trait;
use chaos_common::crd::ChaosExperiment;
use tokio_util::sync::CancellationToken;

use super::stress::{positive_integer, run_stress, stop_stress};
use super::{ActionContext, ChaosAction, ExperimentType};
use crate::error::ActionError;

/// Parameter holding the amount of memory to allocate, in MB
pub const MEMORY_MB_PARAM: &str = "memoryMB";
const DEFAULT_MEMORY_MB: &str = "256";

/// Holds `memoryMB` of memory for the experiment duration
pub struct MemoryHog {
    ctx: ActionContext,
}

impl MemoryHog {
    /// Create the action
    pub fn new(ctx: ActionContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl ChaosAction for MemoryHog {
    fn experiment_type(&self) -> ExperimentType {
        ExperimentType::MemoryHog
    }

    async fn start(
        &self,
        experiment: &ChaosExperiment,
        cancel: &CancellationToken,
    ) -> Result<(), ActionError> {
        let megabytes = positive_integer(
            MEMORY_MB_PARAM,
            experiment.parameter(MEMORY_MB_PARAM, DEFAULT_MEMORY_MB),
        )?;
        let load = format!("--vm 1 --vm-bytes {}M", megabytes);
        run_stress(&self.ctx, experiment, &load, cancel).await
    }

    async fn stop(
        &self,
        experiment: &ChaosExperiment,
        cancel: &CancellationToken,
    ) -> Result<(), ActionError> {
        stop_stress(&self.ctx, experiment, cancel).await
    }
}

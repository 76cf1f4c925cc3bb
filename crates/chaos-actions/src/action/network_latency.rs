//! Network latency injection with `tc netem`

use std::time::Duration;

use async_trait::async_trait;
use chaos_common::crd::ChaosExperiment;
use chaos_common::duration::parse_duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::{resolve_for_stop, ActionContext, ChaosAction, ExperimentType};
use crate::error::ActionError;
use crate::exec::shell;
use crate::target::resolve_target;

/// Parameter holding the added delay, e.g. "100ms"
pub const LATENCY_PARAM: &str = "latency";
/// Parameter naming the network device
pub const INTERFACE_PARAM: &str = "interface";

const DEFAULT_LATENCY: &str = "100ms";
const DEFAULT_INTERFACE: &str = "eth0";
/// Linux IFNAMSIZ minus the terminator
const MAX_INTERFACE_LEN: usize = 15;

/// Adds a root netem qdisc delaying all egress traffic
pub struct NetworkLatency {
    ctx: ActionContext,
}

impl NetworkLatency {
    /// Create the action
    pub fn new(ctx: ActionContext) -> Self {
        Self { ctx }
    }
}

/// Render a latency parameter in a unit `tc` understands
fn tc_latency(value: &str) -> Result<String, ActionError> {
    let latency = parse_duration(value)
        .map_err(|e| ActionError::invalid_parameter(LATENCY_PARAM, value, e.to_string()))?;
    if latency.is_zero() {
        return Err(ActionError::invalid_parameter(
            LATENCY_PARAM,
            value,
            "must be greater than zero",
        ));
    }
    Ok(format_tc_time(latency))
}

fn format_tc_time(latency: Duration) -> String {
    let micros = latency.as_micros().max(1);
    if micros % 1000 == 0 {
        format!("{}ms", micros / 1000)
    } else {
        format!("{}us", micros)
    }
}

fn interface(experiment: &ChaosExperiment) -> Result<&str, ActionError> {
    let iface = experiment.parameter(INTERFACE_PARAM, DEFAULT_INTERFACE);
    let valid = iface.len() <= MAX_INTERFACE_LEN
        && iface
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(iface)
    } else {
        Err(ActionError::invalid_parameter(
            INTERFACE_PARAM,
            iface,
            "must be a network device name",
        ))
    }
}

#[async_trait]
impl ChaosAction for NetworkLatency {
    fn experiment_type(&self) -> ExperimentType {
        ExperimentType::NetworkLatency
    }

    async fn start(
        &self,
        experiment: &ChaosExperiment,
        cancel: &CancellationToken,
    ) -> Result<(), ActionError> {
        let latency = tc_latency(experiment.parameter(LATENCY_PARAM, DEFAULT_LATENCY))?;
        let iface = interface(experiment)?;
        let target = resolve_target(self.ctx.targets.as_ref(), experiment).await?;

        info!(
            experiment = %experiment.key(),
            pod = %target.name,
            interface = %iface,
            latency = %latency,
            "Injecting network latency"
        );

        let script = format!("tc qdisc add dev {} root netem delay {}", iface, latency);
        self.ctx
            .executor
            .exec(&target, &shell(script), self.ctx.command_timeout, cancel)
            .await?;
        Ok(())
    }

    async fn stop(
        &self,
        experiment: &ChaosExperiment,
        cancel: &CancellationToken,
    ) -> Result<(), ActionError> {
        let iface = interface(experiment)?;
        let Some(target) = resolve_for_stop(&self.ctx, experiment).await? else {
            return Ok(());
        };

        info!(
            experiment = %experiment.key(),
            pod = %target.name,
            interface = %iface,
            "Removing network latency"
        );

        let script = format!("tc qdisc del dev {} root", iface);
        self.ctx
            .executor
            .exec(&target, &shell(script), self.ctx.command_timeout, cancel)
            .await?;
        Ok(())
    }
}

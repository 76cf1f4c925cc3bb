//! Shared plumbing for the load-generating actions
//!
//! Both hogs install the `stress` utility in the target container and run it
//! bounded by the experiment duration. Start blocks until stress exits.

use std::time::Duration;

use chaos_common::crd::ChaosExperiment;
use chaos_common::duration::ceil_secs;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::{resolve_for_stop, ActionContext};
use crate::error::ActionError;
use crate::exec::shell;
use crate::target::resolve_target;

/// Extra time on top of the experiment duration for package installation
pub(super) const STRESS_INSTALL_GRACE: Duration = Duration::from_secs(300);

const STOP_SCRIPT: &str = "pkill stress || true";

/// Parse a strictly positive integer parameter
pub(super) fn positive_integer(name: &str, value: &str) -> Result<u64, ActionError> {
    match value.trim().parse::<u64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ActionError::invalid_parameter(
            name,
            value,
            "must be a positive integer",
        )),
    }
}

/// Script that installs stress and runs it with `load_args` for `duration`
pub(super) fn stress_script(load_args: &str, duration: Duration) -> String {
    format!(
        "apt-get update && apt-get install -y stress && stress {} --timeout {}s",
        load_args,
        ceil_secs(duration)
    )
}

/// Run stress in the target until it exits on its own timeout
pub(super) async fn run_stress(
    ctx: &ActionContext,
    experiment: &ChaosExperiment,
    load_args: &str,
    cancel: &CancellationToken,
) -> Result<(), ActionError> {
    let duration = experiment.duration()?;
    let target = resolve_target(ctx.targets.as_ref(), experiment).await?;

    info!(
        experiment = %experiment.key(),
        pod = %target.name,
        load = %load_args,
        duration_secs = ceil_secs(duration),
        "Starting stress"
    );

    ctx.executor
        .exec(
            &target,
            &shell(stress_script(load_args, duration)),
            duration + STRESS_INSTALL_GRACE,
            cancel,
        )
        .await?;
    Ok(())
}

/// Kill any stress process left in the target
pub(super) async fn stop_stress(
    ctx: &ActionContext,
    experiment: &ChaosExperiment,
    cancel: &CancellationToken,
) -> Result<(), ActionError> {
    let Some(target) = resolve_for_stop(ctx, experiment).await? else {
        return Ok(());
    };
    ctx.executor
        .exec(&target, &shell(STOP_SCRIPT), ctx.command_timeout, cancel)
        .await?;
    Ok(())
}

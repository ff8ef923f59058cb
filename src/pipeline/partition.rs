//! Partitioning stage: executes the storage plan against the target disk.

use std::thread;
use std::time::Duration;

use tracing::{debug, info};

use crate::command_runner::CommandRunner;
use crate::error::Result;
use crate::plan::InstallPlan;

/// Wipe the disk, write the GPT layout, then give udev time to create the
/// partition nodes.
pub fn run(runner: &dyn CommandRunner, plan: &InstallPlan) -> Result<String> {
    let storage = plan.storage_plan();
    info!("Partitioning {}", plan.disk.display());
    debug!("{}", storage.summary());

    for op in &storage.ops {
        let invocation = op.invocation();
        runner
            .run(&invocation)?
            .ensure_success(&invocation.program)?;
    }

    if plan.settings.settle_delay_ms > 0 {
        debug!("Waiting {} ms for partition nodes", plan.settings.settle_delay_ms);
        thread::sleep(Duration::from_millis(plan.settings.settle_delay_ms));
    }

    Ok(format!(
        "EFI {} / root {}",
        plan.layout.efi.display(),
        plan.layout.root.display()
    ))
}

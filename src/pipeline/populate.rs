//! Populate stage: put a base system into the mounted target.

use tracing::{info, warn};

use crate::command_runner::{CommandRunner, run_tool};
use crate::config_file::PopulationSource;
use crate::error::{InstallError, Result};
use crate::install_state::InstallStage;
use crate::plan::InstallPlan;
use crate::tools::system::{Debootstrap, Rsync};

pub fn run(runner: &dyn CommandRunner, plan: &InstallPlan) -> Result<String> {
    let target = &plan.settings.target_root;

    match &plan.source {
        PopulationSource::Bootstrap {
            suite,
            mirror,
            arch,
            variant,
        } => {
            if !plan.network.is_online() {
                warn!("No network connectivity detected, debootstrap will probably fail");
            }
            info!("Bootstrapping {} ({}) from {}", suite, arch, mirror);
            run_tool(
                runner,
                &Debootstrap {
                    arch: *arch,
                    variant: *variant,
                    suite: suite.clone(),
                    target: target.clone(),
                    mirror: mirror.clone(),
                },
            )?;
            Ok(format!("debootstrap {} into {}", suite, target.display()))
        }
        PopulationSource::LocalCopy { source } => {
            if !source.is_dir() {
                return Err(InstallError::stage(
                    InstallStage::Populating,
                    format!("copy source {} is not a directory", source.display()),
                ));
            }
            info!("Copying {} into {}", source.display(), target.display());
            run_tool(
                runner,
                &Rsync {
                    source: source.clone(),
                    target: target.clone(),
                },
            )?;
            Ok(format!("copied {} into {}", source.display(), target.display()))
        }
    }
}

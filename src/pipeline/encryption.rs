//! Encryption stage and the resolved root device.
//!
//! ```text
//! disabled ─────────────────────────────▶ DeviceHandle::Raw(root partition)
//! enabled ──▶ luksFormat ──▶ open ──────▶ DeviceHandle::Mapped(/dev/mapper/<name>)
//! ```

use std::path::{Path, PathBuf};

use tracing::info;

use crate::command_runner::{CommandRunner, run_tool};
use crate::error::Result;
use crate::plan::InstallPlan;
use crate::pipeline::Session;
use crate::tools::encryption::{LuksFormat, LuksOpen};

/// The block device every later stage formats, mounts and looks up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceHandle {
    /// Unencrypted root partition
    Raw(PathBuf),
    /// Opened LUKS container on top of `backing`
    Mapped {
        device: PathBuf,
        backing: PathBuf,
        name: String,
    },
}

impl DeviceHandle {
    /// Resolve the handle for `plan` without touching anything.
    pub fn for_plan(plan: &InstallPlan) -> Self {
        if plan.encrypted() {
            Self::Mapped {
                device: plan.settings.mapped_device(),
                backing: plan.layout.root.clone(),
                name: plan.settings.mapper_name.clone(),
            }
        } else {
            Self::Raw(plan.layout.root.clone())
        }
    }

    /// Path to format and mount.
    pub fn path(&self) -> &Path {
        match self {
            Self::Raw(path) => path,
            Self::Mapped { device, .. } => device,
        }
    }

    pub fn is_encrypted(&self) -> bool {
        matches!(self, Self::Mapped { .. })
    }
}

/// Format and open the container when encryption is enabled.
///
/// The mapping is recorded in the session as soon as `open` succeeds so
/// teardown closes it even if a later stage fails.
pub fn run(runner: &dyn CommandRunner, plan: &InstallPlan, session: &mut Session) -> Result<DeviceHandle> {
    let handle = DeviceHandle::for_plan(plan);

    let Some(passphrase) = &plan.encryption else {
        info!("Encryption disabled, using {}", handle.path().display());
        session.device = Some(handle.clone());
        return Ok(handle);
    };

    let partition = plan.layout.root.clone();
    info!("Formatting {} as LUKS2", partition.display());
    run_tool(
        runner,
        &LuksFormat {
            device: partition.clone(),
            passphrase: passphrase.clone(),
        },
    )?;

    info!(
        "Opening {} as {}",
        partition.display(),
        plan.settings.mapped_device().display()
    );
    run_tool(
        runner,
        &LuksOpen {
            device: partition,
            name: plan.settings.mapper_name.clone(),
            passphrase: passphrase.clone(),
        },
    )?;
    session.opened_mapping = Some(plan.settings.mapper_name.clone());
    session.device = Some(handle.clone());

    Ok(handle)
}

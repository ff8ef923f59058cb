//! Filesystem stage: FAT32 on the ESP, Btrfs with the subvolume layout on the
//! root device.

use std::fs;

use strum::IntoEnumIterator;
use tracing::{info, warn};

use crate::command_runner::{CommandRunner, run_tool};
use crate::error::Result;
use crate::pipeline::encryption::DeviceHandle;
use crate::plan::InstallPlan;
use crate::tools::disk::{MkfsBtrfs, MkfsVfat, SubvolumeCreate};
use crate::tools::mount::{Mount, Umount};
use crate::types::Subvolume;

pub fn run(runner: &dyn CommandRunner, plan: &InstallPlan, device: &DeviceHandle) -> Result<String> {
    info!("Formatting {} as FAT32", plan.layout.efi.display());
    run_tool(
        runner,
        &MkfsVfat {
            device: plan.layout.efi.clone(),
        },
    )?;

    info!("Formatting {} as Btrfs", device.path().display());
    run_tool(
        runner,
        &MkfsBtrfs {
            device: device.path().to_path_buf(),
            label: plan.settings.volume_label.clone(),
        },
    )?;

    create_subvolumes(runner, plan, device)?;

    Ok(format!("Btrfs '{}' on {}", plan.settings.volume_label, device.path().display()))
}

/// Mount the top-level volume at the scratch mount, create every subvolume,
/// then unmount and remove the scratch directory whatever happened.
fn create_subvolumes(runner: &dyn CommandRunner, plan: &InstallPlan, device: &DeviceHandle) -> Result<()> {
    let scratch = &plan.settings.scratch_mount;
    fs::create_dir_all(scratch)?;

    let mounted = run_tool(
        runner,
        &Mount {
            source: device.path().to_path_buf(),
            target: scratch.clone(),
            ..Mount::default()
        },
    );
    let is_mounted = mounted.is_ok();

    let created = mounted.and_then(|_| {
        for subvolume in Subvolume::iter() {
            info!("Creating subvolume {}", subvolume);
            run_tool(
                runner,
                &SubvolumeCreate {
                    path: scratch.join(subvolume.to_string()),
                },
            )?;
        }
        Ok(())
    });

    if is_mounted {
        if let Err(e) = run_tool(runner, &Umount::new(scratch.clone())) {
            warn!("Failed to unmount scratch mount {}: {}", scratch.display(), e);
        }
    }
    if let Err(e) = fs::remove_dir(scratch) {
        warn!("Failed to remove scratch directory {}: {}", scratch.display(), e);
    }

    created
}

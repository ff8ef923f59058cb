//! Teardown: undo what the run set up, as far as it got.
//!
//! Every step is attempted independently and only logged on failure, so a
//! broken mount never keeps the LUKS container open. Running it twice is
//! harmless: the registry and the opened mapping are consumed the first time.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::command_runner::{CommandRunner, run_tool};
use crate::pipeline::Session;
use crate::pipeline::mount::mounts_under;
use crate::plan::InstallPlan;
use crate::tools::encryption::LuksClose;
use crate::tools::mount::Umount;

/// Run every teardown step. Returns the problems that were logged.
pub fn run(runner: &dyn CommandRunner, plan: &InstallPlan, session: &mut Session) -> Vec<String> {
    let mut problems = Vec::new();
    let root = &plan.settings.target_root;

    if root.join("etc").is_dir() {
        match copy_network_profiles(&plan.settings.network_profiles, root) {
            Ok(0) => {}
            Ok(n) => info!("Copied {} network profile(s) into the target", n),
            Err(e) => problems.push(format!("copying network profiles: {}", e)),
        }
    }

    for mount_point in session.mounts.drain_reverse() {
        debug!("Unmounting {}", mount_point.display());
        if let Err(e) = run_tool(runner, &Umount::new(mount_point.clone())) {
            problems.push(format!("unmounting {}: {}", mount_point.display(), e));
        }
    }

    // Catches anything mounted under the root that the registry never saw
    let leftovers = mounts_under(&plan.settings.mountinfo, root).unwrap_or(true);
    if leftovers {
        if let Err(e) = run_tool(runner, &Umount::recursive(root.clone())) {
            problems.push(format!("recursive unmount of {}: {}", root.display(), e));
        }
    }

    if let Some(name) = session.opened_mapping.take() {
        info!("Closing encrypted container {}", name);
        if let Err(e) = run_tool(runner, &LuksClose { name: name.clone() }) {
            problems.push(format!("closing {}: {}", name, e));
        }
    }

    for problem in &problems {
        warn!("Teardown: {}", problem);
    }
    problems
}

/// Copy the host's NetworkManager connection files, readable by root only.
fn copy_network_profiles(source: &Path, root: &Path) -> std::io::Result<usize> {
    if !source.is_dir() {
        debug!("No network profiles at {}", source.display());
        return Ok(0);
    }

    let target = root.join("etc/NetworkManager/system-connections");
    fs::create_dir_all(&target)?;

    let mut copied = 0;
    for entry in fs::read_dir(source)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let dest = target.join(entry.file_name());
        fs::copy(entry.path(), &dest)?;
        fs::set_permissions(&dest, fs::Permissions::from_mode(0o600))?;
        copied += 1;
    }
    Ok(copied)
}

//! Mount stage: assemble the final tree at the target root.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::command_runner::{CommandRunner, run_tool};
use crate::error::Result;
use crate::pipeline::encryption::DeviceHandle;
use crate::pipeline::fstab::subvolume_options;
use crate::pipeline::mounts::MountRegistry;
use crate::plan::InstallPlan;
use crate::tools::mount::{Mount, Umount};
use crate::types::Subvolume;

pub fn run(
    runner: &dyn CommandRunner,
    plan: &InstallPlan,
    device: &DeviceHandle,
    mounts: &mut MountRegistry,
) -> Result<String> {
    let root = &plan.settings.target_root;

    if has_mounts_under(&plan.settings.mountinfo, root) {
        warn!("{} already has mounts from an earlier run, unmounting", root.display());
        run_tool(runner, &Umount::recursive(root.clone()))?;
    }

    fs::create_dir_all(root)?;
    mount_recorded(
        runner,
        mounts,
        Mount {
            source: device.path().to_path_buf(),
            target: root.clone(),
            options: Some(subvolume_options(&plan.settings.mount_options, Subvolume::Root)),
            ..Mount::default()
        },
    )?;

    let home = root.join("home");
    fs::create_dir_all(&home)?;
    mount_recorded(
        runner,
        mounts,
        Mount {
            source: device.path().to_path_buf(),
            target: home,
            options: Some(subvolume_options(&plan.settings.mount_options, Subvolume::Home)),
            ..Mount::default()
        },
    )?;

    let efi = root.join("boot/efi");
    fs::create_dir_all(&efi)?;
    mount_recorded(
        runner,
        mounts,
        Mount {
            source: plan.layout.efi.clone(),
            target: efi,
            ..Mount::default()
        },
    )?;

    Ok(format!("{} mounts under {}", mounts.len(), root.display()))
}

/// Mount, and record the target only once the mount succeeded.
pub(crate) fn mount_recorded(
    runner: &dyn CommandRunner,
    mounts: &mut MountRegistry,
    mount: Mount,
) -> Result<()> {
    info!("Mounting {} at {}", mount.source.display(), mount.target.display());
    run_tool(runner, &mount)?;
    mounts.record(mount.target);
    Ok(())
}

/// True if the mount table lists `root` or anything below it.
///
/// An unreadable table is treated as "nothing mounted".
fn has_mounts_under(mountinfo: &Path, root: &Path) -> bool {
    match mounts_under(mountinfo, root) {
        Ok(found) => found,
        Err(e) => {
            warn!("Cannot read {}: {}", mountinfo.display(), e);
            false
        }
    }
}

pub(crate) fn mounts_under(mountinfo: &Path, root: &Path) -> std::io::Result<bool> {
    let table = fs::read_to_string(mountinfo)?;
    Ok(mount_points(&table).iter().any(|p| p.starts_with(root)))
}

/// Mount points (field 5) from `/proc/self/mountinfo` content.
fn mount_points(table: &str) -> Vec<PathBuf> {
    table
        .lines()
        .filter_map(|line| line.split_whitespace().nth(4))
        .map(|field| PathBuf::from(unescape_octal(field)))
        .collect()
}

/// Undo the kernel's `\040`-style escaping of spaces, tabs and backslashes.
fn unescape_octal(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() {
            let digits = &bytes[i + 1..i + 4];
            if digits.iter().all(|b| (b'0'..=b'7').contains(b)) {
                let value = digits.iter().fold(0u32, |acc, b| acc * 8 + u32::from(b - b'0'));
                if let Ok(value) = u8::try_from(value) {
                    out.push(value);
                    i += 4;
                    continue;
                }
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    const MOUNTINFO: &str = "\
22 1 8:2 / / rw,relatime shared:1 - ext4 /dev/sda2 rw
98 22 0:45 /@ /mnt/toca_install rw,noatime shared:50 - btrfs /dev/sdb2 rw
99 98 8:17 / /mnt/toca_install/boot/efi rw shared:51 - vfat /dev/sdb1 rw
100 22 0:46 / /media/usb\\040stick rw shared:52 - vfat /dev/sdc1 rw
";

    #[test]
    fn test_mount_points_parsing() {
        let points = mount_points(MOUNTINFO);
        assert_eq!(points.len(), 4);
        assert_eq!(points[1], PathBuf::from("/mnt/toca_install"));
        assert_eq!(points[3], PathBuf::from("/media/usb stick"));
    }

    #[test]
    fn test_has_mounts_under() {
        let dir = tempfile::tempdir().unwrap();
        let table = dir.path().join("mountinfo");
        fs::write(&table, MOUNTINFO).unwrap();

        assert!(has_mounts_under(&table, Path::new("/mnt/toca_install")));
        assert!(!has_mounts_under(&table, Path::new("/mnt/toca")));
        assert!(!has_mounts_under(&table, Path::new("/mnt/other")));
        assert!(!has_mounts_under(&dir.path().join("missing"), Path::new("/mnt/toca_install")));
    }

    #[test]
    fn test_unescape_octal() {
        assert_eq!(unescape_octal("/a\\040b"), "/a b");
        assert_eq!(unescape_octal("/tab\\011x"), "/tab\tx");
        assert_eq!(unescape_octal("/plain"), "/plain");
        assert_eq!(unescape_octal("/trailing\\04"), "/trailing\\04");
    }
}

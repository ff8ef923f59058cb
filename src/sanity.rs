//! Pre-flight sanity checks for the runtime environment
//!
//! Verified before anything touches a disk:
//! - Running with root privileges (EUID 0)
//! - Required tools are on `PATH` (which ones depends on the plan)
//! - Booted in UEFI mode (the layout and bootloader are EFI-only)
//! - The local copy source exists, when copying instead of bootstrapping
//!
//! Failures are environment errors: fatal, with no cleanup needed.

use std::path::PathBuf;
use std::process::{Command, Stdio};

use tracing::{debug, info, warn};

use crate::config_file::PopulationSource;
use crate::error::{InstallError, Result};
use crate::hardware::{FirmwareMode, detect_firmware_mode};
use crate::plan::InstallPlan;
use crate::process_guard::CommandProcessGroup;

/// Tools every install needs
const BASE_BINARIES: &[&str] = &[
    "wipefs",
    "parted",
    "mkfs.vfat",
    "mkfs.btrfs",
    "btrfs",
    "mount",
    "umount",
    "blkid",
    "lsblk",
    "chroot",
];

/// Used only by the interactive network menu
const OPTIONAL_BINARIES: &[&str] = &["nmcli", "ip"];

/// What the environment must provide.
#[derive(Debug, Clone, Default)]
pub struct Requirements {
    pub encryption: bool,
    pub bootstrap: bool,
    pub rsync: bool,
    pub local_source: Option<PathBuf>,
    pub require_uefi: bool,
    pub skip_root: bool,
}

impl Requirements {
    /// Checks possible before any choice is made: root, UEFI and the tools
    /// every plan uses. Choice-dependent tools wait for `for_plan`.
    pub fn baseline(skip_root: bool) -> Self {
        Self {
            encryption: false,
            bootstrap: false,
            rsync: false,
            local_source: None,
            require_uefi: true,
            skip_root,
        }
    }

    pub fn for_plan(plan: &InstallPlan, skip_root: bool) -> Self {
        let (bootstrap, rsync, local_source) = match &plan.source {
            PopulationSource::Bootstrap { .. } => (true, false, None),
            PopulationSource::LocalCopy { source } => (false, true, Some(source.clone())),
        };
        Self {
            encryption: plan.encrypted(),
            bootstrap,
            rsync,
            local_source,
            require_uefi: true,
            skip_root,
        }
    }

    pub fn binaries(&self) -> Vec<&'static str> {
        let mut list = BASE_BINARIES.to_vec();
        if self.encryption {
            list.push("cryptsetup");
        }
        if self.bootstrap {
            list.push("debootstrap");
        }
        if self.rsync {
            list.push("rsync");
        }
        list
    }
}

/// Result of environment verification
#[derive(Debug)]
pub struct SanityCheckResult {
    pub missing_binaries: Vec<String>,
    pub is_root: bool,
    pub firmware: FirmwareMode,
    pub uefi_required: bool,
    pub missing_source: Option<PathBuf>,
}

impl SanityCheckResult {
    /// Returns true if all checks passed
    pub fn is_ok(&self) -> bool {
        self.missing_binaries.is_empty()
            && self.is_root
            && (!self.uefi_required || self.firmware.is_uefi())
            && self.missing_source.is_none()
    }

    /// One line per failed check, with the Debian package to install.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if !self.is_root {
            problems.push("Root privileges required (run with sudo or as root)".to_string());
        }
        for binary in &self.missing_binaries {
            problems.push(format!(
                "Missing tool: {} (install: apt install {})",
                binary,
                package_for_binary(binary)
            ));
        }
        if self.uefi_required && !self.firmware.is_uefi() {
            problems.push("System was not booted in UEFI mode (/sys/firmware/efi missing)".to_string());
        }
        if let Some(source) = &self.missing_source {
            problems.push(format!("Local copy source {} does not exist", source.display()));
        }
        problems
    }

    pub fn into_result(self) -> Result<()> {
        if self.is_ok() {
            Ok(())
        } else {
            Err(InstallError::environment(self.problems().join("; ")))
        }
    }
}

/// Check if a binary is available in PATH
fn binary_exists(name: &str) -> bool {
    Command::new("which")
        .arg(name)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .in_new_process_group()
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

fn is_running_as_root() -> bool {
    nix::unistd::geteuid().is_root()
}

/// Run every check in `requirements`.
pub fn verify_environment(requirements: &Requirements) -> SanityCheckResult {
    debug!("Running pre-flight checks: {:?}", requirements);

    let missing_binaries = requirements
        .binaries()
        .into_iter()
        .filter(|b| !binary_exists(b))
        .map(str::to_string)
        .collect();

    for binary in OPTIONAL_BINARIES {
        if !binary_exists(binary) {
            warn!("Optional tool not found: {} (network menu unavailable)", binary);
        }
    }

    let is_root = if requirements.skip_root {
        warn!("Root check skipped");
        true
    } else {
        is_running_as_root()
    };

    let missing_source = requirements
        .local_source
        .as_ref()
        .filter(|source| !source.is_dir())
        .cloned();

    SanityCheckResult {
        missing_binaries,
        is_root,
        firmware: detect_firmware_mode(),
        uefi_required: requirements.require_uefi,
        missing_source,
    }
}

/// Verify and convert failures into `InstallError::Environment`.
pub fn run_preflight_checks(requirements: &Requirements) -> Result<()> {
    verify_environment(requirements).into_result()?;
    info!("Pre-flight checks passed");
    Ok(())
}

/// Map binary names to their Debian package names
fn package_for_binary(binary: &str) -> &'static str {
    match binary {
        "wipefs" | "blkid" | "lsblk" | "mount" | "umount" => "util-linux",
        "parted" => "parted",
        "mkfs.vfat" => "dosfstools",
        "mkfs.btrfs" | "btrfs" => "btrfs-progs",
        "cryptsetup" => "cryptsetup",
        "debootstrap" => "debootstrap",
        "rsync" => "rsync",
        "chroot" => "coreutils",
        "nmcli" => "network-manager",
        "ip" => "iproute2",
        _ => "unknown",
    }
}

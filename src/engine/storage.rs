//! Partition planner
//!
//! Translates the chosen target disk into the fixed GPT layout and an ordered
//! sequence of `StorageOp`s that the partition stage executes.
//!
//! # Layout
//!
//! ```text
//! <disk>1 / <disk>p1 - EFI System Partition (FAT32, 1MiB - 513MiB, esp flag)
//! <disk>2 / <disk>p2 - Root (513MiB - 100%), optionally LUKS, then Btrfs
//! ```
//!
//! # Design
//!
//! - **Pure logic**: no I/O, the plan is data until the stage runs it
//! - **Typed output**: each `StorageOp` maps to exactly one tool invocation
//! - **Loud naming**: a disk whose partition names cannot be derived is an
//!   error, never a guess

use crate::command_runner::Invocation;
use crate::error::{InstallError, Result};
use crate::tools::disk::{Parted, PartedCommand, PartitionTable, Wipefs};
use std::fmt;
use std::path::{Path, PathBuf};

/// ESP start offset
pub const ESP_START: &str = "1MiB";
/// ESP end offset (512 MiB partition)
pub const ESP_END: &str = "513MiB";
/// Root partition end
pub const ROOT_END: &str = "100%";

pub const EFI_PARTITION_NUMBER: u32 = 1;
pub const ROOT_PARTITION_NUMBER: u32 = 2;

/// Kernel name prefixes whose partitions are `<disk>p<N>`.
const SUFFIXED_PREFIXES: &[&str] = &["nvme", "mmcblk", "loop", "nbd"];
/// Kernel name prefixes whose partitions are `<disk><N>`.
const PLAIN_PREFIXES: &[&str] = &["sd", "vd", "hd", "xvd"];

/// Derive the device path of partition `number` on `disk`.
///
/// ```
/// use std::path::{Path, PathBuf};
/// use tocainstall::engine::storage::partition_path;
///
/// assert_eq!(partition_path(Path::new("/dev/nvme0n1"), 2).unwrap(), PathBuf::from("/dev/nvme0n1p2"));
/// assert_eq!(partition_path(Path::new("/dev/sda"), 1).unwrap(), PathBuf::from("/dev/sda1"));
/// assert!(partition_path(Path::new("/dev/disk/by-id/foo"), 1).is_err());
/// ```
pub fn partition_path(disk: &Path, number: u32) -> Result<PathBuf> {
    let unknown = || InstallError::UnknownDiskNaming(disk.display().to_string());

    let name = disk
        .to_str()
        .and_then(|s| s.strip_prefix("/dev/"))
        .filter(|n| !n.is_empty() && !n.contains('/'))
        .ok_or_else(unknown)?;

    let ends_with_digit = name.ends_with(|c: char| c.is_ascii_digit());

    if SUFFIXED_PREFIXES
        .iter()
        .any(|p| name.len() > p.len() && name.starts_with(p))
        && ends_with_digit
    {
        return Ok(PathBuf::from(format!("/dev/{}p{}", name, number)));
    }

    if PLAIN_PREFIXES
        .iter()
        .any(|p| name.len() > p.len() && name.starts_with(p))
        && !ends_with_digit
        && name.chars().all(|c| c.is_ascii_lowercase())
    {
        return Ok(PathBuf::from(format!("/dev/{}{}", name, number)));
    }

    Err(unknown())
}

/// The two partitions the installer creates on the target disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionLayout {
    pub disk: PathBuf,
    pub efi: PathBuf,
    pub root: PathBuf,
}

impl PartitionLayout {
    pub fn for_disk(disk: &Path) -> Result<Self> {
        Ok(Self {
            disk: disk.to_path_buf(),
            efi: partition_path(disk, EFI_PARTITION_NUMBER)?,
            root: partition_path(disk, ROOT_PARTITION_NUMBER)?,
        })
    }
}

/// A single atomic storage operation in the plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageOp {
    /// Remove every filesystem and partition-table signature (wipefs -a)
    WipeSignatures { disk: PathBuf },

    /// Write a fresh partition table
    CreateLabel { disk: PathBuf, table: PartitionTable },

    /// Create one partition
    CreatePartition {
        disk: PathBuf,
        number: u32,
        name: String,
        fs_type: Option<String>,
        start: String,
        end: String,
    },

    /// Turn a partition flag on
    SetFlag {
        disk: PathBuf,
        number: u32,
        flag: String,
    },
}

impl StorageOp {
    /// The tool invocation that performs this operation.
    pub fn invocation(&self) -> Invocation {
        match self {
            Self::WipeSignatures { disk } => Invocation::from_tool(&Wipefs {
                device: disk.clone(),
            }),
            Self::CreateLabel { disk, table } => Invocation::from_tool(&Parted {
                device: disk.clone(),
                command: PartedCommand::MkLabel(*table),
            }),
            Self::CreatePartition {
                disk,
                name,
                fs_type,
                start,
                end,
                ..
            } => Invocation::from_tool(&Parted {
                device: disk.clone(),
                command: PartedCommand::MkPart {
                    name: name.clone(),
                    fs_type: fs_type.clone(),
                    start: start.clone(),
                    end: end.clone(),
                },
            }),
            Self::SetFlag { disk, number, flag } => Invocation::from_tool(&Parted {
                device: disk.clone(),
                command: PartedCommand::Set {
                    number: *number,
                    flag: flag.clone(),
                    on: true,
                },
            }),
        }
    }
}

impl fmt::Display for StorageOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WipeSignatures { disk } => write!(f, "WipeSignatures({})", disk.display()),
            Self::CreateLabel { disk, table } => {
                write!(f, "CreateLabel({}, {})", disk.display(), table)
            }
            Self::CreatePartition {
                disk,
                number,
                name,
                fs_type,
                start,
                end,
            } => write!(
                f,
                "CreatePartition({} #{} {} fs={} {}..{})",
                disk.display(),
                number,
                name,
                fs_type.as_deref().unwrap_or("-"),
                start,
                end
            ),
            Self::SetFlag { disk, number, flag } => {
                write!(f, "SetFlag({} #{} {})", disk.display(), number, flag)
            }
        }
    }
}

/// A complete storage plan: an ordered list of operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoragePlan {
    pub layout: PartitionLayout,
    pub ops: Vec<StorageOp>,
}

impl StoragePlan {
    pub fn is_destructive(&self) -> bool {
        !self.ops.is_empty()
    }

    /// Returns a summary of the plan for display.
    pub fn summary(&self) -> String {
        let mut lines = vec![
            format!("Storage Plan: {}", self.layout.disk.display()),
            format!("  EFI partition:  {}", self.layout.efi.display()),
            format!("  Root partition: {}", self.layout.root.display()),
            format!("  Operations ({}):", self.ops.len()),
        ];
        for (i, op) in self.ops.iter().enumerate() {
            lines.push(format!("    {}. {}", i + 1, op));
        }
        lines.join("\n")
    }
}

/// Calculate the partitioning operations for `layout`.
pub fn calculate_storage_plan(layout: &PartitionLayout) -> StoragePlan {
    let disk = layout.disk.clone();
    let ops = vec![
        StorageOp::WipeSignatures { disk: disk.clone() },
        StorageOp::CreateLabel {
            disk: disk.clone(),
            table: PartitionTable::Gpt,
        },
        StorageOp::CreatePartition {
            disk: disk.clone(),
            number: EFI_PARTITION_NUMBER,
            name: "ESP".to_string(),
            fs_type: Some("fat32".to_string()),
            start: ESP_START.to_string(),
            end: ESP_END.to_string(),
        },
        StorageOp::SetFlag {
            disk: disk.clone(),
            number: EFI_PARTITION_NUMBER,
            flag: "esp".to_string(),
        },
        StorageOp::CreatePartition {
            disk,
            number: ROOT_PARTITION_NUMBER,
            name: "primary".to_string(),
            fs_type: None,
            start: ESP_END.to_string(),
            end: ROOT_END.to_string(),
        },
    ];

    StoragePlan {
        layout: layout.clone(),
        ops,
    }
}

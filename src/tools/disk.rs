//! Partitioning, formatting and block-device inspection tools.
//!
//! - `Wipefs`: clear filesystem and partition-table signatures
//! - `Parted`: one parted sub-command in script mode
//! - `MkfsVfat` / `MkfsBtrfs`: create filesystems
//! - `SubvolumeCreate`: `btrfs subvolume create`
//! - `Blkid`: read a single UUID
//! - `ListDisks`: whole-disk listing as JSON

use std::fmt;
use std::path::PathBuf;

use crate::tool_traits::ToolArgs;

/// `wipefs -a <device>`
#[derive(Debug, Clone)]
pub struct Wipefs {
    pub device: PathBuf,
}

impl ToolArgs for Wipefs {
    fn program(&self) -> &'static str {
        "wipefs"
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec!["-a".to_string(), self.device.display().to_string()]
    }

    fn is_destructive(&self) -> bool {
        true
    }
}

/// Partition table types understood by `parted mklabel`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionTable {
    Gpt,
}

impl fmt::Display for PartitionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartitionTable::Gpt => write!(f, "gpt"),
        }
    }
}

/// A single parted sub-command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartedCommand {
    /// `mklabel <table>`
    MkLabel(PartitionTable),
    /// `mkpart <name> [fs-type] <start> <end>`
    MkPart {
        name: String,
        fs_type: Option<String>,
        start: String,
        end: String,
    },
    /// `set <number> <flag> on|off`
    Set { number: u32, flag: String, on: bool },
}

impl PartedCommand {
    fn args(&self) -> Vec<String> {
        match self {
            PartedCommand::MkLabel(table) => vec!["mklabel".to_string(), table.to_string()],
            PartedCommand::MkPart {
                name,
                fs_type,
                start,
                end,
            } => {
                let mut args = vec!["mkpart".to_string(), name.clone()];
                if let Some(fs) = fs_type {
                    args.push(fs.clone());
                }
                args.push(start.clone());
                args.push(end.clone());
                args
            }
            PartedCommand::Set { number, flag, on } => vec![
                "set".to_string(),
                number.to_string(),
                flag.clone(),
                if *on { "on" } else { "off" }.to_string(),
            ],
        }
    }
}

/// `parted -s <device> <command...>`
#[derive(Debug, Clone)]
pub struct Parted {
    pub device: PathBuf,
    pub command: PartedCommand,
}

impl ToolArgs for Parted {
    fn program(&self) -> &'static str {
        "parted"
    }

    fn to_cli_args(&self) -> Vec<String> {
        let mut args = vec!["-s".to_string(), self.device.display().to_string()];
        args.extend(self.command.args());
        args
    }

    fn is_destructive(&self) -> bool {
        true
    }
}

/// `mkfs.vfat -F 32 <device>`
#[derive(Debug, Clone)]
pub struct MkfsVfat {
    pub device: PathBuf,
}

impl ToolArgs for MkfsVfat {
    fn program(&self) -> &'static str {
        "mkfs.vfat"
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec![
            "-F".to_string(),
            "32".to_string(),
            self.device.display().to_string(),
        ]
    }

    fn is_destructive(&self) -> bool {
        true
    }
}

/// `mkfs.btrfs -f -L <label> <device>`
#[derive(Debug, Clone)]
pub struct MkfsBtrfs {
    pub device: PathBuf,
    pub label: String,
}

impl ToolArgs for MkfsBtrfs {
    fn program(&self) -> &'static str {
        "mkfs.btrfs"
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec![
            "-f".to_string(),
            "-L".to_string(),
            self.label.clone(),
            self.device.display().to_string(),
        ]
    }

    fn is_destructive(&self) -> bool {
        true
    }
}

/// `btrfs subvolume create <path>`
#[derive(Debug, Clone)]
pub struct SubvolumeCreate {
    pub path: PathBuf,
}

impl ToolArgs for SubvolumeCreate {
    fn program(&self) -> &'static str {
        "btrfs"
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec![
            "subvolume".to_string(),
            "create".to_string(),
            self.path.display().to_string(),
        ]
    }
}

/// `blkid -s UUID -o value <device>`
#[derive(Debug, Clone)]
pub struct Blkid {
    pub device: PathBuf,
}

impl ToolArgs for Blkid {
    fn program(&self) -> &'static str {
        "blkid"
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec![
            "-s".to_string(),
            "UUID".to_string(),
            "-o".to_string(),
            "value".to_string(),
            self.device.display().to_string(),
        ]
    }
}

/// `lsblk -d -n -J -o NAME,SIZE,MODEL,TYPE`
#[derive(Debug, Clone, Default)]
pub struct ListDisks;

impl ToolArgs for ListDisks {
    fn program(&self) -> &'static str {
        "lsblk"
    }

    fn to_cli_args(&self) -> Vec<String> {
        ["-d", "-n", "-J", "-o", "NAME,SIZE,MODEL,TYPE"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parted_mkpart_with_fs_type() {
        let args = Parted {
            device: PathBuf::from("/dev/sdb"),
            command: PartedCommand::MkPart {
                name: "ESP".into(),
                fs_type: Some("fat32".into()),
                start: "1MiB".into(),
                end: "513MiB".into(),
            },
        };
        assert_eq!(
            args.to_cli_args(),
            vec!["-s", "/dev/sdb", "mkpart", "ESP", "fat32", "1MiB", "513MiB"]
        );
        assert!(args.is_destructive());
    }

    #[test]
    fn test_parted_set_flag() {
        let args = Parted {
            device: PathBuf::from("/dev/nvme0n1"),
            command: PartedCommand::Set {
                number: 1,
                flag: "esp".into(),
                on: true,
            },
        };
        assert_eq!(args.to_cli_args(), vec!["-s", "/dev/nvme0n1", "set", "1", "esp", "on"]);
    }

    #[test]
    fn test_parted_mklabel() {
        let args = Parted {
            device: PathBuf::from("/dev/sda"),
            command: PartedCommand::MkLabel(PartitionTable::Gpt),
        };
        assert_eq!(args.to_cli_args(), vec!["-s", "/dev/sda", "mklabel", "gpt"]);
    }

    #[test]
    fn test_mkfs_btrfs_forces_and_labels() {
        let args = MkfsBtrfs {
            device: PathBuf::from("/dev/mapper/cryptroot"),
            label: "TocaRoot".into(),
        };
        assert_eq!(args.program(), "mkfs.btrfs");
        assert_eq!(
            args.to_cli_args(),
            vec!["-f", "-L", "TocaRoot", "/dev/mapper/cryptroot"]
        );
    }

    #[test]
    fn test_inspection_tools_are_not_destructive() {
        assert!(!Blkid { device: PathBuf::from("/dev/sda2") }.is_destructive());
        assert!(!ListDisks.is_destructive());
        assert_eq!(
            Blkid { device: PathBuf::from("/dev/sda2") }.to_cli_args(),
            vec!["-s", "UUID", "-o", "value", "/dev/sda2"]
        );
    }
}

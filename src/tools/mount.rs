//! mount / umount.

use std::path::PathBuf;

use crate::tool_traits::ToolArgs;

/// `mount [--bind] [-o <options>] <source> <target>`
#[derive(Debug, Clone, Default)]
pub struct Mount {
    pub source: PathBuf,
    pub target: PathBuf,
    pub options: Option<String>,
    pub bind: bool,
}

impl Mount {
    /// A bind mount of `source` onto `target`.
    pub fn bind(source: impl Into<PathBuf>, target: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            bind: true,
            ..Self::default()
        }
    }
}

impl ToolArgs for Mount {
    fn program(&self) -> &'static str {
        "mount"
    }

    fn to_cli_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if self.bind {
            args.push("--bind".to_string());
        }
        if let Some(options) = &self.options {
            args.push("-o".to_string());
            args.push(options.clone());
        }
        args.push(self.source.display().to_string());
        args.push(self.target.display().to_string());
        args
    }
}

/// `umount [-R] <target>`
#[derive(Debug, Clone, Default)]
pub struct Umount {
    pub target: PathBuf,
    pub recursive: bool,
}

impl Umount {
    pub fn new(target: impl Into<PathBuf>) -> Self {
        Self {
            target: target.into(),
            ..Self::default()
        }
    }

    pub fn recursive(target: impl Into<PathBuf>) -> Self {
        Self {
            target: target.into(),
            recursive: true,
        }
    }
}

impl ToolArgs for Umount {
    fn program(&self) -> &'static str {
        "umount"
    }

    fn to_cli_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if self.recursive {
            args.push("-R".to_string());
        }
        args.push(self.target.display().to_string());
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subvolume_mount_args() {
        let args = Mount {
            source: PathBuf::from("/dev/sdb2"),
            target: PathBuf::from("/mnt/toca_install"),
            options: Some("noatime,subvol=@".into()),
            ..Mount::default()
        };
        assert_eq!(
            args.to_cli_args(),
            vec!["-o", "noatime,subvol=@", "/dev/sdb2", "/mnt/toca_install"]
        );
    }

    #[test]
    fn test_bind_mount_args() {
        let args = Mount::bind("/dev/pts", "/mnt/toca_install/dev/pts");
        assert_eq!(
            args.to_cli_args(),
            vec!["--bind", "/dev/pts", "/mnt/toca_install/dev/pts"]
        );
    }

    #[test]
    fn test_umount_flags() {
        assert_eq!(Umount::new("/mnt/x").to_cli_args(), vec!["/mnt/x"]);
        assert_eq!(Umount::recursive("/mnt/x").to_cli_args(), vec!["-R", "/mnt/x"]);
    }
}

//! Root filesystem population and chroot execution.
//!
//! All three tools run for minutes and print progress, so their output is
//! streamed to the terminal rather than captured.

use std::path::PathBuf;

use crate::tool_traits::ToolArgs;
use crate::types::{Architecture, BootstrapVariant};

/// `debootstrap --arch=<arch> --variant=<variant> <suite> <target> <mirror>`
#[derive(Debug, Clone)]
pub struct Debootstrap {
    pub arch: Architecture,
    pub variant: BootstrapVariant,
    pub suite: String,
    pub target: PathBuf,
    pub mirror: String,
}

impl ToolArgs for Debootstrap {
    fn program(&self) -> &'static str {
        "debootstrap"
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec![
            format!("--arch={}", self.arch),
            format!("--variant={}", self.variant),
            self.suite.clone(),
            self.target.display().to_string(),
            self.mirror.clone(),
        ]
    }

    fn streams_output(&self) -> bool {
        true
    }
}

/// Paths never copied from a running system image.
pub const RSYNC_EXCLUDES: &[&str] = &["/dev/*", "/proc/*", "/sys/*", "/tmp/*"];

/// `rsync -aAXH --numeric-ids --exclude=... <source>/ <target>/`
#[derive(Debug, Clone)]
pub struct Rsync {
    pub source: PathBuf,
    pub target: PathBuf,
}

impl ToolArgs for Rsync {
    fn program(&self) -> &'static str {
        "rsync"
    }

    fn to_cli_args(&self) -> Vec<String> {
        let mut args = vec!["-aAXH".to_string(), "--numeric-ids".to_string()];
        args.extend(RSYNC_EXCLUDES.iter().map(|e| format!("--exclude={}", e)));
        // Trailing slash copies the contents, not the directory itself
        args.push(format!("{}/", self.source.display().to_string().trim_end_matches('/')));
        args.push(format!("{}/", self.target.display().to_string().trim_end_matches('/')));
        args
    }

    fn streams_output(&self) -> bool {
        true
    }
}

/// `chroot <root> <command...>`
#[derive(Debug, Clone)]
pub struct Chroot {
    pub root: PathBuf,
    pub command: Vec<String>,
}

impl ToolArgs for Chroot {
    fn program(&self) -> &'static str {
        "chroot"
    }

    fn to_cli_args(&self) -> Vec<String> {
        let mut args = vec![self.root.display().to_string()];
        args.extend(self.command.iter().cloned());
        args
    }

    fn streams_output(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debootstrap_args() {
        let args = Debootstrap {
            arch: Architecture::Amd64,
            variant: BootstrapVariant::Minbase,
            suite: "bookworm".into(),
            target: PathBuf::from("/mnt/toca_install"),
            mirror: "http://deb.debian.org/debian".into(),
        };
        assert_eq!(
            args.to_cli_args(),
            vec![
                "--arch=amd64",
                "--variant=minbase",
                "bookworm",
                "/mnt/toca_install",
                "http://deb.debian.org/debian"
            ]
        );
        assert!(args.streams_output());
    }

    #[test]
    fn test_rsync_copies_contents_with_excludes() {
        let args = Rsync {
            source: PathBuf::from("/run/live/rootfs/"),
            target: PathBuf::from("/mnt/toca_install"),
        }
        .to_cli_args();

        assert_eq!(args[0], "-aAXH");
        assert!(args.contains(&"--exclude=/proc/*".to_string()));
        assert!(args.contains(&"--exclude=/tmp/*".to_string()));
        assert_eq!(args[args.len() - 2], "/run/live/rootfs/");
        assert_eq!(args[args.len() - 1], "/mnt/toca_install/");
    }

    #[test]
    fn test_chroot_args() {
        let args = Chroot {
            root: PathBuf::from("/mnt/toca_install"),
            command: vec!["/bin/bash".into(), "/setup_internal.sh".into()],
        };
        assert_eq!(
            args.to_cli_args(),
            vec!["/mnt/toca_install", "/bin/bash", "/setup_internal.sh"]
        );
    }
}

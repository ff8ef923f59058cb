//! LUKS container tools.
//!
//! Passphrases are NEVER passed as arguments (visible in `ps aux` and
//! `/proc/<pid>/cmdline`). cryptsetup reads them from stdin via
//! `--key-file=-`, with no trailing newline.

use std::path::PathBuf;

use crate::secret::Secret;
use crate::tool_traits::ToolArgs;

/// `cryptsetup --batch-mode luksFormat --type luks2 --pbkdf pbkdf2 --key-file=- <device>`
///
/// pbkdf2 keeps the container unlockable by GRUB.
#[derive(Debug, Clone)]
pub struct LuksFormat {
    pub device: PathBuf,
    pub passphrase: Secret,
}

impl ToolArgs for LuksFormat {
    fn program(&self) -> &'static str {
        "cryptsetup"
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec![
            "--batch-mode".to_string(),
            "luksFormat".to_string(),
            "--type".to_string(),
            "luks2".to_string(),
            "--pbkdf".to_string(),
            "pbkdf2".to_string(),
            "--key-file=-".to_string(),
            self.device.display().to_string(),
        ]
    }

    fn stdin(&self) -> Option<Secret> {
        Some(self.passphrase.clone())
    }

    fn is_destructive(&self) -> bool {
        true
    }
}

/// `cryptsetup open --key-file=- <device> <name>`
#[derive(Debug, Clone)]
pub struct LuksOpen {
    pub device: PathBuf,
    pub name: String,
    pub passphrase: Secret,
}

impl ToolArgs for LuksOpen {
    fn program(&self) -> &'static str {
        "cryptsetup"
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec![
            "open".to_string(),
            "--key-file=-".to_string(),
            self.device.display().to_string(),
            self.name.clone(),
        ]
    }

    fn stdin(&self) -> Option<Secret> {
        Some(self.passphrase.clone())
    }
}

/// `cryptsetup close <name>`
#[derive(Debug, Clone)]
pub struct LuksClose {
    pub name: String,
}

impl ToolArgs for LuksClose {
    fn program(&self) -> &'static str {
        "cryptsetup"
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec!["close".to_string(), self.name.clone()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passphrase_never_in_argv() {
        let secret = Secret::new("hunter2-very-secret");
        let format = LuksFormat {
            device: PathBuf::from("/dev/sdb2"),
            passphrase: secret.clone(),
        };
        let open = LuksOpen {
            device: PathBuf::from("/dev/sdb2"),
            name: "cryptroot".into(),
            passphrase: secret.clone(),
        };

        for args in [format.to_cli_args(), open.to_cli_args()] {
            assert!(args.iter().all(|a| !a.contains("hunter2")), "{:?}", args);
            assert!(args.contains(&"--key-file=-".to_string()));
        }
        assert_eq!(format.stdin(), Some(secret.clone()));
        assert_eq!(open.stdin(), Some(secret));
    }

    #[test]
    fn test_luks_format_uses_luks2_pbkdf2() {
        let args = LuksFormat {
            device: PathBuf::from("/dev/nvme0n1p2"),
            passphrase: Secret::new("x"),
        };
        let cli = args.to_cli_args();
        assert!(cli.windows(2).any(|w| w == ["--type", "luks2"]));
        assert!(cli.windows(2).any(|w| w == ["--pbkdf", "pbkdf2"]));
        assert_eq!(cli.last().map(String::as_str), Some("/dev/nvme0n1p2"));
        assert!(args.is_destructive());
    }

    #[test]
    fn test_luks_open_and_close() {
        let open = LuksOpen {
            device: PathBuf::from("/dev/sda2"),
            name: "cryptroot".into(),
            passphrase: Secret::new("x"),
        };
        assert_eq!(open.to_cli_args(), vec!["open", "--key-file=-", "/dev/sda2", "cryptroot"]);

        let close = LuksClose { name: "cryptroot".into() };
        assert_eq!(close.to_cli_args(), vec!["close", "cryptroot"]);
        assert_eq!(close.stdin(), None);
    }
}

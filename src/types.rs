//! Type-safe configuration types for tocainstall
//!
//! Stringly-typed choices (architecture, debootstrap variant, subvolume names)
//! become enums with compile-time exhaustive matching.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// How the target root filesystem gets its base system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[serde(rename_all = "snake_case")]
pub enum PopulationMethod {
    /// Network install with debootstrap
    #[default]
    #[strum(serialize = "bootstrap")]
    Bootstrap,
    /// Copy of a prepared root image already present on the live system
    #[strum(serialize = "local_copy")]
    LocalCopy,
}

/// debootstrap `--variant`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum BootstrapVariant {
    #[default]
    Minbase,
    Buildd,
    Fakechroot,
}

/// Debian architecture name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Architecture {
    #[default]
    Amd64,
    Arm64,
    I386,
}

impl Architecture {
    /// `grub-install --target` for UEFI on this architecture
    pub fn grub_efi_target(&self) -> &'static str {
        match self {
            Self::Amd64 => "x86_64-efi",
            Self::Arm64 => "arm64-efi",
            Self::I386 => "i386-efi",
        }
    }

    /// Debian kernel metapackage
    pub fn kernel_package(&self) -> &'static str {
        match self {
            Self::Amd64 => "linux-image-amd64",
            Self::Arm64 => "linux-image-arm64",
            Self::I386 => "linux-image-686",
        }
    }

    /// GRUB EFI packages, signed where Debian ships a signed build
    pub fn grub_packages(&self) -> &'static [&'static str] {
        match self {
            Self::Amd64 => &["grub-efi-amd64", "grub-efi-amd64-signed", "shim-signed"],
            Self::Arm64 => &["grub-efi-arm64", "grub-efi-arm64-signed", "shim-signed"],
            Self::I386 => &["grub-efi-ia32"],
        }
    }
}

/// Btrfs subvolumes in creation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, EnumIter)]
pub enum Subvolume {
    #[strum(serialize = "@")]
    Root,
    #[strum(serialize = "@home")]
    Home,
    #[strum(serialize = "@snapshots")]
    Snapshots,
    #[strum(serialize = "@var_log")]
    VarLog,
}

impl Subvolume {
    /// Mount point inside the target, for subvolumes mounted at install time
    pub fn mount_point(&self) -> Option<&'static str> {
        match self {
            Self::Root => Some("/"),
            Self::Home => Some("/home"),
            Self::Snapshots | Self::VarLog => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn test_population_method_strings() {
        assert_eq!(PopulationMethod::LocalCopy.to_string(), "local_copy");
        assert_eq!(
            PopulationMethod::from_str("bootstrap").unwrap(),
            PopulationMethod::Bootstrap
        );
    }

    #[test]
    fn test_architecture_parsing_and_grub_target() {
        assert_eq!(Architecture::from_str("arm64").unwrap(), Architecture::Arm64);
        assert_eq!(Architecture::Amd64.to_string(), "amd64");
        assert_eq!(Architecture::Amd64.grub_efi_target(), "x86_64-efi");
        assert!(Architecture::from_str("sparc").is_err());
    }

    #[test]
    fn test_variant_serde_lowercase() {
        let json = serde_json::to_string(&BootstrapVariant::Minbase).unwrap();
        assert_eq!(json, "\"minbase\"");
        let parsed: BootstrapVariant = serde_json::from_str("\"buildd\"").unwrap();
        assert_eq!(parsed, BootstrapVariant::Buildd);
    }

    #[test]
    fn test_subvolume_layout() {
        let names: Vec<String> = Subvolume::iter().map(|s| s.to_string()).collect();
        assert_eq!(names, vec!["@", "@home", "@snapshots", "@var_log"]);
        assert_eq!(Subvolume::Home.mount_point(), Some("/home"));
        assert_eq!(Subvolume::VarLog.mount_point(), None);
    }
}

//! The confirmed installation plan.
//!
//! Built once from validated input (prompts or a config file) and then only
//! ever borrowed. Stages read it, none of them change it.

use std::fmt::Write as _;
use std::path::PathBuf;

use crate::config_file::{InstallSettings, PopulationSource};
use crate::engine::storage::{PartitionLayout, StoragePlan, calculate_storage_plan};
use crate::hardware::NetworkState;
use crate::secret::Secret;
use crate::types::Architecture;

#[derive(Debug, Clone)]
pub struct InstallPlan {
    pub disk: PathBuf,
    pub layout: PartitionLayout,
    /// LUKS passphrase; `None` disables encryption
    pub encryption: Option<Secret>,
    pub locale: String,
    pub keymap: Option<String>,
    pub username: String,
    pub user_password: Secret,
    pub root_password: Secret,
    pub hostname: String,
    pub network: NetworkState,
    pub source: PopulationSource,
    pub packages: Vec<String>,
    pub settings: InstallSettings,
}

impl InstallPlan {
    pub fn encrypted(&self) -> bool {
        self.encryption.is_some()
    }

    /// Target architecture. Local copies are assumed to match the default.
    pub fn architecture(&self) -> Architecture {
        match &self.source {
            PopulationSource::Bootstrap { arch, .. } => *arch,
            PopulationSource::LocalCopy { .. } => Architecture::default(),
        }
    }

    pub fn storage_plan(&self) -> StoragePlan {
        calculate_storage_plan(&self.layout)
    }

    /// Human-readable overview, shown before confirmation and by `plan`.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Target disk:   {}", self.disk.display());
        let _ = writeln!(
            out,
            "Encryption:    {}",
            if self.encrypted() {
                format!("LUKS2 -> {}", self.settings.mapped_device().display())
            } else {
                "none".to_string()
            }
        );
        match &self.source {
            PopulationSource::Bootstrap {
                suite,
                mirror,
                arch,
                variant,
            } => {
                let _ = writeln!(
                    out,
                    "Base system:   debootstrap {} ({}, {}) from {}",
                    suite, arch, variant, mirror
                );
            }
            PopulationSource::LocalCopy { source } => {
                let _ = writeln!(out, "Base system:   copy of {}", source.display());
            }
        }
        let _ = writeln!(out, "Hostname:      {}", self.hostname);
        let _ = writeln!(out, "User:          {} (sudo)", self.username);
        let _ = writeln!(out, "Locale:        {}", self.locale);
        let _ = writeln!(
            out,
            "Keymap:        {}",
            self.keymap.as_deref().unwrap_or("(unchanged)")
        );
        if !self.packages.is_empty() {
            let _ = writeln!(out, "Extra packages: {}", self.packages.join(" "));
        }
        let _ = writeln!(out, "Network:       {}", self.network);
        let _ = writeln!(out, "Target root:   {}", self.settings.target_root.display());
        out.push_str(&self.storage_plan().summary());
        out
    }
}

//! Configuration file handling for headless installs.
//!
//! An `InstallationConfig` is the JSON form of everything the interactive
//! prompts collect. Secrets are accepted on load but never written back by
//! `save_to_file`; missing secrets are prompted for at install time.

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::engine::storage::PartitionLayout;
use crate::error::{InstallError, Result};
use crate::hardware::NetworkState;
use crate::plan::InstallPlan;
use crate::secret::{InputError, Secret};
use crate::types::{Architecture, BootstrapVariant, PopulationMethod};

/// Btrfs mount options shared by the mount stage and the generated fstab.
pub const DEFAULT_MOUNT_OPTIONS: &str = "defaults,compress=zstd:1,noatime,space_cache=v2,discard=async";

pub const DEFAULT_SUITE: &str = "bookworm";
pub const DEFAULT_MIRROR: &str = "http://deb.debian.org/debian";
pub const DEFAULT_LOCALE: &str = "en_US.UTF-8";
pub const DEFAULT_USERNAME: &str = "tocauser";
pub const DEFAULT_HOSTNAME: &str = "toca-machine";

/// Installer-side knobs. Every field has a default; a config file only
/// needs to name what it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallSettings {
    /// Where the new system is assembled
    pub target_root: PathBuf,
    /// Temporary mount of the top-level Btrfs volume for subvolume creation
    pub scratch_mount: PathBuf,
    /// `/dev/mapper/<name>` of the opened LUKS container
    pub mapper_name: String,
    pub volume_label: String,
    pub bootloader_id: String,
    pub mount_options: String,
    /// Host resolver config copied into the target
    pub resolv_conf: PathBuf,
    /// Host NetworkManager connection profiles copied into the target
    pub network_profiles: PathBuf,
    /// Mount table consulted before mounting the target
    pub mountinfo: PathBuf,
    /// Pause after the partition table write so udev creates the nodes
    pub settle_delay_ms: u64,
    /// Also bind-mount /run into the chroot
    pub bind_run: bool,
}

impl Default for InstallSettings {
    fn default() -> Self {
        Self {
            target_root: PathBuf::from("/mnt/toca_install"),
            scratch_mount: PathBuf::from("/mnt/tmp_btrfs"),
            mapper_name: "cryptroot".to_string(),
            volume_label: "TocaRoot".to_string(),
            bootloader_id: "TocaLinux".to_string(),
            mount_options: DEFAULT_MOUNT_OPTIONS.to_string(),
            resolv_conf: PathBuf::from("/etc/resolv.conf"),
            network_profiles: PathBuf::from("/etc/NetworkManager/system-connections"),
            mountinfo: PathBuf::from("/proc/self/mountinfo"),
            settle_delay_ms: 2000,
            bind_run: false,
        }
    }
}

impl InstallSettings {
    /// `/dev/mapper/<mapper_name>`
    pub fn mapped_device(&self) -> PathBuf {
        Path::new("/dev/mapper").join(&self.mapper_name)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.target_root.is_absolute() || !self.scratch_mount.is_absolute() {
            bail!("target_root and scratch_mount must be absolute paths");
        }
        if self.target_root == Path::new("/") {
            bail!("target_root cannot be /");
        }
        if self.scratch_mount == self.target_root
            || self.scratch_mount.starts_with(&self.target_root)
            || self.target_root.starts_with(&self.scratch_mount)
        {
            bail!(
                "scratch_mount {:?} must be separate from target_root {:?}",
                self.scratch_mount,
                self.target_root
            );
        }
        if self.mapper_name.is_empty()
            || !self
                .mapper_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            bail!("mapper_name must be non-empty and contain only letters, digits, '-' and '_'");
        }
        if self.volume_label.is_empty() || self.volume_label.len() > 255 {
            bail!("volume_label must be 1-255 bytes");
        }
        if self.bootloader_id.is_empty()
            || !self
                .bootloader_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            bail!("bootloader_id must contain only letters, digits, '-' and '_'");
        }
        if self.mount_options.is_empty() || self.mount_options.contains(char::is_whitespace) {
            bail!("mount_options must be a non-empty comma-separated list");
        }
        if self.mount_options.split(',').any(|o| o.starts_with("subvol")) {
            bail!("mount_options must not select a subvolume");
        }
        Ok(())
    }
}

/// Where the base system comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum PopulationSource {
    /// Network install with debootstrap
    Bootstrap {
        #[serde(default = "default_suite")]
        suite: String,
        #[serde(default = "default_mirror")]
        mirror: String,
        #[serde(default)]
        arch: Architecture,
        #[serde(default)]
        variant: BootstrapVariant,
    },
    /// rsync of a prepared root image on the live system
    LocalCopy { source: PathBuf },
}

fn default_suite() -> String {
    DEFAULT_SUITE.to_string()
}

fn default_mirror() -> String {
    DEFAULT_MIRROR.to_string()
}

impl Default for PopulationSource {
    fn default() -> Self {
        Self::Bootstrap {
            suite: default_suite(),
            mirror: default_mirror(),
            arch: Architecture::default(),
            variant: BootstrapVariant::default(),
        }
    }
}

impl PopulationSource {
    pub fn method(&self) -> PopulationMethod {
        match self {
            Self::Bootstrap { .. } => PopulationMethod::Bootstrap,
            Self::LocalCopy { .. } => PopulationMethod::LocalCopy,
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        match self {
            Self::Bootstrap { suite, mirror, .. } => {
                if suite.is_empty()
                    || !suite.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
                {
                    bail!("Invalid suite name '{}'", suite);
                }
                if !(mirror.starts_with("http://") || mirror.starts_with("https://")) {
                    bail!("Mirror URL must start with http:// or https://");
                }
                if mirror.contains(char::is_whitespace) {
                    bail!("Mirror URL cannot contain whitespace");
                }
            }
            Self::LocalCopy { source } => {
                if !source.is_absolute() || source == Path::new("/") {
                    bail!("Local copy source must be an absolute path other than /");
                }
            }
        }
        Ok(())
    }
}

/// Hostname: 1-63 characters of letters, digits and '-', not starting or
/// ending with '-'.
pub fn validate_hostname(hostname: &str) -> std::result::Result<(), InputError> {
    if hostname.is_empty() {
        return Err(InputError::Empty);
    }
    if hostname.len() > 63 {
        return Err(InputError::Invalid("Hostname must be at most 63 characters".into()));
    }
    if hostname.starts_with('-') || hostname.ends_with('-') {
        return Err(InputError::Invalid("Hostname cannot start or end with '-'".into()));
    }
    if !hostname.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(InputError::Invalid(
            "Hostname can only contain letters, digits and '-'".into(),
        ));
    }
    Ok(())
}

/// Username: a lowercase letter or '_' followed by up to 31 lowercase
/// letters, digits, '_' or '-'. `root` is reserved.
pub fn validate_username(username: &str) -> std::result::Result<(), InputError> {
    let mut chars = username.chars();
    let Some(first) = chars.next() else {
        return Err(InputError::Empty);
    };
    if username.len() > 32 {
        return Err(InputError::Invalid("Username must be at most 32 characters".into()));
    }
    if !(first.is_ascii_lowercase() || first == '_') {
        return Err(InputError::Invalid(
            "Username must start with a lowercase letter or '_'".into(),
        ));
    }
    if !chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-') {
        return Err(InputError::Invalid(
            "Username can only contain lowercase letters, digits, '_' and '-'".into(),
        ));
    }
    if username == "root" {
        return Err(InputError::Invalid("Username 'root' is reserved".into()));
    }
    Ok(())
}

/// Locale such as `en_US.UTF-8` or `pt_BR.UTF-8`.
pub fn validate_locale(locale: &str) -> std::result::Result<(), InputError> {
    if locale.is_empty() {
        return Err(InputError::Empty);
    }
    if !locale
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-' | '@'))
    {
        return Err(InputError::Invalid(format!("Invalid locale '{}'", locale)));
    }
    Ok(())
}

/// Console keymap / XKB layout such as `us`, `br` or `de-latin1`.
pub fn validate_keymap(keymap: &str) -> std::result::Result<(), InputError> {
    if keymap.is_empty() {
        return Err(InputError::Empty);
    }
    if !keymap
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(InputError::Invalid(format!("Invalid keymap '{}'", keymap)));
    }
    Ok(())
}

/// Debian package name rules.
pub fn is_valid_package_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c.is_ascii_digit() => {}
        _ => return false,
    }
    name.len() >= 2
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '+' | '-' | '.'))
}

/// Installation configuration that can be saved/loaded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallationConfig {
    /// Whole-disk device path like /dev/sda
    pub disk: String,

    #[serde(default)]
    pub encrypt: bool,
    #[serde(default, skip_serializing)]
    pub encryption_passphrase: Option<Secret>,

    #[serde(default = "default_locale")]
    pub locale: String,
    #[serde(default)]
    pub keymap: Option<String>,

    #[serde(default = "default_hostname")]
    pub hostname: String,
    #[serde(default = "default_username")]
    pub username: String,
    #[serde(default, skip_serializing)]
    pub user_password: Option<Secret>,
    /// Defaults to the user password when absent
    #[serde(default, skip_serializing)]
    pub root_password: Option<Secret>,

    #[serde(default)]
    pub source: PopulationSource,
    /// Extra packages installed inside the target
    #[serde(default)]
    pub packages: Vec<String>,

    #[serde(default)]
    pub settings: InstallSettings,
}

fn default_locale() -> String {
    DEFAULT_LOCALE.to_string()
}

fn default_hostname() -> String {
    DEFAULT_HOSTNAME.to_string()
}

fn default_username() -> String {
    DEFAULT_USERNAME.to_string()
}

impl Default for InstallationConfig {
    fn default() -> Self {
        Self {
            disk: String::new(),
            encrypt: false,
            encryption_passphrase: None,
            locale: default_locale(),
            keymap: None,
            hostname: default_hostname(),
            username: default_username(),
            user_password: None,
            root_password: None,
            source: PopulationSource::default(),
            packages: Vec::new(),
            settings: InstallSettings::default(),
        }
    }
}

impl InstallationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Save configuration to a JSON file. Secrets are omitted.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)
            .context("Failed to serialize configuration to JSON")?;

        fs::write(&path, json)
            .with_context(|| format!("Failed to write configuration to {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Load configuration from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read configuration from {:?}", path.as_ref()))?;

        let config: Self =
            serde_json::from_str(&content).context("Failed to parse configuration JSON")?;

        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// Absent secrets are allowed (they are prompted for); present ones must
    /// be non-empty.
    pub fn validate(&self) -> anyhow::Result<()> {
        let disk = self.disk.trim();
        if disk.is_empty() {
            bail!("Install disk must be specified");
        }
        PartitionLayout::for_disk(Path::new(disk)).map_err(|e| anyhow::anyhow!("{}", e))?;

        validate_hostname(&self.hostname).context("Invalid hostname")?;
        validate_username(&self.username).context("Invalid username")?;
        validate_locale(&self.locale).context("Invalid locale")?;
        if let Some(keymap) = &self.keymap {
            validate_keymap(keymap).context("Invalid keymap")?;
        }

        if self.user_password.as_ref().is_some_and(Secret::is_empty) {
            bail!("User password cannot be empty");
        }
        if self.root_password.as_ref().is_some_and(Secret::is_empty) {
            bail!("Root password cannot be empty");
        }
        if self.encrypt && self.encryption_passphrase.as_ref().is_some_and(Secret::is_empty) {
            bail!("Encryption passphrase cannot be empty");
        }

        if let Some(bad) = self.packages.iter().find(|p| !is_valid_package_name(p)) {
            bail!("Invalid package name '{}'", bad);
        }

        self.source.validate()?;
        self.settings.validate()?;

        Ok(())
    }

    /// Build the immutable plan. All secrets must be present by now.
    pub fn to_plan(&self, network: NetworkState) -> Result<InstallPlan> {
        self.validate()
            .map_err(|e| InstallError::config(format!("{:#}", e)))?;

        let disk = PathBuf::from(self.disk.trim());
        let layout = PartitionLayout::for_disk(&disk)?;

        let user_password = self
            .user_password
            .clone()
            .ok_or_else(|| InstallError::config("User password is missing"))?;
        let root_password = self
            .root_password
            .clone()
            .unwrap_or_else(|| user_password.clone());

        let encryption = if self.encrypt {
            Some(
                self.encryption_passphrase
                    .clone()
                    .ok_or_else(|| InstallError::config("Encryption passphrase is missing"))?,
            )
        } else {
            None
        };

        Ok(InstallPlan {
            disk,
            layout,
            encryption,
            locale: self.locale.clone(),
            keymap: self.keymap.clone(),
            username: self.username.clone(),
            user_password,
            root_password,
            hostname: self.hostname.clone(),
            network,
            source: self.source.clone(),
            packages: self.packages.clone(),
            settings: self.settings.clone(),
        })
    }

    /// Plan for display only: absent secrets are filled with placeholders.
    pub fn to_preview_plan(&self) -> Result<InstallPlan> {
        const PLACEHOLDER: &str = "<prompted at install time>";
        let mut preview = self.clone();
        preview.user_password.get_or_insert_with(|| Secret::new(PLACEHOLDER));
        if preview.encrypt {
            preview
                .encryption_passphrase
                .get_or_insert_with(|| Secret::new(PLACEHOLDER));
        }
        preview.to_plan(NetworkState::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_test_config() -> InstallationConfig {
        InstallationConfig {
            disk: "/dev/sdb".to_string(),
            hostname: "box1".to_string(),
            username: "alice".to_string(),
            user_password: Some("wonderland".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_installation_config_default() {
        let config = InstallationConfig::default();
        assert!(config.disk.is_empty());
        assert_eq!(config.hostname, "toca-machine");
        assert_eq!(config.username, "tocauser");
        assert_eq!(config.locale, "en_US.UTF-8");
        assert_eq!(config.settings.mount_options, DEFAULT_MOUNT_OPTIONS);
        assert_eq!(config.source.method(), PopulationMethod::Bootstrap);
    }

    #[test]
    fn test_save_omits_secrets_and_reloads() {
        let mut config = create_test_config();
        config.encrypt = true;
        config.encryption_passphrase = Some("luks-secret".into());
        config.root_password = Some("root-secret".into());

        let file = NamedTempFile::new().unwrap();
        config.save_to_file(file.path()).unwrap();

        let raw = fs::read_to_string(file.path()).unwrap();
        assert!(!raw.contains("wonderland"));
        assert!(!raw.contains("luks-secret"));
        assert!(!raw.contains("root-secret"));

        let loaded = InstallationConfig::load_from_file(file.path()).unwrap();
        assert_eq!(loaded.disk, "/dev/sdb");
        assert!(loaded.encrypt);
        assert_eq!(loaded.user_password, None);
        assert_eq!(loaded.encryption_passphrase, None);
    }

    #[test]
    fn test_minimal_json_uses_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "disk": "/dev/nvme0n1", "source": {{ "method": "local_copy", "source": "/run/live/rootfs" }} }}"#
        )
        .unwrap();

        let config = InstallationConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.hostname, DEFAULT_HOSTNAME);
        assert_eq!(config.settings, InstallSettings::default());
        assert_eq!(
            config.source,
            PopulationSource::LocalCopy {
                source: PathBuf::from("/run/live/rootfs")
            }
        );
        config.validate().unwrap();
    }

    #[test]
    fn test_bootstrap_source_defaults() {
        let source: PopulationSource =
            serde_json::from_str(r#"{ "method": "bootstrap", "suite": "trixie" }"#).unwrap();
        match source {
            PopulationSource::Bootstrap { suite, mirror, arch, variant } => {
                assert_eq!(suite, "trixie");
                assert_eq!(mirror, DEFAULT_MIRROR);
                assert_eq!(arch, Architecture::Amd64);
                assert_eq!(variant, BootstrapVariant::Minbase);
            }
            other => panic!("unexpected source {other:?}"),
        }
    }

    #[test]
    fn test_load_invalid_json_fails() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        assert!(InstallationConfig::load_from_file(file.path()).is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = create_test_config();
        config.disk = "/dev/md0".into();
        assert!(config.validate().is_err());

        let mut config = create_test_config();
        config.hostname = "-bad".into();
        assert!(config.validate().is_err());

        let mut config = create_test_config();
        config.username = "Alice".into();
        assert!(config.validate().is_err());

        let mut config = create_test_config();
        config.packages = vec!["vim".into(), "rm -rf".into()];
        assert!(config.validate().is_err());

        let mut config = create_test_config();
        config.settings.scratch_mount = config.settings.target_root.join("scratch");
        assert!(config.validate().is_err());

        let mut config = create_test_config();
        config.encrypt = true;
        config.encryption_passphrase = Some(Secret::new(""));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_loaded_secrets_stay_redacted() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "disk": "/dev/sdb", "encrypt": true, "encryption_passphrase": "luks-secret", "user_password": "wonderland" }}"#
        )
        .unwrap();

        let config = InstallationConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.user_password.as_ref().map(Secret::expose), Some("wonderland"));
        let shown = format!("{:?}", config);
        assert!(!shown.contains("wonderland"));
        assert!(!shown.contains("luks-secret"));

        let plan = config.to_plan(NetworkState::Online).unwrap();
        assert_eq!(plan.encryption.as_ref().map(Secret::expose), Some("luks-secret"));
    }

    #[test]
    fn test_to_plan_requires_secrets() {
        let mut config = create_test_config();
        config.user_password = None;
        assert!(matches!(
            config.to_plan(NetworkState::Online),
            Err(InstallError::Config(_))
        ));

        let mut config = create_test_config();
        config.encrypt = true;
        assert!(matches!(
            config.to_plan(NetworkState::Online),
            Err(InstallError::Config(_))
        ));
    }

    #[test]
    fn test_to_plan_root_password_defaults_to_user_password() {
        let plan = create_test_config().to_plan(NetworkState::Online).unwrap();
        assert_eq!(plan.root_password.expose(), "wonderland");
        assert_eq!(plan.layout.efi, PathBuf::from("/dev/sdb1"));
        assert!(!plan.encrypted());
    }

    #[test]
    fn test_preview_plan_without_secrets() {
        let mut config = create_test_config();
        config.user_password = None;
        config.encrypt = true;
        assert!(config.to_plan(NetworkState::Online).is_err());

        let plan = config.to_preview_plan().unwrap();
        assert!(plan.encrypted());
        assert_eq!(plan.network, NetworkState::Offline);
    }

    #[test]
    fn test_validators() {
        assert!(validate_hostname("box1").is_ok());
        assert_eq!(validate_hostname(""), Err(InputError::Empty));
        assert!(validate_hostname("a_b").is_err());
        assert!(validate_username("alice").is_ok());
        assert!(validate_username("_svc-1").is_ok());
        assert!(validate_username("root").is_err());
        assert!(validate_username("1abc").is_err());
        assert!(validate_locale("pt_BR.UTF-8").is_ok());
        assert!(validate_locale("en US").is_err());
        assert!(validate_keymap("de-latin1").is_ok());
        assert!(is_valid_package_name("g++"));
        assert!(is_valid_package_name("firmware-linux"));
        assert!(!is_valid_package_name("a"));
        assert!(!is_valid_package_name("Vim"));
    }
}

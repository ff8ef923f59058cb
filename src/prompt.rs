//! Interactive collection of the install plan.
//!
//! Every prompt re-asks on an [`InputError`]; only I/O problems on the
//! terminal itself abort. The final confirmation is the single gate before
//! anything destructive happens.

use std::path::PathBuf;

use dialoguer::{Confirm, Input, Password, Select};
use tracing::{info, warn};
use zeroize::Zeroizing;

use crate::catalog::{self, DiskInfo, NetworkInterface, WIFI_RESCAN_DELAY};
use crate::command_runner::CommandRunner;
use crate::config_file::{
    InstallationConfig, PopulationSource, validate_hostname, validate_keymap, validate_locale,
    validate_username,
};
use crate::error::{InstallError, Result};
use crate::hardware::{NetworkState, detect_internet};
use crate::plan::InstallPlan;
use crate::secret::{InputError, Secret, confirm_secret};

/// Word the user has to type to start the install.
pub const CONFIRMATION_WORD: &str = "yes";

fn interaction(e: dialoguer::Error) -> InstallError {
    InstallError::Io(std::io::Error::other(e.to_string()))
}

/// Ask for everything the config file would otherwise hold.
pub fn collect_config(runner: &dyn CommandRunner, defaults: InstallationConfig) -> Result<InstallationConfig> {
    let mut config = defaults;

    let disk = select_disk(runner)?;
    config.disk = disk.path.display().to_string();

    config.encrypt = Confirm::new()
        .with_prompt("Encrypt the root filesystem (LUKS2)?")
        .default(true)
        .interact()
        .map_err(interaction)?;

    config.locale = validated_input("Locale", &config.locale, validate_locale)?;
    let keymap = validated_input("Keyboard layout (empty keeps the default)", "", |k| {
        if k.is_empty() { Ok(()) } else { validate_keymap(k) }
    })?;
    config.keymap = Some(keymap).filter(|k| !k.is_empty());

    config.username = validated_input("Username", &config.username, validate_username)?;
    config.hostname = validated_input("Hostname", &config.hostname, validate_hostname)?;

    config.source = select_source(config.source)?;

    fill_missing_secrets(&mut config)?;
    Ok(config)
}

/// Prompt for the secrets a config file left out.
pub fn fill_missing_secrets(config: &mut InstallationConfig) -> Result<()> {
    if config.encrypt && config.encryption_passphrase.is_none() {
        let secret = confirmed_secret("Encryption passphrase")?;
        config.encryption_passphrase = Some(secret);
    }
    if config.user_password.is_none() {
        let secret = confirmed_secret(&format!("Password for {}", config.username))?;
        config.user_password = Some(secret);
    }
    if config.root_password.is_none() {
        let separate = Confirm::new()
            .with_prompt("Set a separate root password?")
            .default(false)
            .interact()
            .map_err(interaction)?;
        if separate {
            let secret = confirmed_secret("Root password")?;
            config.root_password = Some(secret);
        }
    }
    Ok(())
}

/// Ask twice until both entries match and are non-empty.
fn confirmed_secret(label: &str) -> Result<Secret> {
    loop {
        let first = Zeroizing::new(
            Password::new()
                .with_prompt(label)
                .allow_empty_password(true)
                .interact()
                .map_err(interaction)?,
        );
        let second = Zeroizing::new(
            Password::new()
                .with_prompt(format!("{} (again)", label))
                .allow_empty_password(true)
                .interact()
                .map_err(interaction)?,
        );
        match confirm_secret(&first, &second) {
            Ok(secret) => return Ok(secret),
            Err(e) => eprintln!("{}. Try again.", e),
        }
    }
}

fn validated_input<F>(prompt: &str, default: &str, validate: F) -> Result<String>
where
    F: Fn(&str) -> std::result::Result<(), InputError>,
{
    Input::<String>::new()
        .with_prompt(prompt)
        .default(default.to_string())
        .allow_empty(true)
        .validate_with(|value: &String| validate(value.trim()).map_err(|e| e.to_string()))
        .interact_text()
        .map(|v| v.trim().to_string())
        .map_err(interaction)
}

fn select_disk(runner: &dyn CommandRunner) -> Result<DiskInfo> {
    let mut disks = catalog::list_disks(runner);
    if disks.is_empty() {
        return Err(InstallError::environment("No installable disks found"));
    }
    let labels: Vec<String> = disks.iter().map(DiskInfo::to_string).collect();
    let index = Select::new()
        .with_prompt("Disk to install to (it will be erased)")
        .items(&labels)
        .default(0)
        .interact()
        .map_err(interaction)?;
    pick(&mut disks, index).map_err(InstallError::from)
}

fn select_source(current: PopulationSource) -> Result<PopulationSource> {
    let items = ["Download with debootstrap", "Copy a local root image"];
    let default = match current {
        PopulationSource::Bootstrap { .. } => 0,
        PopulationSource::LocalCopy { .. } => 1,
    };
    let index = Select::new()
        .with_prompt("Base system")
        .items(&items)
        .default(default)
        .interact()
        .map_err(interaction)?;

    match (index, current) {
        (0, current @ PopulationSource::Bootstrap { .. }) => Ok(current),
        (0, _) => Ok(PopulationSource::default()),
        (_, current) => {
            let start = match &current {
                PopulationSource::LocalCopy { source } => source.display().to_string(),
                _ => "/run/live/rootfs".to_string(),
            };
            let source = validated_input("Path of the root image", &start, |p| {
                let path = PathBuf::from(p);
                if p.is_empty() {
                    Err(InputError::Empty)
                } else if !path.is_absolute() || path == PathBuf::from("/") {
                    Err(InputError::Invalid("Use an absolute path other than /".into()))
                } else if !path.is_dir() {
                    Err(InputError::Invalid(format!("{} is not a directory", p)))
                } else {
                    Ok(())
                }
            })?;
            Ok(PopulationSource::LocalCopy {
                source: PathBuf::from(source),
            })
        }
    }
}

fn pick<T>(items: &mut Vec<T>, index: usize) -> std::result::Result<T, InputError> {
    if index < items.len() {
        Ok(items.swap_remove(index))
    } else {
        Err(InputError::InvalidSelection(index.to_string()))
    }
}

/// Offer to bring up networking until the probe succeeds or the user
/// continues offline.
pub fn network_setup(runner: &dyn CommandRunner, host: &str, port: u16) -> Result<NetworkState> {
    loop {
        let state = detect_internet(host, port);
        if state.is_online() {
            return Ok(state);
        }
        warn!("No connectivity to {}:{}", host, port);
        for address in catalog::list_addresses(runner) {
            info!("{} {} {}", address.ifname, address.operstate, address.addresses.join(" "));
        }

        let interfaces = catalog::list_interfaces(runner);
        let actions = network_actions(&interfaces);
        let labels: Vec<String> = actions.iter().map(NetworkAction::to_string).collect();
        let index = Select::new()
            .with_prompt("Network is offline")
            .items(&labels)
            .default(0)
            .interact()
            .map_err(interaction)?;

        match actions.get(index) {
            Some(NetworkAction::Wired(device)) => {
                if let Err(e) = catalog::connect_device(runner, device) {
                    eprintln!("{}", e);
                }
            }
            Some(NetworkAction::Wifi) => join_wifi(runner)?,
            Some(NetworkAction::Retry) => {}
            Some(NetworkAction::Offline) | None => return Ok(NetworkState::Offline),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum NetworkAction {
    Wired(String),
    Wifi,
    Retry,
    Offline,
}

impl std::fmt::Display for NetworkAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Wired(device) => write!(f, "Connect wired interface {}", device),
            Self::Wifi => write!(f, "Join a Wi-Fi network"),
            Self::Retry => write!(f, "Check again"),
            Self::Offline => write!(f, "Continue without network"),
        }
    }
}

fn network_actions(interfaces: &[NetworkInterface]) -> Vec<NetworkAction> {
    let mut actions: Vec<NetworkAction> = interfaces
        .iter()
        .filter(|i| i.is_ethernet() && !i.is_connected())
        .map(|i| NetworkAction::Wired(i.device.clone()))
        .collect();
    if interfaces.iter().any(NetworkInterface::is_wifi) {
        actions.push(NetworkAction::Wifi);
    }
    actions.push(NetworkAction::Retry);
    actions.push(NetworkAction::Offline);
    actions
}

fn join_wifi(runner: &dyn CommandRunner) -> Result<()> {
    println!("Scanning for Wi-Fi networks...");
    let mut networks = catalog::scan_wifi(runner, WIFI_RESCAN_DELAY);
    if networks.is_empty() {
        eprintln!("No Wi-Fi networks found");
        return Ok(());
    }
    let labels: Vec<String> = networks.iter().map(|n| n.to_string()).collect();
    let index = Select::new()
        .with_prompt("Wi-Fi network")
        .items(&labels)
        .default(0)
        .interact()
        .map_err(interaction)?;
    let network = pick(&mut networks, index)?;

    let password = if network.is_open() {
        None
    } else {
        let value = Zeroizing::new(
            Password::new()
                .with_prompt(format!("Password for {}", network.ssid))
                .interact()
                .map_err(interaction)?,
        );
        Some(Secret::new(value.as_str()))
    };

    if let Err(e) = catalog::connect_wifi(runner, &network.ssid, password) {
        eprintln!("{}", e);
    }
    Ok(())
}

/// Show the plan and require the confirmation word.
pub fn confirm_install(plan: &InstallPlan) -> Result<()> {
    println!();
    println!("{}", plan.summary());
    println!("ALL DATA ON {} WILL BE DESTROYED.", plan.disk.display());

    let answer: String = Input::new()
        .with_prompt(format!("Type '{}' to continue", CONFIRMATION_WORD))
        .allow_empty(true)
        .interact_text()
        .map_err(interaction)?;

    if is_confirmation(&answer) {
        Ok(())
    } else {
        Err(InstallError::Cancelled)
    }
}

pub fn is_confirmation(answer: &str) -> bool {
    answer.trim() == CONFIRMATION_WORD
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confirmation_word_is_exact() {
        assert!(is_confirmation("yes"));
        assert!(is_confirmation("  yes\n"));
        assert!(!is_confirmation("y"));
        assert!(!is_confirmation("YES"));
        assert!(!is_confirmation(""));
    }

    #[test]
    fn test_pick_rejects_out_of_range() {
        let mut items = vec!["a", "b"];
        assert_eq!(pick(&mut items, 5), Err(InputError::InvalidSelection("5".into())));
        assert_eq!(pick(&mut items, 1), Ok("b"));
    }

    #[test]
    fn test_network_actions() {
        let interfaces = vec![
            NetworkInterface {
                device: "enp1s0".into(),
                kind: "ethernet".into(),
                state: "disconnected".into(),
            },
            NetworkInterface {
                device: "enp2s0".into(),
                kind: "ethernet".into(),
                state: "connected".into(),
            },
            NetworkInterface {
                device: "wlan0".into(),
                kind: "wifi".into(),
                state: "disconnected".into(),
            },
        ];
        assert_eq!(
            network_actions(&interfaces),
            vec![
                NetworkAction::Wired("enp1s0".into()),
                NetworkAction::Wifi,
                NetworkAction::Retry,
                NetworkAction::Offline
            ]
        );
        assert_eq!(
            network_actions(&[]),
            vec![NetworkAction::Retry, NetworkAction::Offline]
        );
    }
}

//! Host environment detection
//!
//! Firmware mode (UEFI vs BIOS) and internet connectivity, using std
//! primitives only.
//!
//! # Design
//!
//! - **Safe defaults**: detection never fails, it reports BIOS / Offline
//! - **TCP, not ping**: ICMP is commonly filtered; a TCP connect to the
//!   mirror's HTTP port answers the question the installer actually has

use std::fmt;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Host used when no mirror is known (local-copy installs).
pub const DEFAULT_PROBE_HOST: &str = "deb.debian.org";

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Detected firmware mode of the live system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FirmwareMode {
    Uefi,
    Bios,
}

impl FirmwareMode {
    pub fn is_uefi(self) -> bool {
        matches!(self, Self::Uefi)
    }
}

impl fmt::Display for FirmwareMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uefi => write!(f, "UEFI"),
            Self::Bios => write!(f, "BIOS"),
        }
    }
}

/// Network connectivity state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NetworkState {
    Online,
    #[default]
    Offline,
}

impl NetworkState {
    pub fn is_online(self) -> bool {
        matches!(self, Self::Online)
    }
}

impl fmt::Display for NetworkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Online => write!(f, "Online"),
            Self::Offline => write!(f, "Offline"),
        }
    }
}

/// Detect firmware mode by checking for the EFI sysfs directory.
///
/// The kernel exposes `/sys/firmware/efi` only when booted through UEFI.
pub fn detect_firmware_mode() -> FirmwareMode {
    firmware_mode_at(Path::new("/sys/firmware/efi"))
}

fn firmware_mode_at(efi_path: &Path) -> FirmwareMode {
    if efi_path.exists() {
        info!("UEFI firmware detected ({} exists)", efi_path.display());
        FirmwareMode::Uefi
    } else {
        info!("BIOS firmware detected ({} not found)", efi_path.display());
        FirmwareMode::Bios
    }
}

/// Extract `host[:port]` from a mirror URL such as `http://deb.debian.org/debian`.
pub fn probe_target(mirror: &str) -> Option<(String, u16)> {
    let (scheme, rest) = mirror.split_once("://")?;
    let default_port = match scheme {
        "http" => 80,
        "https" => 443,
        _ => return None,
    };

    let authority = rest.split('/').next().filter(|a| !a.is_empty())?;
    match authority.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() => {
            port.parse().ok().map(|p| (host.to_string(), p))
        }
        Some(_) => None,
        None => Some((authority.to_string(), default_port)),
    }
}

/// Detect connectivity with a TCP connect to `host:port`.
///
/// Returns `Offline` on resolution failure, refusal or timeout.
pub fn detect_internet(host: &str, port: u16) -> NetworkState {
    let addrs = match (host, port).to_socket_addrs() {
        Ok(addrs) => addrs.collect::<Vec<_>>(),
        Err(e) => {
            warn!("Cannot resolve {}: {}", host, e);
            return NetworkState::Offline;
        }
    };

    for addr in addrs {
        match TcpStream::connect_timeout(&addr, PROBE_TIMEOUT) {
            Ok(_stream) => {
                info!("Network connectivity confirmed (TCP to {}:{})", host, port);
                return NetworkState::Online;
            }
            Err(e) => warn!("Connectivity probe to {} failed: {}", addr, e),
        }
    }

    NetworkState::Offline
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_firmware_mode_from_path() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(firmware_mode_at(dir.path()), FirmwareMode::Uefi);
        assert_eq!(
            firmware_mode_at(&dir.path().join("missing")),
            FirmwareMode::Bios
        );
    }

    #[test]
    fn test_probe_target_parsing() {
        assert_eq!(
            probe_target("http://deb.debian.org/debian"),
            Some(("deb.debian.org".to_string(), 80))
        );
        assert_eq!(
            probe_target("https://mirror.example.org:8443/debian/"),
            Some(("mirror.example.org".to_string(), 8443))
        );
        assert_eq!(probe_target("ftp://old.example.org/debian"), None);
        assert_eq!(probe_target("deb.debian.org"), None);
        assert_eq!(probe_target("http:///debian"), None);
    }

    #[test]
    fn test_unresolvable_host_is_offline() {
        assert_eq!(
            detect_internet("host.invalid", 80),
            NetworkState::Offline
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(FirmwareMode::Uefi.to_string(), "UEFI");
        assert_eq!(NetworkState::Offline.to_string(), "Offline");
        assert!(!NetworkState::default().is_online());
    }
}

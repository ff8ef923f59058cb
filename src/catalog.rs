//! Device catalog: disks and network interfaces the prompts offer.
//!
//! Listing functions fail soft. A missing tool, a non-zero exit or
//! unparsable output all give an empty list plus a warning, because an
//! empty menu is something the user can react to and a crash is not.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::command_runner::{CommandRunner, Invocation, run_tool};
use crate::error::Result;
use crate::secret::Secret;
use crate::tool_traits::ToolArgs;
use crate::tools::disk::ListDisks;
use crate::tools::network::{
    IpBriefAddr, NmcliConnectDevice, NmcliDeviceStatus, WifiConnect, WifiList, WifiRescan,
};

/// Delay between a Wi-Fi rescan request and reading the results.
pub const WIFI_RESCAN_DELAY: Duration = Duration::from_secs(3);

/// A whole disk that can be installed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskInfo {
    pub path: PathBuf,
    pub size: String,
    pub model: Option<String>,
}

impl fmt::Display for DiskInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.path.display(), self.size)?;
        if let Some(model) = &self.model {
            write!(f, " {}", model)?;
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct LsblkOutput {
    #[serde(default)]
    blockdevices: Vec<LsblkDevice>,
}

#[derive(Debug, Deserialize)]
struct LsblkDevice {
    name: String,
    #[serde(default)]
    size: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(rename = "type")]
    kind: String,
}

/// Parse `lsblk -J` output, keeping `type == "disk"` only.
pub fn parse_disks(json: &str) -> Vec<DiskInfo> {
    let parsed: LsblkOutput = match serde_json::from_str(json) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!("Could not parse lsblk output: {}", e);
            return Vec::new();
        }
    };
    parsed
        .blockdevices
        .into_iter()
        .filter(|d| d.kind == "disk")
        .map(|d| DiskInfo {
            path: PathBuf::from("/dev").join(&d.name),
            size: d.size.unwrap_or_else(|| "?".to_string()),
            model: d
                .model
                .map(|m| m.trim().to_string())
                .filter(|m| !m.is_empty()),
        })
        .collect()
}

pub fn list_disks(runner: &dyn CommandRunner) -> Vec<DiskInfo> {
    match soft_stdout(runner, &ListDisks) {
        Some(stdout) => parse_disks(&stdout),
        None => Vec::new(),
    }
}

/// One row of `nmcli dev`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkInterface {
    pub device: String,
    pub kind: String,
    pub state: String,
}

impl NetworkInterface {
    pub fn is_ethernet(&self) -> bool {
        self.kind == "ethernet"
    }

    pub fn is_wifi(&self) -> bool {
        self.kind == "wifi"
    }

    pub fn is_connected(&self) -> bool {
        self.state == "connected"
    }
}

impl fmt::Display for NetworkInterface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}] {}", self.device, self.kind, self.state)
    }
}

/// Split one line of nmcli terse output. `\:` and `\\` are escapes.
pub fn split_terse(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut chars = line.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            ':' => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}

pub fn parse_interfaces(output: &str) -> Vec<NetworkInterface> {
    output
        .lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|line| {
            let fields = split_terse(line);
            match fields.as_slice() {
                [device, kind, state] => Some(NetworkInterface {
                    device: device.clone(),
                    kind: kind.clone(),
                    state: state.clone(),
                }),
                _ => {
                    debug!("Skipping nmcli line: {}", line);
                    None
                }
            }
        })
        .collect()
}

pub fn list_interfaces(runner: &dyn CommandRunner) -> Vec<NetworkInterface> {
    match soft_stdout(runner, &NmcliDeviceStatus) {
        Some(stdout) => parse_interfaces(&stdout),
        None => Vec::new(),
    }
}

/// Addresses of one interface from `ip -j -br addr`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceAddress {
    pub ifname: String,
    pub operstate: String,
    /// `address/prefix` strings
    pub addresses: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct IpBrief {
    ifname: String,
    #[serde(default)]
    operstate: String,
    #[serde(default)]
    addr_info: Vec<IpAddrInfo>,
}

#[derive(Debug, Deserialize)]
struct IpAddrInfo {
    local: String,
    #[serde(default)]
    prefixlen: Option<u8>,
}

pub fn parse_addresses(json: &str) -> Vec<InterfaceAddress> {
    let parsed: Vec<IpBrief> = match serde_json::from_str(json) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!("Could not parse ip output: {}", e);
            return Vec::new();
        }
    };
    parsed
        .into_iter()
        .filter(|i| i.ifname != "lo")
        .map(|i| InterfaceAddress {
            ifname: i.ifname,
            operstate: i.operstate,
            addresses: i
                .addr_info
                .into_iter()
                .map(|a| match a.prefixlen {
                    Some(len) => format!("{}/{}", a.local, len),
                    None => a.local,
                })
                .collect(),
        })
        .collect()
}

pub fn list_addresses(runner: &dyn CommandRunner) -> Vec<InterfaceAddress> {
    match soft_stdout(runner, &IpBriefAddr) {
        Some(stdout) => parse_addresses(&stdout),
        None => Vec::new(),
    }
}

/// A visible Wi-Fi network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WifiNetwork {
    pub ssid: String,
    pub security: String,
    pub signal: u8,
}

impl WifiNetwork {
    pub fn is_open(&self) -> bool {
        self.security.is_empty() || self.security == "--"
    }
}

impl fmt::Display for WifiNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let security = if self.is_open() { "open" } else { &self.security };
        write!(f, "{} ({}%, {})", self.ssid, self.signal, security)
    }
}

/// Parse `nmcli -t -f SSID,SECURITY,SIGNAL dev wifi list`.
///
/// Hidden networks are skipped; an SSID seen on several access points is
/// listed once with its strongest signal. Strongest first.
pub fn parse_wifi_list(output: &str) -> Vec<WifiNetwork> {
    let mut best: HashMap<String, WifiNetwork> = HashMap::new();
    for line in output.lines() {
        let fields = split_terse(line);
        let [ssid, security, signal] = fields.as_slice() else {
            continue;
        };
        if ssid.is_empty() {
            continue;
        }
        let network = WifiNetwork {
            ssid: ssid.clone(),
            security: security.clone(),
            signal: signal.trim().parse().unwrap_or(0),
        };
        match best.get(ssid) {
            Some(existing) if existing.signal >= network.signal => {}
            _ => {
                best.insert(ssid.clone(), network);
            }
        }
    }
    let mut networks: Vec<WifiNetwork> = best.into_values().collect();
    networks.sort_by(|a, b| b.signal.cmp(&a.signal).then_with(|| a.ssid.cmp(&b.ssid)));
    networks
}

/// Ask NetworkManager to rescan, wait `delay`, then list networks.
pub fn scan_wifi(runner: &dyn CommandRunner, delay: Duration) -> Vec<WifiNetwork> {
    if soft_stdout(runner, &WifiRescan).is_none() {
        warn!("Wi-Fi rescan failed, listing cached results");
    }
    thread::sleep(delay);
    match soft_stdout(runner, &WifiList) {
        Some(stdout) => parse_wifi_list(&stdout),
        None => Vec::new(),
    }
}

/// Bring up a wired interface.
pub fn connect_device(runner: &dyn CommandRunner, device: &str) -> Result<()> {
    run_tool(
        runner,
        &NmcliConnectDevice {
            device: device.to_string(),
        },
    )?;
    Ok(())
}

/// Join a Wi-Fi network; the password travels on stdin.
pub fn connect_wifi(runner: &dyn CommandRunner, ssid: &str, password: Option<Secret>) -> Result<()> {
    run_tool(
        runner,
        &WifiConnect {
            ssid: ssid.to_string(),
            password,
        },
    )?;
    Ok(())
}

/// Stdout of a successful run, or `None` after logging why not.
fn soft_stdout<T: ToolArgs>(runner: &dyn CommandRunner, tool: &T) -> Option<String> {
    match runner.run(&Invocation::from_tool(tool)) {
        Ok(output) if output.success && !output.stdout.trim().is_empty() => Some(output.stdout),
        Ok(output) if output.success => {
            warn!("`{}` produced no output", tool.program());
            None
        }
        Ok(output) => {
            warn!("`{}` failed: {}", tool.program(), output.stderr.trim());
            None
        }
        Err(e) => {
            warn!("{}", e);
            None
        }
    }
}

//! NetworkManager and iproute2 queries.
//!
//! Everything here reads terse (`-t`) or JSON output so the catalog can parse
//! it without screen-scraping tables.

use crate::secret::Secret;
use crate::tool_traits::ToolArgs;

/// `nmcli -t -f DEVICE,TYPE,STATE dev`
#[derive(Debug, Clone, Default)]
pub struct NmcliDeviceStatus;

impl ToolArgs for NmcliDeviceStatus {
    fn program(&self) -> &'static str {
        "nmcli"
    }

    fn to_cli_args(&self) -> Vec<String> {
        ["-t", "-f", "DEVICE,TYPE,STATE", "dev"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }
}

/// `ip -j -br addr`
#[derive(Debug, Clone, Default)]
pub struct IpBriefAddr;

impl ToolArgs for IpBriefAddr {
    fn program(&self) -> &'static str {
        "ip"
    }

    fn to_cli_args(&self) -> Vec<String> {
        ["-j", "-br", "addr"].iter().map(|s| s.to_string()).collect()
    }
}

/// `nmcli dev connect <device>`
#[derive(Debug, Clone)]
pub struct NmcliConnectDevice {
    pub device: String,
}

impl ToolArgs for NmcliConnectDevice {
    fn program(&self) -> &'static str {
        "nmcli"
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec!["dev".to_string(), "connect".to_string(), self.device.clone()]
    }
}

/// `nmcli dev wifi rescan`
#[derive(Debug, Clone, Default)]
pub struct WifiRescan;

impl ToolArgs for WifiRescan {
    fn program(&self) -> &'static str {
        "nmcli"
    }

    fn to_cli_args(&self) -> Vec<String> {
        ["dev", "wifi", "rescan"].iter().map(|s| s.to_string()).collect()
    }
}

/// `nmcli -t -f SSID,SECURITY,SIGNAL dev wifi list`
#[derive(Debug, Clone, Default)]
pub struct WifiList;

impl ToolArgs for WifiList {
    fn program(&self) -> &'static str {
        "nmcli"
    }

    fn to_cli_args(&self) -> Vec<String> {
        ["-t", "-f", "SSID,SECURITY,SIGNAL", "dev", "wifi", "list"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }
}

/// `nmcli [--ask] dev wifi connect <ssid>`
///
/// With a password, `--ask` makes nmcli read it from stdin instead of argv.
#[derive(Debug, Clone)]
pub struct WifiConnect {
    pub ssid: String,
    pub password: Option<Secret>,
}

impl ToolArgs for WifiConnect {
    fn program(&self) -> &'static str {
        "nmcli"
    }

    fn to_cli_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if self.password.is_some() {
            args.push("--ask".to_string());
        }
        args.extend(["dev", "wifi", "connect"].iter().map(|s| s.to_string()));
        args.push(self.ssid.clone());
        args
    }

    fn stdin(&self) -> Option<Secret> {
        self.password
            .as_ref()
            .map(|p| Secret::new(format!("{}\n", p.expose())))
    }
}

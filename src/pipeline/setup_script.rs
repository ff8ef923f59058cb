//! The one-shot configuration script run inside the target.
//!
//! Every value that came from the user goes through [`shell_quote`]; the
//! builder never splices raw strings into a command line.

use crate::config_file::PopulationSource;
use crate::plan::InstallPlan;
use crate::secret::Secret;

/// Script location inside the target root.
pub const SETUP_SCRIPT_PATH: &str = "/setup_internal.sh";

/// Base packages for a bootstrapped system, besides kernel and GRUB.
const BASE_PACKAGES: &[&str] = &[
    "sudo",
    "network-manager",
    "firmware-linux",
    "wget",
    "ca-certificates",
    "locales",
    "initramfs-tools",
    "btrfs-progs",
];

const KEYBOARD_PACKAGES: &[&str] = &["keyboard-configuration", "console-setup"];

/// Quote `value` for POSIX sh. Plain words pass through untouched.
///
/// ```
/// use tocainstall::pipeline::setup_script::shell_quote;
///
/// assert_eq!(shell_quote("alice"), "alice");
/// assert_eq!(shell_quote("it's"), "'it'\\''s'");
/// ```
pub fn shell_quote(value: &str) -> String {
    let safe = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-./:=@%+,".contains(c));
    if safe {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', "'\\''"))
    }
}

/// Line-oriented bash script builder.
#[derive(Debug, Clone)]
pub struct SetupScript {
    lines: Vec<String>,
}

impl Default for SetupScript {
    fn default() -> Self {
        Self::new()
    }
}

impl SetupScript {
    /// Starts with a shebang and strict mode.
    pub fn new() -> Self {
        Self {
            lines: vec!["#!/bin/bash".to_string(), "set -euo pipefail".to_string()],
        }
    }

    pub fn comment(&mut self, text: &str) -> &mut Self {
        self.lines.push(String::new());
        self.lines.push(format!("# {}", text));
        self
    }

    /// `program arg...` with every argument quoted.
    pub fn command<I, S>(&mut self, program: &str, args: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut line = program.to_string();
        for arg in args {
            line.push(' ');
            line.push_str(&shell_quote(arg.as_ref()));
        }
        self.lines.push(line);
        self
    }

    /// Overwrite `path` with `lines`, one per line.
    pub fn write_lines<S: AsRef<str>>(&mut self, path: &str, lines: &[S]) -> &mut Self {
        let quoted: Vec<String> = lines.iter().map(|l| shell_quote(l.as_ref())).collect();
        self.lines.push(format!(
            "printf '%s\\n' {} > {}",
            quoted.join(" "),
            shell_quote(path)
        ));
        self
    }

    /// Feed `lines` to the stdin of `program`.
    pub fn pipe_lines<S: AsRef<str>>(&mut self, lines: &[S], program: &str) -> &mut Self {
        let quoted: Vec<String> = lines.iter().map(|l| shell_quote(l.as_ref())).collect();
        self.lines
            .push(format!("printf '%s\\n' {} | {}", quoted.join(" "), program));
        self
    }

    /// Create `username` unless the image already has it.
    pub fn ensure_user(&mut self, username: &str, group: &str) -> &mut Self {
        let user = shell_quote(username);
        self.lines.push(format!(
            "id -u {user} >/dev/null 2>&1 || useradd -m -s /bin/bash -G {} {user}",
            shell_quote(group)
        ));
        self.lines.push(format!("usermod -aG {} {user}", shell_quote(group)));
        self
    }

    pub fn render(&self) -> String {
        let mut out = self.lines.join("\n");
        out.push('\n');
        out
    }
}

/// Packages the script installs. Empty means apt is not touched at all.
pub fn packages_for(plan: &InstallPlan) -> Vec<String> {
    let mut packages: Vec<String> = Vec::new();
    if matches!(plan.source, PopulationSource::Bootstrap { .. }) {
        let arch = plan.architecture();
        packages.push(arch.kernel_package().to_string());
        packages.extend(BASE_PACKAGES.iter().map(|p| p.to_string()));
        packages.extend(arch.grub_packages().iter().map(|p| p.to_string()));
    }
    if plan.encrypted() {
        packages.push("cryptsetup".to_string());
        packages.push("cryptsetup-initramfs".to_string());
    }
    if plan.keymap.is_some() {
        packages.extend(KEYBOARD_PACKAGES.iter().map(|p| p.to_string()));
    }
    for extra in &plan.packages {
        if !packages.contains(extra) {
            packages.push(extra.clone());
        }
    }
    packages
}

/// Render the configuration script for `plan`.
///
/// The script carries the account passwords, so it comes back as a
/// [`Secret`].
pub fn build_setup_script(plan: &InstallPlan) -> Secret {
    let mut script = SetupScript::new();
    script.command("export", ["DEBIAN_FRONTEND=noninteractive"]);

    if let PopulationSource::Bootstrap { suite, mirror, .. } = &plan.source {
        script.comment("Package sources");
        script.write_lines(
            "/etc/apt/sources.list",
            &[format!("deb {} {} main contrib non-free non-free-firmware", mirror, suite)],
        );
    }

    let packages = packages_for(plan);
    if !packages.is_empty() {
        script.comment("Packages");
        script.command("apt-get", ["update"]);
        let mut args = vec!["install".to_string(), "-y".to_string()];
        args.extend(packages);
        script.command("apt-get", args);
    }

    script.comment("Accounts");
    script.ensure_user(&plan.username, "sudo");
    script.pipe_lines(
        &[
            format!("{}:{}", plan.username, plan.user_password.expose()),
            format!("root:{}", plan.root_password.expose()),
        ],
        "chpasswd",
    );

    script.comment("Locale");
    script.command("locale-gen", Vec::<String>::new());

    script.comment("Boot");
    script.command("update-initramfs", ["-u", "-k", "all"]);
    script.command(
        "grub-install",
        [
            format!("--target={}", plan.architecture().grub_efi_target()),
            "--efi-directory=/boot/efi".to_string(),
            format!("--bootloader-id={}", plan.settings.bootloader_id),
            "--recheck".to_string(),
        ],
    );
    script.command("update-grub", Vec::<String>::new());

    script.comment("Services");
    script.command("systemctl", ["enable", "NetworkManager"]);

    script.comment("Runs once");
    script.command("rm", ["-f", SETUP_SCRIPT_PATH]);

    Secret::new(script.render())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config_file::InstallationConfig;
    use crate::hardware::NetworkState;
    use std::path::PathBuf;

    fn plan_with(config: InstallationConfig) -> InstallPlan {
        config.to_plan(NetworkState::Online).unwrap()
    }

    fn base_config() -> InstallationConfig {
        InstallationConfig {
            disk: "/dev/sdb".into(),
            username: "alice".into(),
            hostname: "box1".into(),
            user_password: Some("wonder land".into()),
            root_password: Some("r00t'pw".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("x86_64-efi"), "x86_64-efi");
        assert_eq!(shell_quote(""), "''");
        assert_eq!(shell_quote("a b"), "'a b'");
        assert_eq!(shell_quote("$(reboot)"), "'$(reboot)'");
        assert_eq!(shell_quote("a'b"), "'a'\\''b'");
    }

    #[test]
    fn test_bootstrap_script_contents() {
        let script = build_setup_script(&plan_with(base_config()));
        let text = script.expose();

        assert!(text.starts_with("#!/bin/bash\nset -euo pipefail\n"));
        assert!(text.contains(
            "'deb http://deb.debian.org/debian bookworm main contrib non-free non-free-firmware'"
        ));
        assert!(text.contains("apt-get update"));
        assert!(text.contains("linux-image-amd64"));
        assert!(text.contains("grub-efi-amd64-signed"));
        assert!(!text.contains("cryptsetup-initramfs"));
        assert!(text.contains("useradd -m -s /bin/bash -G sudo alice"));
        assert!(text.contains("printf '%s\\n' 'alice:wonder land' 'root:r00t'\\''pw' | chpasswd"));
        assert!(text.contains(
            "grub-install --target=x86_64-efi --efi-directory=/boot/efi --bootloader-id=TocaLinux --recheck"
        ));
        assert!(text.contains("systemctl enable NetworkManager"));
        assert!(text.trim_end().ends_with("rm -f /setup_internal.sh"));
    }

    #[test]
    fn test_step_order() {
        let script = build_setup_script(&plan_with(base_config()));
        let text = script.expose();
        let pos = |needle: &str| text.find(needle).unwrap();

        assert!(pos("apt-get install") < pos("useradd"));
        assert!(pos("chpasswd") < pos("locale-gen"));
        assert!(pos("update-initramfs") < pos("grub-install"));
        assert!(pos("grub-install") < pos("update-grub"));
        assert!(pos("update-grub") < pos("rm -f"));
    }

    #[test]
    fn test_encryption_and_keymap_packages() {
        let mut config = base_config();
        config.encrypt = true;
        config.encryption_passphrase = Some("luks".into());
        config.keymap = Some("br".into());
        let packages = packages_for(&plan_with(config));

        assert!(packages.contains(&"cryptsetup-initramfs".to_string()));
        assert!(packages.contains(&"keyboard-configuration".to_string()));
    }

    #[test]
    fn test_local_copy_skips_apt_without_extras() {
        let mut config = base_config();
        config.source = PopulationSource::LocalCopy {
            source: PathBuf::from("/run/live/rootfs"),
        };
        let plan = plan_with(config.clone());
        assert!(packages_for(&plan).is_empty());
        let script = build_setup_script(&plan);
        assert!(!script.expose().contains("apt-get"));
        assert!(!script.expose().contains("sources.list"));

        config.packages = vec!["vim".into()];
        let plan = plan_with(config);
        assert_eq!(packages_for(&plan), vec!["vim".to_string()]);
        assert!(build_setup_script(&plan).expose().contains("apt-get install -y vim"));
    }

    #[test]
    fn test_extras_are_deduplicated() {
        let mut config = base_config();
        config.packages = vec!["sudo".into(), "htop".into()];
        let packages = packages_for(&plan_with(config));
        assert_eq!(packages.iter().filter(|p| *p == "sudo").count(), 1);
        assert_eq!(packages.last().map(String::as_str), Some("htop"));
    }
}

//! Chroot configuration stage.
//!
//! Everything that can be done from outside the target (bind mounts, UUID
//! lookups, static files under /etc) happens here in Rust; only what needs
//! the target's own tools goes into the setup script.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::command_runner::{CommandRunner, Invocation, run_tool};
use crate::error::{InstallError, Result};
use crate::install_state::InstallStage;
use crate::pipeline::encryption::DeviceHandle;
use crate::pipeline::fstab::{render_crypttab, render_fstab};
use crate::pipeline::mount::mount_recorded;
use crate::pipeline::mounts::MountRegistry;
use crate::pipeline::setup_script::{SETUP_SCRIPT_PATH, build_setup_script};
use crate::plan::InstallPlan;
use crate::tools::disk::Blkid;
use crate::tools::mount::Mount;
use crate::tools::system::Chroot;

/// Host pseudo-filesystems bound into the target, parents first.
const BIND_MOUNTS: &[&str] = &["/dev", "/dev/pts", "/proc", "/sys"];

pub fn run(
    runner: &dyn CommandRunner,
    plan: &InstallPlan,
    device: &DeviceHandle,
    mounts: &mut MountRegistry,
) -> Result<String> {
    let root = &plan.settings.target_root;

    bind_host_filesystems(runner, plan, mounts)?;
    copy_resolver_config(&plan.settings.resolv_conf, root);

    let root_uuid = lookup_uuid(runner, device.path())?;
    let efi_uuid = lookup_uuid(runner, &plan.layout.efi)?;

    let etc = root.join("etc");
    fs::create_dir_all(&etc)?;
    write_file(
        &etc.join("fstab"),
        &render_fstab(&root_uuid, &efi_uuid, &plan.settings.mount_options),
    )?;

    if let DeviceHandle::Mapped { backing, name, .. } = device {
        let luks_uuid = lookup_uuid(runner, backing)?;
        write_file(&etc.join("crypttab"), &render_crypttab(name, &luks_uuid))?;
    }

    write_system_identity(plan, &etc)?;

    let script_path = target_path(root, SETUP_SCRIPT_PATH);
    write_setup_script(plan, &script_path)?;

    info!("Running {} inside {}", SETUP_SCRIPT_PATH, root.display());
    let chroot = Chroot {
        root: root.clone(),
        command: vec!["/bin/bash".to_string(), SETUP_SCRIPT_PATH.to_string()],
    };
    let output = runner.run(&Invocation::from_tool(&chroot))?;
    if !output.success {
        return Err(InstallError::ConfigScript {
            code: output.exit_code.unwrap_or(-1),
        });
    }

    Ok(format!("root UUID {}, EFI UUID {}", root_uuid, efi_uuid))
}

fn bind_host_filesystems(
    runner: &dyn CommandRunner,
    plan: &InstallPlan,
    mounts: &mut MountRegistry,
) -> Result<()> {
    let root = &plan.settings.target_root;
    let mut sources: Vec<&str> = BIND_MOUNTS.to_vec();
    if plan.settings.bind_run {
        sources.push("/run");
    }

    for source in sources {
        let target = target_path(root, source);
        fs::create_dir_all(&target)?;
        mount_recorded(runner, mounts, Mount::bind(source, target))?;
    }
    Ok(())
}

/// Copy the host resolver config so apt can resolve names inside the chroot.
/// A missing host file is logged and skipped.
fn copy_resolver_config(host: &Path, root: &Path) {
    let target = root.join("etc/resolv.conf");
    let result = (|| -> std::io::Result<()> {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        // Debian images often ship resolv.conf as a dangling symlink
        if fs::symlink_metadata(&target).is_ok() {
            fs::remove_file(&target)?;
        }
        fs::copy(host, &target)?;
        Ok(())
    })();

    match result {
        Ok(()) => debug!("Copied {} into target", host.display()),
        Err(e) => warn!("Could not copy {} into target: {}", host.display(), e),
    }
}

/// First line of `blkid -s UUID -o value`; empty output is an error.
fn lookup_uuid(runner: &dyn CommandRunner, device: &Path) -> Result<String> {
    let output = run_tool(
        runner,
        &Blkid {
            device: device.to_path_buf(),
        },
    )?;
    let uuid = output.stdout.lines().next().unwrap_or("").trim().to_string();
    if uuid.is_empty() {
        return Err(InstallError::stage(
            InstallStage::Configuring,
            format!("no filesystem UUID found for {}", device.display()),
        ));
    }
    debug!("UUID of {} is {}", device.display(), uuid);
    Ok(uuid)
}

/// locale.gen, default/locale, hostname, hosts and (optionally) keyboard.
fn write_system_identity(plan: &InstallPlan, etc: &Path) -> Result<()> {
    write_file(&etc.join("locale.gen"), &locale_gen_line(&plan.locale))?;

    let default = etc.join("default");
    fs::create_dir_all(&default)?;
    write_file(&default.join("locale"), &format!("LANG={}\n", plan.locale))?;

    write_file(&etc.join("hostname"), &format!("{}\n", plan.hostname))?;
    write_file(&etc.join("hosts"), &render_hosts(&plan.hostname))?;

    if let Some(keymap) = &plan.keymap {
        write_file(&default.join("keyboard"), &render_keyboard(keymap))?;
    }
    Ok(())
}

/// `en_US.UTF-8` becomes `en_US.UTF-8 UTF-8`.
pub(crate) fn locale_gen_line(locale: &str) -> String {
    let charset = locale.split_once('.').map(|(_, c)| c).unwrap_or("UTF-8");
    let charset = charset.split('@').next().unwrap_or(charset);
    format!("{} {}\n", locale, charset)
}

pub(crate) fn render_hosts(hostname: &str) -> String {
    format!(
        "127.0.0.1\tlocalhost\n\
         127.0.1.1\t{}\n\
         \n\
         ::1\tlocalhost ip6-localhost ip6-loopback\n\
         ff02::1\tip6-allnodes\n\
         ff02::2\tip6-allrouters\n",
        hostname
    )
}

pub(crate) fn render_keyboard(layout: &str) -> String {
    format!(
        "XKBMODEL=\"pc105\"\n\
         XKBLAYOUT=\"{}\"\n\
         XKBVARIANT=\"\"\n\
         XKBOPTIONS=\"\"\n\
         \n\
         BACKSPACE=\"guess\"\n",
        layout
    )
}

/// Owner-only executable; it holds the account passwords.
fn write_setup_script(plan: &InstallPlan, path: &Path) -> Result<()> {
    let script = build_setup_script(plan);
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o700)
        .open(path)?;
    file.write_all(script.expose().as_bytes())?;
    debug!("Wrote {}", path.display());
    Ok(())
}

fn write_file(path: &Path, content: &str) -> Result<()> {
    fs::write(path, content)?;
    debug!("Wrote {}", path.display());
    Ok(())
}

/// `root` joined with an absolute in-target path.
fn target_path(root: &Path, absolute: &str) -> PathBuf {
    root.join(absolute.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locale_gen_line() {
        assert_eq!(locale_gen_line("en_US.UTF-8"), "en_US.UTF-8 UTF-8\n");
        assert_eq!(locale_gen_line("pt_BR.UTF-8"), "pt_BR.UTF-8 UTF-8\n");
        assert_eq!(locale_gen_line("de_DE.ISO-8859-15@euro"), "de_DE.ISO-8859-15@euro ISO-8859-15\n");
        assert_eq!(locale_gen_line("C"), "C UTF-8\n");
    }

    #[test]
    fn test_hosts_names_the_machine() {
        let hosts = render_hosts("box1");
        assert!(hosts.starts_with("127.0.0.1\tlocalhost\n"));
        assert!(hosts.contains("127.0.1.1\tbox1\n"));
    }

    #[test]
    fn test_keyboard_layout() {
        assert!(render_keyboard("br").contains("XKBLAYOUT=\"br\"\n"));
    }

    #[test]
    fn test_target_path() {
        assert_eq!(
            target_path(Path::new("/mnt/t"), "/dev/pts"),
            PathBuf::from("/mnt/t/dev/pts")
        );
    }

    #[test]
    fn test_copy_resolver_replaces_symlink() {
        let host = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();
        let resolv = host.path().join("resolv.conf");
        fs::write(&resolv, "nameserver 9.9.9.9\n").unwrap();

        fs::create_dir_all(root.path().join("etc")).unwrap();
        std::os::unix::fs::symlink("/nonexistent/stub-resolv.conf", root.path().join("etc/resolv.conf"))
            .unwrap();

        copy_resolver_config(&resolv, root.path());
        assert_eq!(
            fs::read_to_string(root.path().join("etc/resolv.conf")).unwrap(),
            "nameserver 9.9.9.9\n"
        );
    }
}

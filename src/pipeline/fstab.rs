//! fstab and crypttab rendering.
//!
//! Pure functions of their inputs: identical UUIDs and options always give
//! byte-identical output.

use crate::types::Subvolume;

/// Mount options for one subvolume: the shared set plus `subvol=`.
///
/// ```
/// use tocainstall::pipeline::fstab::subvolume_options;
/// use tocainstall::types::Subvolume;
///
/// assert_eq!(subvolume_options("noatime", Subvolume::Home), "noatime,subvol=@home");
/// ```
pub fn subvolume_options(mount_options: &str, subvolume: Subvolume) -> String {
    format!("{},subvol={}", mount_options, subvolume)
}

/// Three lines: `/` and `/home` on the Btrfs volume, `/boot/efi` on the ESP.
pub fn render_fstab(root_uuid: &str, efi_uuid: &str, mount_options: &str) -> String {
    let mut out = String::new();
    for subvolume in [Subvolume::Root, Subvolume::Home] {
        let Some(mount_point) = subvolume.mount_point() else {
            continue;
        };
        out.push_str(&format!(
            "UUID={} {} btrfs {} 0 0\n",
            root_uuid,
            mount_point,
            subvolume_options(mount_options, subvolume)
        ));
    }
    out.push_str(&format!("UUID={} /boot/efi vfat defaults 0 2\n", efi_uuid));
    out
}

/// One line unlocking the root container at boot from the initramfs.
pub fn render_crypttab(mapper_name: &str, luks_uuid: &str) -> String {
    format!("{} UUID={} none luks,discard,initramfs\n", mapper_name, luks_uuid)
}

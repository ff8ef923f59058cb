//! Property-Based Tests for tocainstall
//!
//! These tests verify:
//! - Partition naming for every supported disk scheme
//! - Mount registry unwinding order
//! - fstab determinism
//! - Secret confirmation
//! - Shell quoting

use std::path::{Path, PathBuf};

use proptest::prelude::*;

use tocainstall::engine::storage::partition_path;
use tocainstall::pipeline::fstab::render_fstab;
use tocainstall::pipeline::mounts::MountRegistry;
use tocainstall::pipeline::setup_script::shell_quote;
use tocainstall::secret::{InputError, confirm_secret};

// =============================================================================
// Partition naming
// =============================================================================

fn digit_terminated_disk() -> impl Strategy<Value = String> {
    prop_oneof![
        (0u8..8, 1u8..4).prop_map(|(c, n)| format!("/dev/nvme{}n{}", c, n)),
        (0u8..4).prop_map(|n| format!("/dev/mmcblk{}", n)),
        (0u8..16).prop_map(|n| format!("/dev/loop{}", n)),
        (0u8..16).prop_map(|n| format!("/dev/nbd{}", n)),
    ]
}

fn letter_terminated_disk() -> impl Strategy<Value = String> {
    (prop_oneof![Just("sd"), Just("vd"), Just("hd"), Just("xvd")], "[a-z]{1,2}")
        .prop_map(|(prefix, suffix)| format!("/dev/{}{}", prefix, suffix))
}

proptest! {
    /// Digit-terminated names get a `p` before the partition number
    #[test]
    fn digit_terminated_names_use_p_suffix(disk in digit_terminated_disk(), n in 1u32..128) {
        let part = partition_path(Path::new(&disk), n).unwrap();
        prop_assert_eq!(part, PathBuf::from(format!("{}p{}", disk, n)));
    }

    /// Letter-terminated names get the bare number
    #[test]
    fn letter_terminated_names_append_number(disk in letter_terminated_disk(), n in 1u32..128) {
        let part = partition_path(Path::new(&disk), n).unwrap();
        prop_assert_eq!(part, PathBuf::from(format!("{}{}", disk, n)));
    }

    /// Anything outside /dev or with an unknown prefix is refused
    #[test]
    fn unknown_schemes_are_rejected(name in "[a-z]{1,6}[0-9]?") {
        prop_assume!(!["sd", "vd", "hd", "xvd", "nvme", "mmcblk", "loop", "nbd"]
            .iter()
            .any(|p| name.starts_with(p)));
        let under_dev = format!("/dev/{}", name);
        let outside_dev = format!("/tmp/{}", name);
        prop_assert!(partition_path(Path::new(&under_dev), 1).is_err());
        prop_assert!(partition_path(Path::new(&outside_dev), 1).is_err());
    }
}

// =============================================================================
// Mount registry
// =============================================================================

proptest! {
    /// Draining hands back exactly what was recorded, newest first, once
    #[test]
    fn registry_unwinds_in_reverse(paths in prop::collection::vec("/[a-z]{1,8}(/[a-z]{1,8}){0,3}", 0..12)) {
        let mut registry = MountRegistry::new();
        for p in &paths {
            registry.record(p.as_str());
        }

        let drained = registry.drain_reverse();
        let expected: Vec<PathBuf> = paths.iter().rev().map(PathBuf::from).collect();
        prop_assert_eq!(drained, expected);
        prop_assert!(registry.is_empty());
        prop_assert!(registry.drain_reverse().is_empty());
    }
}

// =============================================================================
// fstab
// =============================================================================

proptest! {
    /// Same UUIDs and options give byte-identical output
    #[test]
    fn fstab_is_deterministic(
        root in "[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}",
        efi in "[0-9A-F]{4}-[0-9A-F]{4}",
        opts in "[a-z]{1,8}(,[a-z]{1,8}){0,4}",
    ) {
        let a = render_fstab(&root, &efi, &opts);
        let b = render_fstab(&root, &efi, &opts);
        prop_assert_eq!(a.as_bytes(), b.as_bytes());
        prop_assert_eq!(a.lines().count(), 3);
        let root_entry = format!("UUID={} ", root);
        prop_assert_eq!(a.matches(root_entry.as_str()).count(), 2);
    }
}

// =============================================================================
// Secrets
// =============================================================================

proptest! {
    /// Two different non-empty entries never confirm
    #[test]
    fn differing_entries_never_confirm(a in ".{1,32}", b in ".{1,32}") {
        prop_assume!(a != b);
        prop_assert_eq!(confirm_secret(&a, &b).err(), Some(InputError::Mismatch));
    }

    /// Equal non-empty entries always confirm to the same value
    #[test]
    fn equal_entries_confirm(a in ".{1,32}") {
        let secret = confirm_secret(&a, &a).unwrap();
        prop_assert_eq!(secret.expose(), a.as_str());
    }
}

// =============================================================================
// Shell quoting
// =============================================================================

proptest! {
    /// Quoted output is either a safe bare word or a single-quoted string
    /// with no unescaped quote inside
    #[test]
    fn shell_quote_is_closed(value in ".{0,40}") {
        let quoted = shell_quote(&value);
        if quoted.starts_with('\'') {
            prop_assert!(quoted.ends_with('\''));
            let inner = &quoted[1..quoted.len() - 1];
            prop_assert_eq!(inner.replace("'\\''", ""), value.replace('\'', ""));
        } else {
            prop_assert_eq!(&quoted, &value);
            prop_assert!(!quoted.contains(|c: char| c.is_whitespace() || "'\"$`\\;&|<>()*?!".contains(c)));
        }
    }
}

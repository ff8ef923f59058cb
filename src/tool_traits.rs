//! Type-safe tool argument contracts.
//!
//! Every external utility the installer drives (parted, cryptsetup, mount,
//! debootstrap, ...) is described by a struct implementing `ToolArgs`. The
//! struct is the single source of truth for argv; nothing builds raw string
//! vectors at the call site.
//!
//! # Contract
//!
//! - `program()` is the executable name, resolved through `PATH`.
//! - `to_cli_args()` is argv without the program, exactly as the tool expects it.
//! - `stdin()` is the only channel for secrets. Secrets never appear in argv.
//!
//! # Example
//!
//! ```
//! use tocainstall::tool_traits::ToolArgs;
//! use tocainstall::tools::disk::Wipefs;
//!
//! let args = Wipefs { device: "/dev/sda".into() };
//! assert_eq!(args.program(), "wipefs");
//! assert_eq!(args.to_cli_args(), vec!["-a", "/dev/sda"]);
//! assert!(args.is_destructive());
//! ```

use crate::secret::Secret;

/// Trait for typed external tool arguments.
pub trait ToolArgs {
    /// Executable name (e.g. `"cryptsetup"`).
    fn program(&self) -> &'static str;

    /// Convert struct fields to argv (program excluded).
    fn to_cli_args(&self) -> Vec<String>;

    /// Secret to write to the tool's stdin, if any.
    fn stdin(&self) -> Option<Secret> {
        None
    }

    /// Whether the tool irreversibly modifies a block device.
    fn is_destructive(&self) -> bool {
        false
    }

    /// Whether stdout/stderr should go straight to the terminal instead of
    /// being captured (long-running tools with progress output).
    fn streams_output(&self) -> bool {
        false
    }
}

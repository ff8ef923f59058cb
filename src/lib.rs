//! tocainstall library
//!
//! Installs a Debian-based system onto a whole disk: GPT with an ESP, an
//! optional LUKS2 container, Btrfs subvolumes, debootstrap or a local image
//! copy, and a one-shot configuration script inside the target.

pub mod catalog;
pub mod cli;
pub mod command_runner;
pub mod config_file;
pub mod engine;
pub mod error;
pub mod hardware;
pub mod install_state;
pub mod pipeline;
pub mod plan;
pub mod process_guard;
pub mod prompt;
pub mod sanity;
pub mod secret;
pub mod tool_traits;
pub mod tools;
pub mod types;

// Re-export main types for convenience
pub use command_runner::{CommandOutput, CommandRunner, Invocation, RecordingRunner, SystemRunner};
pub use config_file::{InstallSettings, InstallationConfig, PopulationSource};
pub use error::{InstallError, Result};
pub use install_state::{InstallStage, InstallTransitionError, InstallerContext};
pub use pipeline::{DeviceHandle, InstallReport, Installer, MountRegistry, StageResult};
pub use plan::InstallPlan;
pub use process_guard::{ChildRegistry, CommandProcessGroup, ProcessGuard};
pub use secret::{InputError, Secret};
pub use tool_traits::ToolArgs;

// Hardware detection
pub use hardware::{FirmwareMode, NetworkState};

// Storage engine
pub use engine::storage::{PartitionLayout, StorageOp, StoragePlan, calculate_storage_plan};

//! Error handling module for tocainstall
//!
//! One error type for the whole library, built with thiserror. The variants
//! follow how the installer reacts to a failure: environment errors abort
//! before anything is touched, input errors re-prompt, stage errors trigger
//! teardown, and a failed configuration script leaves the target mounted.

use crate::install_state::{InstallStage, InstallTransitionError};
use crate::secret::InputError;
use thiserror::Error;

/// Exit status for a clean run.
pub const EXIT_SUCCESS: i32 = 0;
/// Exit status for fatal errors and user cancellation.
pub const EXIT_FAILURE: i32 = 1;
/// Exit status when the in-target configuration script failed.
pub const EXIT_CONFIG_SCRIPT: i32 = 2;
/// Exit status after SIGINT/SIGTERM/SIGHUP (128 + SIGINT).
pub const EXIT_INTERRUPTED: i32 = 130;

/// Main error type for tocainstall
#[derive(Error, Debug)]
pub enum InstallError {
    /// Pre-flight failures: privileges, tools, firmware, source image
    #[error("Environment check failed: {0}")]
    Environment(String),

    /// Invalid interactive input (recoverable by re-prompting)
    #[error("Invalid input: {0}")]
    Input(#[from] InputError),

    /// Configuration errors (loading, parsing, validation)
    #[error("Configuration error: {0}")]
    Config(String),

    /// An external tool exited non-zero
    #[error("Command `{program}` failed (exit code {code}): {stderr}")]
    Command {
        program: String,
        code: i32,
        stderr: String,
    },

    /// An external tool could not be started at all
    #[error("Failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// A pipeline stage failed for a reason other than a single command
    #[error("{stage} failed: {message}")]
    Stage {
        stage: InstallStage,
        message: String,
    },

    /// The one-shot setup script inside the chroot exited non-zero
    #[error("Configuration script failed inside the target (exit code {code})")]
    ConfigScript { code: i32 },

    /// A termination signal arrived while the pipeline was running
    #[error("Installation interrupted by signal")]
    Interrupted,

    /// The user declined to continue
    #[error("Installation cancelled by user")]
    Cancelled,

    /// Disk path does not follow a naming scheme we can derive partitions for
    #[error("Unknown disk naming scheme for {0} (cannot derive partition names)")]
    UnknownDiskNaming(String),

    /// IO errors (file operations, pipes)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Install state machine transition errors
    #[error("Install transition error: {0}")]
    InstallTransition(#[from] InstallTransitionError),
}

/// Result type alias for tocainstall operations
pub type Result<T> = std::result::Result<T, InstallError>;

// Convenient error constructors
impl InstallError {
    /// Create an environment error
    pub fn environment(msg: impl Into<String>) -> Self {
        Self::Environment(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a stage error
    pub fn stage(stage: InstallStage, msg: impl Into<String>) -> Self {
        Self::Stage {
            stage,
            message: msg.into(),
        }
    }

    /// Create a command failure error
    pub fn command(program: impl Into<String>, code: i32, stderr: impl Into<String>) -> Self {
        Self::Command {
            program: program.into(),
            code,
            stderr: stderr.into(),
        }
    }

    /// The configuration script failure leaves the target mounted for inspection.
    pub fn skips_teardown(&self) -> bool {
        matches!(self, Self::ConfigScript { .. })
    }

    /// Process exit status for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Interrupted => EXIT_INTERRUPTED,
            Self::ConfigScript { .. } => EXIT_CONFIG_SCRIPT,
            _ => EXIT_FAILURE,
        }
    }
}

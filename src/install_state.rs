//! Install State Machine
//!
//! Authoritative, Rust-side source of truth for pipeline progress. Transitions
//! are validated so a stage can never be skipped or re-entered.
//!
//! # Stage Flow
//!
//! ```text
//! NotStarted
//!     ↓
//! ValidatingPlan
//!     ↓
//! Partitioning        (destructive, requires confirmation)
//!     ↓
//! Encrypting          (no-op when encryption is disabled)
//!     ↓
//! Formatting
//!     ↓
//! Mounting
//!     ↓
//! Populating
//!     ↓
//! Configuring
//!     ↓
//! TearingDown
//!     ↓
//! Completed
//!
//! (Any non-terminal stage can transition to Failed)
//! ```

use std::fmt;
use thiserror::Error;

/// Installation stages in sequential order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum InstallStage {
    /// Installation has not started yet
    NotStarted = 0,

    /// Checking plan invariants before anything is mutated
    ValidatingPlan = 1,

    /// Wiping the disk and writing the GPT layout.
    /// This is a DESTRUCTIVE stage - requires explicit confirmation
    Partitioning = 2,

    /// LUKS format + open of the root partition
    Encrypting = 3,

    /// mkfs and subvolume creation
    Formatting = 4,

    /// Mounting the final tree at the target root
    Mounting = 5,

    /// Bootstrap or copy of the base system
    Populating = 6,

    /// fstab, chroot binds and the in-target setup script
    Configuring = 7,

    /// Unmounting and closing the container
    TearingDown = 8,

    /// Installation completed successfully (terminal state)
    Completed = 9,

    /// Installation failed (terminal state)
    Failed = 255,
}

impl InstallStage {
    /// Returns the numeric order of this stage (0-9, 255 for Failed)
    #[inline]
    pub const fn order(self) -> u8 {
        self as u8
    }

    /// Returns true if this is a terminal state (Completed or Failed)
    #[inline]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Returns true if this stage is the first one that touches the disk
    #[inline]
    pub const fn is_destructive(self) -> bool {
        matches!(self, Self::Partitioning)
    }

    /// Returns the next stage in the sequence, or None if at a terminal state
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::NotStarted => Some(Self::ValidatingPlan),
            Self::ValidatingPlan => Some(Self::Partitioning),
            Self::Partitioning => Some(Self::Encrypting),
            Self::Encrypting => Some(Self::Formatting),
            Self::Formatting => Some(Self::Mounting),
            Self::Mounting => Some(Self::Populating),
            Self::Populating => Some(Self::Configuring),
            Self::Configuring => Some(Self::TearingDown),
            Self::TearingDown => Some(Self::Completed),
            Self::Completed | Self::Failed => None,
        }
    }

    /// Returns the previous stage in the sequence, or None if at NotStarted or Failed
    pub const fn previous(self) -> Option<Self> {
        match self {
            Self::ValidatingPlan => Some(Self::NotStarted),
            Self::Partitioning => Some(Self::ValidatingPlan),
            Self::Encrypting => Some(Self::Partitioning),
            Self::Formatting => Some(Self::Encrypting),
            Self::Mounting => Some(Self::Formatting),
            Self::Populating => Some(Self::Mounting),
            Self::Configuring => Some(Self::Populating),
            Self::TearingDown => Some(Self::Configuring),
            Self::Completed => Some(Self::TearingDown),
            Self::NotStarted | Self::Failed => None,
        }
    }

    /// Returns a human-readable description of this stage
    pub const fn description(self) -> &'static str {
        match self {
            Self::NotStarted => "Not started",
            Self::ValidatingPlan => "Validating plan",
            Self::Partitioning => "Partitioning disk",
            Self::Encrypting => "Setting up encryption",
            Self::Formatting => "Formatting filesystems",
            Self::Mounting => "Mounting target",
            Self::Populating => "Installing base system",
            Self::Configuring => "Configuring system",
            Self::TearingDown => "Unmounting target",
            Self::Completed => "Installation complete",
            Self::Failed => "Installation failed",
        }
    }

    /// Returns the approximate progress percentage for this stage
    pub const fn progress_percent(self) -> u8 {
        match self {
            Self::NotStarted => 0,
            Self::ValidatingPlan => 2,
            Self::Partitioning => 5,
            Self::Encrypting => 10,
            Self::Formatting => 15,
            Self::Mounting => 20,
            Self::Populating => 25,
            Self::Configuring => 60,
            Self::TearingDown => 95,
            Self::Completed => 100,
            Self::Failed => 0,
        }
    }

    /// Returns all stages in order (excluding Failed)
    pub const fn all_stages() -> &'static [Self] {
        &[
            Self::NotStarted,
            Self::ValidatingPlan,
            Self::Partitioning,
            Self::Encrypting,
            Self::Formatting,
            Self::Mounting,
            Self::Populating,
            Self::Configuring,
            Self::TearingDown,
            Self::Completed,
        ]
    }
}

impl fmt::Display for InstallStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors that can occur during state transitions
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InstallTransitionError {
    /// Attempted to skip one or more stages
    #[error("Cannot skip from {from} to {to} (must transition through intermediate stages)")]
    SkippedStage {
        from: InstallStage,
        to: InstallStage,
    },

    /// Attempted to go backwards (not allowed)
    #[error("Cannot go backwards from {from} to {to} (installation is forward-only)")]
    BackwardTransition {
        from: InstallStage,
        to: InstallStage,
    },

    /// Attempted to transition from a terminal state
    #[error("Cannot transition from terminal state {from}")]
    FromTerminalState { from: InstallStage },

    /// Attempted a transition that requires confirmation without providing it
    #[error("Stage {stage} requires explicit confirmation (destructive operation)")]
    MissingConfirmation { stage: InstallStage },

    /// Attempted to transition to the same state
    #[error("Already at stage {stage}")]
    AlreadyAtStage { stage: InstallStage },
}

/// Context for tracking installation state.
///
/// Owns the current stage and validates every transition.
///
/// # Example
///
/// ```
/// use tocainstall::install_state::{InstallerContext, InstallStage};
///
/// let mut ctx = InstallerContext::new();
/// assert_eq!(ctx.current_stage(), InstallStage::NotStarted);
///
/// ctx.advance().unwrap();
/// assert_eq!(ctx.current_stage(), InstallStage::ValidatingPlan);
///
/// // Cannot skip stages
/// assert!(ctx.transition_to(InstallStage::Mounting).is_err());
/// ```
#[derive(Debug, Clone)]
pub struct InstallerContext {
    current: InstallStage,

    /// Stage at which failure occurred (if any)
    failed_at: Option<InstallStage>,

    /// (stage, unix timestamp) for every transition
    stage_history: Vec<(InstallStage, u64)>,

    destructive_confirmed: bool,
}

impl Default for InstallerContext {
    fn default() -> Self {
        Self::new()
    }
}

impl InstallerContext {
    pub fn new() -> Self {
        Self {
            current: InstallStage::NotStarted,
            failed_at: None,
            stage_history: Vec::with_capacity(InstallStage::all_stages().len()),
            destructive_confirmed: false,
        }
    }

    #[inline]
    pub fn current_stage(&self) -> InstallStage {
        self.current
    }

    #[inline]
    pub fn failed_at(&self) -> Option<InstallStage> {
        self.failed_at
    }

    #[inline]
    pub fn progress_percent(&self) -> u8 {
        self.current.progress_percent()
    }

    pub fn stage_history(&self) -> &[(InstallStage, u64)] {
        &self.stage_history
    }

    /// Confirm that destructive operations are authorized.
    ///
    /// Must be called before entering `Partitioning`. One-way flag.
    pub fn confirm_destructive_operations(&mut self) {
        self.destructive_confirmed = true;
    }

    /// Advance to the next stage in sequence.
    ///
    /// # Errors
    ///
    /// - `FromTerminalState` if already at Completed or Failed
    /// - `MissingConfirmation` if entering a destructive stage without confirmation
    pub fn advance(&mut self) -> Result<InstallStage, InstallTransitionError> {
        let Some(next_stage) = self.current.next() else {
            return Err(InstallTransitionError::FromTerminalState { from: self.current });
        };

        if next_stage.is_destructive() && !self.destructive_confirmed {
            return Err(InstallTransitionError::MissingConfirmation { stage: next_stage });
        }

        self.record_stage_transition(next_stage);
        self.current = next_stage;

        Ok(next_stage)
    }

    /// Transition to a specific stage (must be the next stage in sequence).
    ///
    /// Stricter than `advance()`: the caller states which stage it expects.
    pub fn transition_to(
        &mut self,
        target: InstallStage,
    ) -> Result<InstallStage, InstallTransitionError> {
        if self.current.is_terminal() {
            return Err(InstallTransitionError::FromTerminalState { from: self.current });
        }

        if target == self.current {
            return Err(InstallTransitionError::AlreadyAtStage { stage: target });
        }

        // Failed is reached through fail()
        if target == InstallStage::Failed {
            return Err(InstallTransitionError::SkippedStage {
                from: self.current,
                to: target,
            });
        }

        if target.order() < self.current.order() {
            return Err(InstallTransitionError::BackwardTransition {
                from: self.current,
                to: target,
            });
        }

        if self.current.next() != Some(target) {
            return Err(InstallTransitionError::SkippedStage {
                from: self.current,
                to: target,
            });
        }

        if target.is_destructive() && !self.destructive_confirmed {
            return Err(InstallTransitionError::MissingConfirmation { stage: target });
        }

        self.record_stage_transition(target);
        self.current = target;

        Ok(target)
    }

    /// Mark the installation as failed, remembering the stage it failed in.
    pub fn fail(&mut self) -> Result<(), InstallTransitionError> {
        if self.current.is_terminal() {
            return Err(InstallTransitionError::FromTerminalState { from: self.current });
        }

        self.failed_at = Some(self.current);
        self.record_stage_transition(InstallStage::Failed);
        self.current = InstallStage::Failed;

        Ok(())
    }

    fn record_stage_transition(&mut self, stage: InstallStage) {
        let timestamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        self.stage_history.push((stage, timestamp));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn advance_to(ctx: &mut InstallerContext, stage: InstallStage) {
        while ctx.current_stage() != stage {
            ctx.advance().expect("Should advance");
        }
    }

    #[test]
    fn test_stage_order_is_sequential() {
        for (i, stage) in InstallStage::all_stages().iter().enumerate() {
            assert_eq!(stage.order() as usize, i, "Stage {:?} should have order {}", stage, i);
        }
    }

    #[test]
    fn test_stage_next_forms_chain() {
        let mut current = InstallStage::NotStarted;
        let mut count = 0;

        while let Some(next) = current.next() {
            current = next;
            count += 1;
            assert!(count < 20, "Infinite loop detected in stage chain");
        }

        assert_eq!(current, InstallStage::Completed);
        assert_eq!(count, 9);
    }

    #[test]
    fn test_stage_previous_forms_reverse_chain() {
        let mut current = InstallStage::Completed;
        let mut count = 0;

        while let Some(prev) = current.previous() {
            current = prev;
            count += 1;
            assert!(count < 20, "Infinite loop detected in stage chain");
        }

        assert_eq!(current, InstallStage::NotStarted);
        assert_eq!(count, 9);
    }

    #[test]
    fn test_only_partitioning_is_destructive() {
        for stage in InstallStage::all_stages() {
            assert_eq!(
                stage.is_destructive(),
                *stage == InstallStage::Partitioning,
                "{:?}",
                stage
            );
        }
    }

    #[test]
    fn test_progress_percent_increases() {
        let mut last_progress = 0u8;
        for stage in InstallStage::all_stages() {
            let progress = stage.progress_percent();
            assert!(progress >= last_progress, "Progress decreased at {:?}", stage);
            last_progress = progress;
        }
        assert_eq!(InstallStage::Completed.progress_percent(), 100);
    }

    #[test]
    fn test_advance_through_all_stages() {
        let mut ctx = InstallerContext::new();
        ctx.confirm_destructive_operations();

        let mut count = 0;
        while ctx.advance().is_ok() {
            count += 1;
            assert!(count < 20, "Infinite loop detected");
        }

        assert_eq!(ctx.current_stage(), InstallStage::Completed);
        assert_eq!(count, 9);
    }

    #[test]
    fn test_partitioning_requires_confirmation() {
        let mut ctx = InstallerContext::new();
        ctx.advance().expect("ValidatingPlan");

        let err = ctx.advance().unwrap_err();
        assert_eq!(
            err,
            InstallTransitionError::MissingConfirmation { stage: InstallStage::Partitioning }
        );

        ctx.confirm_destructive_operations();
        assert_eq!(ctx.advance(), Ok(InstallStage::Partitioning));
    }

    #[test]
    fn test_cannot_skip_or_go_backwards() {
        let mut ctx = InstallerContext::new();
        ctx.confirm_destructive_operations();

        let err = ctx.transition_to(InstallStage::Formatting).unwrap_err();
        assert!(matches!(err, InstallTransitionError::SkippedStage { .. }));

        advance_to(&mut ctx, InstallStage::Mounting);
        let err = ctx.transition_to(InstallStage::Partitioning).unwrap_err();
        assert!(matches!(err, InstallTransitionError::BackwardTransition { .. }));

        let err = ctx.transition_to(InstallStage::Mounting).unwrap_err();
        assert!(matches!(err, InstallTransitionError::AlreadyAtStage { .. }));
    }

    #[test]
    fn test_fail_records_failed_at_stage() {
        let mut ctx = InstallerContext::new();
        ctx.confirm_destructive_operations();
        advance_to(&mut ctx, InstallStage::Populating);

        ctx.fail().expect("Should fail");

        assert_eq!(ctx.current_stage(), InstallStage::Failed);
        assert_eq!(ctx.failed_at(), Some(InstallStage::Populating));
        assert!(matches!(
            ctx.advance().unwrap_err(),
            InstallTransitionError::FromTerminalState { .. }
        ));
        assert!(ctx.fail().is_err());
    }

    #[test]
    fn test_stage_history_is_recorded() {
        let mut ctx = InstallerContext::new();
        assert!(ctx.stage_history().is_empty());

        ctx.advance().expect("ValidatingPlan");
        assert_eq!(ctx.stage_history().len(), 1);
        assert_eq!(ctx.stage_history()[0].0, InstallStage::ValidatingPlan);
    }

    #[test]
    fn test_error_display() {
        let err = InstallTransitionError::SkippedStage {
            from: InstallStage::NotStarted,
            to: InstallStage::Mounting,
        };
        let msg = err.to_string();
        assert!(msg.contains("Cannot skip"));
        assert!(msg.contains("Not started"));
        assert!(msg.contains("Mounting target"));
    }
}

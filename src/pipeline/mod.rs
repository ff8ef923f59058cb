//! The installation pipeline.
//!
//! ```text
//! ValidatingPlan → Partitioning → Encrypting → Formatting → Mounting
//!     → Populating → Configuring → TearingDown → Completed
//!                        │
//!                        └─ any error ─▶ Failed (+ teardown unless the
//!                                        setup script itself failed)
//! ```
//!
//! Stages are plain functions of the plan; the [`Installer`] owns the only
//! mutable state (state machine, mount registry, opened mapping) and alone
//! decides when to clean up.

pub mod chroot;
pub mod encryption;
pub mod filesystem;
pub mod fstab;
pub mod mount;
pub mod mounts;
pub mod partition;
pub mod populate;
pub mod setup_script;
pub mod stage;
pub mod teardown;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use tracing::{debug, error, info, warn};

use crate::command_runner::CommandRunner;
use crate::engine::storage::PartitionLayout;
use crate::error::{InstallError, Result};
use crate::install_state::{InstallStage, InstallerContext};
use crate::plan::InstallPlan;
use crate::process_guard::interrupt_flag;

pub use encryption::DeviceHandle;
pub use mounts::MountRegistry;
pub use stage::StageResult;

/// Resources acquired during a run that teardown has to give back.
#[derive(Debug, Default)]
pub struct Session {
    pub mounts: MountRegistry,
    pub device: Option<DeviceHandle>,
    /// Mapper name of an opened LUKS container
    pub opened_mapping: Option<String>,
}

/// What a successful run produced.
#[derive(Debug)]
pub struct InstallReport {
    pub results: Vec<StageResult>,
    pub device: Option<DeviceHandle>,
    /// Teardown steps that failed but were tolerated
    pub teardown_problems: Vec<String>,
}

pub struct Installer<'a> {
    runner: &'a dyn CommandRunner,
    plan: &'a InstallPlan,
    context: InstallerContext,
    session: Session,
    results: Vec<StageResult>,
    interrupt: Arc<AtomicBool>,
}

impl<'a> Installer<'a> {
    /// Installer watching the process-wide interrupt flag.
    pub fn new(runner: &'a dyn CommandRunner, plan: &'a InstallPlan) -> Self {
        Self::with_interrupt_flag(runner, plan, interrupt_flag())
    }

    pub fn with_interrupt_flag(
        runner: &'a dyn CommandRunner,
        plan: &'a InstallPlan,
        interrupt: Arc<AtomicBool>,
    ) -> Self {
        Self {
            runner,
            plan,
            context: InstallerContext::new(),
            session: Session::default(),
            results: Vec::new(),
            interrupt,
        }
    }

    /// The user has seen the plan and agreed to wipe the disk.
    pub fn confirm_destructive_operations(&mut self) {
        self.context.confirm_destructive_operations();
    }

    /// Run every stage, then tear down.
    ///
    /// On failure the state machine ends in `Failed` and teardown has
    /// already run, except after a failed setup script, which leaves the
    /// target mounted for inspection.
    pub fn run(mut self) -> Result<InstallReport> {
        match self.run_stages() {
            Ok(()) => {
                self.context.transition_to(InstallStage::TearingDown)?;
                let teardown_problems = self.teardown();
                self.context.transition_to(InstallStage::Completed)?;
                info!("{} ({}%)", InstallStage::Completed, self.context.progress_percent());
                debug!("Stage history: {:?}", self.context.stage_history());
                Ok(InstallReport {
                    results: self.results,
                    device: self.session.device,
                    teardown_problems,
                })
            }
            Err(e) => {
                let e = if self.interrupted() {
                    InstallError::Interrupted
                } else {
                    e
                };
                if let Err(transition) = self.context.fail() {
                    warn!("{}", transition);
                }
                let stage = self.context.failed_at().unwrap_or(InstallStage::NotStarted);
                error!("Installation failed during '{}': {}", stage.description(), e);

                if e.skips_teardown() {
                    warn!(
                        "Leaving {} mounted for inspection",
                        self.plan.settings.target_root.display()
                    );
                } else {
                    self.teardown();
                }
                Err(e)
            }
        }
    }

    fn run_stages(&mut self) -> Result<()> {
        self.execute(InstallStage::ValidatingPlan, |s| validate_plan(s.plan))?;
        self.execute(InstallStage::Partitioning, |s| partition::run(s.runner, s.plan))?;
        self.execute(InstallStage::Encrypting, |s| {
            let handle = encryption::run(s.runner, s.plan, &mut s.session)?;
            Ok(handle.path().display().to_string())
        })?;

        let device = self
            .session
            .device
            .clone()
            .ok_or_else(|| InstallError::stage(InstallStage::Encrypting, "no root device resolved"))?;

        self.execute(InstallStage::Formatting, |s| filesystem::run(s.runner, s.plan, &device))?;
        self.execute(InstallStage::Mounting, |s| {
            mount::run(s.runner, s.plan, &device, &mut s.session.mounts)
        })?;
        self.execute(InstallStage::Populating, |s| populate::run(s.runner, s.plan))?;
        self.execute(InstallStage::Configuring, |s| {
            chroot::run(s.runner, s.plan, &device, &mut s.session.mounts)
        })?;
        Ok(())
    }

    /// Enter `stage`, run `body`, and record the outcome.
    fn execute<F>(&mut self, stage: InstallStage, body: F) -> Result<()>
    where
        F: FnOnce(&mut Self) -> Result<String>,
    {
        if self.interrupted() {
            return Err(InstallError::Interrupted);
        }
        self.context.transition_to(stage)?;
        info!("==> {} ({}%)", stage.description(), self.context.progress_percent());

        let started = Instant::now();
        match body(self) {
            Ok(diagnostics) => {
                let result = StageResult::succeeded(stage, diagnostics, started.elapsed());
                info!("{}", result);
                self.results.push(result);
                Ok(())
            }
            Err(e) => {
                let result = StageResult::failed(stage, e.to_string(), started.elapsed());
                error!("{}", result);
                self.results.push(result);
                Err(e)
            }
        }
    }

    fn teardown(&mut self) -> Vec<String> {
        info!("==> {}", InstallStage::TearingDown.description());
        teardown::run(self.runner, self.plan, &mut self.session)
    }

    fn interrupted(&self) -> bool {
        self.interrupt.load(Ordering::SeqCst)
    }
}

/// Last look at the plan before anything is written.
fn validate_plan(plan: &InstallPlan) -> Result<String> {
    let fail = |msg: String| InstallError::stage(InstallStage::ValidatingPlan, msg);

    plan.settings.validate().map_err(|e| fail(format!("{:#}", e)))?;
    plan.source.validate().map_err(|e| fail(format!("{:#}", e)))?;

    if PartitionLayout::for_disk(&plan.disk)? != plan.layout {
        return Err(fail(format!(
            "partition layout does not belong to {}",
            plan.disk.display()
        )));
    }
    if plan.user_password.is_empty() || plan.root_password.is_empty() {
        return Err(fail("account passwords cannot be empty".to_string()));
    }
    if plan.encryption.as_ref().is_some_and(|p| p.is_empty()) {
        return Err(fail("encryption passphrase cannot be empty".to_string()));
    }

    Ok(format!("{} on {}", plan.source.method(), plan.disk.display()))
}

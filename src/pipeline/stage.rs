//! Per-stage outcome records.

use std::fmt;
use std::time::Duration;

use crate::install_state::InstallStage;

/// Outcome of one pipeline stage. Kept in memory for the final report only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageResult {
    pub stage: InstallStage,
    pub success: bool,
    /// Error text on failure, a short note on success
    pub diagnostics: String,
    pub duration: Duration,
}

impl StageResult {
    pub fn succeeded(stage: InstallStage, diagnostics: impl Into<String>, duration: Duration) -> Self {
        Self {
            stage,
            success: true,
            diagnostics: diagnostics.into(),
            duration,
        }
    }

    pub fn failed(stage: InstallStage, diagnostics: impl Into<String>, duration: Duration) -> Self {
        Self {
            stage,
            success: false,
            diagnostics: diagnostics.into(),
            duration,
        }
    }
}

impl fmt::Display for StageResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} ({:.1}s)",
            if self.success { " OK " } else { "FAIL" },
            self.stage,
            self.duration.as_secs_f64()
        )?;
        if !self.diagnostics.is_empty() {
            write!(f, ": {}", self.diagnostics)?;
        }
        Ok(())
    }
}

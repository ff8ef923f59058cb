//! Registry of everything mounted under the target during a run.

use std::path::PathBuf;

/// Mount points in the order they were mounted.
///
/// Appended only after a mount succeeds; drained newest-first so nested
/// mounts (`/dev/pts` inside `/dev`, `/home` inside `/`) come off before
/// their parents. Each path is handed out exactly once.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MountRegistry {
    entries: Vec<PathBuf>,
}

impl MountRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, path: impl Into<PathBuf>) {
        self.entries.push(path.into());
    }

    /// Every entry, newest first. The registry is empty afterwards.
    pub fn drain_reverse(&mut self) -> Vec<PathBuf> {
        let mut drained = std::mem::take(&mut self.entries);
        drained.reverse();
        drained
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

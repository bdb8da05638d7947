//! Change classification: which changes matter, and whether a change can be
//! absorbed by an incremental rebuild or forces a full pipeline restart.

use std::path::Path;
use std::sync::Arc;

use super::types::{ChangeKind, DecisionKind};
use crate::config::{self, EntrySet, ProjectConfig};
use crate::debug;

pub(super) struct Classifier {
    config: Arc<ProjectConfig>,
    entries: EntrySet,
}

impl Classifier {
    pub(super) fn new(config: Arc<ProjectConfig>) -> Self {
        let entries = EntrySet::scan(&config).unwrap_or_default();
        Self { config, entries }
    }

    /// Changes the pipeline itself produces are never build triggers.
    pub(super) fn ignored(&self, path: &Path) -> bool {
        path.starts_with(&self.config.build.output) || path.starts_with(&self.config.build.cache_dir)
    }

    /// Decide what one change demands.
    ///
    /// - The config file itself: hot-reload it, always a restart.
    /// - Created/Removed files: rescan the entry set, since the set may have
    ///   changed out from under us; a changed set is a restart.
    /// - A change to a known entry point: restart.
    /// - Anything else: incremental rebuild.
    pub(super) fn classify(
        &mut self,
        path: &Path,
        kind: ChangeKind,
        errors: &mut Vec<String>,
    ) -> DecisionKind {
        if path == self.config.config_path {
            match config::reload_config() {
                Ok(true) => {
                    debug!("watch"; "config reloaded");
                    self.config = config::cfg();
                    self.entries = EntrySet::scan(&self.config).unwrap_or_default();
                }
                Ok(false) => debug!("watch"; "config unchanged"),
                Err(e) => errors.push(format!("config reload failed: {e}")),
            }
            return DecisionKind::Restart;
        }

        if matches!(kind, ChangeKind::Created | ChangeKind::Removed) {
            match EntrySet::scan(&self.config) {
                Ok(fresh) => {
                    if fresh != self.entries {
                        debug!("watch"; "entry set changed");
                        self.entries = fresh;
                        return DecisionKind::Restart;
                    }
                    self.entries = fresh;
                }
                // Keep the stale set; better a spurious rebuild than a hang.
                Err(e) => errors.push(format!("entry scan failed: {e}")),
            }
        }

        if self.entries.contains(path) {
            return DecisionKind::Restart;
        }
        DecisionKind::Rebuild
    }
}

use std::path::PathBuf;

/// Raw kind of a filesystem change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Modified,
    Removed,
}

impl ChangeKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Modified => "modified",
            Self::Removed => "removed",
        }
    }
}

/// One debounced filesystem change handed to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub kind: ChangeKind,
    pub path: PathBuf,
}

/// What a cycle must do about the accumulated changes.
///
/// `Restart` dominates: once any change in a window demands a restart, the
/// whole window restarts. The derive order makes `max()` express that.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DecisionKind {
    /// Non-entry source changed: rebuild with the existing pipeline.
    Rebuild,
    /// Entry set or config changed: tear the pipeline down and rebuild it.
    Restart,
}

impl DecisionKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Rebuild => "rebuild",
            Self::Restart => "restart",
        }
    }
}

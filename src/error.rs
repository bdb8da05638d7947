//! Pipeline failure taxonomy and per-cycle aggregation.
//!
//! A build cycle is wholly Ok or wholly Err. When concurrent stages fail,
//! every failure is collected under its stage name rather than only the
//! first one encountered. Cache I/O failures are deliberately absent from
//! this taxonomy: they are swallowed at the call site (a cache is an
//! optimization, never a source of truth).

use std::collections::BTreeMap;

use crate::channel::ChannelError;
use crate::manifest::Manifest;

/// A single stage's failure within one build cycle.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StageError {
    /// The stage's underlying bundler failed.
    #[error("bundler failed: {0}")]
    Bundler(String),
    /// The manifest channel misbehaved or was rejected for this cycle.
    #[error(transparent)]
    Channel(#[from] ChannelError),
    /// Scanning the configured entry-point set failed.
    #[error("entry scan failed: {0}")]
    Entries(String),
    /// Persisting a build artifact failed (not cache I/O, which is swallowed).
    #[error("artifact write failed: {0}")]
    Io(String),
    /// The stage's in-flight work was cooperatively cancelled.
    #[error("build cancelled")]
    Cancelled,
    /// The cycle exceeded the configured build timeout.
    #[error("build cycle timed out")]
    TimedOut,
    /// `build()` was called while another cycle was running.
    #[error("a build cycle is already running")]
    Busy,
}

/// All failures of one cycle, keyed by stage name.
///
/// `BTreeMap` keeps reporting order deterministic.
pub type BuildFailures = BTreeMap<String, StageError>;

/// Outcome of one pipeline cycle.
pub type BuildResult = Result<Manifest, BuildFailures>;

/// Aggregate a single failure under a stage name.
pub fn single_failure(stage: &str, error: StageError) -> BuildFailures {
    let mut failures = BTreeMap::new();
    failures.insert(stage.to_string(), error);
    failures
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_failure() {
        let failures = single_failure("client", StageError::Cancelled);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures["client"], StageError::Cancelled);
    }

    #[test]
    fn test_failures_ordering_is_deterministic() {
        let mut failures = BuildFailures::new();
        failures.insert("server".into(), StageError::TimedOut);
        failures.insert("client".into(), StageError::Busy);
        let stages: Vec<_> = failures.keys().cloned().collect();
        assert_eq!(stages, vec!["client", "server"]);
    }
}

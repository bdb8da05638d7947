//! Rebuild scheduling: one explicit state machine instead of racing timers.
//!
//! States: `Idle` (nothing pending), `Debouncing` (changes accumulating
//! inside the window), `Running` (a cycle is in flight; further changes
//! accumulate and at most one follow-up cycle is queued). Every change also
//! carries a [`DecisionKind`], and `Restart` preempts `Rebuild` within a
//! window.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;

use super::types::{ChangeKind, DecisionKind, WatchEvent};
use crate::debug;

/// Poll interval while a cycle is running (waiting for the gate to clear).
const RUNNING_POLL_MS: u64 = 50;

/// Idle wakeup interval. Watch-root re-attachment piggybacks on the
/// scheduler's wakeups, so even a quiet project must wake periodically.
const IDLE_POLL_SECS: u64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum SchedulerState {
    Idle,
    /// Changes are accumulating; `kind` is the strongest decision seen.
    Debouncing { kind: DecisionKind },
    /// A cycle is in flight. Changes arriving now queue exactly one
    /// follow-up, again keeping only the strongest decision.
    Running { pending: Option<DecisionKind> },
}

pub(super) struct Scheduler {
    state: SchedulerState,
    window: Duration,
    cooldown: Duration,
    /// Path -> ChangeKind (dedup is free via map key uniqueness)
    changes: FxHashMap<PathBuf, ChangeKind>,
    last_event: Option<Instant>,
    last_cycle: Option<Instant>,
}

impl Scheduler {
    pub(super) fn new(window: Duration, cooldown: Duration) -> Self {
        Self {
            state: SchedulerState::Idle,
            window,
            cooldown,
            changes: FxHashMap::default(),
            last_event: None,
            last_cycle: None,
        }
    }

    pub(super) fn state(&self) -> SchedulerState {
        self.state
    }

    /// Record one classified change.
    ///
    /// Dedup rules per path:
    /// - Removed + Created/Modified: file was restored, use the new event
    /// - Modified + Removed: upgrade to Removed
    /// - Created + Removed: appeared then vanished, discard entirely
    /// - otherwise: first event wins
    pub(super) fn note(&mut self, path: PathBuf, kind: ChangeKind, decision: DecisionKind) {
        if let Some(&existing) = self.changes.get(&path) {
            match (existing, kind) {
                (ChangeKind::Removed, ChangeKind::Created | ChangeKind::Modified) => {
                    debug!("watch"; "restore {}->{}: {}", existing.label(), kind.label(), path.display());
                    self.changes.insert(path, kind);
                }
                (ChangeKind::Modified, ChangeKind::Removed) => {
                    debug!("watch"; "upgrade modified->removed: {}", path.display());
                    self.changes.insert(path, ChangeKind::Removed);
                }
                (ChangeKind::Created, ChangeKind::Removed) => {
                    debug!("watch"; "discard created+removed: {}", path.display());
                    self.changes.remove(&path);
                }
                _ => return,
            }
        } else {
            debug!("watch"; "event {}: {}", kind.label(), path.display());
            self.changes.insert(path, kind);
        }

        self.last_event = Some(Instant::now());
        self.state = match self.state {
            SchedulerState::Idle => SchedulerState::Debouncing { kind: decision },
            SchedulerState::Debouncing { kind } => SchedulerState::Debouncing {
                kind: kind.max(decision),
            },
            SchedulerState::Running { pending } => SchedulerState::Running {
                pending: Some(pending.map_or(decision, |p| p.max(decision))),
            },
        };
    }

    /// Whether the debounce window and cooldown have both elapsed.
    pub(super) fn is_ready(&self) -> bool {
        let SchedulerState::Debouncing { .. } = self.state else {
            return false;
        };
        let Some(last_event) = self.last_event else {
            return false;
        };
        if last_event.elapsed() < self.window {
            return false;
        }
        if let Some(last_cycle) = self.last_cycle
            && last_cycle.elapsed() < self.cooldown
        {
            return false;
        }
        !self.changes.is_empty()
    }

    /// Take the accumulated window as one cycle, moving to `Running`.
    ///
    /// Events are sorted by path so a cycle's report is deterministic.
    pub(super) fn take_ready(&mut self) -> Option<(DecisionKind, Vec<WatchEvent>)> {
        if !self.is_ready() {
            return None;
        }
        let SchedulerState::Debouncing { kind } = self.state else {
            return None;
        };

        let changes = std::mem::take(&mut self.changes);
        self.last_event = None;
        if changes.is_empty() {
            self.state = SchedulerState::Idle;
            return None;
        }

        let mut events: Vec<WatchEvent> = changes
            .into_iter()
            .map(|(path, kind)| WatchEvent { kind, path })
            .collect();
        events.sort_by(|a, b| a.path.cmp(&b.path));

        self.last_cycle = Some(Instant::now());
        self.state = SchedulerState::Running { pending: None };
        Some((kind, events))
    }

    /// The in-flight cycle finished. A queued follow-up decision (or changes
    /// that arrived meanwhile) re-enters `Debouncing`; otherwise back to
    /// `Idle`.
    pub(super) fn finish(&mut self) {
        let pending = match self.state {
            SchedulerState::Running { pending } => pending,
            // finish() while not running is a no-op
            _ => return,
        };
        self.last_cycle = Some(Instant::now());
        self.state = match (pending, self.changes.is_empty()) {
            (Some(kind), _) => SchedulerState::Debouncing { kind },
            (None, false) => SchedulerState::Debouncing {
                kind: DecisionKind::Rebuild,
            },
            (None, true) => SchedulerState::Idle,
        };
    }

    /// Precise sleep until the next possible ready time.
    pub(super) fn sleep_duration(&self) -> Duration {
        if matches!(self.state, SchedulerState::Running { .. }) {
            return Duration::from_millis(RUNNING_POLL_MS);
        }

        let Some(last_event) = self.last_event else {
            return Duration::from_secs(IDLE_POLL_SECS);
        };

        let window_remaining = self.window.saturating_sub(last_event.elapsed());
        let cooldown_remaining = self
            .last_cycle
            .map(|t| self.cooldown.saturating_sub(t.elapsed()))
            .unwrap_or(Duration::ZERO);

        window_remaining
            .max(cooldown_remaining)
            .max(Duration::from_millis(1))
    }

    #[cfg(test)]
    pub(super) fn force_ready(&mut self) {
        self.last_event = Some(Instant::now() - self.window - Duration::from_millis(1));
        self.last_cycle = None;
    }
}

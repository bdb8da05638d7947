//! The dev session: initial build, then watch-driven rebuild cycles until
//! shutdown.
//!
//! The session owns the coordinator and the watcher. A `Rebuild` cycle
//! reuses the coordinator; a `Restart` disposes it and constructs a fresh
//! one against the (possibly hot-reloaded) config. The last successful
//! manifest is retained across failed cycles, so consumers always have a
//! known-good build to serve.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::bundler::Bundler;
use crate::cache::CacheStore;
use crate::config::{self, ProjectConfig};
use crate::error::BuildResult;
use crate::manifest::Manifest;
use crate::pipeline::Coordinator;
use crate::watch::{DecisionKind, FsWatcher, WatchEvent};

/// Shared busy flag between the session and the watcher's scheduler.
///
/// The watcher sets it when dispatching a cycle and holds further cycles
/// until the session clears it, closing the window between dispatch and the
/// build actually starting.
#[derive(Clone, Default)]
pub struct BuildGate(Arc<AtomicBool>);

impl BuildGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn end(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_busy(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Messages from the watcher to the session.
#[derive(Debug)]
pub enum SessionMsg {
    /// One debounced window's worth of changes, already classified.
    Cycle {
        decision: DecisionKind,
        events: Vec<WatchEvent>,
    },
    /// A non-fatal watcher-side problem worth surfacing.
    WatchError(String),
}

type BuildFinishHook = Box<dyn Fn(Duration, &BuildResult) + Send>;

/// Observation points for embedding the session (the CLI wires these to the
/// logger; a dev server would wire them to live-reload).
pub struct WatchHooks {
    pub on_initial_build_complete: BuildFinishHook,
    pub on_rebuild_start: Box<dyn Fn(DecisionKind) + Send>,
    pub on_rebuild_finish: BuildFinishHook,
    pub on_file_event: Box<dyn Fn(&WatchEvent) + Send>,
    pub on_watch_error: Box<dyn Fn(&str) + Send>,
}

impl Default for WatchHooks {
    fn default() -> Self {
        Self {
            on_initial_build_complete: Box::new(|_, _| {}),
            on_rebuild_start: Box::new(|_| {}),
            on_rebuild_finish: Box::new(|_, _| {}),
            on_file_event: Box::new(|_| {}),
            on_watch_error: Box::new(|_| {}),
        }
    }
}

/// A running dev session.
pub struct DevSession<B: Bundler> {
    bundler: Arc<B>,
    cache: Arc<CacheStore>,
    coordinator: Coordinator<B>,
    hooks: WatchHooks,
    gate: BuildGate,
    msg_rx: mpsc::Receiver<SessionMsg>,
    watcher: Option<JoinHandle<()>>,
    /// Last successful manifest, retained across failed cycles.
    manifest: Option<Manifest>,
    shutdown_rx: Option<crossbeam::channel::Receiver<()>>,
}

impl<B: Bundler> DevSession<B> {
    /// Set up the session: watcher first (so changes made during the initial
    /// build buffer instead of vanishing), coordinator second.
    pub fn new(
        config: Arc<ProjectConfig>,
        bundler: Arc<B>,
        cache: Arc<CacheStore>,
        hooks: WatchHooks,
        shutdown_rx: Option<crossbeam::channel::Receiver<()>>,
    ) -> notify::Result<Self> {
        let gate = BuildGate::new();
        // Busy from the start: the initial build counts as a cycle.
        gate.begin();

        let (msg_tx, msg_rx) = mpsc::channel(16);
        let watcher = FsWatcher::new(config.clone(), msg_tx, gate.clone())?;
        let handle = tokio::spawn(watcher.run());

        let coordinator = Coordinator::new(config, bundler.clone(), cache.clone());

        Ok(Self {
            bundler,
            cache,
            coordinator,
            hooks,
            gate,
            msg_rx,
            watcher: Some(handle),
            manifest: None,
            shutdown_rx,
        })
    }

    /// Last successful manifest, if any cycle has succeeded yet.
    pub fn manifest(&self) -> Option<&Manifest> {
        self.manifest.as_ref()
    }

    /// Run until shutdown is requested or the watcher dies.
    pub async fn run(&mut self) {
        let started = Instant::now();
        let result = self.coordinator.build().await;
        if let Ok(manifest) = &result {
            self.manifest = Some(manifest.clone());
        }
        (self.hooks.on_initial_build_complete)(started.elapsed(), &result);
        self.gate.end();

        loop {
            tokio::select! {
                msg = self.msg_rx.recv() => {
                    match msg {
                        Some(SessionMsg::Cycle { decision, events }) => {
                            self.run_cycle(decision, &events).await;
                        }
                        Some(SessionMsg::WatchError(error)) => {
                            (self.hooks.on_watch_error)(&error);
                        }
                        None => break,
                    }
                }
                _ = tokio::time::sleep(Duration::from_millis(100)) => {
                    if let Some(rx) = &self.shutdown_rx
                        && rx.try_recv().is_ok()
                    {
                        break;
                    }
                }
            }
        }

        self.close().await;
    }

    async fn run_cycle(&mut self, decision: DecisionKind, events: &[WatchEvent]) {
        for event in events {
            (self.hooks.on_file_event)(event);
        }
        (self.hooks.on_rebuild_start)(decision);

        if decision == DecisionKind::Restart {
            // Tear the pipeline down and rebuild it against the current
            // config (the classifier may have hot-reloaded it).
            self.coordinator.dispose();
            let config = config::cfg();
            self.coordinator = Coordinator::new(config, self.bundler.clone(), self.cache.clone());
        }

        let started = Instant::now();
        let result = self.coordinator.build().await;
        if let Ok(manifest) = &result {
            self.manifest = Some(manifest.clone());
        }
        (self.hooks.on_rebuild_finish)(started.elapsed(), &result);

        self.gate.end();
    }

    /// Shut the session down. Idempotent.
    pub async fn close(&mut self) {
        self.coordinator.dispose();
        self.msg_rx.close();
        if let Some(handle) = self.watcher.take() {
            handle.abort();
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundler::SimpleBundler;
    use crate::config::test_config;
    use crate::paths::normalize_path;
    use parking_lot::Mutex;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_initial_build_reports_duration() {
        let temp = TempDir::new().unwrap();
        let root = normalize_path(temp.path());
        fs::create_dir_all(root.join("src/pages")).unwrap();
        fs::write(root.join("src/client.js"), "").unwrap();
        fs::write(root.join("src/server.js"), "").unwrap();
        let config = Arc::new(test_config(&root));

        let seen: Arc<Mutex<Option<(Duration, bool)>>> = Arc::new(Mutex::new(None));
        let hooks = WatchHooks {
            on_initial_build_complete: Box::new({
                let seen = seen.clone();
                move |elapsed, result| {
                    *seen.lock() = Some((elapsed, result.is_ok()));
                }
            }),
            ..WatchHooks::default()
        };

        // Shutdown already requested: run() does the initial build, then
        // exits on its first shutdown poll.
        let (shutdown_tx, shutdown_rx) = crossbeam::channel::bounded(1);
        shutdown_tx.send(()).unwrap();

        let mut session = DevSession::new(
            config.clone(),
            Arc::new(SimpleBundler::new(config)),
            Arc::new(CacheStore::in_memory()),
            hooks,
            Some(shutdown_rx),
        )
        .unwrap();
        session.run().await;

        let (elapsed, ok) = seen.lock().take().expect("initial build hook not called");
        assert!(ok);
        assert!(elapsed < Duration::from_secs(60));
        assert!(session.manifest().is_some());
    }

    #[test]
    fn test_gate_transitions() {
        let gate = BuildGate::new();
        assert!(!gate.is_busy());
        gate.begin();
        assert!(gate.is_busy());
        // Clones share state
        let clone = gate.clone();
        clone.end();
        assert!(!gate.is_busy());
    }

    #[test]
    fn test_default_hooks_are_noops() {
        let hooks = WatchHooks::default();
        (hooks.on_rebuild_start)(DecisionKind::Rebuild);
        (hooks.on_watch_error)("ignored");
    }
}

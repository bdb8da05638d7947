//! File watching.
//!
//! Watches the project for changes and sends debounced, classified cycles to
//! the dev session. Uses the watcher-first pattern: the watcher attaches
//! before the initial build so changes made during it are buffered, not lost.
//!
//! ```text
//! notify -> Scheduler (timing + dedup) -> Classifier (restart vs rebuild) -> SessionMsg
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use rustc_hash::FxHashSet;
use tokio::sync::mpsc;

mod classifier;
mod scheduler;
mod types;


pub use types::{ChangeKind, DecisionKind, WatchEvent};

use classifier::Classifier;
use scheduler::{Scheduler, SchedulerState};

use crate::config::ProjectConfig;
use crate::log;
use crate::paths::normalize_path;
use crate::session::{BuildGate, SessionMsg};

/// Watch-root consistency manager: attaches existing roots at startup and
/// re-attaches roots that were removed and recreated.
struct WatchRoots {
    desired: Vec<PathBuf>,
    attached: FxHashSet<PathBuf>,
}

impl WatchRoots {
    fn new(paths: Vec<PathBuf>) -> Self {
        Self {
            desired: paths,
            attached: FxHashSet::default(),
        }
    }

    fn attach_existing(&mut self, watcher: &mut RecommendedWatcher) -> notify::Result<()> {
        for path in &self.desired {
            if !path.exists() {
                continue;
            }
            watcher.watch(path, RecursiveMode::Recursive)?;
            self.attached.insert(path.clone());
        }
        Ok(())
    }

    fn maintain(&mut self, watcher: &mut RecommendedWatcher) {
        self.attached.retain(|path| path.exists());

        for path in &self.desired {
            if self.attached.contains(path) || !path.exists() {
                continue;
            }
            if watcher.watch(path, RecursiveMode::Recursive).is_ok() {
                self.attached.insert(path.clone());
                crate::debug!("watch"; "re-attached watch: {}", path.display());
            }
        }
    }
}

/// The filesystem watcher feeding the dev session.
pub struct FsWatcher {
    /// Channel to receive notify events (sync -> async bridge)
    notify_rx: std::sync::mpsc::Receiver<notify::Result<notify::Event>>,
    /// Watcher handle (must be kept alive)
    watcher: RecommendedWatcher,
    watch_roots: WatchRoots,
    session_tx: mpsc::Sender<SessionMsg>,
    scheduler: Scheduler,
    classifier: Classifier,
    /// Busy while a cycle runs; the scheduler holds follow-ups until clear.
    gate: BuildGate,
    pending_errors: Vec<String>,
}

impl FsWatcher {
    /// Create a watcher and attach it immediately.
    ///
    /// Events start buffering in `notify_rx` while the caller performs the
    /// initial build, so nothing changed during it is missed.
    pub fn new(
        config: Arc<ProjectConfig>,
        session_tx: mpsc::Sender<SessionMsg>,
        gate: BuildGate,
    ) -> notify::Result<Self> {
        let (notify_tx, notify_rx) = std::sync::mpsc::channel();

        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = notify_tx.send(res);
        })?;

        let mut roots = vec![config.get_root().to_path_buf()];
        roots.extend(config.watch.extra_paths.iter().cloned());
        let mut watch_roots = WatchRoots::new(roots);
        watch_roots.attach_existing(&mut watcher)?;

        Ok(Self {
            notify_rx,
            watcher,
            watch_roots,
            session_tx,
            scheduler: Scheduler::new(config.debounce_window(), config.cooldown()),
            classifier: Classifier::new(config),
            gate,
            pending_errors: Vec::new(),
        })
    }

    /// Run the watcher loop until the session side hangs up.
    pub async fn run(self) {
        let notify_rx = self.notify_rx;
        let session_tx = self.session_tx;
        let gate = self.gate;
        let mut scheduler = self.scheduler;
        let mut classifier = self.classifier;
        let mut watcher = self.watcher;
        let mut watch_roots = self.watch_roots;
        let mut pending_errors = self.pending_errors;

        let (async_tx, mut async_rx) = mpsc::channel::<notify::Event>(64);

        // notify's callback is sync; bridge it onto the runtime.
        std::thread::spawn(move || {
            while let Ok(result) = notify_rx.recv() {
                match result {
                    Ok(event) => {
                        if async_tx.blocking_send(event).is_err() {
                            break; // Receiver dropped
                        }
                    }
                    Err(e) => log!("watch"; "notify error: {}", e),
                }
            }
        });

        loop {
            tokio::select! {
                biased;
                Some(event) = async_rx.recv() => {
                    ingest(&event, &mut scheduler, &mut classifier, &mut pending_errors);
                }
                _ = tokio::time::sleep(scheduler.sleep_duration()) => {
                    watch_roots.maintain(&mut watcher);
                    if flush(&mut scheduler, &session_tx, &gate, &mut pending_errors)
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
            }
        }
    }
}

/// Feed one raw notify event through classification into the scheduler.
fn ingest(
    event: &notify::Event,
    scheduler: &mut Scheduler,
    classifier: &mut Classifier,
    errors: &mut Vec<String>,
) {
    use notify::EventKind;

    let kind = match event.kind {
        EventKind::Create(_) => ChangeKind::Created,
        EventKind::Remove(_) => ChangeKind::Removed,
        EventKind::Modify(modify) => {
            // mtime/atime/chmod noise can trigger endless rebuild loops
            if matches!(modify, notify::event::ModifyKind::Metadata(_)) {
                return;
            }
            ChangeKind::Modified
        }
        _ => return,
    };

    for path in &event.paths {
        if is_temp_file(path) {
            continue;
        }
        let path = normalize_path(path);
        if classifier.ignored(&path) {
            continue;
        }
        let decision = classifier.classify(&path, kind, errors);
        scheduler.note(path, kind, decision);
    }
}

/// Report buffered errors and dispatch a cycle if one is due.
///
/// Returns `Err(())` when the session has shut down.
async fn flush(
    scheduler: &mut Scheduler,
    session_tx: &mpsc::Sender<SessionMsg>,
    gate: &BuildGate,
    pending_errors: &mut Vec<String>,
) -> Result<(), ()> {
    for error in pending_errors.drain(..) {
        session_tx
            .send(SessionMsg::WatchError(error))
            .await
            .map_err(|_| ())?;
    }

    if matches!(scheduler.state(), SchedulerState::Running { .. }) && !gate.is_busy() {
        scheduler.finish();
    }

    let Some((decision, events)) = scheduler.take_ready() else {
        return Ok(());
    };

    // Mark busy before dispatch so nothing slips into the handoff window.
    gate.begin();
    session_tx
        .send(SessionMsg::Cycle { decision, events })
        .await
        .map_err(|_| ())
}

/// Editor temp/backup artifacts are never build triggers.
fn is_temp_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    matches!(ext, "bck" | "bak" | "backup" | "swp" | "swo" | "tmp")
        || name.ends_with('~')
        || name.starts_with('.')
}

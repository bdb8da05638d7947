//! The build pipeline: two sub-compilers coordinated through a one-shot
//! manifest channel, all driven by the [`Coordinator`].
//!
//! The client stage bundles the browser target, assembles the asset
//! manifest, and settles the channel; the server stage bundles the server
//! target and awaits that same manifest before finishing its output. Both
//! run concurrently inside one cycle and both carry a cooperative
//! cancellation handle so a timeout or shutdown can interrupt in-flight
//! work at its await points.

mod client;
mod coordinator;
mod server;

pub use client::ClientCompiler;
pub use coordinator::{Coordinator, PipelineState};
pub use server::{ServerArtifact, ServerCompiler};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

use crate::channel::OnceChannel;
use crate::config::EntrySet;
use crate::error::StageError;
use crate::manifest::Manifest;

/// Cooperative cancellation token shared by a stage and its coordinator.
///
/// `cancel()` interrupts the current cycle; `rearm()` at the start of the
/// next cycle clears it, so one timed-out cycle never poisons later builds.
#[derive(Clone, Default)]
pub struct Cancellation {
    inner: Arc<CancelInner>,
}

#[derive(Default)]
struct CancelInner {
    flag: AtomicBool,
    notify: Notify,
}

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.flag.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    /// Clear the flag at the start of a new cycle.
    pub fn rearm(&self) {
        self.inner.flag.store(false, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.flag.load(Ordering::SeqCst)
    }

    /// Resolve once cancelled. Registers before checking, so a `cancel()`
    /// racing the check still wakes the waiter.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// One concurrent stage of a build cycle.
pub trait SubCompiler: Send + Sync {
    type Artifact: Send;

    fn name(&self) -> &'static str;

    /// Run this stage's portion of a cycle. The channel is fresh per cycle;
    /// the client stage settles it, the server stage awaits it.
    fn build(
        &self,
        entries: &EntrySet,
        channel: &OnceChannel<Manifest>,
    ) -> impl std::future::Future<Output = Result<Self::Artifact, StageError>> + Send;

    /// Interrupt in-flight work at its next await point.
    fn cancel(&self);

    /// Permanently retire this stage. Idempotent; a disposed stage refuses
    /// further builds.
    fn dispose(&self);
}

//! The pipeline coordinator: one build cycle at a time, both stages joined,
//! failures aggregated, the channel never left pending.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::bundler::Bundler;
use crate::cache::CacheStore;
use crate::channel::OnceChannel;
use crate::config::{EntrySet, ProjectConfig};
use crate::debug;
use crate::error::{BuildFailures, BuildResult, StageError, single_failure};
use crate::manifest::Manifest;
use crate::pipeline::{ClientCompiler, ServerCompiler, SubCompiler};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Building,
}

/// Drives both sub-compilers through build cycles.
///
/// A coordinator is cheap to construct and is rebuilt wholesale on a watch
/// restart; its stages are fresh instances each time.
pub struct Coordinator<B> {
    config: Arc<ProjectConfig>,
    client: ClientCompiler<B>,
    server: ServerCompiler<B>,
    state: Mutex<PipelineState>,
    timeout: Option<Duration>,
}

impl<B: Bundler> Coordinator<B> {
    pub fn new(config: Arc<ProjectConfig>, bundler: Arc<B>, cache: Arc<CacheStore>) -> Self {
        let client = ClientCompiler::new(config.clone(), bundler.clone(), cache);
        let server = ServerCompiler::new(config.clone(), bundler);
        let timeout = config.build_timeout();
        Self {
            config,
            client,
            server,
            state: Mutex::new(PipelineState::Idle),
            timeout,
        }
    }

    pub fn state(&self) -> PipelineState {
        *self.state.lock()
    }

    /// Run one build cycle: scan entries, run both stages concurrently,
    /// aggregate whatever failed.
    ///
    /// Overlapping calls are rejected with `Busy` rather than queued; the
    /// watch scheduler owns queueing.
    pub async fn build(&self) -> BuildResult {
        if !self.try_begin() {
            return Err(single_failure("pipeline", StageError::Busy));
        }
        let result = self.run_cycle().await;
        self.finish();
        result
    }

    async fn run_cycle(&self) -> BuildResult {
        let entries = match EntrySet::scan(&self.config) {
            Ok(entries) => entries,
            Err(e) => return Err(single_failure("pipeline", StageError::Entries(e.to_string()))),
        };

        let channel: OnceChannel<Manifest> = OnceChannel::new();

        let cycle = async {
            let (client, server) = tokio::join!(
                self.client.build(&entries, &channel),
                self.server.build(&entries, &channel),
            );
            self.aggregate(client, server)
        };

        let result = match self.timeout {
            None => cycle.await,
            Some(limit) => match tokio::time::timeout(limit, cycle).await {
                Ok(result) => result,
                Err(_) => {
                    debug!("pipeline"; "cycle exceeded {:?}, cancelling stages", limit);
                    self.client.cancel();
                    self.server.cancel();
                    Err(single_failure("pipeline", StageError::TimedOut))
                }
            },
        };

        // Invariant: no cycle ends with a pending channel.
        if channel.is_pending() {
            let _ = channel.reject("build cycle ended without a manifest");
        }
        result
    }

    fn aggregate(
        &self,
        client: Result<Manifest, StageError>,
        server: Result<super::ServerArtifact, StageError>,
    ) -> BuildResult {
        let mut failures = BuildFailures::new();
        if let Err(e) = &client {
            failures.insert(self.client.name().to_string(), e.clone());
        }
        if let Err(e) = &server {
            failures.insert(self.server.name().to_string(), e.clone());
        }
        match client {
            Ok(manifest) if failures.is_empty() => Ok(manifest),
            _ => Err(failures),
        }
    }

    fn try_begin(&self) -> bool {
        let mut state = self.state.lock();
        if *state == PipelineState::Building {
            return false;
        }
        *state = PipelineState::Building;
        true
    }

    fn finish(&self) {
        *self.state.lock() = PipelineState::Idle;
    }

    /// Interrupt the current cycle, if any.
    pub fn cancel(&self) {
        self.client.cancel();
        self.server.cancel();
    }

    /// Retire both stages. The coordinator is done after this; a restart
    /// constructs a new one.
    pub fn dispose(&self) {
        self.client.dispose();
        self.server.dispose();
        self.finish();
    }
}

//! Server sub-compiler: bundles the server target, then awaits the client
//! stage's manifest before writing the server entry descriptor.

use std::fs;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};

use crate::bundler::{BundleTarget, Bundler};
use crate::channel::OnceChannel;
use crate::config::{EntrySet, ProjectConfig};
use crate::error::StageError;
use crate::manifest::Manifest;
use crate::pipeline::{Cancellation, SubCompiler};

/// The server stage's output: which compiled module to load, and which
/// manifest version it was rendered against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerArtifact {
    pub module_ref: String,
    pub manifest_version: String,
}

pub struct ServerCompiler<B> {
    bundler: Arc<B>,
    config: Arc<ProjectConfig>,
    cancel: Cancellation,
    disposed: AtomicBool,
}

impl<B: Bundler> ServerCompiler<B> {
    pub fn new(config: Arc<ProjectConfig>, bundler: Arc<B>) -> Self {
        Self {
            bundler,
            config,
            cancel: Cancellation::new(),
            disposed: AtomicBool::new(false),
        }
    }

    fn write_descriptor(&self, artifact: &ServerArtifact) -> Result<(), StageError> {
        let dir = self.config.build.output.join(BundleTarget::Server.out_dir());
        fs::create_dir_all(&dir).map_err(|e| StageError::Io(e.to_string()))?;
        let path = dir.join("entry.json");
        let json =
            serde_json::to_string_pretty(artifact).map_err(|e| StageError::Io(e.to_string()))?;
        fs::write(&path, json).map_err(|e| StageError::Io(e.to_string()))
    }
}

impl<B: Bundler> SubCompiler for ServerCompiler<B> {
    type Artifact = ServerArtifact;

    fn name(&self) -> &'static str {
        "server"
    }

    async fn build(
        &self,
        entries: &EntrySet,
        channel: &OnceChannel<Manifest>,
    ) -> Result<ServerArtifact, StageError> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(StageError::Cancelled);
        }
        self.cancel.rearm();

        let output = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(StageError::Cancelled),
            result = self.bundler.bundle(BundleTarget::Server, entries) => {
                result.map_err(|e| StageError::Bundler(e.to_string()))?
            }
        };

        // The descriptor embeds the manifest version, so this stage cannot
        // finish ahead of the client stage's settlement.
        let manifest = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(StageError::Cancelled),
            manifest = channel.read() => manifest?,
        };

        let entry = output
            .entry()
            .ok_or_else(|| StageError::Bundler(format!("bundle has no entry '{}'", output.entry_id)))?;
        let artifact = ServerArtifact {
            module_ref: entry.module_ref.clone(),
            manifest_version: manifest.version.clone(),
        };
        self.write_descriptor(&artifact)?;
        Ok(artifact)
    }

    fn cancel(&self) {
        self.cancel.cancel();
    }

    fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
        self.cancel.cancel();
    }
}

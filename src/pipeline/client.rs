//! Client sub-compiler: bundles the browser target, assembles the asset
//! manifest, and settles the cycle's channel.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::bundler::{BundleTarget, Bundler};
use crate::cache::{CacheStore, exports_key};
use crate::channel::OnceChannel;
use crate::config::{EntrySet, ProjectConfig};
use crate::error::StageError;
use crate::manifest::{self, Manifest, ManifestEntry, ModuleEntry, prune_imports};
use crate::pipeline::{Cancellation, SubCompiler};

pub struct ClientCompiler<B> {
    bundler: Arc<B>,
    cache: Arc<CacheStore>,
    config: Arc<ProjectConfig>,
    cancel: Cancellation,
    disposed: AtomicBool,
}

impl<B: Bundler> ClientCompiler<B> {
    pub fn new(config: Arc<ProjectConfig>, bundler: Arc<B>, cache: Arc<CacheStore>) -> Self {
        Self {
            bundler,
            cache,
            config,
            cancel: Cancellation::new(),
            disposed: AtomicBool::new(false),
        }
    }

    /// Turn the bundler's output into a versioned manifest.
    fn assemble_manifest(&self, output: &crate::bundler::BundleOutput) -> Result<Manifest, StageError> {
        let pruned = prune_imports(&output.modules);

        let entry_module = output
            .entry()
            .ok_or_else(|| StageError::Bundler(format!("bundle has no entry '{}'", output.entry_id)))?;
        let entry = ManifestEntry {
            module_ref: entry_module.module_ref.clone(),
            imports: pruned.get(&output.entry_id).cloned().unwrap_or_default(),
        };

        let mut modules = BTreeMap::new();
        for module in &output.modules {
            if module.id == output.entry_id {
                continue;
            }

            let mut flags = module.flags;
            // Export metadata is derived and cached by source hash.
            let exports = self
                .cache
                .lookup(&exports_key(&module.id), module.source_hash, || {
                    self.bundler.module_exports(module)
                })
                .map_err(|e| StageError::Bundler(e.to_string()))?;
            flags.has_default_export = exports.iter().any(|e| e == "default");

            let imports = pruned.get(&module.id).filter(|i| !i.is_empty()).cloned();
            modules.insert(
                module.id.clone(),
                ModuleEntry {
                    module_ref: module.module_ref.clone(),
                    imports,
                    flags,
                },
            );
        }

        Manifest::new(entry, modules).map_err(|e| StageError::Io(e.to_string()))
    }
}

impl<B: Bundler> SubCompiler for ClientCompiler<B> {
    type Artifact = Manifest;

    fn name(&self) -> &'static str {
        "client"
    }

    async fn build(
        &self,
        entries: &EntrySet,
        channel: &OnceChannel<Manifest>,
    ) -> Result<Manifest, StageError> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(StageError::Cancelled);
        }
        // A cancellation from a prior cycle must not leak into this one.
        self.cancel.rearm();

        let output = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                let _ = channel.reject("client build cancelled");
                return Err(StageError::Cancelled);
            }
            result = self.bundler.bundle(BundleTarget::Client, entries) => match result {
                Ok(output) => output,
                Err(e) => {
                    // The server stage must not wait forever on our failure.
                    let _ = channel.reject(e.to_string());
                    return Err(StageError::Bundler(e.to_string()));
                }
            },
        };

        let manifest = match self.assemble_manifest(&output) {
            Ok(manifest) => manifest,
            Err(e) => {
                let _ = channel.reject(e.to_string());
                return Err(e);
            }
        };

        if let Err(e) = manifest::persist(&manifest, &self.config.build.output) {
            let _ = channel.reject(e.to_string());
            return Err(StageError::Io(e.to_string()));
        }

        channel.write(manifest.clone())?;
        Ok(manifest)
    }

    fn cancel(&self) {
        self.cancel.cancel();
    }

    fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
        self.cancel.cancel();
    }
}

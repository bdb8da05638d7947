//! The bundler collaborator boundary.
//!
//! A [`Bundler`] is the single-module bundler/transpiler each sub-compiler
//! delegates to. It is invoked with a fixed entry-point list and returns
//! compiled artifacts plus per-module dependency-import lists. Alternative
//! backends implement this trait; the orchestration layer is generic over it
//! rather than duplicated per backend.

mod simple;

pub use simple::SimpleBundler;

use std::future::Future;
use std::path::PathBuf;

use crate::config::EntrySet;
use crate::hash::ContentHash;
use crate::manifest::ModuleFlags;

/// Which bundle a sub-compiler is producing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleTarget {
    Client,
    Server,
}

impl BundleTarget {
    pub fn label(self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Server => "server",
        }
    }

    /// Output subdirectory for this target's artifacts.
    pub fn out_dir(self) -> &'static str {
        match self {
            Self::Client => "assets",
            Self::Server => "server",
        }
    }
}

/// Bundler failure modes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BundleError {
    #[error("cannot read {0}: {1}")]
    Read(PathBuf, String),
    #[error("cannot write {0}: {1}")]
    Write(PathBuf, String),
    #[error("missing entry point {0}")]
    MissingEntry(PathBuf),
}

/// One compiled module as reported by the bundler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundledModule {
    /// Stable module id (`client-entry`, `route:/home`, `src/lib/util`, ...).
    pub id: String,
    /// Addressable compiled artifact name, content-fingerprinted.
    pub module_ref: String,
    pub source_path: PathBuf,
    pub source_hash: ContentHash,
    /// Import list: module ids for bundle-internal imports, raw specifiers
    /// for external packages. Unpruned; the manifest builder prunes.
    pub imports: Vec<String>,
    /// Module that first discovered this one (ancestor chain for pruning).
    pub parent: Option<String>,
    pub flags: ModuleFlags,
}

/// Result of bundling one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleOutput {
    pub entry_id: String,
    pub modules: Vec<BundledModule>,
}

impl BundleOutput {
    pub fn entry(&self) -> Option<&BundledModule> {
        self.modules.iter().find(|m| m.id == self.entry_id)
    }
}

/// The underlying bundler invoked per sub-compiler.
pub trait Bundler: Send + Sync + 'static {
    /// Compile one target from its fixed entry-point list.
    fn bundle(
        &self,
        target: BundleTarget,
        entries: &EntrySet,
    ) -> impl Future<Output = Result<BundleOutput, BundleError>> + Send;

    /// Derive a module's declared export names.
    ///
    /// Callers cache this by `source_hash`; it must depend only on the
    /// module's current source.
    fn module_exports(&self, module: &BundledModule) -> Result<Vec<String>, BundleError>;
}

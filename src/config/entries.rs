//! Entry-point set discovery.
//!
//! The configured entry points are the client entry, the server entry, and
//! every file under the pages directory (one route entry per file). The
//! watcher classifies changes against this set: touching an entry point (or
//! changing the set itself) forces a full pipeline restart.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::ProjectConfig;
use crate::paths::normalize_path;

/// The known entry points of a project, scanned from disk.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EntrySet {
    pub client_entry: PathBuf,
    pub server_entry: PathBuf,
    /// Route id -> source path, ordered for deterministic bundling.
    pub routes: BTreeMap<String, PathBuf>,
}

impl EntrySet {
    /// Scan the pages directory plus the two fixed entries.
    ///
    /// A missing pages directory yields an empty route set rather than an
    /// error; the fixed entries are validated at config load.
    pub fn scan(config: &ProjectConfig) -> std::io::Result<Self> {
        let mut routes = BTreeMap::new();

        if config.build.pages.is_dir() {
            for entry in jwalk::WalkDir::new(&config.build.pages)
                .skip_hidden(true)
                .into_iter()
                .filter_map(Result::ok)
                .filter(|e| e.file_type().is_file())
            {
                let path = normalize_path(&entry.path());
                let id = Self::route_id(&config.build.pages, &path);
                routes.insert(id, path);
            }
        }

        Ok(Self {
            client_entry: config.build.client_entry.clone(),
            server_entry: config.build.server_entry.clone(),
            routes,
        })
    }

    /// Route id for a pages file: `route:/blog/post` for `blog/post.js`,
    /// with `index` collapsing to its directory.
    pub fn route_id(pages_dir: &Path, path: &Path) -> String {
        let rel = path.strip_prefix(pages_dir).unwrap_or(path);
        let mut url = String::new();
        let stem = rel.with_extension("");
        for component in stem.components() {
            url.push('/');
            url.push_str(&component.as_os_str().to_string_lossy());
        }
        if let Some(trimmed) = url.strip_suffix("/index") {
            url = trimmed.to_string();
        }
        if url.is_empty() {
            url.push('/');
        }
        format!("route:{url}")
    }

    /// Whether a path is a configured entry point.
    pub fn contains(&self, path: &Path) -> bool {
        path == self.client_entry
            || path == self.server_entry
            || self.routes.values().any(|p| p == path)
    }

    /// All entry paths, fixed entries first, routes in id order.
    pub fn paths(&self) -> impl Iterator<Item = &PathBuf> {
        [&self.client_entry, &self.server_entry]
            .into_iter()
            .chain(self.routes.values())
    }
}

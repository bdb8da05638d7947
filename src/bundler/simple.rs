//! Built-in bundler backend.
//!
//! Deliberately minimal: it copies each reachable module to the output
//! directory under a content-fingerprinted name and discovers the module
//! graph by scanning ES import/export statements. It exists so the pipeline
//! is usable out of the box and so tests exercise the real contract; heavier
//! backends plug in through the [`Bundler`] trait.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use regex::Regex;
use rustc_hash::FxHashSet;

use super::{BundleError, BundleOutput, BundleTarget, BundledModule, Bundler};
use crate::config::{EntrySet, ProjectConfig};
use crate::hash::{self, hash_bytes};
use crate::manifest::ModuleFlags;

static IMPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    // `import defaultName from '...'`, `import { a, b } from '...'`,
    // `import '...'`, `export ... from '...'`
    Regex::new(
        r#"(?m)^\s*(?:import|export)\s+(?:[\w$*{},\s]+\s+from\s+)?["']([^"']+)["']"#,
    )
    .expect("import regex")
});

static EXPORT_DEFAULT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*export\s+default\b").expect("export default regex"));

static EXPORT_DECL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*export\s+(?:async\s+)?(?:const|let|var|function|class)\s+([A-Za-z_$][\w$]*)")
        .expect("export decl regex")
});

static EXPORT_BRACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*export\s*\{([^}]*)\}").expect("export brace regex"));

const RESOLVE_EXTENSIONS: &[&str] = &["js", "mjs", "jsx", "ts", "tsx"];

pub struct SimpleBundler {
    config: Arc<ProjectConfig>,
}

impl SimpleBundler {
    pub fn new(config: Arc<ProjectConfig>) -> Self {
        Self { config }
    }

    /// Stable module id for a source path.
    fn module_id(&self, path: &Path, entries: &EntrySet) -> String {
        if path == entries.client_entry {
            return "client-entry".into();
        }
        if path == entries.server_entry {
            return "server-entry".into();
        }
        if path.starts_with(&self.config.build.pages) {
            return EntrySet::route_id(&self.config.build.pages, path);
        }
        let rel = self.config.root_relative(path);
        let stem = rel.with_extension("");
        stem.components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Addressable artifact name: sanitized id + content fingerprint.
    fn module_ref(id: &str, source: &[u8]) -> String {
        let safe: String = id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
            .collect();
        let safe = safe.trim_matches('-').to_string();
        format!("{}.{}.js", safe, hash::fingerprint(source))
    }

    /// Resolve a relative import specifier against its importer.
    fn resolve(&self, importer: &Path, specifier: &str) -> Option<PathBuf> {
        if !specifier.starts_with("./") && !specifier.starts_with("../") {
            return None;
        }
        let base = importer.parent()?.join(specifier);
        if base.is_file() {
            return Some(base);
        }
        for ext in RESOLVE_EXTENSIONS {
            let candidate = base.with_extension(ext);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
        let index = base.join("index.js");
        index.is_file().then_some(index)
    }

    fn emit(&self, target: BundleTarget, module_ref: &str, source: &[u8]) -> Result<(), BundleError> {
        let dir = self.config.build.output.join(target.out_dir());
        fs::create_dir_all(&dir).map_err(|e| BundleError::Write(dir.clone(), e.to_string()))?;
        let path = dir.join(module_ref);
        // Content-fingerprinted names: an existing file is already correct.
        if path.exists() {
            return Ok(());
        }
        fs::write(&path, source).map_err(|e| BundleError::Write(path, e.to_string()))
    }

    fn load_module(
        &self,
        target: BundleTarget,
        entries: &EntrySet,
        path: &Path,
        id: String,
        parent: Option<String>,
    ) -> Result<(BundledModule, Vec<(PathBuf, String)>), BundleError> {
        let source = fs::read(path)
            .map_err(|e| BundleError::Read(path.to_path_buf(), e.to_string()))?;

        let text = String::from_utf8_lossy(&source);
        let mut imports = Vec::new();
        let mut children = Vec::new();
        for capture in IMPORT_RE.captures_iter(&text) {
            let specifier = &capture[1];
            match self.resolve(path, specifier) {
                Some(child_path) => {
                    let child_path = crate::paths::normalize_path(&child_path);
                    let child_id = self.module_id(&child_path, entries);
                    imports.push(child_id.clone());
                    children.push((child_path, child_id));
                }
                // Bare package specifier: external import, still prunable.
                None => imports.push(specifier.to_string()),
            }
        }

        let module_ref = Self::module_ref(&id, &source);
        self.emit(target, &module_ref, &source)?;

        let module = BundledModule {
            id,
            module_ref,
            source_path: path.to_path_buf(),
            source_hash: hash_bytes(&source),
            imports,
            parent,
            flags: ModuleFlags {
                route: path.starts_with(&self.config.build.pages),
                has_default_export: false,
            },
        };
        Ok((module, children))
    }
}

impl Bundler for SimpleBundler {
    async fn bundle(
        &self,
        target: BundleTarget,
        entries: &EntrySet,
    ) -> Result<BundleOutput, BundleError> {
        let entry_path = match target {
            BundleTarget::Client => &entries.client_entry,
            BundleTarget::Server => &entries.server_entry,
        };
        if !entry_path.is_file() {
            return Err(BundleError::MissingEntry(entry_path.clone()));
        }

        let entry_id = self.module_id(entry_path, entries);

        // BFS from the entry; the client bundle additionally seeds every
        // route entry as a child of the entry module.
        let mut queue: VecDeque<(PathBuf, String, Option<String>)> = VecDeque::new();
        let mut visited = FxHashSet::default();
        queue.push_back((entry_path.clone(), entry_id.clone(), None));
        visited.insert(entry_path.clone());

        if target == BundleTarget::Client {
            for (route_id, route_path) in &entries.routes {
                if visited.insert(route_path.clone()) {
                    queue.push_back((route_path.clone(), route_id.clone(), Some(entry_id.clone())));
                }
            }
        }

        let mut modules = Vec::new();
        while let Some((path, id, parent)) = queue.pop_front() {
            let (mut module, children) =
                self.load_module(target, entries, &path, id.clone(), parent)?;

            // The client entry guarantees its routes are loaded.
            if target == BundleTarget::Client && module.id == entry_id {
                for route_id in entries.routes.keys() {
                    if !module.imports.contains(route_id) {
                        module.imports.push(route_id.clone());
                    }
                }
            }

            for (child_path, child_id) in children {
                if visited.insert(child_path.clone()) {
                    queue.push_back((child_path, child_id, Some(module.id.clone())));
                }
            }
            modules.push(module);
        }

        Ok(BundleOutput { entry_id, modules })
    }

    fn module_exports(&self, module: &BundledModule) -> Result<Vec<String>, BundleError> {
        let text = fs::read_to_string(&module.source_path)
            .map_err(|e| BundleError::Read(module.source_path.clone(), e.to_string()))?;

        let mut exports = Vec::new();
        if EXPORT_DEFAULT_RE.is_match(&text) {
            exports.push("default".to_string());
        }
        for capture in EXPORT_DECL_RE.captures_iter(&text) {
            exports.push(capture[1].to_string());
        }
        for capture in EXPORT_BRACE_RE.captures_iter(&text) {
            for name in capture[1].split(',') {
                // `foo as bar` exports `bar`
                let name = name.split_whitespace().last().unwrap_or("").trim();
                if !name.is_empty() && name != "default" {
                    exports.push(name.to_string());
                }
            }
        }
        exports.sort();
        exports.dedup();
        Ok(exports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use crate::paths::normalize_path;
    use tempfile::TempDir;

    fn make_project() -> (TempDir, Arc<ProjectConfig>) {
        let temp = TempDir::new().unwrap();
        let root = normalize_path(temp.path());
        fs::create_dir_all(root.join("src/pages")).unwrap();
        fs::create_dir_all(root.join("src/lib")).unwrap();
        fs::write(
            root.join("src/client.js"),
            "import { boot } from './lib/runtime';\nboot();\n",
        )
        .unwrap();
        fs::write(root.join("src/server.js"), "import 'http';\n").unwrap();
        fs::write(
            root.join("src/pages/home.js"),
            "import { grid } from '../lib/runtime';\nexport default function home() {}\n",
        )
        .unwrap();
        fs::write(
            root.join("src/lib/runtime.js"),
            "import 'react';\nexport const boot = 1;\nexport const grid = 2;\n",
        )
        .unwrap();
        (temp, Arc::new(test_config(&root)))
    }

    #[tokio::test]
    async fn test_client_bundle_graph() {
        let (_tmp, config) = make_project();
        let bundler = SimpleBundler::new(config.clone());
        let entries = EntrySet::scan(&config).unwrap();

        let output = bundler.bundle(BundleTarget::Client, &entries).await.unwrap();
        assert_eq!(output.entry_id, "client-entry");

        let ids: Vec<_> = output.modules.iter().map(|m| m.id.as_str()).collect();
        assert!(ids.contains(&"client-entry"));
        assert!(ids.contains(&"route:/home"));
        assert!(ids.contains(&"src/lib/runtime"));

        // Entry guarantees its routes
        let entry = output.entry().unwrap();
        assert!(entry.imports.contains(&"route:/home".to_string()));
        assert!(entry.imports.contains(&"src/lib/runtime".to_string()));

        // Route's parent is the entry
        let home = output.modules.iter().find(|m| m.id == "route:/home").unwrap();
        assert_eq!(home.parent.as_deref(), Some("client-entry"));
        assert!(home.flags.route);
    }

    #[tokio::test]
    async fn test_external_imports_kept_as_specifiers() {
        let (_tmp, config) = make_project();
        let bundler = SimpleBundler::new(config.clone());
        let entries = EntrySet::scan(&config).unwrap();

        let output = bundler.bundle(BundleTarget::Client, &entries).await.unwrap();
        let runtime = output
            .modules
            .iter()
            .find(|m| m.id == "src/lib/runtime")
            .unwrap();
        assert_eq!(runtime.imports, vec!["react"]);
    }

    #[tokio::test]
    async fn test_artifacts_are_fingerprinted_and_written() {
        let (_tmp, config) = make_project();
        let bundler = SimpleBundler::new(config.clone());
        let entries = EntrySet::scan(&config).unwrap();

        let output = bundler.bundle(BundleTarget::Client, &entries).await.unwrap();
        for module in &output.modules {
            assert!(config.build.output.join("assets").join(&module.module_ref).is_file());
            // ref embeds an 8-hex fingerprint before the extension
            let fp = module.module_ref.rsplit('.').nth(1).unwrap();
            assert_eq!(fp.len(), 8);
        }
    }

    #[tokio::test]
    async fn test_server_bundle_skips_routes() {
        let (_tmp, config) = make_project();
        let bundler = SimpleBundler::new(config.clone());
        let entries = EntrySet::scan(&config).unwrap();

        let output = bundler.bundle(BundleTarget::Server, &entries).await.unwrap();
        assert_eq!(output.entry_id, "server-entry");
        assert!(output.modules.iter().all(|m| !m.id.starts_with("route:")));
    }

    #[test]
    fn test_module_exports() {
        let (_tmp, config) = make_project();
        let bundler = SimpleBundler::new(config.clone());
        let module = BundledModule {
            id: "route:/home".into(),
            module_ref: "x.00000000.js".into(),
            source_path: config.build.pages.join("home.js"),
            source_hash: hash_bytes(b""),
            imports: vec![],
            parent: None,
            flags: ModuleFlags::default(),
        };
        let exports = bundler.module_exports(&module).unwrap();
        assert_eq!(exports, vec!["default"]);
    }

    #[test]
    fn test_export_scan_variants() {
        let temp = TempDir::new().unwrap();
        let root = normalize_path(temp.path());
        fs::create_dir_all(root.join("src/pages")).unwrap();
        fs::write(root.join("src/client.js"), "").unwrap();
        fs::write(root.join("src/server.js"), "").unwrap();
        let path = root.join("src/lib.js");
        fs::write(
            &path,
            "export const a = 1;\nexport async function b() {}\nexport { c, d as e };\n",
        )
        .unwrap();

        let bundler = SimpleBundler::new(Arc::new(test_config(&root)));
        let module = BundledModule {
            id: "src/lib".into(),
            module_ref: "x.00000000.js".into(),
            source_path: path,
            source_hash: hash_bytes(b""),
            imports: vec![],
            parent: None,
            flags: ModuleFlags::default(),
        };
        let exports = bundler.module_exports(&module).unwrap();
        assert_eq!(exports, vec!["a", "b", "c", "e"]);
    }
}

//! The asset manifest: the versioned description of build outputs and their
//! import graph, produced once per successful cycle.
//!
//! `version` is a pure content hash of `{entry, modules}` — identical inputs
//! always produce an identical version, with no timestamps or randomness.
//! Module maps are `BTreeMap` so serialization (and therefore the version)
//! is deterministic.

mod prune;
mod store;

pub use prune::prune_imports;
pub use store::{artifact_name, load, persist};

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::hash::hash_bytes;

fn is_false(v: &bool) -> bool {
    !*v
}

/// Per-module boolean markers carried through to the runtime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleFlags {
    /// Module is a route entry under the pages directory.
    #[serde(default, skip_serializing_if = "is_false")]
    pub route: bool,
    /// Module declares a default export (derived metadata, cached by hash).
    #[serde(default, skip_serializing_if = "is_false")]
    pub has_default_export: bool,
}

impl ModuleFlags {
    pub fn is_empty(&self) -> bool {
        !self.route && !self.has_default_export
    }
}

/// The manifest's entry bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub module_ref: String,
    pub imports: Vec<String>,
}

/// One compiled module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleEntry {
    pub module_ref: String,
    /// Pruned import list; omitted entirely when empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imports: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "ModuleFlags::is_empty")]
    pub flags: ModuleFlags,
}

/// The versioned, de-duplicated asset manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: String,
    pub entry: ManifestEntry,
    pub modules: BTreeMap<String, ModuleEntry>,
}

impl Manifest {
    /// Assemble a manifest, computing its content-hash version.
    pub fn new(
        entry: ManifestEntry,
        modules: BTreeMap<String, ModuleEntry>,
    ) -> serde_json::Result<Self> {
        let version = Self::compute_version(&entry, &modules)?;
        Ok(Self {
            version,
            entry,
            modules,
        })
    }

    /// Deterministic hash over the manifest's own content (version excluded).
    fn compute_version(
        entry: &ManifestEntry,
        modules: &BTreeMap<String, ModuleEntry>,
    ) -> serde_json::Result<String> {
        #[derive(Serialize)]
        struct Versioned<'a> {
            entry: &'a ManifestEntry,
            modules: &'a BTreeMap<String, ModuleEntry>,
        }
        let bytes = serde_json::to_vec(&Versioned { entry, modules })?;
        Ok(hash_bytes(&bytes).to_hex()[..16].to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module(module_ref: &str, imports: &[&str]) -> ModuleEntry {
        ModuleEntry {
            module_ref: module_ref.into(),
            imports: (!imports.is_empty())
                .then(|| imports.iter().map(|s| s.to_string()).collect()),
            flags: ModuleFlags::default(),
        }
    }

    fn sample() -> Manifest {
        let entry = ManifestEntry {
            module_ref: "client.abc123.js".into(),
            imports: vec!["route:/home".into()],
        };
        let mut modules = BTreeMap::new();
        modules.insert("route:/home".to_string(), module("home.def456.js", &["lib"]));
        Manifest::new(entry, modules).unwrap()
    }

    #[test]
    fn test_version_is_deterministic() {
        assert_eq!(sample().version, sample().version);
        assert_eq!(sample().version.len(), 16);
    }

    #[test]
    fn test_version_changes_with_content() {
        let a = sample();
        let mut modules = a.modules.clone();
        modules.insert("route:/about".to_string(), module("about.0f0f0f.js", &[]));
        let b = Manifest::new(a.entry.clone(), modules).unwrap();
        assert_ne!(a.version, b.version);
    }

    #[test]
    fn test_serde_roundtrip() {
        let manifest = sample();
        let json = serde_json::to_string(&manifest).unwrap();
        let back: Manifest = serde_json::from_str(&json).unwrap();
        assert_eq!(manifest, back);
    }

    #[test]
    fn test_empty_flags_omitted() {
        let json = serde_json::to_string(&sample()).unwrap();
        assert!(!json.contains("flags"));
        assert!(!json.contains("has_default_export"));
    }
}

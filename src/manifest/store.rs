//! Versioned manifest artifact persistence.
//!
//! The storage key embeds the manifest's version, so consumers of a prior
//! cycle's manifest are never served a colliding identifier; stale manifests
//! stay resolvable until their files are superseded.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::Manifest;
use crate::debug;

/// Artifact filename for a manifest version.
pub fn artifact_name(version: &str) -> String {
    format!("assets-manifest.{version}.json")
}

/// Write the manifest artifact into `dir`, returning its path.
///
/// Identical content already on disk is left untouched, keeping mtimes (and
/// downstream watchers) quiet across no-op cycles.
pub fn persist(manifest: &Manifest, dir: &Path) -> io::Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(artifact_name(&manifest.version));
    let json = serde_json::to_string_pretty(manifest)?;

    if file_content_matches(&path, &json) {
        debug!("manifest"; "{} unchanged, skipping write", path.display());
        return Ok(path);
    }

    fs::write(&path, json)?;
    Ok(path)
}

/// Load a manifest by its version-stamped identifier.
pub fn load(dir: &Path, version: &str) -> io::Result<Manifest> {
    let path = dir.join(artifact_name(version));
    let json = fs::read_to_string(&path)?;
    serde_json::from_str(&json).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

fn file_content_matches(path: &Path, content: &str) -> bool {
    path.exists() && fs::read_to_string(path).is_ok_and(|existing| existing == content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{ManifestEntry, ModuleEntry, ModuleFlags};
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn sample() -> Manifest {
        let entry = ManifestEntry {
            module_ref: "client.abc123.js".into(),
            imports: vec![],
        };
        let mut modules = BTreeMap::new();
        modules.insert(
            "route:/home".to_string(),
            ModuleEntry {
                module_ref: "home.def456.js".into(),
                imports: None,
                flags: ModuleFlags {
                    route: true,
                    has_default_export: true,
                },
            },
        );
        Manifest::new(entry, modules).unwrap()
    }

    #[test]
    fn test_persist_and_load_by_version() {
        let dir = TempDir::new().unwrap();
        let manifest = sample();

        let path = persist(&manifest, dir.path()).unwrap();
        assert!(path.ends_with(artifact_name(&manifest.version)));

        let loaded = load(dir.path(), &manifest.version).unwrap();
        assert_eq!(loaded, manifest);
    }

    #[test]
    fn test_stale_versions_remain_resolvable() {
        let dir = TempDir::new().unwrap();
        let old = sample();
        persist(&old, dir.path()).unwrap();

        let mut modules = old.modules.clone();
        modules.insert(
            "route:/about".to_string(),
            ModuleEntry {
                module_ref: "about.0f0f0f.js".into(),
                imports: None,
                flags: ModuleFlags::default(),
            },
        );
        let new = Manifest::new(old.entry.clone(), modules).unwrap();
        persist(&new, dir.path()).unwrap();

        // Both versions coexist
        assert_eq!(load(dir.path(), &old.version).unwrap(), old);
        assert_eq!(load(dir.path(), &new.version).unwrap(), new);
    }

    #[test]
    fn test_missing_version_errors() {
        let dir = TempDir::new().unwrap();
        assert!(load(dir.path(), "deadbeef00000000").is_err());
    }
}

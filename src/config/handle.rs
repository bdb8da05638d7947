//! Global config with atomic reload support.
//!
//! Uses `arc-swap` for lock-free reads and atomic config replacement.
//! This enables hot-reloading of `kiln.toml` during watch mode: the watcher
//! reloads it before classifying a change, since new files can introduce
//! entry points not yet known.

use std::sync::{Arc, LazyLock};

use anyhow::Result;
use arc_swap::ArcSwap;

use super::ProjectConfig;
use crate::hash;

/// Global config storage.
static CONFIG: LazyLock<ArcSwap<ProjectConfig>> =
    LazyLock::new(|| ArcSwap::from_pointee(ProjectConfig::default()));

/// Hash of the current config file content (reload gate).
static CONFIG_HASH: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);

#[inline]
pub fn cfg() -> Arc<ProjectConfig> {
    CONFIG.load_full()
}

/// Reload config from disk if its content changed.
///
/// Returns `Ok(true)` if the config was updated, `Ok(false)` if unchanged.
pub fn reload_config() -> Result<bool> {
    use std::fs;

    let current = cfg();
    let content = fs::read_to_string(&current.config_path)?;
    let new_hash = hash::compute(content.as_bytes());

    let old_hash = CONFIG_HASH.load(std::sync::atomic::Ordering::Relaxed);
    if new_hash == old_hash {
        return Ok(false);
    }

    let new_config = ProjectConfig::load(&current.config_path)?;
    CONFIG.store(Arc::new(new_config));
    CONFIG_HASH.store(new_hash, std::sync::atomic::Ordering::Relaxed);

    Ok(true)
}

#[inline]
pub fn init_config(config: ProjectConfig) -> Arc<ProjectConfig> {
    use std::fs;

    if config.config_path.exists()
        && let Ok(content) = fs::read_to_string(&config.config_path)
    {
        let content_hash = hash::compute(content.as_bytes());
        CONFIG_HASH.store(content_hash, std::sync::atomic::Ordering::Relaxed);
    }

    let arc = Arc::new(config);
    CONFIG.store(Arc::clone(&arc));
    arc
}

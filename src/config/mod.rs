//! Project configuration management for `kiln.toml`.
//!
//! # Sections
//!
//! | Section     | Purpose                                              |
//! |-------------|------------------------------------------------------|
//! | `[project]` | Project metadata (name)                              |
//! | `[build]`   | Entry points, pages dir, output, cache, timeout      |
//! | `[watch]`   | Debounce window, cooldown, extra watched paths       |

mod entries;
mod handle;

pub use entries::EntrySet;
pub use handle::{cfg, init_config, reload_config};

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Result;
use serde::Deserialize;

use crate::log;
use crate::paths::normalize_path;

/// Configuration load/validate failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    Io(PathBuf, std::io::Error),
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Validation(String),
}

/// Root configuration structure representing kiln.toml
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectConfig {
    /// Absolute path to the config file (internal use only)
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Project root directory - parent of config file (internal use only)
    #[serde(skip)]
    pub root: PathBuf,

    /// Project metadata
    #[serde(default)]
    pub project: ProjectSection,

    /// Build settings
    #[serde(default)]
    pub build: BuildSection,

    /// Watch mode settings
    #[serde(default)]
    pub watch: WatchSection,
}

/// `[project]` section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProjectSection {
    pub name: String,
}

impl Default for ProjectSection {
    fn default() -> Self {
        Self { name: "app".into() }
    }
}

/// `[build]` section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BuildSection {
    /// Directory whose files are route entry points
    pub pages: PathBuf,
    /// Client bundle entry point
    pub client_entry: PathBuf,
    /// Server bundle entry point
    pub server_entry: PathBuf,
    /// Output directory for compiled artifacts
    pub output: PathBuf,
    /// Cache directory for derived metadata (safe to delete at any time)
    pub cache_dir: PathBuf,
    /// Maximum build-cycle duration in seconds (no timeout when unset)
    pub timeout_secs: Option<u64>,
}

impl Default for BuildSection {
    fn default() -> Self {
        Self {
            pages: PathBuf::from("src/pages"),
            client_entry: PathBuf::from("src/client.js"),
            server_entry: PathBuf::from("src/server.js"),
            output: PathBuf::from("dist"),
            cache_dir: PathBuf::from(".kiln"),
            timeout_secs: None,
        }
    }
}

/// `[watch]` section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WatchSection {
    /// Debounce window in milliseconds (bursts within it collapse to one cycle)
    pub debounce_ms: u64,
    /// Minimum gap between the end of one cycle and the start of the next
    pub cooldown_ms: u64,
    /// Extra explicit paths to watch besides the project root
    pub extra_paths: Vec<PathBuf>,
}

impl Default for WatchSection {
    fn default() -> Self {
        Self {
            debounce_ms: 100,
            cooldown_ms: 300,
            extra_paths: Vec::new(),
        }
    }
}

impl ProjectConfig {
    /// Load configuration from an explicit file path.
    ///
    /// If the path is a bare filename, searches upward from cwd. The project
    /// root is the config file's parent directory.
    pub fn load(config_arg: &Path) -> Result<Self> {
        let config_path = match find_config_file(config_arg) {
            Some(path) => path,
            None => anyhow::bail!(ConfigError::Validation(format!(
                "config file '{}' not found",
                config_arg.display()
            ))),
        };

        let content = fs::read_to_string(&config_path)
            .map_err(|err| ConfigError::Io(config_path.clone(), err))?;
        let (mut config, ignored) = Self::parse_with_ignored(&content)?;

        if !ignored.is_empty() {
            Self::print_unknown_fields_warning(&ignored, &config_path);
        }

        config.config_path = normalize_path(&config_path);
        let root = config
            .config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        config.normalize_paths(&root);
        config.validate()?;

        Ok(config)
    }

    /// Parse configuration from a TOML string (paths stay as written).
    pub fn from_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(ConfigError::Parse)?;
        Ok(config)
    }

    /// Parse TOML content, collecting any unknown fields.
    pub fn parse_with_ignored(content: &str) -> Result<(Self, Vec<String>)> {
        let mut ignored = Vec::new();
        let deserializer = toml::Deserializer::new(content);
        let config = serde_ignored::deserialize(deserializer, |path: serde_ignored::Path| {
            ignored.push(path.to_string());
        })
        .map_err(ConfigError::Parse)?;
        Ok((config, ignored))
    }

    fn print_unknown_fields_warning(fields: &[String], path: &Path) {
        let display_path = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_else(|| path.to_string_lossy());
        log!("warning"; "unknown fields in {}, ignoring:", display_path);
        for field in fields {
            eprintln!("- {}", field);
        }
    }

    /// Normalize all paths relative to the root directory.
    fn normalize_paths(&mut self, root: &Path) {
        let root = normalize_path(root);

        self.build.pages = normalize_path(&root.join(&self.build.pages));
        self.build.client_entry = normalize_path(&root.join(&self.build.client_entry));
        self.build.server_entry = normalize_path(&root.join(&self.build.server_entry));
        self.build.output = normalize_path(&root.join(&self.build.output));
        self.build.cache_dir = normalize_path(&root.join(&self.build.cache_dir));
        self.watch.extra_paths = self
            .watch
            .extra_paths
            .iter()
            .map(|p| normalize_path(&root.join(p)))
            .collect();

        self.root = root;
    }

    /// Validate configuration.
    fn validate(&self) -> Result<()> {
        if !self.build.client_entry.is_file() {
            anyhow::bail!(ConfigError::Validation(format!(
                "client entry '{}' is not a file",
                self.build.client_entry.display()
            )));
        }
        if !self.build.server_entry.is_file() {
            anyhow::bail!(ConfigError::Validation(format!(
                "server entry '{}' is not a file",
                self.build.server_entry.display()
            )));
        }
        if self.build.timeout_secs == Some(0) {
            anyhow::bail!(ConfigError::Validation(
                "build.timeout_secs must be positive".into()
            ));
        }
        if !self.build.pages.is_dir() {
            log!("warning"; "pages directory '{}' does not exist", self.build.pages.display());
        }
        Ok(())
    }

    /// Get the root directory path
    pub fn get_root(&self) -> &Path {
        &self.root
    }

    /// Set the root directory path (tests construct configs by hand)
    pub fn set_root(&mut self, path: &Path) {
        self.root = path.to_path_buf();
    }

    /// Get a path relative to the project root
    pub fn root_relative(&self, path: impl AsRef<Path>) -> PathBuf {
        path.as_ref()
            .strip_prefix(&self.root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| path.as_ref().to_path_buf())
    }

    /// Debounce window for the rebuild scheduler.
    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.watch.debounce_ms)
    }

    /// Cooldown between consecutive cycles.
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.watch.cooldown_ms)
    }

    /// Per-cycle build timeout, if configured.
    pub fn build_timeout(&self) -> Option<Duration> {
        self.build.timeout_secs.map(Duration::from_secs)
    }
}

/// Search for the config file upward from the current directory.
fn find_config_file(config_arg: &Path) -> Option<PathBuf> {
    if config_arg.is_absolute() || config_arg.components().count() > 1 {
        return config_arg.exists().then(|| config_arg.to_path_buf());
    }

    let cwd = std::env::current_dir().ok()?;
    for dir in cwd.ancestors() {
        let candidate = dir.join(config_arg);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}

// ============================================================================
// Test Helpers
// ============================================================================

/// Build a config rooted at a temp project dir with entries on disk.
#[cfg(test)]
pub fn test_config(root: &Path) -> ProjectConfig {
    let mut config = ProjectConfig::default();
    config.config_path = root.join("kiln.toml");
    config.normalize_paths(root);
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_str_invalid_toml() {
        let result: Result<ProjectConfig, _> = toml::from_str("[build\npages = \"src\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_defaults() {
        let config = ProjectConfig::default();
        assert_eq!(config.project.name, "app");
        assert_eq!(config.build.pages, PathBuf::from("src/pages"));
        assert_eq!(config.watch.debounce_ms, 100);
        assert!(config.build.timeout_secs.is_none());
    }

    #[test]
    fn test_unknown_fields_detected() {
        let content = "[build]\npages = \"routes\"\n[mystery]\nfield = 1";
        let (config, ignored) = ProjectConfig::parse_with_ignored(content).unwrap();
        assert_eq!(config.build.pages, PathBuf::from("routes"));
        assert!(ignored.iter().any(|f| f.contains("mystery")));
    }

    #[test]
    fn test_no_unknown_fields() {
        let content = "[project]\nname = \"demo\"\n[watch]\ndebounce_ms = 50";
        let (config, ignored) = ProjectConfig::parse_with_ignored(content).unwrap();
        assert!(ignored.is_empty());
        assert_eq!(config.project.name, "demo");
        assert_eq!(config.watch.debounce_ms, 50);
    }

    #[test]
    fn test_normalize_paths() {
        let mut config = ProjectConfig::default();
        config.normalize_paths(Path::new("/proj"));
        assert!(config.build.pages.is_absolute());
        assert!(config.build.output.ends_with("dist"));
        assert_eq!(config.get_root(), Path::new("/proj"));
    }

    #[test]
    fn test_root_relative() {
        let mut config = ProjectConfig::default();
        config.set_root(Path::new("/proj"));
        assert_eq!(
            config.root_relative("/proj/src/pages/home.js"),
            PathBuf::from("src/pages/home.js")
        );
    }
}

//! Configuration system for archrepo.
//!
//! Config priority: explicit `--config` path > `$ARCHREPO_CONFIG` > user (~/.config/archrepo/config.toml) > defaults

use std::{
  path::{Path, PathBuf},
  time::Duration,
};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::dirs;

/// Architectures an `any` package is published into by default.
pub const DEFAULT_ARCHES: &[&str] = &["i686", "x86_64"];

/// Suffix of the per-architecture index file managed by the external indexer.
pub const INDEX_SUFFIX: &str = ".db.tar.gz";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
  #[error("Failed to read config {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("Failed to parse config {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: toml::de::Error,
  },
}

// ============================================================================
// Repository Configuration
// ============================================================================

/// The watched repository tree and the external tools that maintain it
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
  /// Root of the repository tree (contains one directory per architecture)
  pub path: PathBuf,

  /// Repository name; index files are `<arch>/<name>.db.tar.gz`
  pub name: String,

  /// Concrete architectures. Packages built for `any` are linked into each of these.
  pub arches: Vec<String>,

  /// Ask the metadata extractor to verify the whole archive, not just `.PKGINFO`
  pub verify_tarball: bool,

  /// Rename completed uploads to `<name>-<version>-<arch>.pkg.tar.<ext>` in the arch directory
  pub auto_rename: bool,

  pub command_add: String,
  pub command_remove: String,
  pub command_fuser: String,
  pub command_pkginfo: String,

  /// Maximum number of dispatched commands running at once
  /// Default: 256
  pub concurrent_jobs: usize,

  /// How long an unpaired MOVED_FROM/MOVED_TO waits for its other half
  /// Default: 1000
  pub move_grace_ms: u64,

  /// Unix socket the processor receives commands on
  pub management_socket: PathBuf,
}

impl Default for RepositoryConfig {
  fn default() -> Self {
    Self {
      path: PathBuf::from("/srv/archrepo"),
      name: "archrepo".to_string(),
      arches: DEFAULT_ARCHES.iter().map(|a| a.to_string()).collect(),
      verify_tarball: true,
      auto_rename: true,
      command_add: "repo-add".to_string(),
      command_remove: "repo-remove".to_string(),
      command_fuser: "fuser".to_string(),
      command_pkginfo: "archrepo-pkginfo".to_string(),
      concurrent_jobs: 256,
      move_grace_ms: 1000,
      management_socket: dirs::default_socket_path(),
    }
  }
}

impl RepositoryConfig {
  /// File name of the per-architecture index
  pub fn index_file_name(&self) -> String {
    format!("{}{}", self.name, INDEX_SUFFIX)
  }

  /// Full path of the index file for an architecture
  pub fn index_path(&self, arch: &str) -> PathBuf {
    self.path.join(arch).join(self.index_file_name())
  }

  /// Directory holding the files for an architecture
  pub fn arch_dir(&self, arch: &str) -> PathBuf {
    self.path.join(arch)
  }

  pub fn move_grace(&self) -> Duration {
    Duration::from_millis(self.move_grace_ms)
  }
}

// ============================================================================
// Database Configuration
// ============================================================================

/// Catalog database location
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
  /// SQLite file holding the package catalog
  pub path: PathBuf,

  /// Connection pool size
  /// Default: 4
  pub max_connections: u32,
}

impl Default for DatabaseConfig {
  fn default() -> Self {
    Self {
      path: dirs::default_data_dir().join("catalog.db"),
      max_connections: 4,
    }
  }
}

// ============================================================================
// Web Configuration
// ============================================================================

/// Read-side browsing settings (query cursor cache)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
  /// Seconds an idle query cursor stays open waiting for the next page
  /// Default: 30
  pub query_reusable_window_secs: u64,

  /// Live cursors shared by all sessions
  /// Default: 16
  pub cursor_pool_size: usize,

  /// Distinct live queries per browsing session
  /// Default: 1
  pub session_cursor_pool_size: usize,
}

impl Default for WebConfig {
  fn default() -> Self {
    Self {
      query_reusable_window_secs: 30,
      cursor_pool_size: 16,
      session_cursor_pool_size: 1,
    }
  }
}

impl WebConfig {
  pub fn reusable_window(&self) -> Duration {
    Duration::from_secs(self.query_reusable_window_secs)
  }
}

// ============================================================================
// Daemon Configuration
// ============================================================================

/// Logging settings for the long-running processor
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
  /// Log level: "off", "error", "warn", "info", "debug", "trace"
  /// Default: "info"
  #[serde(default = "default_log_level")]
  pub log_level: String,

  /// Log file rotation: "daily", "hourly", "never"
  /// Default: "daily"
  #[serde(default = "default_log_rotation")]
  pub log_rotation: String,
}

fn default_log_level() -> String {
  "info".to_string()
}
fn default_log_rotation() -> String {
  "daily".to_string()
}

impl Default for DaemonConfig {
  fn default() -> Self {
    Self {
      log_level: default_log_level(),
      log_rotation: default_log_rotation(),
    }
  }
}

// ============================================================================
// Config
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
  #[serde(default)]
  pub repository: RepositoryConfig,

  #[serde(default)]
  pub database: DatabaseConfig,

  #[serde(default)]
  pub web: WebConfig,

  #[serde(default)]
  pub daemon: DaemonConfig,
}

impl Config {
  /// Load configuration.
  ///
  /// An explicit path (or `$ARCHREPO_CONFIG`) must exist and parse. The user
  /// config is optional; a broken user config is reported and ignored.
  pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
    if let Some(path) = explicit {
      return Self::load_from(path);
    }

    if let Ok(path) = std::env::var("ARCHREPO_CONFIG") {
      return Self::load_from(Path::new(&path));
    }

    if let Some(user_config_path) = Self::user_config_path()
      && user_config_path.exists()
    {
      match Self::load_from(&user_config_path) {
        Ok(config) => return Ok(config),
        Err(e) => warn!(error = %e, "Ignoring unreadable user config"),
      }
    }

    debug!("No config file found, using defaults");
    Ok(Self::default())
  }

  /// Load and parse a single config file
  pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
      path: path.to_path_buf(),
      source,
    })
  }

  /// Get the user-level config path
  pub fn user_config_path() -> Option<PathBuf> {
    Some(dirs::default_config_dir().join("config.toml"))
  }

  /// Generate a default config file as a string
  pub fn generate_template() -> String {
    let defaults = Self::default();
    let arches = defaults
      .repository
      .arches
      .iter()
      .map(|a| format!("\"{a}\""))
      .collect::<Vec<_>>()
      .join(", ");

    format!(
      r#"# archrepo configuration
# Place in ~/.config/archrepo/config.toml or pass --config <file>

# ============================================================================
# Repository
# ============================================================================

[repository]
# Root of the repository tree; one directory per architecture lives below it
path = "{path}"
# Index files are <arch>/<name>.db.tar.gz
name = "{name}"
# Packages built for "any" are linked into each of these
arches = [{arches}]
verify_tarball = {verify}
auto_rename = {rename}
command_add = "{add}"
command_remove = "{remove}"
command_fuser = "{fuser}"
command_pkginfo = "{pkginfo}"
concurrent_jobs = {jobs}
# Grace window (ms) for pairing MOVED_FROM with MOVED_TO
move_grace_ms = {grace}
management_socket = "{socket}"

# ============================================================================
# Catalog database
# ============================================================================

[database]
path = "{db}"
max_connections = {conns}

# ============================================================================
# Browsing
# ============================================================================

[web]
# Seconds an idle query cursor is kept for the next page request
query_reusable_window_secs = {window}
cursor_pool_size = {pool}
session_cursor_pool_size = {session_pool}

# ============================================================================
# Daemon
# ============================================================================

[daemon]
# off, error, warn, info, debug, trace
log_level = "{level}"
# daily, hourly, never
log_rotation = "{rotation}"
"#,
      path = defaults.repository.path.display(),
      name = defaults.repository.name,
      verify = defaults.repository.verify_tarball,
      rename = defaults.repository.auto_rename,
      add = defaults.repository.command_add,
      remove = defaults.repository.command_remove,
      fuser = defaults.repository.command_fuser,
      pkginfo = defaults.repository.command_pkginfo,
      jobs = defaults.repository.concurrent_jobs,
      grace = defaults.repository.move_grace_ms,
      socket = defaults.repository.management_socket.display(),
      db = defaults.database.path.display(),
      conns = defaults.database.max_connections,
      window = defaults.web.query_reusable_window_secs,
      pool = defaults.web.cursor_pool_size,
      session_pool = defaults.web.session_cursor_pool_size,
      level = defaults.daemon.log_level,
      rotation = defaults.daemon.log_rotation,
    )
  }
}

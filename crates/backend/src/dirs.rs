//! Default locations for the socket, the catalog and the config file.
//!
//! Each directory honours an explicit override variable, then the matching
//! XDG variable, then the platform default from the `dirs` crate.

use std::path::PathBuf;

const APP: &str = "archrepo";

fn resolve(override_var: &str, xdg_var: &str, platform: Option<PathBuf>) -> PathBuf {
  if let Ok(dir) = std::env::var(override_var) {
    return PathBuf::from(dir);
  }
  if let Ok(xdg) = std::env::var(xdg_var) {
    return PathBuf::from(xdg).join(APP);
  }
  platform.unwrap_or_else(|| PathBuf::from(".")).join(APP)
}

/// Management socket: `$XDG_RUNTIME_DIR/archrepo.sock`, or a per-uid path in /tmp
pub fn default_socket_path() -> PathBuf {
  match std::env::var("XDG_RUNTIME_DIR") {
    Ok(runtime_dir) => PathBuf::from(runtime_dir).join(format!("{APP}.sock")),
    Err(_) => {
      let uid = unsafe { libc::getuid() };
      PathBuf::from(format!("/tmp/{APP}-{uid}.sock"))
    }
  }
}

/// Catalog and log files: `$DATA_DIR`, `$XDG_DATA_HOME/archrepo`, or the platform data dir
pub fn default_data_dir() -> PathBuf {
  resolve("DATA_DIR", "XDG_DATA_HOME", dirs::data_local_dir())
}

/// Config file directory: `$CONFIG_DIR`, `$XDG_CONFIG_HOME/archrepo`, or the platform config dir
pub fn default_config_dir() -> PathBuf {
  resolve("CONFIG_DIR", "XDG_CONFIG_HOME", dirs::config_dir())
}

//! Configuration commands

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use archrepo::config::Config;

/// Where `config init` writes and `config show` reports from
fn target_path(explicit: Option<&Path>) -> Option<PathBuf> {
  explicit
    .map(Path::to_path_buf)
    .or_else(|| std::env::var("ARCHREPO_CONFIG").ok().map(PathBuf::from))
    .or_else(Config::user_config_path)
}

/// Print the effective configuration as TOML
pub fn cmd_config_show(config: &Config, explicit: Option<&Path>) -> Result<()> {
  match target_path(explicit) {
    Some(path) if path.exists() => println!("# Loaded from {}\n", path.display()),
    _ => println!("# No config file found, showing defaults\n"),
  }

  let rendered = toml::to_string_pretty(config).context("Failed to render configuration")?;
  println!("{rendered}");
  Ok(())
}

/// Write the commented default configuration
pub fn cmd_config_init(explicit: Option<&Path>, force: bool) -> Result<()> {
  let Some(path) = target_path(explicit) else {
    bail!("Cannot determine a config location; pass --config <file>");
  };

  if path.exists() && !force {
    bail!("{} already exists (use --force to overwrite)", path.display());
  }

  if let Some(parent) = path.parent() {
    std::fs::create_dir_all(parent).with_context(|| format!("Failed to create {}", parent.display()))?;
  }
  std::fs::write(&path, Config::generate_template()).with_context(|| format!("Failed to write {}", path.display()))?;

  println!("Wrote {}", path.display());
  Ok(())
}

//! Logging setup for CLI commands and the processor

use std::path::PathBuf;

use archrepo::config::Config;
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Log file name inside the data directory
const LOG_FILE: &str = "archrepo.log";

/// Get the archrepo data directory (respects env vars)
pub fn data_dir() -> PathBuf {
  archrepo::dirs::default_data_dir()
}

/// Parse log level from config string
fn parse_log_level(level: &str) -> LevelFilter {
  match level.to_lowercase().as_str() {
    "off" => LevelFilter::OFF,
    "error" => LevelFilter::ERROR,
    "warn" => LevelFilter::WARN,
    "info" => LevelFilter::INFO,
    "debug" => LevelFilter::DEBUG,
    "trace" => LevelFilter::TRACE,
    _ => LevelFilter::INFO,
  }
}

/// `-v` wins over the configured level
fn level(config: &Config, verbosity: Option<u8>) -> LevelFilter {
  match verbosity {
    Some(0) => LevelFilter::ERROR,
    Some(1) => LevelFilter::INFO,
    Some(_) => LevelFilter::DEBUG,
    None => parse_log_level(&config.daemon.log_level),
  }
}

/// Build env filter (allows RUST_LOG override)
fn env_filter(config: &Config, verbosity: Option<u8>) -> EnvFilter {
  EnvFilter::builder()
    .with_default_directive(level(config, verbosity).into())
    .from_env_lossy()
}

/// Initialize logging for CLI commands (console only)
pub fn init_cli_logging(config: &Config, verbosity: Option<u8>) {
  tracing_subscriber::fmt()
    .with_env_filter(env_filter(config, verbosity))
    .with_writer(std::io::stderr)
    .init();
}

/// Initialize logging for the processor.
///
/// In foreground mode: Logs to console only with colors
/// In background mode: Logs to a rolling file only (no ANSI)
///
/// Returns the guard that must be kept alive for the duration of the program
pub fn init_daemon_logging(config: &Config, verbosity: Option<u8>, foreground: bool) -> Option<WorkerGuard> {
  if foreground {
    tracing_subscriber::fmt()
      .with_env_filter(env_filter(config, verbosity))
      .with_target(true)
      .with_ansi(true)
      .init();
    return None;
  }

  let log_dir = data_dir();
  if std::fs::create_dir_all(&log_dir).is_err() {
    // Fall back to console-only logging
    init_cli_logging(config, verbosity);
    return None;
  }

  let file_appender = match config.daemon.log_rotation.as_str() {
    "hourly" => tracing_appender::rolling::hourly(&log_dir, LOG_FILE),
    "never" => tracing_appender::rolling::never(&log_dir, LOG_FILE),
    _ => tracing_appender::rolling::daily(&log_dir, LOG_FILE),
  };
  let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

  tracing_subscriber::fmt()
    .with_env_filter(env_filter(config, verbosity))
    .with_target(true)
    .with_ansi(false)
    .with_writer(file_writer)
    .init();

  Some(guard)
}

//! External programs the processor drives.
//!
//! Each program sits behind a trait so the processor can be exercised
//! without `repo-add`, `fuser` or a real package archive.

mod extractor;
pub mod fs;
mod indexer;
mod probe;

use std::sync::Arc;

pub use extractor::{ExtractError, Extraction, MetadataExtractor, PkgInfoCommand};
pub use indexer::{IndexerError, RepoCommands, RepoIndexer};
pub use probe::{FuserProbe, WriteProbe};

use crate::config::RepositoryConfig;

/// The set of external collaborators used by the processor
#[derive(Clone)]
pub struct Tools {
  pub extractor: Arc<dyn MetadataExtractor>,
  pub indexer: Arc<dyn RepoIndexer>,
  pub probe: Arc<dyn WriteProbe>,
}

impl Tools {
  /// Real subprocess-backed tools
  pub fn from_config(config: &RepositoryConfig) -> Self {
    Self {
      extractor: Arc::new(PkgInfoCommand::new(&config.command_pkginfo, config.verify_tarball)),
      indexer: Arc::new(RepoCommands::new(&config.command_add, &config.command_remove)),
      probe: Arc::new(FuserProbe::new(&config.command_fuser)),
    }
  }
}

/// Build a command from a configured string; extra words become leading arguments.
pub(crate) fn command_from(spec: &str) -> tokio::process::Command {
  let mut parts = spec.split_whitespace();
  let program = parts.next().unwrap_or(spec);
  let mut command = tokio::process::Command::new(program);
  command.args(parts);
  command.kill_on_drop(true);
  command
}

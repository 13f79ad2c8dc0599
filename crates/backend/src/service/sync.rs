//! Reconciliation passes between the catalog and the repository tree.
//!
//! `sync` feeds every difference to a processor as if it had just been
//! observed; `date_sync` rewrites `last_update` from file mtimes.

use std::{
  collections::{BTreeMap, BTreeSet},
  path::{Path, PathBuf},
};

use serde::Serialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::{
  actor::{Completion, ProcessorHandle, SendError},
  db::{CatalogDb, DbError},
  package::is_package_file,
  tools::fs::modified_unix,
};

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
  #[error(transparent)]
  Db(#[from] DbError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
  /// Files on disk the catalog did not know. A local processor counts only
  /// files it stored; a remote one counts every accepted submission.
  pub added: usize,
  /// New files a local processor left alone (busy, unreadable or not regular)
  pub skipped: usize,
  /// Catalog paths whose file is gone
  pub removed: usize,
  /// Submissions the processor refused
  pub failed: usize,
}

/// Every package archive under `root`, symlinks excluded
pub fn scan_repository(root: &Path) -> BTreeSet<PathBuf> {
  WalkDir::new(root)
    .follow_links(false)
    .into_iter()
    .filter_map(|entry| match entry {
      Ok(entry) => Some(entry),
      Err(e) => {
        warn!(error = %e, "Skipping unreadable entry");
        None
      }
    })
    .filter(|entry| entry.file_type().is_file() && is_package_file(entry.path()))
    .map(|entry| entry.into_path())
    .collect()
}

async fn known_files(db: &CatalogDb) -> Result<BTreeMap<PathBuf, i64>, SyncError> {
  Ok(
    db.file_paths()
      .await?
      .into_iter()
      .map(|(id, path)| (PathBuf::from(path), id))
      .collect(),
  )
}

/// Bring the catalog in line with the files under `root`.
///
/// # Arguments
/// * `db` - Catalog to read known paths from
/// * `root` - Repository root
/// * `processor` - Where completions and deletions are sent
///
/// # Returns
/// * `Ok(SyncReport)` - What was submitted
/// * `Err(SyncError)` - If the catalog could not be read
pub async fn sync(db: &CatalogDb, root: &Path, processor: &ProcessorHandle) -> Result<SyncReport, SyncError> {
  let files = scan_repository(root);
  let known = known_files(db).await?;
  let mut report = SyncReport::default();

  for path in files.iter().filter(|path| !known.contains_key(*path)) {
    info!(path = %path.display(), "Adding new file to repo");
    match complete(processor, path).await {
      Ok(true) => report.added += 1,
      Ok(false) => {
        debug!(path = %path.display(), "File was not cataloged");
        report.skipped += 1;
      }
      Err(e) => {
        warn!(path = %path.display(), error = %e, "Failed to submit completion");
        report.failed += 1;
      }
    }
  }

  for path in known.keys().filter(|path| !files.contains(*path)) {
    info!(path = %path.display(), "Deleting package from repo");
    match processor.delete(path).await {
      Ok(()) => report.removed += 1,
      Err(e) => {
        warn!(path = %path.display(), error = %e, "Failed to submit deletion");
        report.failed += 1;
      }
    }
  }

  debug!(?report, "Sync finished");
  Ok(report)
}

/// Whether `path` ended up in the catalog; always `true` once a non-local processor accepted it
async fn complete(processor: &ProcessorHandle, path: &Path) -> Result<bool, SendError> {
  match processor {
    ProcessorHandle::Local(local) => {
      let completion = local.complete(path).await?;
      Ok(matches!(completion, Completion::Stored { .. }))
    }
    _ => processor.complete(path).await.map(|()| true),
  }
}

/// Set `last_update` of every cataloged file to its modification time.
///
/// # Returns
/// * `Ok(usize)` - Rows updated
/// * `Err(SyncError)` - If the catalog could not be read or written
pub async fn date_sync(db: &CatalogDb, root: &Path) -> Result<usize, SyncError> {
  let files = scan_repository(root);
  let known = known_files(db).await?;
  let mut updated = 0;

  for (path, id) in known.iter().filter(|(path, _)| files.contains(*path)) {
    match modified_unix(path).await {
      Ok(mtime) => {
        db.set_last_update(*id, mtime).await?;
        updated += 1;
      }
      Err(e) => warn!(path = %path.display(), error = %e, "Cannot read modification time"),
    }
  }

  info!(updated, "Dates synchronized");
  Ok(updated)
}

//! The processor: turns file events into catalog and index changes.
//!
//! Every mutation of a (name, arch) runs under that identity's lock, and every
//! index command for an architecture runs under that architecture's lock.
//! Packages built for `any` are symlinked into each configured architecture
//! directory and indexed there.

use std::{
  cmp::Ordering,
  io,
  path::{Path, PathBuf},
  sync::Arc,
};

use async_trait::async_trait;
use dashmap::DashSet;
use futures::future::BoxFuture;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, trace, warn};

use super::{
  events::EventKind,
  locks::LockRegistry,
  moves::{MoveHalf, MoveTracker, Observed},
};
use crate::{
  config::RepositoryConfig,
  db::{CatalogDb, DbError, PackageRecord},
  ipc::{Command, FsEvent, RemoteCall},
  owner::OwnerFinder,
  package::{ARCH_ANY, canonical_path, is_index_file, is_package_file, relative_path},
  server::CommandHandler,
  tools::{ExtractError, Extraction, IndexerError, Tools, fs},
  version,
};

#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
  #[error(transparent)]
  Extract(#[from] ExtractError),
  #[error(transparent)]
  Indexer(#[from] IndexerError),
  #[error("Catalog error: {0}")]
  Db(#[from] DbError),
  #[error("IO error on {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

pub type Result<T> = std::result::Result<T, ProcessorError>;

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> ProcessorError + '_ {
  move |source| ProcessorError::Io {
    path: path.to_path_buf(),
    source,
  }
}

fn path_str(path: &Path) -> String {
  path.to_string_lossy().into_owned()
}

/// What `complete` did with a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
  /// Not a regular package file (index, symlink, vanished)
  Skipped,
  /// Still open by a writer; a later close will retry
  Busy,
  /// The extractor refused the file
  Rejected,
  Stored { id: i64, partial: bool },
}

#[derive(Clone)]
pub struct Processor {
  inner: Arc<Inner>,
}

struct Inner {
  config: RepositoryConfig,
  db: CatalogDb,
  tools: Tools,
  locks: LockRegistry,
  moves: MoveTracker,
  /// Renames the processor performed itself; their MOVED pair is ignored
  renames: DashSet<(PathBuf, PathBuf)>,
  /// Deferred work started outside a command: move fallbacks and cleanups
  background: TaskTracker,
}

impl Processor {
  pub fn new(config: RepositoryConfig, db: CatalogDb, tools: Tools) -> Self {
    let background = TaskTracker::new();
    let moves = MoveTracker::new(config.move_grace(), background.clone());
    Self {
      inner: Arc::new(Inner {
        config,
        db,
        tools,
        locks: LockRegistry::new(),
        moves,
        renames: DashSet::new(),
        background,
      }),
    }
  }

  pub fn config(&self) -> &RepositoryConfig {
    &self.inner.config
  }

  pub fn db(&self) -> &CatalogDb {
    &self.inner.db
  }

  /// Wait for deferred work, including rename halves still inside their grace window
  pub async fn drain(&self) {
    let background = &self.inner.background;
    debug!(pending = background.len(), "Draining background work");
    background.close();
    background.wait().await;
    background.reopen();
  }

  // ==========================================================================
  // Events
  // ==========================================================================

  /// React to one filesystem notification
  pub async fn handle_event(&self, event: FsEvent) -> Result<()> {
    if event.is_dir() {
      trace!(path = %event.path.display(), "Ignoring directory event");
      return Ok(());
    }

    let Some(kind) = EventKind::from_mask(event.mask) else {
      debug!(mask = event.mask, path = %event.path.display(), "Unhandled event mask");
      return Ok(());
    };

    match kind {
      EventKind::Modify | EventKind::Create => {
        trace!(?kind, path = %event.path.display(), "No action for event");
        Ok(())
      }
      EventKind::CloseWrite => self.complete(&event.path).await.map(drop),
      EventKind::Delete => self.delete(&event.path).await,
      EventKind::MovedFrom => self.moved(event.cookie, MoveHalf::From, event.path).await,
      EventKind::MovedTo => self.moved(event.cookie, MoveHalf::To, event.path).await,
    }
  }

  /// Run a named operation
  pub async fn handle_call(&self, call: RemoteCall) -> Result<()> {
    match call {
      RemoteCall::Complete { path } => self.complete(&path).await.map(drop),
      RemoteCall::Delete { path } => self.delete(&path).await,
      RemoteCall::Move { src, dest } => self.move_file(&src, &dest).await,
      RemoteCall::AutoAdopt { user_id } => self.auto_adopt(user_id).await.map(drop),
    }
  }

  async fn moved(&self, cookie: Option<u32>, half: MoveHalf, path: PathBuf) -> Result<()> {
    let Some(cookie) = cookie else {
      debug!(path = %path.display(), "Move event without cookie");
      return self.unpaired(half, &path).await;
    };

    let this = self.clone();
    let fallback_path = path.clone();
    let fallback = move || async move {
      if let Err(e) = this.unpaired(half, &fallback_path).await {
        error!(path = %fallback_path.display(), error = %e, "Unpaired move handling failed");
      }
    };

    match self.inner.moves.observe(cookie, half, path, fallback) {
      Observed::Paired { src, dest } => self.move_file(&src, &dest).await,
      Observed::Deferred => Ok(()),
    }
  }

  /// A lone MOVED_FROM means the file left the tree; a lone MOVED_TO means it arrived
  async fn unpaired(&self, half: MoveHalf, path: &Path) -> Result<()> {
    match half {
      MoveHalf::From => self.delete(path).await,
      MoveHalf::To => self.complete(path).await.map(drop),
    }
  }

  // ==========================================================================
  // Operations
  // ==========================================================================

  /// Catalog a finished upload and publish it if it is the newest version.
  pub async fn complete(&self, path: &Path) -> Result<Completion> {
    if is_index_file(path) {
      trace!(path = %path.display(), "Ignoring index file");
      return Ok(Completion::Skipped);
    }

    let meta = match tokio::fs::symlink_metadata(path).await {
      Ok(meta) => meta,
      Err(e) if e.kind() == io::ErrorKind::NotFound => {
        debug!(path = %path.display(), "File vanished before completion");
        return Ok(Completion::Skipped);
      }
      Err(e) => return Err(io_error(path)(e)),
    };
    if !meta.file_type().is_file() {
      trace!(path = %path.display(), "Not a regular file");
      return Ok(Completion::Skipped);
    }

    if self.inner.tools.probe.in_use(path).await {
      info!(path = %path.display(), "Upload still in progress");
      return Ok(Completion::Busy);
    }

    let Extraction { info, partial } = match self.inner.tools.extractor.extract(path).await {
      Ok(extraction) => extraction,
      Err(e @ ExtractError::Spawn { .. }) => return Err(e.into()),
      Err(e) => {
        warn!(path = %path.display(), error = %e, "Ignoring unreadable package");
        return Ok(Completion::Rejected);
      }
    };

    let uploader = fs::file_owner(path).await.map_err(io_error(path))?;
    let mtime = fs::modified_unix(path).await.map_err(io_error(path))?;

    let mut path = path.to_path_buf();
    if self.inner.config.auto_rename && !partial {
      let dest = canonical_path(&self.inner.config.path, &info.pkgname, &info.pkgver, &info.arch, &path);
      if dest != path {
        self.rename(&path, &dest).await?;
        path = dest;
      }
    }

    let _identity = self.inner.locks.lock_identity(&info.pkgname, &info.arch).await;
    let db = &self.inner.db;

    let owner = db.find(info.packager.as_deref(), Some(&uploader)).await?;
    let record = PackageRecord::from_info(&info, &path_str(&path), Some(uploader), owner, partial, mtime)?;

    let id = match db.find_version(&info.pkgname, &info.arch, &info.pkgver).await? {
      None => {
        let id = db.insert_package(&info.pkgname, &info.arch, &info.pkgver, &record).await?;
        info!(name = %info.pkgname, version = %info.pkgver, arch = %info.arch, partial, "Cataloged new package");
        if !partial {
          self.check_latest(&info.pkgname, &info.arch, &path, id, &info.pkgver).await?;
        }
        id
      }
      Some(existing) => {
        let demote = existing.latest && partial;
        db.update_package(existing.id, &record, demote).await?;
        info!(name = %info.pkgname, version = %info.pkgver, arch = %info.arch, partial, "Updated known package");
        if demote {
          self.remove_latest(&info.pkgname, &info.arch).await?;
        } else if !existing.enabled && !partial {
          self.check_latest(&info.pkgname, &info.arch, &path, existing.id, &info.pkgver).await?;
        }
        existing.id
      }
    };

    Ok(Completion::Stored { id, partial })
  }

  async fn rename(&self, src: &Path, dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
      tokio::fs::create_dir_all(parent).await.map_err(io_error(parent))?;
    }

    let key = (src.to_path_buf(), dest.to_path_buf());
    self.inner.renames.insert(key.clone());
    if let Err(e) = tokio::fs::rename(src, dest).await {
      self.inner.renames.remove(&key);
      return Err(io_error(src)(e));
    }

    info!(src = %src.display(), dest = %dest.display(), "Renamed upload");
    Ok(())
  }

  /// Publish `id` if it beats the current latest of (name, arch).
  ///
  /// The caller holds the identity lock.
  pub async fn check_latest(&self, name: &str, arch: &str, path: &Path, id: i64, candidate: &str) -> Result<()> {
    let db = &self.inner.db;

    let newest = match db.current_latest(name, arch).await? {
      Some(current) if current.id == id => false,
      Some(current) => {
        if version::compare(candidate, &current.version) == Ordering::Greater {
          db.set_latest(current.id, false).await?;
          true
        } else {
          debug!(name, arch, candidate, latest = %current.version, "Not newer than latest");
          false
        }
      }
      None => true,
    };

    if newest {
      db.set_latest(id, true).await?;
      info!(name, arch, version = candidate, "New latest version");
      self.repo_add(arch, path).await?;
    }
    Ok(())
  }

  /// Elect a new latest for (name, arch) after the old one went away.
  ///
  /// The caller holds the identity lock and has already cleared the old
  /// latest flag. A winner whose file is missing is withdrawn from the
  /// index and its row is deleted in the background.
  pub async fn remove_latest(&self, name: &str, arch: &str) -> Result<()> {
    let db = &self.inner.db;
    info!(name, arch, "Electing replacement latest");

    let best = db
      .enabled_versions(name, arch)
      .await?
      .into_iter()
      .max_by(|a, b| version::compare(&a.version, &b.version));

    let Some(best) = best else {
      debug!(name, arch, "No versions left");
      return self.repo_remove(arch, name).await;
    };

    db.set_latest(best.id, true).await?;
    let file = PathBuf::from(&best.file_path);
    if !best.file_path.is_empty() && tokio::fs::try_exists(&file).await.unwrap_or(false) {
      self.repo_add(arch, &file).await
    } else {
      warn!(name, arch, version = %best.version, path = %file.display(), "Latest version file is missing");
      self.unlink_for_any(arch, &file).await;
      self.repo_remove(arch, name).await?;
      self.spawn_delete(file);
      Ok(())
    }
  }

  /// Forget the file at `path`, electing a new latest if it was one.
  pub async fn delete(&self, path: &Path) -> Result<()> {
    if !is_package_file(path) {
      trace!(path = %path.display(), "Not a package file");
      return Ok(());
    }

    let db = &self.inner.db;
    let key = path_str(path);
    let Some(found) = db.find_by_path(&key).await? else {
      debug!(path = %path.display(), "Deleted file was not cataloged");
      return Ok(());
    };

    {
      let _identity = self.inner.locks.lock_identity(&found.name, &found.arch).await;
      // the row may have moved while we waited
      let Some(row) = db.find_by_path(&key).await?.filter(|row| row.id == found.id) else {
        return Ok(());
      };

      info!(name = %row.name, version = %row.version, arch = %row.arch, "Removing file record");
      db.disable_package(row.id).await?;
      if row.latest {
        self.remove_latest(&row.name, &row.arch).await?;
      }
    }

    self.unlink_for_any(&found.arch, path).await;
    Ok(())
  }

  /// Follow a rename inside the tree
  pub async fn move_file(&self, src: &Path, dest: &Path) -> Result<()> {
    if self
      .inner
      .renames
      .remove(&(src.to_path_buf(), dest.to_path_buf()))
      .is_some()
    {
      trace!(src = %src.display(), dest = %dest.display(), "Ignoring own rename");
      return Ok(());
    }

    if !is_package_file(src) {
      trace!(path = %src.display(), "Not a package file");
      return Ok(());
    }

    let db = &self.inner.db;
    let key = path_str(src);
    let Some(found) = db.find_by_path(&key).await? else {
      debug!(path = %src.display(), "Moved file was not cataloged");
      return Ok(());
    };

    let _identity = self.inner.locks.lock_identity(&found.name, &found.arch).await;
    if let Some(row) = db.find_by_path(&key).await?.filter(|row| row.id == found.id) {
      info!(src = %src.display(), dest = %dest.display(), "Updating path after move");
      db.relocate_package(row.id, &path_str(dest)).await?;
    }
    Ok(())
  }

  /// Give every ownerless package that matches `user_id` to that user
  pub async fn auto_adopt(&self, user_id: i64) -> Result<usize> {
    let db = &self.inner.db;
    let Some(matcher) = db.user_matcher(user_id).await? else {
      warn!(user_id, "Cannot adopt for unknown user");
      return Ok(0);
    };

    let mut adopted = 0;
    for orphan in db.orphans().await? {
      if let Some(owner) = matcher
        .find(orphan.packager.as_deref(), orphan.uploader.as_deref())
        .await?
      {
        db.set_owner(orphan.id, owner).await?;
        adopted += 1;
      }
    }

    info!(user_id, adopted, "Adopted orphan packages");
    Ok(adopted)
  }

  fn spawn_delete(&self, path: PathBuf) {
    let this = self.clone();
    let task: BoxFuture<'static, ()> = Box::pin(async move {
      if let Err(e) = this.delete(&path).await {
        error!(path = %path.display(), error = %e, "Cleanup of missing package failed");
      }
    });
    self.inner.background.spawn(task);
  }

  // ==========================================================================
  // Index maintenance
  // ==========================================================================

  async fn repo_add(&self, arch: &str, path: &Path) -> Result<()> {
    let config = &self.inner.config;

    if arch != ARCH_ANY {
      let _arch = self.inner.locks.lock_arch(arch).await;
      return Ok(self.inner.tools.indexer.add(&config.index_path(arch), path).await?);
    }

    for target in &config.arches {
      let _arch = self.inner.locks.lock_arch(target).await;
      let link = self.link_into(target, path).await?;
      self.inner.tools.indexer.add(&config.index_path(target), &link).await?;
    }
    Ok(())
  }

  async fn repo_remove(&self, arch: &str, name: &str) -> Result<()> {
    let config = &self.inner.config;
    let targets: Vec<&str> = if arch == ARCH_ANY {
      config.arches.iter().map(String::as_str).collect()
    } else {
      vec![arch]
    };

    for target in targets {
      let _arch = self.inner.locks.lock_arch(target).await;
      self.inner.tools.indexer.remove(&config.index_path(target), name).await?;
    }
    Ok(())
  }

  /// Place a relative symlink to `path` in an architecture directory
  async fn link_into(&self, arch: &str, path: &Path) -> Result<PathBuf> {
    let dir = self.inner.config.arch_dir(arch);
    tokio::fs::create_dir_all(&dir).await.map_err(io_error(&dir))?;

    let Some(file_name) = path.file_name() else {
      return Err(io_error(path)(io::Error::new(io::ErrorKind::InvalidInput, "no file name")));
    };
    let link = dir.join(file_name);

    if tokio::fs::symlink_metadata(&link).await.is_ok() {
      if let (Ok(existing), Ok(target)) = (tokio::fs::canonicalize(&link).await, tokio::fs::canonicalize(path).await)
        && existing == target
      {
        return Ok(link);
      }
      tokio::fs::remove_file(&link).await.map_err(io_error(&link))?;
    }

    let target = relative_path(path, &dir);
    tokio::fs::symlink(&target, &link).await.map_err(io_error(&link))?;
    debug!(link = %link.display(), target = %target.display(), "Linked package");
    Ok(link)
  }

  /// Remove the per-architecture symlinks of an `any` package
  async fn unlink_for_any(&self, arch: &str, path: &Path) {
    if arch != ARCH_ANY {
      return;
    }
    let Some(file_name) = path.file_name() else {
      return;
    };

    for target in &self.inner.config.arches {
      let link = self.inner.config.arch_dir(target).join(file_name);
      let is_link = tokio::fs::symlink_metadata(&link)
        .await
        .map(|meta| meta.file_type().is_symlink())
        .unwrap_or(false);
      if is_link && let Err(e) = tokio::fs::remove_file(&link).await {
        warn!(link = %link.display(), error = %e, "Failed to remove package link");
      }
    }
  }
}

#[async_trait]
impl CommandHandler for Processor {
  async fn handle(&self, command: Command) -> Result<()> {
    match command {
      Command::FilesystemEvent(event) => self.handle_event(event).await,
      Command::RemoteCall(call) => self.handle_call(call).await,
    }
  }

  async fn drain(&self) {
    Processor::drain(self).await
  }
}

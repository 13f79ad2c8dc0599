//! Lock domains guarding the repository.
//!
//! - one lock per architecture: index commands for that architecture run one at a time
//! - one lock per (name, arch): catalog read-modify-write for that package identity
//!
//! Identity locks are held weakly and pruned once the registry grows, so a
//! long-running processor does not keep a lock for every package it ever saw.
//! Callers always take the identity lock before an architecture lock.

use std::sync::{
  Arc, Weak,
  atomic::{AtomicUsize, Ordering},
};

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::trace;

/// Registry size below which dead identity entries are left alone
const PRUNE_FLOOR: usize = 1024;

pub struct LockRegistry {
  arches: DashMap<String, Arc<Mutex<()>>>,
  identities: DashMap<(String, String), Weak<Mutex<()>>>,
  prune_at: AtomicUsize,
}

impl Default for LockRegistry {
  fn default() -> Self {
    Self::new()
  }
}

impl LockRegistry {
  pub fn new() -> Self {
    Self {
      arches: DashMap::new(),
      identities: DashMap::new(),
      prune_at: AtomicUsize::new(PRUNE_FLOOR),
    }
  }

  pub fn arch(&self, arch: &str) -> Arc<Mutex<()>> {
    if let Some(lock) = self.arches.get(arch) {
      return Arc::clone(&lock);
    }
    Arc::clone(&self.arches.entry(arch.to_string()).or_default())
  }

  pub async fn lock_arch(&self, arch: &str) -> OwnedMutexGuard<()> {
    self.arch(arch).lock_owned().await
  }

  pub fn identity(&self, name: &str, arch: &str) -> Arc<Mutex<()>> {
    let lock = {
      let mut entry = self
        .identities
        .entry((name.to_string(), arch.to_string()))
        .or_insert_with(Weak::new);
      match entry.upgrade() {
        Some(lock) => return lock,
        None => {
          let lock = Arc::new(Mutex::new(()));
          *entry = Arc::downgrade(&lock);
          lock
        }
      }
    };

    self.maybe_prune();
    lock
  }

  pub async fn lock_identity(&self, name: &str, arch: &str) -> OwnedMutexGuard<()> {
    self.identity(name, arch).lock_owned().await
  }

  /// Number of identity entries currently tracked (live or dead)
  pub fn identity_entries(&self) -> usize {
    self.identities.len()
  }

  fn maybe_prune(&self) {
    let len = self.identities.len();
    if len < self.prune_at.load(Ordering::Relaxed) {
      return;
    }

    self.identities.retain(|_, lock| lock.strong_count() > 0);
    let remaining = self.identities.len();
    self.prune_at.store((remaining * 2).max(PRUNE_FLOOR), Ordering::Relaxed);
    trace!(before = len, after = remaining, "Pruned identity locks");
  }
}

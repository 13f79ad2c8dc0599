//! Test helpers for processor integration tests.
//!
//! Provides `ProcessorTestContext`, which owns a temporary repository tree and
//! catalog and wires a `Processor` to in-memory stand-ins for the external
//! tools. A "package" in these tests is a file whose content is the JSON the
//! metadata extractor would print; `"partial": true` marks a damaged archive
//! and anything that is not JSON is rejected.

use std::{
  collections::{HashMap, HashSet},
  future::Future,
  path::{Path, PathBuf},
  sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
  },
  time::Duration,
};

use async_trait::async_trait;
use tempfile::TempDir;

use crate::{
  actor::Processor,
  config::RepositoryConfig,
  db::CatalogDb,
  domain::package::PackageInfo,
  tools::{ExtractError, Extraction, IndexerError, MetadataExtractor, RepoIndexer, Tools, WriteProbe},
};

// ============================================================================
// Tool stand-ins
// ============================================================================

pub struct JsonExtractor;

#[async_trait]
impl MetadataExtractor for JsonExtractor {
  async fn extract(&self, path: &Path) -> Result<Extraction, ExtractError> {
    let rejected = |stderr: String| ExtractError::Rejected {
      path: path.to_path_buf(),
      code: Some(1),
      stderr,
    };

    let raw = tokio::fs::read_to_string(path).await.map_err(|e| rejected(e.to_string()))?;
    let value: serde_json::Value = serde_json::from_str(&raw).map_err(|e| rejected(e.to_string()))?;
    let partial = value.get("partial").and_then(|p| p.as_bool()).unwrap_or(false);
    let info: PackageInfo = serde_json::from_value(value).map_err(|source| ExtractError::Parse {
      path: path.to_path_buf(),
      source,
    })?;
    Ok(Extraction { info, partial })
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexCall {
  Add { index: PathBuf, package: PathBuf },
  Remove { index: PathBuf, name: String },
}

/// Records index commands and notices when two run on one index at once
#[derive(Default)]
pub struct RecordingIndexer {
  calls: Mutex<Vec<IndexCall>>,
  in_flight: Mutex<HashMap<PathBuf, usize>>,
  overlaps: AtomicUsize,
  /// How long each command takes
  latency: Mutex<Duration>,
}

impl RecordingIndexer {
  pub fn calls(&self) -> Vec<IndexCall> {
    self.calls.lock().unwrap().clone()
  }

  pub fn take(&self) -> Vec<IndexCall> {
    std::mem::take(&mut *self.calls.lock().unwrap())
  }

  /// Commands that started while another was running on the same index
  pub fn overlaps(&self) -> usize {
    self.overlaps.load(Ordering::SeqCst)
  }

  pub fn set_latency(&self, latency: Duration) {
    *self.latency.lock().unwrap() = latency;
  }

  async fn run(&self, index: &Path, call: IndexCall) {
    {
      let mut in_flight = self.in_flight.lock().unwrap();
      let running = in_flight.entry(index.to_path_buf()).or_default();
      if *running > 0 {
        self.overlaps.fetch_add(1, Ordering::SeqCst);
      }
      *running += 1;
    }

    let latency = *self.latency.lock().unwrap();
    if latency.is_zero() {
      tokio::task::yield_now().await;
    } else {
      tokio::time::sleep(latency).await;
    }
    self.calls.lock().unwrap().push(call);

    if let Some(running) = self.in_flight.lock().unwrap().get_mut(index) {
      *running -= 1;
    }
  }
}

#[async_trait]
impl RepoIndexer for RecordingIndexer {
  async fn add(&self, index: &Path, package: &Path) -> Result<(), IndexerError> {
    let call = IndexCall::Add {
      index: index.to_path_buf(),
      package: package.to_path_buf(),
    };
    self.run(index, call).await;
    Ok(())
  }

  async fn remove(&self, index: &Path, name: &str) -> Result<(), IndexerError> {
    let call = IndexCall::Remove {
      index: index.to_path_buf(),
      name: name.to_string(),
    };
    self.run(index, call).await;
    Ok(())
  }
}

#[derive(Default)]
pub struct FakeProbe {
  busy: Mutex<HashSet<PathBuf>>,
}

impl FakeProbe {
  pub fn set_busy(&self, path: &Path, busy: bool) {
    let mut set = self.busy.lock().unwrap();
    if busy {
      set.insert(path.to_path_buf());
    } else {
      set.remove(path);
    }
  }
}

#[async_trait]
impl WriteProbe for FakeProbe {
  async fn in_use(&self, path: &Path) -> bool {
    self.busy.lock().unwrap().contains(path)
  }
}

// ============================================================================
// Context
// ============================================================================

pub struct ProcessorTestContext {
  pub repo_dir: TempDir,
  pub data_dir: TempDir,
  pub config: RepositoryConfig,
  pub db: CatalogDb,
  pub processor: Processor,
  pub indexer: Arc<RecordingIndexer>,
  pub probe: Arc<FakeProbe>,
}

impl ProcessorTestContext {
  pub async fn new() -> Self {
    Self::with_config(|_| {}).await
  }

  pub async fn with_config(customize: impl FnOnce(&mut RepositoryConfig)) -> Self {
    let repo_dir = TempDir::new().expect("create repo temp dir");
    let data_dir = TempDir::new().expect("create data temp dir");

    let mut config = RepositoryConfig {
      path: repo_dir.path().to_path_buf(),
      name: "test".to_string(),
      arches: vec!["i686".to_string(), "x86_64".to_string()],
      auto_rename: false,
      move_grace_ms: 200,
      management_socket: data_dir.path().join("archrepo.sock"),
      ..RepositoryConfig::default()
    };
    customize(&mut config);

    for arch in config.arches.iter().chain(std::iter::once(&"any".to_string())) {
      std::fs::create_dir_all(repo_dir.path().join(arch)).expect("create arch dir");
    }

    let db = CatalogDb::open_at_path(&data_dir.path().join("catalog.db"), 4)
      .await
      .expect("open catalog");

    let indexer = Arc::new(RecordingIndexer::default());
    let probe = Arc::new(FakeProbe::default());
    let tools = Tools {
      extractor: Arc::new(JsonExtractor),
      indexer: indexer.clone(),
      probe: probe.clone(),
    };
    let processor = Processor::new(config.clone(), db.clone(), tools);

    Self {
      repo_dir,
      data_dir,
      config,
      db,
      processor,
      indexer,
      probe,
    }
  }

  pub fn path(&self, relative: &str) -> PathBuf {
    self.repo_dir.path().join(relative)
  }

  pub fn index(&self, arch: &str) -> PathBuf {
    self.config.index_path(arch)
  }

  /// Write a package file at `relative` describing (name, version, arch)
  pub fn write_package(&self, relative: &str, name: &str, version: &str, arch: &str) -> PathBuf {
    self.write_package_json(
      relative,
      serde_json::json!({
        "pkgname": name,
        "pkgver": version,
        "arch": arch,
        "pkgdesc": format!("The {name} package"),
        "packager": "Jane Doe <jane@example.org>",
        "builddate": "1700000000",
        "size": "1024",
        "depend": ["glibc"],
      }),
    )
  }

  pub fn write_partial_package(&self, relative: &str, name: &str, version: &str, arch: &str) -> PathBuf {
    self.write_package_json(
      relative,
      serde_json::json!({"pkgname": name, "pkgver": version, "arch": arch, "partial": true}),
    )
  }

  pub fn write_package_json(&self, relative: &str, json: serde_json::Value) -> PathBuf {
    let path = self.path(relative);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).expect("create parent");
    }
    std::fs::write(&path, serde_json::to_vec(&json).expect("serialize")).expect("write package");
    path
  }

  /// Version currently marked latest for (name, arch)
  pub async fn latest(&self, name: &str, arch: &str) -> Option<String> {
    self
      .db
      .current_latest(name, arch)
      .await
      .expect("query latest")
      .map(|row| row.version)
  }
}

/// Poll `check` until it returns true or `timeout` elapses
pub async fn wait_for<F, Fut>(timeout: Duration, mut check: F) -> bool
where
  F: FnMut() -> Fut,
  Fut: Future<Output = bool>,
{
  let deadline = tokio::time::Instant::now() + timeout;
  while tokio::time::Instant::now() < deadline {
    if check().await {
      return true;
    }
    tokio::time::sleep(Duration::from_millis(20)).await;
  }
  check().await
}

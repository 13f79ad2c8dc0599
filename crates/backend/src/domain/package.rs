//! Package archives: file naming rules and the metadata the extractor reports.

use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, OneOrMany, serde_as};

use super::config::INDEX_SUFFIX;

/// Architecture value meaning "installable everywhere"
pub const ARCH_ANY: &str = "any";

/// Compression suffixes accepted after `.pkg.tar.`
pub const PACKAGE_COMPRESSIONS: &[&str] = &["gz", "xz", "zst"];

/// The lock file repo-add leaves next to an index while rewriting it
const LOCK_SUFFIX: &str = ".lck";

/// Does this path name a package archive?
pub fn is_package_file(path: &Path) -> bool {
  let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
    return false;
  };
  PACKAGE_COMPRESSIONS
    .iter()
    .any(|ext| name.ends_with(&format!(".pkg.tar.{ext}")))
}

/// Does this path name a repository index (or its lock file)?
pub fn is_index_file(path: &Path) -> bool {
  let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
    return false;
  };
  name.strip_suffix(LOCK_SUFFIX).unwrap_or(name).ends_with(INDEX_SUFFIX)
}

/// Canonical location for a package: `<root>/<arch>/<name>-<version>-<arch>.pkg.tar.<ext>`,
/// keeping the compression extension of `source`.
pub fn canonical_path(root: &Path, name: &str, version: &str, arch: &str, source: &Path) -> PathBuf {
  let ext = source
    .file_name()
    .and_then(|n| n.to_str())
    .and_then(|n| n.rsplit('.').next())
    .unwrap_or("xz");
  root.join(arch).join(format!("{name}-{version}-{arch}.pkg.tar.{ext}"))
}

/// Path of `target` relative to directory `base`, for symlinks.
///
/// Both paths are expected to be absolute and normalized.
pub fn relative_path(target: &Path, base: &Path) -> PathBuf {
  let target: Vec<Component> = target.components().collect();
  let base: Vec<Component> = base.components().collect();

  let common = target.iter().zip(base.iter()).take_while(|(a, b)| a == b).count();

  let mut result = PathBuf::new();
  for _ in common..base.len() {
    result.push("..");
  }
  for component in &target[common..] {
    result.push(component.as_os_str());
  }
  result
}

// ============================================================================
// Extractor output
// ============================================================================

/// Metadata read from an archive's `.PKGINFO`.
///
/// Repeated keys arrive as a list, single keys as a plain string, and numbers
/// are quoted.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageInfo {
  pub pkgname: String,
  pub pkgver: String,
  pub arch: String,
  pub pkgdesc: Option<String>,
  pub url: Option<String>,
  #[serde_as(as = "Option<OneOrMany<_>>")]
  pub group: Option<Vec<String>>,
  #[serde_as(as = "Option<OneOrMany<_>>")]
  pub license: Option<Vec<String>>,
  pub packager: Option<String>,
  pub pkgbase: Option<String>,
  #[serde_as(as = "Option<DisplayFromStr>")]
  pub builddate: Option<i64>,
  #[serde_as(as = "Option<DisplayFromStr>")]
  pub size: Option<i64>,
  #[serde_as(as = "OneOrMany<_>")]
  #[serde(default)]
  pub depend: Vec<String>,
  #[serde_as(as = "OneOrMany<_>")]
  #[serde(default)]
  pub optdepend: Vec<String>,
}

impl PackageInfo {
  pub fn base_name(&self) -> &str {
    self.pkgbase.as_deref().unwrap_or(&self.pkgname)
  }
}

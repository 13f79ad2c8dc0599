//! Package rows: the read-modify-write operations the processor performs.
//!
//! Callers serialize mutations per (name, arch); nothing here takes locks.

use sqlx::FromRow;

use super::{CatalogDb, Result};
use crate::domain::package::PackageInfo;

/// Full package row
#[derive(Debug, Clone, FromRow)]
pub struct PackageRow {
  pub id: i64,
  pub name: String,
  pub arch: String,
  pub version: String,
  pub description: Option<String>,
  pub url: Option<String>,
  pub pkg_group: Option<String>,
  pub license: Option<String>,
  pub packager: Option<String>,
  pub uploader: Option<String>,
  pub base_name: Option<String>,
  pub file_path: String,
  pub build_date: Option<i64>,
  pub size: Option<i64>,
  pub depends: String,
  pub opt_depends: String,
  pub enabled: bool,
  pub latest: bool,
  pub last_update: i64,
  pub flag_date: Option<i64>,
  pub owner: Option<i64>,
}

impl PackageRow {
  pub fn depends(&self) -> Vec<String> {
    serde_json::from_str(&self.depends).unwrap_or_default()
  }

  pub fn opt_depends(&self) -> Vec<String> {
    serde_json::from_str(&self.opt_depends).unwrap_or_default()
  }
}

/// Candidate for the latest slot of a (name, arch)
#[derive(Debug, Clone, FromRow)]
pub struct VersionRow {
  pub id: i64,
  pub version: String,
  pub file_path: String,
}

/// Package without a resolved owner
#[derive(Debug, Clone, FromRow)]
pub struct OrphanRow {
  pub id: i64,
  pub packager: Option<String>,
  pub uploader: Option<String>,
}

/// Column values written on insert and on re-completion of a known version
#[derive(Debug, Clone)]
pub struct PackageRecord {
  pub description: Option<String>,
  pub url: Option<String>,
  pub group: Option<String>,
  pub license: Option<String>,
  pub packager: Option<String>,
  pub uploader: Option<String>,
  pub base_name: String,
  pub file_path: String,
  pub build_date: i64,
  pub size: Option<i64>,
  pub depends: String,
  pub opt_depends: String,
  pub owner: Option<i64>,
  pub enabled: bool,
  pub last_update: i64,
}

impl PackageRecord {
  /// Build the stored columns from extractor output.
  ///
  /// A partial package is stored disabled so it never becomes latest.
  pub fn from_info(
    info: &PackageInfo,
    file_path: &str,
    uploader: Option<String>,
    owner: Option<i64>,
    partial: bool,
    last_update: i64,
  ) -> Result<Self> {
    Ok(Self {
      description: info.pkgdesc.clone(),
      url: info.url.clone(),
      group: info.group.as_ref().map(serde_json::to_string).transpose()?,
      license: info.license.as_ref().map(serde_json::to_string).transpose()?,
      packager: info.packager.clone(),
      uploader,
      base_name: info.base_name().to_string(),
      file_path: file_path.to_string(),
      build_date: info.builddate.unwrap_or(last_update),
      size: info.size,
      depends: serde_json::to_string(&info.depend)?,
      opt_depends: serde_json::to_string(&info.optdepend)?,
      owner,
      enabled: !partial,
      last_update,
    })
  }
}

impl CatalogDb {
  pub async fn get_package(&self, id: i64) -> Result<Option<PackageRow>> {
    let row = sqlx::query_as::<_, PackageRow>("SELECT * FROM packages WHERE id = ?")
      .bind(id)
      .fetch_optional(self.pool())
      .await?;
    Ok(row)
  }

  /// Row for an exact (name, arch, version)
  pub async fn find_version(&self, name: &str, arch: &str, version: &str) -> Result<Option<PackageRow>> {
    let row = sqlx::query_as::<_, PackageRow>("SELECT * FROM packages WHERE name = ? AND arch = ? AND version = ?")
      .bind(name)
      .bind(arch)
      .bind(version)
      .fetch_optional(self.pool())
      .await?;
    Ok(row)
  }

  /// Row whose stored file is `path`
  pub async fn find_by_path(&self, path: &str) -> Result<Option<PackageRow>> {
    let row = sqlx::query_as::<_, PackageRow>("SELECT * FROM packages WHERE file_path = ? LIMIT 1")
      .bind(path)
      .fetch_optional(self.pool())
      .await?;
    Ok(row)
  }

  /// Insert a new version and return its id
  pub async fn insert_package(&self, name: &str, arch: &str, version: &str, record: &PackageRecord) -> Result<i64> {
    let result = sqlx::query(
      "INSERT INTO packages (name, arch, version, description, url, pkg_group, license, packager, uploader, \
       base_name, file_path, build_date, size, depends, opt_depends, owner, enabled, last_update) \
       VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(name)
    .bind(arch)
    .bind(version)
    .bind(&record.description)
    .bind(&record.url)
    .bind(&record.group)
    .bind(&record.license)
    .bind(&record.packager)
    .bind(&record.uploader)
    .bind(&record.base_name)
    .bind(&record.file_path)
    .bind(record.build_date)
    .bind(record.size)
    .bind(&record.depends)
    .bind(&record.opt_depends)
    .bind(record.owner)
    .bind(record.enabled)
    .bind(record.last_update)
    .execute(self.pool())
    .await?;
    Ok(result.last_insert_rowid())
  }

  /// Overwrite an existing version. `demote` also clears its latest flag.
  pub async fn update_package(&self, id: i64, record: &PackageRecord, demote: bool) -> Result<()> {
    sqlx::query(
      "UPDATE packages SET description = ?, url = ?, pkg_group = ?, license = ?, packager = ?, uploader = ?, \
       base_name = ?, file_path = ?, build_date = ?, size = ?, depends = ?, opt_depends = ?, owner = ?, \
       enabled = ?, last_update = ?, latest = CASE WHEN ? THEN 0 ELSE latest END \
       WHERE id = ?",
    )
    .bind(&record.description)
    .bind(&record.url)
    .bind(&record.group)
    .bind(&record.license)
    .bind(&record.packager)
    .bind(&record.uploader)
    .bind(&record.base_name)
    .bind(&record.file_path)
    .bind(record.build_date)
    .bind(record.size)
    .bind(&record.depends)
    .bind(&record.opt_depends)
    .bind(record.owner)
    .bind(record.enabled)
    .bind(record.last_update)
    .bind(demote)
    .bind(id)
    .execute(self.pool())
    .await?;
    Ok(())
  }

  /// The row currently marked latest for (name, arch)
  pub async fn current_latest(&self, name: &str, arch: &str) -> Result<Option<VersionRow>> {
    let row = sqlx::query_as::<_, VersionRow>(
      "SELECT id, version, file_path FROM packages WHERE name = ? AND arch = ? AND latest",
    )
    .bind(name)
    .bind(arch)
    .fetch_optional(self.pool())
    .await?;
    Ok(row)
  }

  pub async fn set_latest(&self, id: i64, latest: bool) -> Result<()> {
    sqlx::query("UPDATE packages SET latest = ? WHERE id = ?")
      .bind(latest)
      .bind(id)
      .execute(self.pool())
      .await?;
    Ok(())
  }

  /// All enabled versions of (name, arch)
  pub async fn enabled_versions(&self, name: &str, arch: &str) -> Result<Vec<VersionRow>> {
    let rows = sqlx::query_as::<_, VersionRow>(
      "SELECT id, version, file_path FROM packages WHERE name = ? AND arch = ? AND enabled",
    )
    .bind(name)
    .bind(arch)
    .fetch_all(self.pool())
    .await?;
    Ok(rows)
  }

  /// Forget the file behind a row: disabled, no path, not latest
  pub async fn disable_package(&self, id: i64) -> Result<()> {
    sqlx::query("UPDATE packages SET file_path = '', enabled = 0, latest = 0 WHERE id = ?")
      .bind(id)
      .execute(self.pool())
      .await?;
    Ok(())
  }

  pub async fn relocate_package(&self, id: i64, file_path: &str) -> Result<()> {
    sqlx::query("UPDATE packages SET file_path = ? WHERE id = ?")
      .bind(file_path)
      .bind(id)
      .execute(self.pool())
      .await?;
    Ok(())
  }

  /// (id, path) for every row that still points at a file
  pub async fn file_paths(&self) -> Result<Vec<(i64, String)>> {
    let rows = sqlx::query_as::<_, (i64, String)>("SELECT id, file_path FROM packages WHERE file_path != ''")
      .fetch_all(self.pool())
      .await?;
    Ok(rows)
  }

  pub async fn set_last_update(&self, id: i64, last_update: i64) -> Result<()> {
    sqlx::query("UPDATE packages SET last_update = ? WHERE id = ?")
      .bind(last_update)
      .bind(id)
      .execute(self.pool())
      .await?;
    Ok(())
  }

  pub async fn orphans(&self) -> Result<Vec<OrphanRow>> {
    let rows = sqlx::query_as::<_, OrphanRow>("SELECT id, packager, uploader FROM packages WHERE owner IS NULL")
      .fetch_all(self.pool())
      .await?;
    Ok(rows)
  }

  pub async fn set_owner(&self, id: i64, owner: i64) -> Result<()> {
    sqlx::query("UPDATE packages SET owner = ? WHERE id = ?")
      .bind(owner)
      .bind(id)
      .execute(self.pool())
      .await?;
    Ok(())
  }

  /// Set or clear the out-of-date flag on the latest (name, arch). Returns rows touched.
  pub async fn set_flagged(&self, name: &str, arch: &str, flag_date: Option<i64>) -> Result<u64> {
    let result = sqlx::query("UPDATE packages SET flag_date = ? WHERE name = ? AND arch = ? AND latest")
      .bind(flag_date)
      .bind(name)
      .bind(arch)
      .execute(self.pool())
      .await?;
    Ok(result.rows_affected())
  }
}

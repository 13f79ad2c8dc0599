//! Reconciliation commands

use anyhow::{Context, Result};
use archrepo::{
  config::Config,
  db::CatalogDb,
  service::sync::{date_sync, sync},
};

/// Reconcile catalog and disk, locally or through the running processor
pub async fn cmd_sync(config: &Config) -> Result<()> {
  let db = CatalogDb::open(&config.database)
    .await
    .context("Failed to open catalog")?;
  let attached = archrepo::attach(config, db.clone())
    .await
    .context("Failed to reach a processor")?;

  if attached.is_local() {
    println!("Repo processor is up");
  } else {
    println!("Connecting to Arch Repo management socket...");
  }

  let report = sync(&db, &config.repository.path, &attached.handle).await;
  attached.finish().await;
  let report = report.context("Sync failed")?;

  println!("Added:   {}", report.added);
  println!("Removed: {}", report.removed);
  if report.skipped > 0 {
    println!("Skipped: {}", report.skipped);
  }
  if report.failed > 0 {
    println!("Failed:  {}", report.failed);
  }
  Ok(())
}

/// Backfill last-update times from file mtimes
pub async fn cmd_date_sync(config: &Config) -> Result<()> {
  let db = CatalogDb::open(&config.database)
    .await
    .context("Failed to open catalog")?;
  let updated = date_sync(&db, &config.repository.path)
    .await
    .context("Date sync failed")?;

  println!("Updated {updated} package(s)");
  Ok(())
}

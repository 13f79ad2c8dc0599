//! Catalog browsing command

use anyhow::{Context, Result, bail};
use archrepo::{
  config::Config,
  db::CatalogDb,
  service::browse::{Browser, Flagged, Page, PackageQuery, PageSize},
};
use chrono::{DateTime, NaiveDate};
use clap::Args;

#[derive(Args)]
pub struct QueryArgs {
  /// Free-text search over name, base name and description
  #[arg(short, long)]
  search: Option<String>,
  /// Only these architectures (repeatable)
  #[arg(long = "arch")]
  arches: Vec<String>,
  /// Only packages owned by this user id
  #[arg(long)]
  maintainer: Option<i64>,
  /// Only packages flagged out of date
  #[arg(long, conflicts_with = "not_flagged")]
  flagged: bool,
  /// Only packages not flagged out of date
  #[arg(long)]
  not_flagged: bool,
  /// Only packages updated since (YYYY-MM-DD or unix seconds)
  #[arg(long)]
  since: Option<String>,
  /// Sort keys: name, last_update, arch; add "asc" for ascending
  #[arg(long, default_value = "last_update")]
  sort: String,
  /// Rows per page
  #[arg(short, long, default_value = "25", value_parser = ["25", "50", "100"])]
  limit: String,
  /// Page number, starting at 1
  #[arg(short, long, default_value = "1")]
  page: u32,
  /// Output as JSON
  #[arg(long)]
  json: bool,
}

fn parse_since(raw: &str) -> Result<i64> {
  if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
    let Some(start) = date.and_hms_opt(0, 0, 0) else {
      bail!("Invalid date: {raw}");
    };
    return Ok(start.and_utc().timestamp());
  }
  raw
    .parse::<i64>()
    .with_context(|| format!("Expected YYYY-MM-DD or unix seconds, got '{raw}'"))
}

impl QueryArgs {
  fn to_query(&self) -> Result<PackageQuery> {
    let limit: u32 = self.limit.parse().context("Invalid page size")?;
    let flagged = match (self.flagged, self.not_flagged) {
      (true, _) => Flagged::Yes,
      (_, true) => Flagged::No,
      _ => Flagged::Any,
    };

    Ok(
      PackageQuery {
        search: self.search.clone(),
        arches: self.arches.clone(),
        maintainer: self.maintainer,
        flagged,
        updated_since: self.since.as_deref().map(parse_since).transpose()?,
        page_size: PageSize::try_from(limit)?,
        page: self.page.max(1),
        ..PackageQuery::default()
      }
      .with_order(&self.sort),
    )
  }
}

fn format_time(unix: i64) -> String {
  DateTime::from_timestamp(unix, 0)
    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
    .unwrap_or_else(|| unix.to_string())
}

fn print_page(page: &Page) {
  if page.rows.is_empty() {
    println!("No packages found");
    return;
  }

  println!(
    "{:<32} {:<24} {:<8} {:<16} {:<16} {}",
    "NAME", "VERSION", "ARCH", "MAINTAINER", "UPDATED", "FLAGGED"
  );
  for row in &page.rows {
    println!(
      "{:<32} {:<24} {:<8} {:<16} {:<16} {}",
      row.name,
      row.version,
      row.arch,
      row.maintainer.as_deref().unwrap_or("-"),
      format_time(row.last_update),
      row.flag_date.map(format_time).unwrap_or_default(),
    );
  }
  println!(
    "\nPage {}/{} ({} packages, {} per page)",
    page.page,
    page.pages.max(1),
    page.total,
    page.page_size
  );
}

/// Print one page of the catalog
pub async fn cmd_query(config: &Config, args: QueryArgs) -> Result<()> {
  let query = args.to_query()?;
  let db = CatalogDb::open(&config.database)
    .await
    .context("Failed to open catalog")?;
  let browser = Browser::new(db, &config.web);

  let page = browser.page("cli", &query).await.context("Query failed")?;
  if args.json {
    println!("{}", serde_json::to_string_pretty(&page)?);
  } else {
    print_page(&page);
  }
  Ok(())
}

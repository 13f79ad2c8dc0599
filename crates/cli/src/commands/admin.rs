//! Administrative commands (adopt, users, flags)

use anyhow::{Context, Result, bail};
use archrepo::{
  config::Config,
  db::{CatalogDb, UserRow},
  ipc::{Command, RemoteCall},
  tools::fs::now_unix,
};

async fn open(config: &Config) -> Result<CatalogDb> {
  CatalogDb::open(&config.database)
    .await
    .context("Failed to open catalog")
}

/// Ask a processor to hand ownerless packages to a user
pub async fn cmd_adopt(config: &Config, user_id: i64) -> Result<()> {
  let db = open(config).await?;
  if db.get_user(user_id).await?.is_none() {
    bail!("No user with id {user_id}");
  }

  let attached = archrepo::attach(config, db).await.context("Failed to reach a processor")?;
  let sent = attached
    .handle
    .submit(Command::RemoteCall(RemoteCall::AutoAdopt { user_id }))
    .await;
  let local = attached.is_local();
  attached.finish().await;
  sent.context("Failed to submit adoption")?;

  if local {
    println!("Adoption finished for user {user_id}");
  } else {
    println!("Adoption queued for user {user_id}");
  }
  Ok(())
}

pub async fn cmd_user_add(
  config: &Config,
  id: i64,
  username: Option<String>,
  email: Option<String>,
  title: Option<String>,
  realname: Option<String>,
) -> Result<()> {
  let db = open(config).await?;
  db.upsert_user(&UserRow {
    id,
    username,
    email,
    title,
    realname,
  })
  .await
  .context("Failed to save user")?;

  println!("Saved user {id}");
  Ok(())
}

pub async fn cmd_user_alias(config: &Config, id: i64, alias: &str) -> Result<()> {
  let db = open(config).await?;
  if db.get_user(id).await?.is_none() {
    bail!("No user with id {id}");
  }
  db.add_alias(id, alias).await.context("Failed to add alias")?;

  println!("Added alias '{alias}' for user {id}");
  Ok(())
}

pub async fn cmd_user_show(config: &Config, id: i64) -> Result<()> {
  let db = open(config).await?;
  let Some(user) = db.get_user(id).await? else {
    bail!("No user with id {id}");
  };
  let aliases = db.aliases(id).await?;

  let show = |value: &Option<String>| value.clone().unwrap_or_else(|| "-".to_string());
  println!("Id:        {}", user.id);
  println!("Username:  {}", show(&user.username));
  println!("Real name: {}", show(&user.realname));
  println!("Email:     {}", show(&user.email));
  println!("Title:     {}", show(&user.title));
  if !aliases.is_empty() {
    println!("Aliases:   {}", aliases.join(", "));
  }
  Ok(())
}

/// Set or clear the out-of-date flag on the latest (name, arch)
pub async fn cmd_flag(config: &Config, name: &str, arch: &str, clear: bool) -> Result<()> {
  let db = open(config).await?;
  let flag_date = (!clear).then(now_unix);
  let touched = db
    .set_flagged(name, arch, flag_date)
    .await
    .context("Failed to update flag")?;

  if touched == 0 {
    bail!("No published package {name} ({arch})");
  }
  if clear {
    println!("Cleared flag on {name} ({arch})");
  } else {
    println!("Flagged {name} ({arch}) out of date");
  }
  Ok(())
}

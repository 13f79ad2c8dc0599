use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::{CatalogDb, Result};
use crate::domain::owner::{OwnerFinder, UserMatcher};

/// Maintainer identity
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct UserRow {
  pub id: i64,
  pub username: Option<String>,
  pub email: Option<String>,
  pub title: Option<String>,
  pub realname: Option<String>,
}

impl CatalogDb {
  /// Insert or replace an identity
  pub async fn upsert_user(&self, user: &UserRow) -> Result<()> {
    sqlx::query(
      "INSERT INTO users (id, username, email, title, realname) VALUES (?, ?, ?, ?, ?) \
       ON CONFLICT(id) DO UPDATE SET username = excluded.username, email = excluded.email, \
       title = excluded.title, realname = excluded.realname",
    )
    .bind(user.id)
    .bind(&user.username)
    .bind(&user.email)
    .bind(&user.title)
    .bind(&user.realname)
    .execute(self.pool())
    .await?;
    Ok(())
  }

  pub async fn get_user(&self, id: i64) -> Result<Option<UserRow>> {
    let row = sqlx::query_as::<_, UserRow>("SELECT id, username, email, title, realname FROM users WHERE id = ?")
      .bind(id)
      .fetch_optional(self.pool())
      .await?;
    Ok(row)
  }

  pub async fn add_alias(&self, user_id: i64, alias: &str) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO user_aliases (user_id, alias) VALUES (?, ?)")
      .bind(user_id)
      .bind(alias)
      .execute(self.pool())
      .await?;
    Ok(())
  }

  pub async fn aliases(&self, user_id: i64) -> Result<Vec<String>> {
    let rows = sqlx::query_as::<_, (String,)>("SELECT alias FROM user_aliases WHERE user_id = ?")
      .bind(user_id)
      .fetch_all(self.pool())
      .await?;
    Ok(rows.into_iter().map(|(alias,)| alias).collect())
  }

  /// Build a matcher for one user, or `None` if the id is unknown
  pub async fn user_matcher(&self, user_id: i64) -> Result<Option<UserMatcher>> {
    let Some(user) = self.get_user(user_id).await? else {
      return Ok(None);
    };
    let aliases = self.aliases(user_id).await?;
    Ok(Some(UserMatcher::new(
      user.id,
      user.username.as_deref(),
      user.realname.as_deref(),
      user.email.as_deref(),
      aliases,
    )))
  }
}

#[async_trait]
impl OwnerFinder for CatalogDb {
  async fn from_users(&self, name: &str, email: Option<&str>) -> Result<Option<i64>> {
    let row = match email {
      Some(email) => {
        sqlx::query_as::<_, (i64,)>(
          "SELECT id FROM users WHERE (lower(username) = ?1 OR lower(realname) = ?1) AND lower(email) = ?2 LIMIT 1",
        )
        .bind(name)
        .bind(email)
        .fetch_optional(self.pool())
        .await?
      }
      None => {
        sqlx::query_as::<_, (i64,)>("SELECT id FROM users WHERE lower(username) = ?1 OR lower(realname) = ?1 LIMIT 1")
          .bind(name)
          .fetch_optional(self.pool())
          .await?
      }
    };
    Ok(row.map(|(id,)| id))
  }

  async fn from_aliases(&self, alias: &str) -> Result<Option<i64>> {
    let row = sqlx::query_as::<_, (i64,)>("SELECT user_id FROM user_aliases WHERE lower(alias) = ? LIMIT 1")
      .bind(alias)
      .fetch_optional(self.pool())
      .await?;
    Ok(row.map(|(id,)| id))
  }
}

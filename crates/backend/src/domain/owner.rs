//! Resolving which maintainer owns a package.
//!
//! The packager string (`Name <email>`) is tried first, then the OS user that
//! uploaded the file. Each candidate is looked up among identities and then
//! among aliases. All comparisons are case-insensitive.

use std::collections::HashSet;

use async_trait::async_trait;

use crate::db::Result;

/// Placeholder makepkg writes when PACKAGER is unset
const UNKNOWN_PACKAGER: &str = "unknown packager";

/// A packager string split into its name and optional email, lowercased
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packager {
  pub name: String,
  pub email: Option<String>,
}

impl Packager {
  /// Parse `Name <email>`; returns `None` for an empty or unknown packager.
  pub fn parse(raw: &str) -> Option<Self> {
    let lowered = raw.trim().to_lowercase();
    if lowered.is_empty() || lowered == UNKNOWN_PACKAGER {
      return None;
    }

    let (name, email) = match lowered.split_once('<') {
      Some((name, rest)) => {
        let email = rest.trim_end().trim_end_matches('>').trim();
        (name.trim(), (!email.is_empty()).then(|| email.to_string()))
      }
      None => (lowered.as_str(), None),
    };

    Some(Self {
      name: name.to_string(),
      email,
    })
  }
}

/// Identity lookup used to attribute packages to maintainers.
///
/// Implementors receive lowercased input.
#[async_trait]
pub trait OwnerFinder: Send + Sync {
  /// Match a user by username or real name, and by email when one is given.
  async fn from_users(&self, name: &str, email: Option<&str>) -> Result<Option<i64>>;

  /// Match a user through one of their aliases.
  async fn from_aliases(&self, alias: &str) -> Result<Option<i64>>;

  /// Resolve an owner from the packager string, falling back to the uploader.
  async fn find(&self, packager: Option<&str>, uploader: Option<&str>) -> Result<Option<i64>> {
    if let Some(packager) = packager.and_then(Packager::parse) {
      if let Some(id) = self.from_users(&packager.name, packager.email.as_deref()).await? {
        return Ok(Some(id));
      }
      if let Some(id) = self.from_aliases(&packager.name).await? {
        return Ok(Some(id));
      }
    }

    if let Some(uploader) = uploader.map(|u| u.trim().to_lowercase())
      && !uploader.is_empty()
    {
      if let Some(id) = self.from_users(&uploader, None).await? {
        return Ok(Some(id));
      }
      return self.from_aliases(&uploader).await;
    }

    Ok(None)
  }
}

/// Matches packages against a single known user (for adopting orphans).
#[derive(Debug, Clone)]
pub struct UserMatcher {
  uid: i64,
  username: Option<String>,
  realname: Option<String>,
  email: Option<String>,
  aliases: HashSet<String>,
}

impl UserMatcher {
  pub fn new(
    uid: i64,
    username: Option<&str>,
    realname: Option<&str>,
    email: Option<&str>,
    aliases: impl IntoIterator<Item = String>,
  ) -> Self {
    Self {
      uid,
      username: username.map(str::to_lowercase),
      realname: realname.map(str::to_lowercase),
      email: email.map(str::to_lowercase),
      aliases: aliases.into_iter().map(|a| a.to_lowercase()).collect(),
    }
  }
}

#[async_trait]
impl OwnerFinder for UserMatcher {
  async fn from_users(&self, name: &str, email: Option<&str>) -> Result<Option<i64>> {
    if self.username.as_deref() == Some(name) || self.realname.as_deref() == Some(name) {
      return Ok(Some(self.uid));
    }
    if email.is_some() && email == self.email.as_deref() {
      return Ok(Some(self.uid));
    }
    Ok(None)
  }

  async fn from_aliases(&self, alias: &str) -> Result<Option<i64>> {
    Ok(self.aliases.contains(alias).then_some(self.uid))
  }
}

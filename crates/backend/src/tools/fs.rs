//! File ownership and timestamps.

use std::{ffi::CStr, os::unix::fs::MetadataExt, path::Path};

use chrono::{DateTime, Utc};

/// Name of the OS user owning `path`; falls back to the numeric uid.
pub async fn file_owner(path: &Path) -> std::io::Result<String> {
  let uid = tokio::fs::metadata(path).await?.uid();
  // getpwuid_r may read /etc/passwd or ask NSS
  let name = tokio::task::spawn_blocking(move || username_for_uid(uid))
    .await
    .ok()
    .flatten();
  Ok(name.unwrap_or_else(|| uid.to_string()))
}

fn username_for_uid(uid: u32) -> Option<String> {
  let mut buf = vec![0 as libc::c_char; 4096];
  let mut pwd: libc::passwd = unsafe { std::mem::zeroed() };
  let mut result: *mut libc::passwd = std::ptr::null_mut();

  let rc = unsafe { libc::getpwuid_r(uid, &mut pwd, buf.as_mut_ptr(), buf.len(), &mut result) };
  if rc != 0 || result.is_null() || pwd.pw_name.is_null() {
    return None;
  }

  let name = unsafe { CStr::from_ptr(pwd.pw_name) };
  Some(name.to_string_lossy().into_owned())
}

/// Modification time of `path` as unix seconds
pub async fn modified_unix(path: &Path) -> std::io::Result<i64> {
  let modified = tokio::fs::metadata(path).await?.modified()?;
  Ok(DateTime::<Utc>::from(modified).timestamp())
}

/// Current time as unix seconds
pub fn now_unix() -> i64 {
  Utc::now().timestamp()
}

//! Loose, component-wise version ordering.
//!
//! A version string is split into runs of digits and runs of other characters;
//! `.` only separates. Numeric runs compare by value, other runs compare
//! lexically, a number sorts before text, and a strict prefix sorts first.
//! This is deliberately looser than pacman's `vercmp`: it never fails to parse.

use std::{cmp::Ordering, fmt};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Component {
  /// Digits with leading zeros stripped, compared by length then lexically
  Number(String),
  Text(String),
}

impl Ord for Component {
  fn cmp(&self, other: &Self) -> Ordering {
    match (self, other) {
      (Component::Number(a), Component::Number(b)) => a.len().cmp(&b.len()).then_with(|| a.cmp(b)),
      (Component::Number(_), Component::Text(_)) => Ordering::Less,
      (Component::Text(_), Component::Number(_)) => Ordering::Greater,
      (Component::Text(a), Component::Text(b)) => a.cmp(b),
    }
  }
}

impl PartialOrd for Component {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

/// A parsed version usable as an ordering key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LooseVersion {
  raw: String,
  components: Vec<Component>,
}

impl LooseVersion {
  pub fn parse(raw: &str) -> Self {
    let mut components = Vec::new();
    let mut chars = raw.chars().peekable();

    while let Some(&c) = chars.peek() {
      if c == '.' {
        chars.next();
        continue;
      }

      let mut run = String::new();
      if c.is_ascii_digit() {
        while let Some(&d) = chars.peek()
          && d.is_ascii_digit()
        {
          run.push(d);
          chars.next();
        }
        let trimmed = run.trim_start_matches('0');
        components.push(Component::Number(if trimmed.is_empty() { "0" } else { trimmed }.to_string()));
      } else if c.is_alphabetic() {
        while let Some(&a) = chars.peek()
          && a.is_alphabetic()
        {
          run.push(a);
          chars.next();
        }
        components.push(Component::Text(run));
      } else {
        // punctuation such as '-', ':' or '+' is kept as its own component
        while let Some(&p) = chars.peek()
          && !p.is_ascii_digit()
          && !p.is_alphabetic()
          && p != '.'
        {
          run.push(p);
          chars.next();
        }
        components.push(Component::Text(run));
      }
    }

    Self {
      raw: raw.to_string(),
      components,
    }
  }

  pub fn as_str(&self) -> &str {
    &self.raw
  }
}

impl Ord for LooseVersion {
  fn cmp(&self, other: &Self) -> Ordering {
    self.components.cmp(&other.components)
  }
}

impl PartialOrd for LooseVersion {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

impl fmt::Display for LooseVersion {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.raw)
  }
}

/// Compare two version strings
pub fn compare(a: &str, b: &str) -> Ordering {
  LooseVersion::parse(a).cmp(&LooseVersion::parse(b))
}

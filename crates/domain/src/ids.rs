//! Thread identifiers.
//!
//! A root thread id looks like `lace_20250101_ab12cd`: a fixed prefix, a
//! UTC date stamp, and six lowercase alphanumeric characters. A child
//! thread created by delegation embeds its lineage by appending `.N`
//! (`N >= 1`) to its parent's id, to arbitrary depth, so a child's relation
//! to its ancestors is recoverable from the id alone without a side table.

use chrono::{NaiveDate, Utc};
use std::fmt;

use crate::error::{LaceError, Result};

/// A thread identifier, stored as an owned string but validated on
/// construction so that downstream code can rely on its shape.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct ThreadId(String);

impl ThreadId {
    /// Generate a fresh root thread id for the given date, with a random
    /// six-character suffix.
    pub fn generate(date: NaiveDate) -> Self {
        let suffix = random_suffix(6);
        ThreadId(format!("lace_{}_{}", date.format("%Y%m%d"), suffix))
    }

    /// Generate a root thread id stamped with today's UTC date.
    pub fn generate_today() -> Self {
        Self::generate(Utc::now().date_naive())
    }

    /// Parse and validate an externally supplied thread id.
    pub fn parse(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        if !is_well_formed(&raw) {
            return Err(LaceError::Validation(format!(
                "malformed thread id: {raw:?}"
            )));
        }
        Ok(ThreadId(raw))
    }

    /// Construct without validation. Used internally once a value is
    /// already known to be well-formed (e.g. a freshly minted child id).
    fn from_validated(raw: String) -> Self {
        debug_assert!(is_well_formed(&raw), "invalid thread id: {raw}");
        ThreadId(raw)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The root ancestor's id (strips all `.N` suffixes).
    pub fn root(&self) -> &str {
        self.0.split('.').next().unwrap_or(&self.0)
    }

    /// Lineage depth: 0 for a root thread, 1 for `root.N`, 2 for
    /// `root.N.M`, and so on.
    pub fn depth(&self) -> usize {
        self.0.matches('.').count()
    }

    /// Mint a child id with the given sequential index.
    pub fn child(&self, n: u32) -> Self {
        assert!(n >= 1, "child index must be >= 1");
        Self::from_validated(format!("{}.{}", self.0, n))
    }

    /// `true` if `other` is this thread or a descendant of it.
    pub fn is_ancestor_of(&self, other: &ThreadId) -> bool {
        other.0 == self.0 || other.0.starts_with(&format!("{}.", self.0))
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ThreadId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn is_well_formed(raw: &str) -> bool {
    let mut parts = raw.split('.');
    let root = match parts.next() {
        Some(r) => r,
        None => return false,
    };
    if !is_well_formed_root(root) {
        return false;
    }
    for part in parts {
        if part.is_empty() || !part.chars().all(|c| c.is_ascii_digit()) {
            return false;
        }
        if part.starts_with('0') && part.len() > 1 {
            return false;
        }
        if part == "0" {
            return false;
        }
    }
    true
}

fn is_well_formed_root(root: &str) -> bool {
    let Some(rest) = root.strip_prefix("lace_") else {
        return false;
    };
    let Some((date, suffix)) = rest.split_once('_') else {
        return false;
    };
    date.len() == 8
        && date.chars().all(|c| c.is_ascii_digit())
        && suffix.len() == 6
        && suffix.chars().all(|c| c.is_ascii_alphanumeric() && (c.is_ascii_lowercase() || c.is_ascii_digit()))
}

/// Random lowercase-alphanumeric suffix, drawn from a fresh UUIDv4's bytes
/// so it rides on the same `uuid` dependency the event log already uses for
/// event ids, rather than hand-rolling a PRNG.
fn random_suffix(len: usize) -> String {
    const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let bytes = uuid::Uuid::new_v4().into_bytes();
    (0..len)
        .map(|i| ALPHABET[(bytes[i % bytes.len()] as usize) % ALPHABET.len()] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_produces_well_formed_id() {
        let id = ThreadId::generate_today();
        assert!(is_well_formed(id.as_str()));
        assert_eq!(id.depth(), 0);
    }

    #[test]
    fn generate_is_unique_across_calls() {
        let a = ThreadId::generate_today();
        let b = ThreadId::generate_today();
        assert_ne!(a, b);
    }

    #[test]
    fn parse_accepts_root_id() {
        let id = ThreadId::parse("lace_20250101_aaaaaa").unwrap();
        assert_eq!(id.as_str(), "lace_20250101_aaaaaa");
        assert_eq!(id.root(), "lace_20250101_aaaaaa");
    }

    #[test]
    fn parse_accepts_nested_child_id() {
        let id = ThreadId::parse("lace_20250101_aaaaaa.1.2").unwrap();
        assert_eq!(id.depth(), 2);
        assert_eq!(id.root(), "lace_20250101_aaaaaa");
    }

    #[test]
    fn parse_rejects_malformed_id() {
        assert!(ThreadId::parse("not-a-thread-id").is_err());
        assert!(ThreadId::parse("lace_2025_aaaaaa").is_err());
        assert!(ThreadId::parse("lace_20250101_aaaaaa.0").is_err());
        assert!(ThreadId::parse("lace_20250101_aaaaaa.01").is_err());
    }

    #[test]
    fn child_mints_expected_lineage() {
        let root = ThreadId::parse("lace_20250101_aaaaaa").unwrap();
        let child = root.child(1);
        assert_eq!(child.as_str(), "lace_20250101_aaaaaa.1");
        let grandchild = child.child(2);
        assert_eq!(grandchild.as_str(), "lace_20250101_aaaaaa.1.2");
        assert_eq!(grandchild.depth(), 2);
    }

    #[test]
    fn is_ancestor_of_covers_self_and_descendants() {
        let root = ThreadId::parse("lace_20250101_aaaaaa").unwrap();
        let child = root.child(1);
        let unrelated = ThreadId::parse("lace_20250101_bbbbbb").unwrap();
        assert!(root.is_ancestor_of(&root));
        assert!(root.is_ancestor_of(&child));
        assert!(!root.is_ancestor_of(&unrelated));
    }
}

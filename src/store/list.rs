//! Persisted config list and the freshness-first merge

use crate::store::write_atomic;
use crate::Result;
use anyhow::Context;
use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Merge freshly validated links in front of the prior list.
///
/// Fresh links keep their discovery order; prior links follow in their
/// original order, minus any already present among the fresh ones. The
/// result never holds the same string twice.
pub fn merge_fresh_first<S: AsRef<str>>(fresh: &[S], prior: &[String]) -> Vec<String> {
    let mut seen: HashSet<&str> = HashSet::with_capacity(fresh.len() + prior.len());
    let mut merged = Vec::with_capacity(fresh.len() + prior.len());

    for link in fresh.iter().map(AsRef::as_ref).chain(prior.iter().map(String::as_str)) {
        if seen.insert(link) {
            merged.push(link.to_string());
        }
    }

    merged
}

/// One-link-per-line list file
#[derive(Debug, Clone)]
pub struct ListStore {
    path: PathBuf,
}

impl ListStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the list; a missing file is an empty list.
    ///
    /// Lines are trimmed, blanks dropped, and repeated lines keep their
    /// first position only.
    pub fn load(&self) -> Result<Vec<String>> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", self.path.display()))
            }
        };
        let content = String::from_utf8_lossy(&bytes);

        let mut seen = HashSet::new();
        Ok(content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .filter(|line| seen.insert(line.to_string()))
            .map(str::to_string)
            .collect())
    }

    /// Replace the list file with `links`, each newline-terminated
    pub fn save<S: AsRef<str>>(&self, links: &[S]) -> Result<()> {
        let content: String = links
            .iter()
            .map(|link| format!("{}\n", link.as_ref()))
            .collect();
        write_atomic(&self.path, content.as_bytes())
    }
}

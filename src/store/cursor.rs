//! Cursor file holding the highest fully processed message id

use crate::store::write_atomic;
use crate::Result;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Reads and writes the ingestion cursor
#[derive(Debug, Clone)]
pub struct CursorStore {
    path: PathBuf,
}

impl CursorStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the cursor, treating a missing or unreadable file as 0
    pub fn load(&self) -> u64 {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => match content.trim().parse() {
                Ok(cursor) => cursor,
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "corrupt cursor file, starting from 0");
                    0
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => 0,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "unreadable cursor file, starting from 0");
                0
            }
        }
    }

    /// Persist the cursor as a decimal integer
    pub fn save(&self, cursor: u64) -> Result<()> {
        write_atomic(&self.path, cursor.to_string().as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_cursor_is_zero() {
        let dir = TempDir::new().unwrap();
        let store = CursorStore::new(dir.path().join("state/last_id.txt"));
        assert_eq!(store.load(), 0);
    }

    #[test]
    fn test_corrupt_cursor_is_zero() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("last_id.txt");
        std::fs::write(&path, "not a number").unwrap();
        assert_eq!(CursorStore::new(&path).load(), 0);

        std::fs::write(&path, "-5").unwrap();
        assert_eq!(CursorStore::new(&path).load(), 0);
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let store = CursorStore::new(dir.path().join("state/last_id.txt"));
        store.save(4242).unwrap();
        assert_eq!(std::fs::read_to_string(store.path()).unwrap(), "4242");
        assert_eq!(store.load(), 4242);
    }

    #[test]
    fn test_load_trims_whitespace() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("last_id.txt");
        std::fs::write(&path, " 17\n").unwrap();
        assert_eq!(CursorStore::new(&path).load(), 17);
    }
}

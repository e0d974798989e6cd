//! I/O boundary traits for testability
//!
//! These traits abstract external I/O operations, allowing services
//! to be tested with in-memory implementations.

use std::io;
use std::path::Path;

/// Insertion-ordered mapping exchanged with a [`Codec`].
pub type PrefMap = serde_json::Map<String, serde_json::Value>;

/// Filesystem abstraction for testability.
pub trait FileSystem: Send + Sync {
    /// Read file contents as bytes.
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Replace the file with `content`, going through a sibling temp file.
    fn write(&self, path: &Path, content: &[u8]) -> io::Result<()>;

    /// Create directory and all parent directories.
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Create parent directories if needed.
    fn ensure_parent(&self, path: &Path) -> io::Result<()>;
}

/// Map ⇄ byte stream conversion for one serialization format.
pub trait Codec: Send + Sync {
    /// Short format name (`json`).
    fn name(&self) -> &'static str;

    /// File extension including the dot (`.json`).
    fn extension(&self) -> &'static str;

    /// Empty or whitespace-only input decodes to an empty map.
    fn decode(&self, bytes: &[u8]) -> io::Result<PrefMap>;

    fn encode(&self, map: &PrefMap) -> io::Result<Vec<u8>>;
}

// ============================================================
// REAL IMPLEMENTATIONS
// ============================================================

/// Real filesystem implementation.
#[derive(Debug, Default)]
pub struct RealFileSystem;

impl FileSystem for RealFileSystem {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }

    fn write(&self, path: &Path, content: &[u8]) -> io::Result<()> {
        self.ensure_parent(path)?;
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, path)
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        std::fs::create_dir_all(path)
    }

    fn ensure_parent(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                self.create_dir_all(parent)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn given_missing_parent_when_writing_then_creates_it() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a/b/prefs.json");
        let fs = RealFileSystem;

        fs.write(&path, b"{}").unwrap();

        assert_eq!(fs.read(&path).unwrap(), b"{}");
        assert!(!dir.path().join("a/b/prefs.json.tmp").exists());
    }

    #[test]
    fn given_missing_file_when_reading_then_not_found() {
        let dir = TempDir::new().unwrap();
        let err = RealFileSystem.read(&dir.path().join("nope")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}

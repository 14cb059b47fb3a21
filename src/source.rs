//! Where file bytes come from.
//!
//! The engine itself never touches the filesystem; callers hand it a
//! [`ByteSource`]. [`FsSource`] is the real one, [`MemorySource`] serves
//! synthetic files in tests and embedded use.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::EtcdcfgError;

pub trait ByteSource {
    /// Read the whole file. Missing files are [`EtcdcfgError::NotFound`].
    fn read(&self, path: &Path) -> Result<Vec<u8>, EtcdcfgError>;
}

/// Reads from the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsSource;

impl ByteSource for FsSource {
    fn read(&self, path: &Path) -> Result<Vec<u8>, EtcdcfgError> {
        match std::fs::read(path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(EtcdcfgError::NotFound {
                path: path.to_path_buf(),
            }),
            Err(e) => Err(EtcdcfgError::IoError {
                path: path.to_path_buf(),
                source: e,
            }),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    files: HashMap<PathBuf, Vec<u8>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: impl Into<PathBuf>, content: impl Into<Vec<u8>>) -> Self {
        self.files.insert(path.into(), content.into());
        self
    }
}

impl ByteSource for MemorySource {
    fn read(&self, path: &Path) -> Result<Vec<u8>, EtcdcfgError> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| EtcdcfgError::NotFound {
                path: path.to_path_buf(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fs_source_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.txt");
        std::fs::write(&path, "/a\n1\n").unwrap();
        assert_eq!(FsSource.read(&path).unwrap(), b"/a\n1\n");
    }

    #[test]
    fn fs_source_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.json");
        match FsSource.read(&path).unwrap_err() {
            EtcdcfgError::NotFound { path: p } => assert_eq!(p, path),
            other => panic!("Expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn memory_source_serves_registered_files() {
        let src = MemorySource::new().with_file("/cfg/a.json", "{}");
        assert_eq!(src.read(Path::new("/cfg/a.json")).unwrap(), b"{}");
        assert!(matches!(
            src.read(Path::new("/cfg/b.json")),
            Err(EtcdcfgError::NotFound { .. })
        ));
    }
}

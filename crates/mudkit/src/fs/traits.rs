//! Filesystem trait definitions

use async_trait::async_trait;
use std::path::Path;
use std::time::SystemTime;

use crate::error::Result;

/// Async filesystem trait.
///
/// Paths are absolute within the filesystem itself: a filesystem mounted at
/// `/realms` sees `/realms/forest/oak.c` as `/forest/oak.c`.
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Read a file's contents.
    async fn read_file(&self, path: &Path) -> Result<Vec<u8>>;

    /// Write contents to a file, replacing it.
    async fn write_file(&self, path: &Path, content: &[u8]) -> Result<()>;

    /// Append contents to a file, creating it if missing.
    async fn append_file(&self, path: &Path, content: &[u8]) -> Result<()>;

    /// Create a directory.
    async fn mkdir(&self, path: &Path, recursive: bool) -> Result<()>;

    /// Remove a file or directory.
    async fn remove(&self, path: &Path, recursive: bool) -> Result<()>;

    async fn stat(&self, path: &Path) -> Result<Metadata>;

    async fn read_dir(&self, path: &Path) -> Result<Vec<DirEntry>>;

    async fn exists(&self, path: &Path) -> Result<bool>;
}

/// File metadata.
#[derive(Debug, Clone)]
pub struct Metadata {
    pub file_type: FileType,
    /// Size in bytes
    pub size: u64,
    pub modified: SystemTime,
    pub created: SystemTime,
}

impl Metadata {
    pub fn file(size: u64) -> Self {
        let now = SystemTime::now();
        Self {
            file_type: FileType::File,
            size,
            modified: now,
            created: now,
        }
    }

    pub fn directory() -> Self {
        Self {
            file_type: FileType::Directory,
            ..Self::file(0)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    File,
    Directory,
}

impl FileType {
    pub fn is_file(&self) -> bool {
        matches!(self, FileType::File)
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, FileType::Directory)
    }
}

/// Directory entry.
#[derive(Debug, Clone)]
pub struct DirEntry {
    /// Entry name (not full path)
    pub name: String,
    pub metadata: Metadata,
}

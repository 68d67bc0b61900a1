//! Host directory filesystem
//!
//! Exposes a directory on the host as a [`FileSystem`]. Every path is joined
//! onto the root after lexical normalization, so `..` can never climb out.

use async_trait::async_trait;
use std::io::{Error as IoError, ErrorKind};
use std::path::{Component, Path, PathBuf};
use tokio::fs;

use super::traits::{DirEntry, FileSystem, FileType, Metadata};
use crate::error::Result;

#[derive(Debug, Clone)]
pub struct DiskFs {
    root: PathBuf,
    read_only: bool,
}

impl DiskFs {
    /// Create a filesystem rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            read_only: false,
        }
    }

    /// Create a filesystem that refuses every write.
    pub fn read_only(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            read_only: true,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        let mut full = self.root.clone();
        let mut depth = 0usize;
        for component in path.components() {
            match component {
                Component::Normal(name) => {
                    full.push(name);
                    depth += 1;
                }
                Component::ParentDir if depth > 0 => {
                    full.pop();
                    depth -= 1;
                }
                _ => {}
            }
        }
        full
    }

    fn check_writable(&self) -> Result<()> {
        if self.read_only {
            Err(IoError::new(ErrorKind::PermissionDenied, "filesystem is read-only").into())
        } else {
            Ok(())
        }
    }
}

fn convert_metadata(meta: &std::fs::Metadata) -> Metadata {
    let file_type = if meta.is_dir() {
        FileType::Directory
    } else {
        FileType::File
    };
    let modified = meta.modified().unwrap_or(std::time::UNIX_EPOCH);
    Metadata {
        file_type,
        size: meta.len(),
        modified,
        created: meta.created().unwrap_or(modified),
    }
}

#[async_trait]
impl FileSystem for DiskFs {
    async fn read_file(&self, path: &Path) -> Result<Vec<u8>> {
        Ok(fs::read(self.resolve(path)).await?)
    }

    async fn write_file(&self, path: &Path, content: &[u8]) -> Result<()> {
        self.check_writable()?;
        Ok(fs::write(self.resolve(path), content).await?)
    }

    async fn append_file(&self, path: &Path, content: &[u8]) -> Result<()> {
        use tokio::io::AsyncWriteExt;

        self.check_writable()?;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.resolve(path))
            .await?;
        file.write_all(content).await?;
        file.flush().await?;
        Ok(())
    }

    async fn mkdir(&self, path: &Path, recursive: bool) -> Result<()> {
        self.check_writable()?;
        let full = self.resolve(path);
        if recursive {
            fs::create_dir_all(full).await?;
        } else {
            fs::create_dir(full).await?;
        }
        Ok(())
    }

    async fn remove(&self, path: &Path, recursive: bool) -> Result<()> {
        self.check_writable()?;
        let full = self.resolve(path);
        if full == self.root {
            return Err(IoError::new(ErrorKind::PermissionDenied, "cannot remove root").into());
        }
        let meta = fs::metadata(&full).await?;
        if meta.is_dir() {
            if recursive {
                fs::remove_dir_all(full).await?;
            } else {
                fs::remove_dir(full).await?;
            }
        } else {
            fs::remove_file(full).await?;
        }
        Ok(())
    }

    async fn stat(&self, path: &Path) -> Result<Metadata> {
        let meta = fs::metadata(self.resolve(path)).await?;
        Ok(convert_metadata(&meta))
    }

    async fn read_dir(&self, path: &Path) -> Result<Vec<DirEntry>> {
        let mut dir = fs::read_dir(self.resolve(path)).await?;
        let mut entries = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            let meta = entry.metadata().await?;
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                metadata: convert_metadata(&meta),
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        Ok(fs::try_exists(self.resolve(path)).await?)
    }
}

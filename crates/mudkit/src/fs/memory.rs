//! In-memory filesystem implementation

use async_trait::async_trait;
use std::collections::HashMap;
use std::io::{Error as IoError, ErrorKind};
use std::path::{Component, Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use std::time::SystemTime;

use super::traits::{DirEntry, FileSystem, FileType, Metadata};
use crate::error::Result;

/// In-memory filesystem.
///
/// Backs tests, scratch mounts and ACL shadow trees that do not need to
/// survive a restart.
pub struct InMemoryFs {
    entries: RwLock<HashMap<PathBuf, FsEntry>>,
}

#[derive(Debug, Clone)]
enum FsEntry {
    File { content: Vec<u8>, metadata: Metadata },
    Directory { metadata: Metadata },
}

impl FsEntry {
    fn metadata(&self) -> &Metadata {
        match self {
            FsEntry::File { metadata, .. } | FsEntry::Directory { metadata } => metadata,
        }
    }
}

impl Default for InMemoryFs {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryFs {
    /// Create an empty filesystem holding only `/`.
    pub fn new() -> Self {
        let mut entries = HashMap::new();
        entries.insert(
            PathBuf::from("/"),
            FsEntry::Directory {
                metadata: Metadata::directory(),
            },
        );
        Self {
            entries: RwLock::new(entries),
        }
    }

    fn normalize_path(path: &Path) -> PathBuf {
        let mut result = PathBuf::from("/");
        for component in path.components() {
            match component {
                Component::Normal(name) => result.push(name),
                Component::ParentDir => {
                    result.pop();
                }
                Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
            }
        }
        result
    }

    fn not_found(path: &Path) -> IoError {
        IoError::new(ErrorKind::NotFound, format!("{}: not found", path.display()))
    }
}

#[async_trait]
impl FileSystem for InMemoryFs {
    async fn read_file(&self, path: &Path) -> Result<Vec<u8>> {
        let path = Self::normalize_path(path);
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);

        match entries.get(&path) {
            Some(FsEntry::File { content, .. }) => Ok(content.clone()),
            Some(FsEntry::Directory { .. }) => Err(IoError::other("is a directory").into()),
            None => Err(Self::not_found(&path).into()),
        }
    }

    async fn write_file(&self, path: &Path, content: &[u8]) -> Result<()> {
        let path = Self::normalize_path(path);
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);

        if let Some(parent) = path.parent() {
            if !matches!(entries.get(parent), Some(FsEntry::Directory { .. })) {
                return Err(IoError::new(ErrorKind::NotFound, "parent directory not found").into());
            }
        }
        if matches!(entries.get(&path), Some(FsEntry::Directory { .. })) {
            return Err(IoError::other("is a directory").into());
        }

        let created = entries
            .get(&path)
            .map(|e| e.metadata().created)
            .unwrap_or_else(SystemTime::now);
        let mut metadata = Metadata::file(content.len() as u64);
        metadata.created = created;
        entries.insert(
            path,
            FsEntry::File {
                content: content.to_vec(),
                metadata,
            },
        );
        Ok(())
    }

    async fn append_file(&self, path: &Path, content: &[u8]) -> Result<()> {
        let path = Self::normalize_path(path);

        // Release the lock before falling back to write_file
        {
            let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
            match entries.get_mut(&path) {
                Some(FsEntry::File {
                    content: existing,
                    metadata,
                }) => {
                    existing.extend_from_slice(content);
                    metadata.size = existing.len() as u64;
                    metadata.modified = SystemTime::now();
                    return Ok(());
                }
                Some(FsEntry::Directory { .. }) => {
                    return Err(IoError::other("is a directory").into());
                }
                None => {}
            }
        }
        self.write_file(&path, content).await
    }

    async fn mkdir(&self, path: &Path, recursive: bool) -> Result<()> {
        let path = Self::normalize_path(path);
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);

        if recursive {
            let mut current = PathBuf::from("/");
            for component in path.components().skip(1) {
                current.push(component);
                match entries.get(&current) {
                    Some(FsEntry::Directory { .. }) => {}
                    Some(FsEntry::File { .. }) => {
                        return Err(IoError::other("not a directory").into());
                    }
                    None => {
                        entries.insert(
                            current.clone(),
                            FsEntry::Directory {
                                metadata: Metadata::directory(),
                            },
                        );
                    }
                }
            }
            return Ok(());
        }

        if let Some(parent) = path.parent() {
            if !matches!(entries.get(parent), Some(FsEntry::Directory { .. })) {
                return Err(IoError::new(ErrorKind::NotFound, "parent directory not found").into());
            }
        }
        if entries.contains_key(&path) {
            return Err(IoError::new(ErrorKind::AlreadyExists, "directory exists").into());
        }
        entries.insert(
            path,
            FsEntry::Directory {
                metadata: Metadata::directory(),
            },
        );
        Ok(())
    }

    async fn remove(&self, path: &Path, recursive: bool) -> Result<()> {
        let path = Self::normalize_path(path);
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);

        match entries.get(&path) {
            Some(FsEntry::Directory { .. }) => {
                let children: Vec<PathBuf> = entries
                    .keys()
                    .filter(|p| *p != &path && p.starts_with(&path))
                    .cloned()
                    .collect();
                if !children.is_empty() && !recursive {
                    return Err(IoError::other("directory not empty").into());
                }
                for child in children {
                    entries.remove(&child);
                }
                entries.remove(&path);
            }
            Some(FsEntry::File { .. }) => {
                entries.remove(&path);
            }
            None => return Err(Self::not_found(&path).into()),
        }
        Ok(())
    }

    async fn stat(&self, path: &Path) -> Result<Metadata> {
        let path = Self::normalize_path(path);
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(&path)
            .map(|e| e.metadata().clone())
            .ok_or_else(|| Self::not_found(&path).into())
    }

    async fn read_dir(&self, path: &Path) -> Result<Vec<DirEntry>> {
        let path = Self::normalize_path(path);
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);

        match entries.get(&path) {
            Some(FsEntry::Directory { .. }) => {
                let mut result: Vec<DirEntry> = entries
                    .iter()
                    .filter(|(p, _)| p.parent() == Some(path.as_path()))
                    .map(|(p, entry)| DirEntry {
                        name: p
                            .file_name()
                            .map(|n| n.to_string_lossy().to_string())
                            .unwrap_or_default(),
                        metadata: entry.metadata().clone(),
                    })
                    .collect();
                result.sort_by(|a, b| a.name.cmp(&b.name));
                Ok(result)
            }
            Some(FsEntry::File { .. }) => Err(IoError::other("not a directory").into()),
            None => Err(Self::not_found(&path).into()),
        }
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        let path = Self::normalize_path(path);
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.contains_key(&path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[tokio::test]
    async fn test_write_and_read_file() {
        let fs = InMemoryFs::new();
        fs.mkdir(Path::new("/realms"), false).await.unwrap();
        fs.write_file(Path::new("/realms/oak.c"), b"inherit tree;")
            .await
            .unwrap();

        let content = fs.read_file(Path::new("/realms/oak.c")).await.unwrap();
        assert_eq!(content, b"inherit tree;");
    }

    #[tokio::test]
    async fn test_write_needs_parent() {
        let fs = InMemoryFs::new();
        let err = fs.write_file(Path::new("/nope/file"), b"x").await.unwrap_err();
        assert!(matches!(err, Error::Io(ref e) if e.kind() == ErrorKind::NotFound));
    }

    #[tokio::test]
    async fn test_append_creates_and_extends() {
        let fs = InMemoryFs::new();
        fs.append_file(Path::new("/log"), b"a").await.unwrap();
        fs.append_file(Path::new("/log"), b"b").await.unwrap();
        assert_eq!(fs.read_file(Path::new("/log")).await.unwrap(), b"ab");
        assert_eq!(fs.stat(Path::new("/log")).await.unwrap().size, 2);
    }

    #[tokio::test]
    async fn test_mkdir_and_read_dir_sorted() {
        let fs = InMemoryFs::new();
        fs.mkdir(Path::new("/a/b"), true).await.unwrap();
        fs.write_file(Path::new("/a/z.txt"), b"").await.unwrap();
        fs.write_file(Path::new("/a/m.txt"), b"").await.unwrap();

        let names: Vec<String> = fs
            .read_dir(Path::new("/a"))
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["b", "m.txt", "z.txt"]);
    }

    #[tokio::test]
    async fn test_remove_directory() {
        let fs = InMemoryFs::new();
        fs.mkdir(Path::new("/a/b"), true).await.unwrap();
        assert!(fs.remove(Path::new("/a"), false).await.is_err());
        fs.remove(Path::new("/a"), true).await.unwrap();
        assert!(!fs.exists(Path::new("/a/b")).await.unwrap());
        assert!(fs.exists(Path::new("/")).await.unwrap());
    }
}

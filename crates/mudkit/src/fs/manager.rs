//! Mount table and access-checked file operations
//!
//! [`FileManager`] is the single entry point game code uses to touch files.
//! Each operation names the acting identity and a virtual path; the manager
//! finds the mount with the longest matching prefix, asks that mount's
//! [`SecurityManager`] for permission and only then calls the mount's
//! [`FileSystem`]. A refusal comes back as [`Access::Denied`] and never
//! reaches the filesystem.
//!
//! # Example
//!
//! ```rust
//! use mudkit::fs::{FileManager, InMemoryFs, PermissiveSecurityManager};
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> mudkit::Result<()> {
//! let manager = FileManager::new()?;
//! manager.mount("/", Arc::new(InMemoryFs::new()), Arc::new(PermissiveSecurityManager::new()))?;
//!
//! manager.write_file("merlin", "/motd", b"Welcome!").await?.into_result()?;
//! let text = manager.read_file("merlin", "/motd").await?.into_result()?;
//! assert_eq!(text, b"Welcome!");
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::memory::InMemoryFs;
use super::security::{AclSecurityManager, FileAction, PermissiveSecurityManager, SecurityManager};
use super::traits::{DirEntry, FileSystem, Metadata};
use crate::acl::AclEngine;
use crate::error::{Error, Result};
use crate::paths;

/// Set while a [`FileManager`] is alive.
static INSTANCE: AtomicBool = AtomicBool::new(false);

/// Everything needed to carry out one operation on one mount.
#[derive(Clone)]
pub struct FileSystemRequest {
    /// Path inside the mount, always absolute (`/` is the mount root)
    pub relative_path: String,
    /// Normalized virtual path
    pub full_path: String,
    pub file_system: Arc<dyn FileSystem>,
    pub security_manager: Arc<dyn SecurityManager>,
}

impl fmt::Debug for FileSystemRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileSystemRequest")
            .field("relative_path", &self.relative_path)
            .field("full_path", &self.full_path)
            .finish_non_exhaustive()
    }
}

/// A refused operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Denied {
    pub action: FileAction,
    pub path: String,
}

/// Outcome of an access-checked operation.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub enum Access<T> {
    Granted(T),
    Denied(Denied),
}

impl<T> Access<T> {
    pub fn is_granted(&self) -> bool {
        matches!(self, Access::Granted(_))
    }

    pub fn is_denied(&self) -> bool {
        !self.is_granted()
    }

    /// The value, if access was granted.
    pub fn granted(self) -> Option<T> {
        match self {
            Access::Granted(value) => Some(value),
            Access::Denied(_) => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Access<U> {
        match self {
            Access::Granted(value) => Access::Granted(f(value)),
            Access::Denied(denied) => Access::Denied(denied),
        }
    }

    /// Turn a denial into [`Error::PermissionDenied`].
    pub fn into_result(self) -> Result<T> {
        match self {
            Access::Granted(value) => Ok(value),
            Access::Denied(denied) => Err(Error::PermissionDenied {
                action: denied.action.to_string(),
                path: denied.path,
            }),
        }
    }
}

/// One mount as written in configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MountSpec {
    /// Registered filesystem name, such as `"memory"` or `"disk"`
    #[serde(rename = "type")]
    pub fs_type: String,
    #[serde(default)]
    pub options: serde_json::Value,
    /// Registered security manager name. Default: `"acl"`
    #[serde(default = "default_security_manager")]
    pub security_manager: String,
    #[serde(default)]
    pub security_manager_options: serde_json::Value,
}

fn default_security_manager() -> String {
    "acl".to_string()
}

/// Mount path to mount specification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MountConfig {
    pub mounts: BTreeMap<String, MountSpec>,
}

impl MountConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

pub type FileSystemFactory = Arc<dyn Fn(&serde_json::Value) -> Result<Arc<dyn FileSystem>> + Send + Sync>;
pub type SecurityManagerFactory =
    Arc<dyn Fn(&serde_json::Value) -> Result<Arc<dyn SecurityManager>> + Send + Sync>;

/// Named factories that turn a [`MountSpec`] into live objects.
#[derive(Clone, Default)]
pub struct FileSystemRegistry {
    file_systems: BTreeMap<String, FileSystemFactory>,
    security_managers: BTreeMap<String, SecurityManagerFactory>,
}

impl FileSystemRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in factories.
    ///
    /// Filesystems: `memory`; `disk` (option `root`, optional `readOnly`).
    /// Security managers: `permissive` (optional `readOnly`); `acl`
    /// (optional `shadowRoot`, and `shadowDir` to keep shadow files on disk
    /// instead of in memory).
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.file_systems.insert(
            "memory".to_string(),
            Arc::new(|_: &serde_json::Value| Ok(Arc::new(InMemoryFs::new()) as Arc<dyn FileSystem>)),
        );

        #[cfg(not(target_arch = "wasm32"))]
        registry.file_systems.insert(
            "disk".to_string(),
            Arc::new(|options: &serde_json::Value| {
                let root = options
                    .get("root")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| Error::Config("disk mount needs a \"root\" option".to_string()))?;
                let fs = if bool_option(options, "readOnly") {
                    super::DiskFs::read_only(root)
                } else {
                    super::DiskFs::new(root)
                };
                Ok(Arc::new(fs) as Arc<dyn FileSystem>)
            }),
        );

        registry.security_managers.insert(
            "permissive".to_string(),
            Arc::new(|options: &serde_json::Value| {
                let manager = if bool_option(options, "readOnly") {
                    PermissiveSecurityManager::read_only()
                } else {
                    PermissiveSecurityManager::new()
                };
                Ok(Arc::new(manager) as Arc<dyn SecurityManager>)
            }),
        );
        registry.security_managers.insert(
            "acl".to_string(),
            Arc::new(|options: &serde_json::Value| {
                let mut builder = AclEngine::builder();
                if let Some(root) = options.get("shadowRoot").and_then(|v| v.as_str()) {
                    builder = builder.shadow_root(root);
                }
                #[cfg(not(target_arch = "wasm32"))]
                if let Some(dir) = options.get("shadowDir").and_then(|v| v.as_str()) {
                    builder = builder.shadow_fs(Arc::new(super::DiskFs::new(dir)));
                }
                Ok(Arc::new(AclSecurityManager::new(Arc::new(builder.build()))) as Arc<dyn SecurityManager>)
            }),
        );
        registry
    }

    /// Register a filesystem factory. Names must be unique.
    pub fn register_file_system(&mut self, name: impl Into<String>, factory: FileSystemFactory) -> Result<()> {
        let name = name.into();
        if self.file_systems.contains_key(&name) {
            return Err(Error::Config(format!("filesystem type {name:?} is already registered")));
        }
        self.file_systems.insert(name, factory);
        Ok(())
    }

    /// Register a security manager factory. Names must be unique.
    pub fn register_security_manager(
        &mut self,
        name: impl Into<String>,
        factory: SecurityManagerFactory,
    ) -> Result<()> {
        let name = name.into();
        if self.security_managers.contains_key(&name) {
            return Err(Error::Config(format!(
                "security manager {name:?} is already registered"
            )));
        }
        self.security_managers.insert(name, factory);
        Ok(())
    }

    /// Register `name` as a security manager sharing one ACL engine.
    pub fn register_acl_engine(&mut self, name: impl Into<String>, engine: Arc<AclEngine>) -> Result<()> {
        self.register_security_manager(
            name,
            Arc::new(move |_: &serde_json::Value| {
                Ok(Arc::new(AclSecurityManager::new(engine.clone())) as Arc<dyn SecurityManager>)
            }),
        )
    }

    fn build(&self, spec: &MountSpec) -> Result<(Arc<dyn FileSystem>, Arc<dyn SecurityManager>)> {
        let fs_factory = self
            .file_systems
            .get(&spec.fs_type)
            .ok_or_else(|| Error::Config(format!("unknown filesystem type {:?}", spec.fs_type)))?;
        let sm_factory = self.security_managers.get(&spec.security_manager).ok_or_else(|| {
            Error::Config(format!("unknown security manager {:?}", spec.security_manager))
        })?;
        Ok((fs_factory(&spec.options)?, sm_factory(&spec.security_manager_options)?))
    }
}

fn bool_option(options: &serde_json::Value, key: &str) -> bool {
    options.get(key).and_then(|v| v.as_bool()).unwrap_or(false)
}

struct Mount {
    file_system: Arc<dyn FileSystem>,
    security_manager: Arc<dyn SecurityManager>,
}

/// Routes file operations to mounts after a security check.
///
/// Only one may exist per process; [`FileManager::new`] fails while another
/// is alive.
pub struct FileManager {
    mounts: RwLock<BTreeMap<String, Mount>>,
}

impl FileManager {
    /// Create the process-wide file manager with no mounts.
    pub fn new() -> Result<Self> {
        if INSTANCE
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::Config("a FileManager already exists".to_string()));
        }
        Ok(Self {
            mounts: RwLock::new(BTreeMap::new()),
        })
    }

    /// Create the file manager and mount everything in `config`.
    pub fn from_config(config: &MountConfig, registry: &FileSystemRegistry) -> Result<Self> {
        let manager = Self::new()?;
        for (path, spec) in &config.mounts {
            let (fs, sm) = registry.build(spec)?;
            manager.mount(path, fs, sm)?;
        }
        Ok(manager)
    }

    /// Mount `file_system` at `path`. Each path may be mounted once.
    pub fn mount(
        &self,
        path: &str,
        file_system: Arc<dyn FileSystem>,
        security_manager: Arc<dyn SecurityManager>,
    ) -> Result<()> {
        let path = paths::normalize_path(path);
        let mut mounts = self.mounts.write().unwrap_or_else(PoisonError::into_inner);
        if mounts.contains_key(&path) {
            return Err(Error::Config(format!("{path} is already mounted")));
        }
        info!(mount = %path, "mounted filesystem");
        mounts.insert(
            path,
            Mount {
                file_system,
                security_manager,
            },
        );
        Ok(())
    }

    pub fn unmount(&self, path: &str) -> Result<()> {
        let path = paths::normalize_path(path);
        let mut mounts = self.mounts.write().unwrap_or_else(PoisonError::into_inner);
        mounts
            .remove(&path)
            .ok_or_else(|| Error::Config(format!("{path} is not mounted")))?;
        info!(mount = %path, "unmounted filesystem");
        Ok(())
    }

    /// Mount points, sorted.
    pub fn mount_points(&self) -> Vec<String> {
        let mounts = self.mounts.read().unwrap_or_else(PoisonError::into_inner);
        mounts.keys().cloned().collect()
    }

    /// Resolve `path` to its mount.
    pub fn create_request(&self, path: &str) -> Result<FileSystemRequest> {
        let full_path = paths::normalize_path(path);
        let mounts = self.mounts.read().unwrap_or_else(PoisonError::into_inner);

        // Longest matching mount point wins
        let (mount_path, mount) = mounts
            .iter()
            .filter(|(mount_path, _)| paths::is_within(&full_path, mount_path))
            .max_by_key(|(mount_path, _)| mount_path.len())
            .ok_or_else(|| Error::NoMount(full_path.clone()))?;

        let relative = if mount_path == "/" {
            full_path.clone()
        } else {
            paths::normalize_path(&full_path[mount_path.len()..])
        };
        Ok(FileSystemRequest {
            relative_path: relative,
            full_path,
            file_system: mount.file_system.clone(),
            security_manager: mount.security_manager.clone(),
        })
    }

    async fn authorize(&self, identity: &str, action: FileAction, path: &str) -> Result<Access<FileSystemRequest>> {
        let request = self.create_request(path)?;
        if request
            .security_manager
            .allows(identity, action, &request)
            .await?
        {
            Ok(Access::Granted(request))
        } else {
            warn!(identity, %action, path = %request.full_path, "access denied");
            Ok(Access::Denied(Denied {
                action,
                path: request.full_path,
            }))
        }
    }

    pub async fn read_file(&self, identity: &str, path: &str) -> Result<Access<Vec<u8>>> {
        let request = match self.authorize(identity, FileAction::ReadFile, path).await? {
            Access::Granted(request) => request,
            Access::Denied(denied) => return Ok(Access::Denied(denied)),
        };
        let content = request
            .file_system
            .read_file(Path::new(&request.relative_path))
            .await?;
        Ok(Access::Granted(content))
    }

    pub async fn write_file(&self, identity: &str, path: &str, content: &[u8]) -> Result<Access<()>> {
        let request = match self.authorize(identity, FileAction::WriteFile, path).await? {
            Access::Granted(request) => request,
            Access::Denied(denied) => return Ok(Access::Denied(denied)),
        };
        request
            .file_system
            .write_file(Path::new(&request.relative_path), content)
            .await?;
        Ok(Access::Granted(()))
    }

    pub async fn append_file(&self, identity: &str, path: &str, content: &[u8]) -> Result<Access<()>> {
        let request = match self.authorize(identity, FileAction::AppendFile, path).await? {
            Access::Granted(request) => request,
            Access::Denied(denied) => return Ok(Access::Denied(denied)),
        };
        request
            .file_system
            .append_file(Path::new(&request.relative_path), content)
            .await?;
        Ok(Access::Granted(()))
    }

    pub async fn create_directory(&self, identity: &str, path: &str) -> Result<Access<()>> {
        let request = match self.authorize(identity, FileAction::CreateDirectory, path).await? {
            Access::Granted(request) => request,
            Access::Denied(denied) => return Ok(Access::Denied(denied)),
        };
        request
            .file_system
            .mkdir(Path::new(&request.relative_path), false)
            .await?;
        Ok(Access::Granted(()))
    }

    /// Delete a file; directories are refused with an I/O error.
    pub async fn delete_file(&self, identity: &str, path: &str) -> Result<Access<()>> {
        let request = match self.authorize(identity, FileAction::DeleteFile, path).await? {
            Access::Granted(request) => request,
            Access::Denied(denied) => return Ok(Access::Denied(denied)),
        };
        let relative = Path::new(&request.relative_path);
        if request.file_system.stat(relative).await?.file_type.is_dir() {
            return Err(std::io::Error::other(format!("{}: is a directory", request.full_path)).into());
        }
        request.file_system.remove(relative, false).await?;
        Ok(Access::Granted(()))
    }

    pub async fn delete_directory(&self, identity: &str, path: &str, recursive: bool) -> Result<Access<()>> {
        let request = match self.authorize(identity, FileAction::DeleteDirectory, path).await? {
            Access::Granted(request) => request,
            Access::Denied(denied) => return Ok(Access::Denied(denied)),
        };
        let relative = Path::new(&request.relative_path);
        if !request.file_system.stat(relative).await?.file_type.is_dir() {
            return Err(std::io::Error::other(format!("{}: not a directory", request.full_path)).into());
        }
        request.file_system.remove(relative, recursive).await?;
        Ok(Access::Granted(()))
    }

    /// List a directory, leaving out entries hidden from `identity`.
    pub async fn read_directory(&self, identity: &str, path: &str) -> Result<Access<Vec<DirEntry>>> {
        let request = match self.authorize(identity, FileAction::ReadDirectory, path).await? {
            Access::Granted(request) => request,
            Access::Denied(denied) => return Ok(Access::Denied(denied)),
        };
        let entries = request
            .file_system
            .read_dir(Path::new(&request.relative_path))
            .await?;

        let mut visible = Vec::with_capacity(entries.len());
        for entry in entries {
            let full = crate::acl::child_path(&request.full_path, &entry.name);
            if !request.security_manager.is_hidden(identity, &full).await? {
                visible.push(entry);
            }
        }
        Ok(Access::Granted(visible))
    }

    pub async fn stat(&self, identity: &str, path: &str) -> Result<Access<Metadata>> {
        let request = match self.authorize(identity, FileAction::Stat, path).await? {
            Access::Granted(request) => request,
            Access::Denied(denied) => return Ok(Access::Denied(denied)),
        };
        let metadata = request
            .file_system
            .stat(Path::new(&request.relative_path))
            .await?;
        Ok(Access::Granted(metadata))
    }

    /// Does `path` exist? Checked as a `stat`.
    pub async fn exists(&self, identity: &str, path: &str) -> Result<Access<bool>> {
        let request = match self.authorize(identity, FileAction::Stat, path).await? {
            Access::Granted(request) => request,
            Access::Denied(denied) => return Ok(Access::Denied(denied)),
        };
        let exists = request
            .file_system
            .exists(Path::new(&request.relative_path))
            .await?;
        Ok(Access::Granted(exists))
    }

    /// Fetch an object's source for loading; requires LOAD rather than READ.
    pub async fn load_object(&self, identity: &str, path: &str) -> Result<Access<Vec<u8>>> {
        let request = match self.authorize(identity, FileAction::LoadObject, path).await? {
            Access::Granted(request) => request,
            Access::Denied(denied) => return Ok(Access::Denied(denied)),
        };
        let source = request
            .file_system
            .read_file(Path::new(&request.relative_path))
            .await?;
        Ok(Access::Granted(source))
    }
}

impl Drop for FileManager {
    fn drop(&mut self) {
        INSTANCE.store(false, Ordering::Release);
    }
}

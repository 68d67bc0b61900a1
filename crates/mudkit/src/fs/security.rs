//! Security managers
//!
//! A [`SecurityManager`] decides whether an identity may perform a
//! [`FileAction`] on a path. Every mount has one; the [`FileManager`]
//! consults it before delegating to the mount's filesystem.
//!
//! [`FileManager`]: super::FileManager

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use super::manager::FileSystemRequest;
use crate::acl::{AclEngine, Permission};
use crate::error::Result;
use crate::paths;

/// Operation requested through the [`FileManager`](super::FileManager).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FileAction {
    ReadFile,
    WriteFile,
    AppendFile,
    CreateDirectory,
    DeleteFile,
    DeleteDirectory,
    ReadDirectory,
    Stat,
    LoadObject,
}

impl FileAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ReadFile => "read",
            Self::WriteFile => "write",
            Self::AppendFile => "append",
            Self::CreateDirectory => "mkdir",
            Self::DeleteFile => "delete",
            Self::DeleteDirectory => "rmdir",
            Self::ReadDirectory => "list",
            Self::Stat => "stat",
            Self::LoadObject => "load",
        }
    }

    /// True for actions that change the filesystem.
    pub fn is_write(self) -> bool {
        matches!(
            self,
            Self::WriteFile
                | Self::AppendFile
                | Self::CreateDirectory
                | Self::DeleteFile
                | Self::DeleteDirectory
        )
    }
}

impl fmt::Display for FileAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Access policy for one mount.
#[async_trait]
pub trait SecurityManager: Send + Sync {
    /// May `identity` perform `action` on the request's path?
    async fn allows(&self, identity: &str, action: FileAction, request: &FileSystemRequest) -> Result<bool>;

    /// Should `full_path` be left out of listings shown to `identity`?
    async fn is_hidden(&self, _identity: &str, _full_path: &str) -> Result<bool> {
        Ok(false)
    }
}

/// Enforces an [`AclEngine`] over virtual paths.
///
/// | Action | Requires |
/// |--------|----------|
/// | read, list, stat | READ on the path |
/// | write, append | WRITE on the path, or CREATE_FILE on its directory |
/// | mkdir | CREATE_DIRECTORY on the parent |
/// | delete | WRITE on the path |
/// | rmdir | DELETE_DIRECTORY on the path |
/// | load | LOAD on the path |
pub struct AclSecurityManager {
    engine: Arc<AclEngine>,
}

impl AclSecurityManager {
    pub fn new(engine: Arc<AclEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<AclEngine> {
        &self.engine
    }
}

#[async_trait]
impl SecurityManager for AclSecurityManager {
    async fn allows(&self, identity: &str, action: FileAction, request: &FileSystemRequest) -> Result<bool> {
        let path = request.full_path.as_str();
        let parent = paths::parent(path);
        let allowed = match action {
            FileAction::ReadFile | FileAction::ReadDirectory | FileAction::Stat => {
                self.engine.check(path, identity, Permission::READ).await?
            }
            FileAction::WriteFile | FileAction::AppendFile => {
                self.engine.check(path, identity, Permission::WRITE).await?
                    || self
                        .engine
                        .check(parent, identity, Permission::CREATE_FILE)
                        .await?
            }
            FileAction::CreateDirectory => {
                self.engine
                    .check(parent, identity, Permission::CREATE_DIRECTORY)
                    .await?
            }
            FileAction::DeleteFile => self.engine.check(path, identity, Permission::WRITE).await?,
            FileAction::DeleteDirectory => {
                self.engine
                    .check(path, identity, Permission::DELETE_DIRECTORY)
                    .await?
            }
            FileAction::LoadObject => self.engine.check(path, identity, Permission::LOAD).await?,
        };
        debug!(identity, %action, path, allowed, "acl check");
        Ok(allowed)
    }

    async fn is_hidden(&self, identity: &str, full_path: &str) -> Result<bool> {
        Ok(self
            .engine
            .effective_permissions(full_path, identity)
            .await?
            .contains(Permission::HIDDEN))
    }
}

/// Allows everything, or only reads when created read-only.
#[derive(Debug, Clone, Copy, Default)]
pub struct PermissiveSecurityManager {
    read_only: bool,
}

impl PermissiveSecurityManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read_only() -> Self {
        Self { read_only: true }
    }
}

#[async_trait]
impl SecurityManager for PermissiveSecurityManager {
    async fn allows(&self, _identity: &str, action: FileAction, _request: &FileSystemRequest) -> Result<bool> {
        Ok(!(self.read_only && action.is_write()))
    }
}

//! Virtual filesystem for Mudkit
//!
//! Provides an async filesystem trait, implementations, and the access layer
//! in front of them:
//! - `InMemoryFs`: Simple in-memory filesystem
//! - `DiskFs`: A host directory
//! - `FileManager`: Mount table that checks every operation with the
//!   mount's `SecurityManager`

#[cfg(not(target_arch = "wasm32"))]
mod disk;
mod manager;
mod memory;
mod security;
mod traits;

#[cfg(not(target_arch = "wasm32"))]
pub use disk::DiskFs;
pub use manager::{
    Access, Denied, FileManager, FileSystemFactory, FileSystemRegistry, FileSystemRequest, MountConfig,
    MountSpec, SecurityManagerFactory,
};
pub use memory::InMemoryFs;
pub use security::{AclSecurityManager, FileAction, PermissiveSecurityManager, SecurityManager};
pub use traits::{DirEntry, FileSystem, FileType, Metadata};

//! FileManager integration tests
//!
//! Only one FileManager may exist per process, so every test here is
//! `#[serial]`.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use mudkit::acl::{AclEngine, EVERYONE, FixedPermissions, Permission};
use mudkit::fs::{
    Access, AclSecurityManager, DirEntry, FileAction, FileManager, FileSystem, FileSystemRegistry,
    FileSystemRequest, InMemoryFs, Metadata, MountConfig, PermissiveSecurityManager, SecurityManager,
};
use mudkit::{Error, Result, async_trait};
use serial_test::serial;

/// Wraps an in-memory filesystem and counts mutating calls.
#[derive(Default)]
struct CountingFs {
    inner: InMemoryFs,
    writes: AtomicUsize,
}

impl CountingFs {
    fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FileSystem for CountingFs {
    async fn read_file(&self, path: &Path) -> Result<Vec<u8>> {
        self.inner.read_file(path).await
    }

    async fn write_file(&self, path: &Path, content: &[u8]) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.write_file(path, content).await
    }

    async fn append_file(&self, path: &Path, content: &[u8]) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.append_file(path, content).await
    }

    async fn mkdir(&self, path: &Path, recursive: bool) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.mkdir(path, recursive).await
    }

    async fn remove(&self, path: &Path, recursive: bool) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.remove(path, recursive).await
    }

    async fn stat(&self, path: &Path) -> Result<Metadata> {
        self.inner.stat(path).await
    }

    async fn read_dir(&self, path: &Path) -> Result<Vec<DirEntry>> {
        self.inner.read_dir(path).await
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        self.inner.exists(path).await
    }
}

/// Refuses everything.
struct DenyAll;

#[async_trait]
impl SecurityManager for DenyAll {
    async fn allows(&self, _identity: &str, _action: FileAction, _request: &FileSystemRequest) -> Result<bool> {
        Ok(false)
    }
}

fn everyone_reads() -> FixedPermissions {
    let mut map = BTreeMap::new();
    map.insert(EVERYONE.to_string(), Permission::READ);
    FixedPermissions(map)
}

#[tokio::test]
#[serial]
async fn test_denied_write_never_reaches_filesystem() {
    let fs = Arc::new(CountingFs::default());
    let manager = FileManager::new().unwrap();
    manager.mount("/", fs.clone(), Arc::new(DenyAll)).unwrap();

    let result = manager.write_file("alice", "/motd", b"hacked").await.unwrap();
    assert!(result.is_denied());
    let result = manager.append_file("alice", "/motd", b"hacked").await.unwrap();
    assert!(result.is_denied());
    let result = manager.create_directory("alice", "/tmp").await.unwrap();
    assert!(result.is_denied());
    let result = manager.delete_file("alice", "/motd").await.unwrap();
    assert!(result.is_denied());

    assert_eq!(fs.writes(), 0);
}

#[tokio::test]
#[serial]
async fn test_granted_write_reaches_filesystem() {
    let fs = Arc::new(CountingFs::default());
    let manager = FileManager::new().unwrap();
    manager
        .mount("/", fs.clone(), Arc::new(PermissiveSecurityManager::new()))
        .unwrap();

    manager
        .write_file("alice", "/motd", b"hello")
        .await
        .unwrap()
        .into_result()
        .unwrap();
    assert_eq!(fs.writes(), 1);
    let content = manager.read_file("alice", "/motd").await.unwrap();
    assert_eq!(content, Access::Granted(b"hello".to_vec()));
}

#[tokio::test]
#[serial]
async fn test_acl_enforced_through_mount() {
    let engine = Arc::new(AclEngine::builder().permission_source(everyone_reads()).build());
    engine
        .set_permissions("/realms", "merlin", Permission::WRITE | Permission::CREATE_FILE)
        .await
        .unwrap();

    let fs = Arc::new(CountingFs::default());
    fs.mkdir(Path::new("/realms"), false).await.unwrap();
    let manager = FileManager::new().unwrap();
    manager
        .mount("/", fs.clone(), Arc::new(AclSecurityManager::new(engine)))
        .unwrap();
    let before = fs.writes();

    let denied = manager.write_file("guest", "/realms/oak.c", b"x").await.unwrap();
    assert!(denied.is_denied());
    assert_eq!(fs.writes(), before);

    let err = denied.into_result().unwrap_err();
    assert!(matches!(err, Error::PermissionDenied { .. }));

    manager
        .write_file("merlin", "/realms/oak.c", b"x")
        .await
        .unwrap()
        .into_result()
        .unwrap();
    assert_eq!(fs.writes(), before + 1);

    // Everyone may read
    let content = manager.read_file("guest", "/realms/oak.c").await.unwrap();
    assert!(content.is_granted());

    // Loading needs LOAD, which nobody holds
    let load = manager.load_object("merlin", "/realms/oak.c").await.unwrap();
    assert!(load.is_denied());
}

#[tokio::test]
#[serial]
async fn test_hidden_entries_filtered() {
    let engine = Arc::new(AclEngine::builder().permission_source(everyone_reads()).build());
    engine
        .set_file_permissions("/secret.txt", "guest", Permission::HIDDEN)
        .await
        .unwrap();

    let fs = Arc::new(InMemoryFs::new());
    fs.write_file(Path::new("/secret.txt"), b"").await.unwrap();
    fs.write_file(Path::new("/motd"), b"").await.unwrap();

    let manager = FileManager::new().unwrap();
    manager
        .mount("/", fs, Arc::new(AclSecurityManager::new(engine)))
        .unwrap();

    let names = |entries: Vec<DirEntry>| entries.into_iter().map(|e| e.name).collect::<Vec<_>>();
    let guest = manager.read_directory("guest", "/").await.unwrap().granted().unwrap();
    assert_eq!(names(guest), vec!["motd"]);
    let other = manager.read_directory("wizard", "/").await.unwrap().granted().unwrap();
    assert_eq!(names(other), vec!["motd", "secret.txt"]);
}

#[tokio::test]
#[serial]
async fn test_io_errors_propagate() {
    let manager = FileManager::new().unwrap();
    manager
        .mount("/", Arc::new(InMemoryFs::new()), Arc::new(PermissiveSecurityManager::new()))
        .unwrap();
    let err = manager.read_file("alice", "/missing").await.unwrap_err();
    assert!(matches!(err, Error::Io(_)));

    manager.create_directory("alice", "/dir").await.unwrap().into_result().unwrap();
    let err = manager.delete_file("alice", "/dir").await.unwrap_err();
    assert!(matches!(err, Error::Io(_)));
}

#[tokio::test]
#[serial]
async fn test_nested_mounts() {
    let lib = Arc::new(InMemoryFs::new());
    let manager = FileManager::new().unwrap();
    manager
        .mount("/", Arc::new(InMemoryFs::new()), Arc::new(PermissiveSecurityManager::new()))
        .unwrap();
    manager
        .mount("/lib", lib.clone(), Arc::new(PermissiveSecurityManager::read_only()))
        .unwrap();

    lib.write_file(Path::new("/std.c"), b"inherit").await.unwrap();
    let source = manager.read_file("alice", "/lib/std.c").await.unwrap().granted();
    assert_eq!(source.as_deref(), Some(&b"inherit"[..]));

    assert!(manager.write_file("alice", "/lib/std.c", b"").await.unwrap().is_denied());
    assert!(manager.write_file("alice", "/home.c", b"").await.unwrap().is_granted());
    assert_eq!(
        manager.exists("alice", "/lib/std.c").await.unwrap(),
        Access::Granted(true)
    );
}

#[tokio::test]
#[serial]
async fn test_from_config() {
    let config = MountConfig::from_json(
        r#"{
            "/": {"type": "memory", "securityManager": "permissive"},
            "/lib": {"type": "memory", "securityManager": "shared"}
        }"#,
    )
    .unwrap();

    let engine = Arc::new(AclEngine::builder().permission_source(everyone_reads()).build());
    let mut registry = FileSystemRegistry::with_defaults();
    registry.register_acl_engine("shared", engine.clone()).unwrap();

    let manager = FileManager::from_config(&config, &registry).unwrap();
    assert_eq!(manager.mount_points(), vec!["/", "/lib"]);
    assert!(manager.write_file("guest", "/lib/x.c", b"").await.unwrap().is_denied());
    assert!(manager.write_file("guest", "/x.c", b"").await.unwrap().is_granted());

    engine
        .set_permissions("/lib", "guest", Permission::CREATE_FILE)
        .await
        .unwrap();
    assert!(manager.write_file("guest", "/lib/x.c", b"").await.unwrap().is_granted());
}

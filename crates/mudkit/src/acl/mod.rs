//! Hierarchical access control
//!
//! The [`AclEngine`] answers "what may `identity` do at `path`?" by walking a
//! tree of [`AclNode`]s from the root. Nodes are loaded lazily from `.acl`
//! shadow files kept on a separate [`FileSystem`], cached for the life of
//! the engine and written back when they change.
//!
//! At each level the node's grants for the caller are either OR'd into the
//! running total (`inherits: true`) or replace it (`inherits: false`), so a
//! non-inheriting directory cuts off everything granted above it.
//!
//! # Example
//!
//! ```rust
//! use mudkit::acl::{AclEngine, Permission};
//!
//! # #[tokio::main]
//! # async fn main() -> mudkit::Result<()> {
//! let engine = AclEngine::builder().build();
//! engine.set_permissions("/", "$EVERYONE", Permission::READ).await?;
//! engine.set_permissions("/secure", "$EVERYONE", Permission::empty()).await?;
//! engine.set_inherits("/secure", false).await?;
//!
//! assert!(engine.effective_permissions("/lib/std.c", "alice").await?.contains(Permission::READ));
//! assert!(engine.effective_permissions("/secure/plans", "alice").await?.is_empty());
//! # Ok(())
//! # }
//! ```

mod node;
mod perms;

pub use node::{AclEntry, AclNode, Bindings, EVERYONE, RegexEntry, ShadowFile, TOKEN, child_path};
pub use perms::Permission;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::fs::{FileSystem, InMemoryFs};
use crate::paths::normalize_path;

/// Name of the per-directory shadow file.
pub const SHADOW_FILE: &str = ".acl";

/// Group membership lookups.
pub trait GroupResolver: Send + Sync {
    fn in_group(&self, identity: &str, group: &str) -> bool;
}

/// Default grants for a directory that has no ACL node yet.
pub trait PermissionSource: Send + Sync {
    fn create_permissions(&self, dir: &str) -> BTreeMap<String, Permission>;
}

/// A fixed group table.
#[derive(Debug, Clone, Default)]
pub struct StaticGroups {
    groups: BTreeMap<String, BTreeSet<String>>,
}

impl StaticGroups {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `identity` to `group`.
    pub fn member(mut self, group: impl Into<String>, identity: impl Into<String>) -> Self {
        self.groups
            .entry(group.into())
            .or_default()
            .insert(identity.into());
        self
    }
}

impl GroupResolver for StaticGroups {
    fn in_group(&self, identity: &str, group: &str) -> bool {
        self.groups
            .get(group)
            .is_some_and(|members| members.contains(identity))
    }
}

/// Gives every new directory the same grants.
#[derive(Debug, Clone, Default)]
pub struct FixedPermissions(pub BTreeMap<String, Permission>);

impl PermissionSource for FixedPermissions {
    fn create_permissions(&self, _dir: &str) -> BTreeMap<String, Permission> {
        self.0.clone()
    }
}

/// Builder for [`AclEngine`].
pub struct AclEngineBuilder {
    shadow: Option<Arc<dyn FileSystem>>,
    shadow_root: String,
    groups: Arc<dyn GroupResolver>,
    source: Arc<dyn PermissionSource>,
}

impl AclEngineBuilder {
    /// Filesystem holding the shadow tree. Default: a fresh [`InMemoryFs`]
    pub fn shadow_fs(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.shadow = Some(fs);
        self
    }

    /// Directory of the shadow tree on that filesystem. Default: `/`
    pub fn shadow_root(mut self, root: impl Into<String>) -> Self {
        self.shadow_root = root.into();
        self
    }

    /// Default: no groups
    pub fn groups(mut self, groups: impl GroupResolver + 'static) -> Self {
        self.groups = Arc::new(groups);
        self
    }

    /// Default: new directories get no grants of their own
    pub fn permission_source(mut self, source: impl PermissionSource + 'static) -> Self {
        self.source = Arc::new(source);
        self
    }

    pub fn build(self) -> AclEngine {
        AclEngine {
            shadow: self
                .shadow
                .unwrap_or_else(|| Arc::new(InMemoryFs::new()) as Arc<dyn FileSystem>),
            shadow_root: normalize_path(&self.shadow_root),
            groups: self.groups,
            source: self.source,
            root: Mutex::new(None),
        }
    }
}

/// Resolves effective permissions over a lazily loaded ACL tree.
pub struct AclEngine {
    shadow: Arc<dyn FileSystem>,
    shadow_root: String,
    groups: Arc<dyn GroupResolver>,
    source: Arc<dyn PermissionSource>,
    /// The cached tree, loaded on first use
    root: Mutex<Option<AclNode>>,
}

impl AclEngine {
    pub fn builder() -> AclEngineBuilder {
        AclEngineBuilder {
            shadow: None,
            shadow_root: "/".to_string(),
            groups: Arc::new(StaticGroups::new()),
            source: Arc::new(FixedPermissions::default()),
        }
    }

    /// Shadow-file location for directory `dir`.
    pub fn shadow_path(&self, dir: &str) -> String {
        let base = if dir == "/" {
            self.shadow_root.clone()
        } else if self.shadow_root == "/" {
            dir.to_string()
        } else {
            format!("{}{}", self.shadow_root, dir)
        };
        child_path(&base, SHADOW_FILE)
    }

    /// Everything `identity` may do at `path`.
    pub async fn effective_permissions(&self, path: &str, identity: &str) -> Result<Permission> {
        let path = normalize_path(path);
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let groups = self.groups.as_ref();

        let mut guard = self.root.lock().await;
        let mut node = self.root_node(&mut guard).await?;
        let mut bindings = Bindings::new();
        let mut total = node.lookup(identity, &bindings, groups);

        for (index, segment) in segments.iter().enumerate() {
            let last = index + 1 == segments.len();

            if !node.is_special && !node.children.contains_key(*segment) {
                let dir = child_path(&node.path, segment);
                if let Some(child) = self.load(&dir, node.depth + 1, segment).await? {
                    node.children.insert(segment.to_string(), child);
                }
            }
            if node.children.contains_key(*segment) {
                node = node
                    .children
                    .get_mut(*segment)
                    .ok_or_else(|| Error::Internal("ACL child vanished".to_string()))?;
                total = node.apply(total, identity, &bindings, groups);
                continue;
            }

            if let Some((position, bound)) = node.match_regex(segment) {
                bindings.extend(bound);
                node = &mut node.regex_entries[position];
                total = node.apply(total, identity, &bindings, groups);
                continue;
            }

            if let Some(entry) = node.files.get(*segment) {
                let own = entry.lookup(identity, &bindings, groups);
                let perms = if entry.inherits { total | own } else { own };
                debug!(path = %path, identity, perms = %perms, "resolved file entry");
                return Ok(perms);
            }

            if last || node.is_special {
                break;
            }

            // Intermediate directory with no node: create one now
            let dir = child_path(&node.path, segment);
            let mut child = AclNode::new(dir.clone(), node.depth + 1, *segment);
            child.permissions = self.source.create_permissions(&dir);
            warn!(dir = %dir, "synthesized ACL node");
            self.persist(&child).await?;
            node.children.insert(segment.to_string(), child);
            node = node
                .children
                .get_mut(*segment)
                .ok_or_else(|| Error::Internal("ACL child vanished".to_string()))?;
            total = node.apply(total, identity, &bindings, groups);
        }

        debug!(path = %path, identity, perms = %total, "resolved permissions");
        Ok(total)
    }

    /// True when `identity` holds every bit of `required` at `path`.
    pub async fn check(&self, path: &str, identity: &str, required: Permission) -> Result<bool> {
        Ok(self
            .effective_permissions(path, identity)
            .await?
            .contains(required))
    }

    /// Grant `perms` to `identity` on directory `dir`, replacing any
    /// previous grant. Empty `perms` removes the key.
    pub async fn set_permissions(&self, dir: &str, identity: &str, perms: Permission) -> Result<()> {
        self.update_dir(dir, |node| {
            if perms.is_empty() {
                node.permissions.remove(identity);
            } else {
                node.permissions.insert(identity.to_string(), perms);
            }
            Ok(())
        })
        .await
    }

    /// Choose whether directory `dir` inherits from its parent.
    pub async fn set_inherits(&self, dir: &str, inherits: bool) -> Result<()> {
        self.update_dir(dir, |node| {
            node.inherits = inherits;
            Ok(())
        })
        .await
    }

    /// Append a regex child to directory `dir`.
    pub async fn add_regex_entry(
        &self,
        dir: &str,
        pattern: &str,
        permissions: BTreeMap<String, Permission>,
        inherits: bool,
    ) -> Result<()> {
        self.update_dir(dir, |node| {
            if node.regex_entries.iter().any(|r| r.name == pattern) {
                return Err(Error::Config(format!(
                    "{}: duplicate regex entry {pattern:?}",
                    node.path
                )));
            }
            let mut child = AclNode::regex(node, pattern)?;
            child.permissions = permissions;
            child.inherits = inherits;
            node.regex_entries.push(child);
            Ok(())
        })
        .await
    }

    /// Ensure `file` has an entry in its directory's node.
    ///
    /// Returns true when the entry was created by this call.
    pub async fn touch_file(&self, file: &str) -> Result<bool> {
        let (dir, name) = split_file(file)?;
        let mut created = false;
        self.update_dir(&dir, |node| {
            if !node.files.contains_key(&name) {
                node.files.insert(name.clone(), AclEntry::default());
                created = true;
            }
            Ok(())
        })
        .await?;
        Ok(created)
    }

    /// Grant `perms` to `identity` on a single file.
    pub async fn set_file_permissions(&self, file: &str, identity: &str, perms: Permission) -> Result<()> {
        let (dir, name) = split_file(file)?;
        self.update_dir(&dir, |node| {
            let entry = node.files.entry(name.clone()).or_default();
            if perms.is_empty() {
                entry.permissions.remove(identity);
            } else {
                entry.permissions.insert(identity.to_string(), perms);
            }
            Ok(())
        })
        .await
    }

    /// Choose whether a single file inherits from its directory.
    pub async fn set_file_inherits(&self, file: &str, inherits: bool) -> Result<()> {
        let (dir, name) = split_file(file)?;
        self.update_dir(&dir, |node| {
            node.files.entry(name.clone()).or_default().inherits = inherits;
            Ok(())
        })
        .await
    }

    /// Human-readable dump of the node for directory `dir`.
    pub async fn describe(&self, dir: &str) -> Result<String> {
        let dir = normalize_path(dir);
        let mut guard = self.root.lock().await;
        let node = self.dir_node(&mut guard, &dir, false).await?;

        let mut out = String::new();
        match node {
            None => {
                let _ = writeln!(out, "{dir}: no ACL node");
            }
            Some(node) => describe_node(&mut out, node, 0),
        }
        Ok(out)
    }

    /// Drop the cached tree; the next lookup reloads from the shadow files.
    pub async fn clear_cache(&self) {
        *self.root.lock().await = None;
    }

    /// Apply `change` to the node for `dir` (creating it and its ancestors
    /// as needed) and persist it.
    async fn update_dir<F>(&self, dir: &str, change: F) -> Result<()>
    where
        F: FnOnce(&mut AclNode) -> Result<()>,
    {
        let dir = normalize_path(dir);
        let mut guard = self.root.lock().await;
        let node = self
            .dir_node(&mut guard, &dir, true)
            .await?
            .ok_or_else(|| Error::Internal(format!("{dir}: ACL node not created")))?;
        change(&mut *node)?;
        self.persist(node).await
    }

    /// Find the node for directory `dir`, loading shadow files on the way.
    /// With `create`, missing nodes are created and persisted.
    async fn dir_node<'n>(
        &self,
        slot: &'n mut Option<AclNode>,
        dir: &str,
        create: bool,
    ) -> Result<Option<&'n mut AclNode>> {
        let mut node = self.root_node(slot).await?;
        for segment in dir.split('/').filter(|s| !s.is_empty()) {
            if node.is_special {
                return Err(Error::Config(format!(
                    "{dir}: lies beneath a regex entry and cannot have its own ACL node"
                )));
            }
            if !node.children.contains_key(segment) {
                let path = child_path(&node.path, segment);
                let child = match self.load(&path, node.depth + 1, segment).await? {
                    Some(child) => child,
                    None if create => {
                        let mut child = AclNode::new(path.clone(), node.depth + 1, segment);
                        child.permissions = self.source.create_permissions(&path);
                        warn!(dir = %path, "synthesized ACL node");
                        self.persist(&child).await?;
                        child
                    }
                    None => return Ok(None),
                };
                node.children.insert(segment.to_string(), child);
            }
            node = node
                .children
                .get_mut(segment)
                .ok_or_else(|| Error::Internal("ACL child vanished".to_string()))?;
        }
        Ok(Some(node))
    }

    /// The root node, loading or creating it on first use.
    async fn root_node<'n>(&self, slot: &'n mut Option<AclNode>) -> Result<&'n mut AclNode> {
        if slot.is_none() {
            let root = match self.load("/", 0, "").await? {
                Some(root) => root,
                None => {
                    let mut root = AclNode::root();
                    root.permissions = self.source.create_permissions("/");
                    root
                }
            };
            *slot = Some(root);
        }
        slot.as_mut()
            .ok_or_else(|| Error::Internal("ACL root missing".to_string()))
    }

    async fn load(&self, dir: &str, depth: usize, name: &str) -> Result<Option<AclNode>> {
        let shadow_path = self.shadow_path(dir);
        if !self.shadow.exists(Path::new(&shadow_path)).await? {
            return Ok(None);
        }
        let bytes = self.shadow.read_file(Path::new(&shadow_path)).await?;
        let shadow: ShadowFile = serde_json::from_slice(&bytes)?;
        debug!(dir, shadow = %shadow_path, "loaded ACL node");
        AclNode::from_shadow(dir, depth, name, shadow).map(Some)
    }

    async fn persist(&self, node: &AclNode) -> Result<()> {
        if node.is_special {
            return Err(Error::Internal(format!(
                "{}: regex nodes are stored with their parent",
                node.path
            )));
        }
        let shadow_path = self.shadow_path(&node.path);
        if let Some(parent) = Path::new(&shadow_path).parent() {
            self.shadow.mkdir(parent, true).await?;
        }
        let json = serde_json::to_vec_pretty(&node.to_shadow())?;
        self.shadow.write_file(Path::new(&shadow_path), &json).await?;
        debug!(dir = %node.path, shadow = %shadow_path, "persisted ACL node");
        Ok(())
    }
}

fn split_file(file: &str) -> Result<(String, String)> {
    let file = normalize_path(file);
    match file.rsplit_once('/') {
        Some((dir, name)) if !name.is_empty() => {
            let dir = if dir.is_empty() { "/" } else { dir };
            Ok((dir.to_string(), name.to_string()))
        }
        _ => Err(Error::Config(format!("{file}: not a file path"))),
    }
}

fn describe_node(out: &mut String, node: &AclNode, indent: usize) {
    let pad = "  ".repeat(indent);
    let kind = if node.is_regex { " (regex)" } else { "" };
    let _ = writeln!(
        out,
        "{pad}{}{kind} inherits={}",
        if node.is_regex { node.name.as_str() } else { node.path.as_str() },
        node.inherits
    );
    for (identity, perms) in &node.permissions {
        let _ = writeln!(out, "{pad}  {identity}: {perms}");
    }
    for (name, entry) in &node.files {
        let _ = writeln!(out, "{pad}  file {name} inherits={}", entry.inherits);
        for (identity, perms) in &entry.permissions {
            let _ = writeln!(out, "{pad}    {identity}: {perms}");
        }
    }
    for regex in &node.regex_entries {
        describe_node(out, regex, indent + 1);
    }
    if node.is_special {
        for child in node.children.values() {
            describe_node(out, child, indent + 1);
        }
    }
}

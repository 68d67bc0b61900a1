//! ACL tree nodes and their shadow-file form
//!
//! Every directory with explicit permissions has an [`AclNode`], persisted
//! as JSON in a `.acl` shadow file. Regex entries (and anything declared
//! beneath them) live inline in their parent's shadow file.

use std::collections::BTreeMap;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::perms::Permission;
use super::GroupResolver;
use crate::error::{Error, Result};

/// Identity key matched by every caller.
pub const EVERYONE: &str = "$EVERYONE";

/// Values captured by regex segments on the way down the tree.
pub type Bindings = BTreeMap<String, String>;

/// Binding name for the whole segment matched by a regex entry.
pub const TOKEN: &str = "token";

fn default_true() -> bool {
    true
}

fn is_true(value: &bool) -> bool {
    *value
}

/// Permissions for a single file within a directory node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AclEntry {
    #[serde(default)]
    pub permissions: BTreeMap<String, Permission>,
    #[serde(default = "default_true")]
    pub inherits: bool,
}

impl Default for AclEntry {
    fn default() -> Self {
        Self {
            permissions: BTreeMap::new(),
            inherits: true,
        }
    }
}

impl AclEntry {
    /// Permissions granted to `identity` by this entry's own keys.
    pub fn lookup(&self, identity: &str, bindings: &Bindings, groups: &dyn GroupResolver) -> Permission {
        lookup_keys(&self.permissions, identity, bindings, groups)
    }
}

/// Serialized form of a node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShadowFile {
    #[serde(default)]
    pub permissions: BTreeMap<String, Permission>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub files: BTreeMap<String, AclEntry>,
    #[serde(default = "default_true", skip_serializing_if = "is_true")]
    pub inherits: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub regex_entries: Vec<RegexEntry>,
    /// Nodes declared inline; only valid beneath a regex entry
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub children: BTreeMap<String, ShadowFile>,
}

/// A regex child as stored in its parent's shadow file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegexEntry {
    pub pattern: String,
    #[serde(flatten)]
    pub node: ShadowFile,
}

/// A directory in the ACL tree.
#[derive(Debug, Clone)]
pub struct AclNode {
    /// Absolute directory path; a regex node uses its pattern as the leaf
    pub path: String,
    pub depth: usize,
    /// Path leaf, or the pattern for a regex node
    pub name: String,
    pub children: BTreeMap<String, AclNode>,
    /// Regex children in declaration order
    pub regex_entries: Vec<AclNode>,
    pub files: BTreeMap<String, AclEntry>,
    pub permissions: BTreeMap<String, Permission>,
    pub inherits: bool,
    pub is_regex: bool,
    /// Declared inline in an ancestor's shadow file
    pub is_special: bool,
    pattern: Option<Regex>,
}

impl AclNode {
    /// The tree root (`/`).
    pub fn root() -> Self {
        Self::new("/", 0, "")
    }

    /// An empty node that inherits from its parent.
    pub fn new(path: impl Into<String>, depth: usize, name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            depth,
            name: name.into(),
            children: BTreeMap::new(),
            regex_entries: Vec::new(),
            files: BTreeMap::new(),
            permissions: BTreeMap::new(),
            inherits: true,
            is_regex: false,
            is_special: false,
            pattern: None,
        }
    }

    /// A regex child matching one whole path segment.
    pub fn regex(parent: &AclNode, pattern: &str) -> Result<Self> {
        let compiled = Regex::new(&format!("^(?:{pattern})$"))
            .map_err(|e| Error::Config(format!("invalid ACL pattern {pattern:?}: {e}")))?;
        let mut node = Self::new(child_path(&parent.path, pattern), parent.depth + 1, pattern);
        node.is_regex = true;
        node.is_special = true;
        node.pattern = Some(compiled);
        Ok(node)
    }

    /// Build a node from its shadow file.
    pub fn from_shadow(path: &str, depth: usize, name: &str, shadow: ShadowFile) -> Result<Self> {
        let mut node = Self::new(path, depth, name);
        node.fill(shadow, false)?;
        Ok(node)
    }

    fn fill(&mut self, shadow: ShadowFile, special: bool) -> Result<()> {
        self.permissions = shadow.permissions;
        self.files = shadow.files;
        self.inherits = shadow.inherits;
        self.is_special |= special;

        for entry in shadow.regex_entries {
            let mut child = AclNode::regex(self, &entry.pattern)?;
            child.fill(entry.node, true)?;
            self.regex_entries.push(child);
        }
        if !shadow.children.is_empty() && !self.is_special {
            return Err(Error::Config(format!(
                "{}: inline children are only allowed beneath a regex entry",
                self.path
            )));
        }
        for (name, inline) in shadow.children {
            let mut child = AclNode::new(child_path(&self.path, &name), self.depth + 1, name.clone());
            child.fill(inline, true)?;
            self.children.insert(name, child);
        }
        Ok(())
    }

    /// Serialized form. Regular children have their own shadow files and
    /// are left out; regex entries and special children are written inline.
    pub fn to_shadow(&self) -> ShadowFile {
        ShadowFile {
            permissions: self.permissions.clone(),
            files: self.files.clone(),
            inherits: self.inherits,
            regex_entries: self
                .regex_entries
                .iter()
                .map(|r| RegexEntry {
                    pattern: r.name.clone(),
                    node: r.to_shadow(),
                })
                .collect(),
            children: if self.is_special {
                self.children
                    .iter()
                    .map(|(name, child)| (name.clone(), child.to_shadow()))
                    .collect()
            } else {
                BTreeMap::new()
            },
        }
    }

    /// First regex child matching `segment`, with the values it binds.
    ///
    /// Binds [`TOKEN`] to the whole segment and every named capture group
    /// under its own name.
    pub fn match_regex(&self, segment: &str) -> Option<(usize, Bindings)> {
        self.regex_entries.iter().enumerate().find_map(|(index, child)| {
            let pattern = child.pattern.as_ref()?;
            let caps = pattern.captures(segment)?;
            let mut bound = Bindings::new();
            bound.insert(TOKEN.to_string(), segment.to_string());
            for name in pattern.capture_names().flatten() {
                if let Some(m) = caps.name(name) {
                    bound.insert(name.to_string(), m.as_str().to_string());
                }
            }
            Some((index, bound))
        })
    }

    /// Permissions granted to `identity` by this node's own keys.
    pub fn lookup(&self, identity: &str, bindings: &Bindings, groups: &dyn GroupResolver) -> Permission {
        lookup_keys(&self.permissions, identity, bindings, groups)
    }

    /// Fold this node into a running total according to `inherits`.
    pub fn apply(
        &self,
        total: Permission,
        identity: &str,
        bindings: &Bindings,
        groups: &dyn GroupResolver,
    ) -> Permission {
        let own = self.lookup(identity, bindings, groups);
        if self.inherits { total | own } else { own }
    }
}

/// OR together every key in `map` that applies to `identity`.
///
/// Keys are an exact identity, `$group`, `%name` (the value bound under
/// `name` by a regex segment) or `$%name` (the group named by that value).
pub fn lookup_keys(
    map: &BTreeMap<String, Permission>,
    identity: &str,
    bindings: &Bindings,
    groups: &dyn GroupResolver,
) -> Permission {
    map.iter()
        .filter(|(key, _)| key_matches(key, identity, bindings, groups))
        .fold(Permission::empty(), |acc, (_, perms)| acc | *perms)
}

fn key_matches(key: &str, identity: &str, bindings: &Bindings, groups: &dyn GroupResolver) -> bool {
    if key == EVERYONE {
        return true;
    }
    if let Some(name) = key.strip_prefix("$%") {
        return bindings
            .get(name)
            .is_some_and(|group| groups.in_group(identity, group));
    }
    if let Some(name) = key.strip_prefix('%') {
        return bindings.get(name).is_some_and(|bound| bound == identity);
    }
    if let Some(group) = key.strip_prefix('$') {
        return groups.in_group(identity, group);
    }
    key == identity
}

/// Join a directory path and a child name.
pub fn child_path(parent: &str, name: &str) -> String {
    if parent == "/" {
        format!("/{name}")
    } else {
        format!("{parent}/{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acl::StaticGroups;

    #[test]
    fn test_shadow_defaults() {
        let shadow: ShadowFile = serde_json::from_str("{}").unwrap();
        assert!(shadow.inherits);
        assert!(shadow.permissions.is_empty());

        let shadow: ShadowFile =
            serde_json::from_str(r#"{"permissions": {"alice": 3}, "inherits": false}"#).unwrap();
        assert!(!shadow.inherits);
        assert_eq!(shadow.permissions["alice"], Permission::READ | Permission::WRITE);
    }

    #[test]
    fn test_key_matching() {
        let groups = StaticGroups::new().member("wizards", "merlin");
        let mut bindings = Bindings::new();
        bindings.insert(TOKEN.to_string(), "bob".to_string());

        assert!(key_matches("merlin", "merlin", &bindings, &groups));
        assert!(key_matches("$wizards", "merlin", &bindings, &groups));
        assert!(!key_matches("$wizards", "bob", &bindings, &groups));
        assert!(key_matches("$EVERYONE", "anyone", &bindings, &groups));
        assert!(key_matches("%token", "bob", &bindings, &groups));
        assert!(!key_matches("%token", "alice", &bindings, &groups));
        assert!(!key_matches("%other", "bob", &bindings, &groups));
    }

    #[test]
    fn test_regex_binding_named_capture() {
        let root = AclNode::root();
        let mut home = AclNode::new("/home", 1, "home");
        home.regex_entries
            .push(AclNode::regex(&root, r"(?P<owner>[a-z]+)\.bak").unwrap());
        home.regex_entries.push(AclNode::regex(&root, "[^/]+").unwrap());

        let (index, bound) = home.match_regex("bob.bak").unwrap();
        assert_eq!(index, 0);
        assert_eq!(bound["owner"], "bob");
        assert_eq!(bound[TOKEN], "bob.bak");

        let (index, _) = home.match_regex("carol").unwrap();
        assert_eq!(index, 1);
    }

    #[test]
    fn test_pattern_is_anchored() {
        let root = AclNode::root();
        let node = AclNode::regex(&root, "ab").unwrap();
        let mut parent = AclNode::root();
        parent.regex_entries.push(node);
        assert!(parent.match_regex("xaby").is_none());
        assert!(parent.match_regex("ab").is_some());
    }

    #[test]
    fn test_invalid_pattern() {
        let err = AclNode::regex(&AclNode::root(), "(").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_shadow_roundtrip_keeps_inline_regex() {
        let json = r#"{
            "permissions": {"$EVERYONE": 1},
            "regexEntries": [
                {"pattern": "[^/]+", "permissions": {"%token": 3},
                 "children": {"private": {"permissions": {"%token": 1}, "inherits": false}}}
            ]
        }"#;
        let shadow: ShadowFile = serde_json::from_str(json).unwrap();
        let node = AclNode::from_shadow("/home", 1, "home", shadow.clone()).unwrap();
        assert_eq!(node.regex_entries.len(), 1);
        let regex = &node.regex_entries[0];
        assert!(regex.is_regex && regex.is_special);
        assert!(regex.children["private"].is_special);
        assert_eq!(node.to_shadow(), shadow);
    }

    #[test]
    fn test_inline_children_rejected_on_plain_node() {
        let shadow: ShadowFile =
            serde_json::from_str(r#"{"children": {"x": {}}}"#).unwrap();
        assert!(AclNode::from_shadow("/d", 1, "d", shadow).is_err());
    }
}

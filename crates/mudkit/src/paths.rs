//! Virtual path helpers
//!
//! Paths inside the driver are `/`-separated strings rooted at the mudlib
//! root. They are normalized lexically; nothing here touches a filesystem.

/// Normalize a path: resolve `.` and `..`, collapse repeated slashes, and
/// make it absolute. `..` at the root stays at the root.
pub fn normalize_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            _ => parts.push(part),
        }
    }
    if parts.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", parts.join("/"))
    }
}

/// Resolve `path` against `cwd` when it is relative, then normalize.
pub fn resolve_path(cwd: &str, path: &str) -> String {
    if path.starts_with('/') {
        normalize_path(path)
    } else {
        normalize_path(&format!("{cwd}/{path}"))
    }
}

/// Directory part of a normalized path (`/` for top-level entries).
pub fn parent(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(i) => &path[..i],
    }
}

/// Last segment of a normalized path (empty for `/`).
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or("")
}

/// True when `path` equals `prefix` or lies beneath it.
pub fn is_within(path: &str, prefix: &str) -> bool {
    prefix == "/"
        || path == prefix
        || (path.starts_with(prefix) && path.as_bytes().get(prefix.len()) == Some(&b'/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize_path(""), "/");
        assert_eq!(normalize_path("/a//b/./c/"), "/a/b/c");
        assert_eq!(normalize_path("a/b/../c"), "/a/c");
        assert_eq!(normalize_path("/../.."), "/");
    }

    #[test]
    fn test_resolve() {
        assert_eq!(resolve_path("/realms", "forest/oak.c"), "/realms/forest/oak.c");
        assert_eq!(resolve_path("/realms", "../std"), "/std");
        assert_eq!(resolve_path("/realms", "/abs"), "/abs");
    }

    #[test]
    fn test_parent_and_name() {
        assert_eq!(parent("/realms/oak.c"), "/realms");
        assert_eq!(parent("/motd"), "/");
        assert_eq!(parent("/"), "/");
        assert_eq!(file_name("/realms/oak.c"), "oak.c");
        assert_eq!(file_name("/"), "");
    }

    #[test]
    fn test_is_within() {
        assert!(is_within("/realms/oak.c", "/realms"));
        assert!(is_within("/realms", "/realms"));
        assert!(!is_within("/realmsx/oak.c", "/realms"));
        assert!(is_within("/anything", "/"));
    }
}

//! File-expression (glob) expansion
//!
//! Unquoted arguments holding `*`, `?` or `[...]` are recorded by the parser
//! in [`ParsedCommand::glob_args`]. Expansion happens here, after parsing,
//! because it needs the [`FileManager`]: directory listings go through the
//! mount's security manager, so a player only ever matches names they are
//! allowed to list and see.
//!
//! A pattern that matches nothing is left as written.

use std::collections::HashMap;

use regex::Regex;
use tracing::debug;

use crate::error::{Error, Result};
use crate::fs::{Access, FileManager};
use crate::parser::ParsedCommand;
use crate::paths;

/// Expand every glob argument in `command` and the commands linked to it.
pub async fn expand_file_expressions(
    command: &mut ParsedCommand,
    manager: &FileManager,
    identity: &str,
    cwd: &str,
) -> Result<()> {
    let mut patterns: Vec<String> = Vec::new();
    for cmd in command.walk() {
        for &index in &cmd.glob_args {
            if let Some(arg) = cmd.args.get(index) {
                if !patterns.contains(arg) {
                    patterns.push(arg.clone());
                }
            }
        }
    }
    if patterns.is_empty() {
        return Ok(());
    }

    let mut matches: HashMap<String, Vec<String>> = HashMap::new();
    for pattern in patterns {
        let found = glob(manager, identity, cwd, &pattern).await?;
        debug!(pattern = %pattern, matches = found.len(), "expanded file expression");
        if !found.is_empty() {
            matches.insert(pattern, found);
        }
    }

    command.for_each_mut(&mut |cmd: &mut ParsedCommand| {
        let mut indices = std::mem::take(&mut cmd.glob_args);
        indices.sort_unstable();
        // Back to front so earlier indices stay valid while splicing
        for index in indices.into_iter().rev() {
            let Some(found) = cmd.args.get(index).and_then(|arg| matches.get(arg)) else {
                continue;
            };
            let found = found.clone();
            cmd.args.splice(index..=index, found);
        }
    });
    Ok(())
}

/// Names matching `pattern`, sorted; relative patterns give relative names.
pub async fn glob(manager: &FileManager, identity: &str, cwd: &str, pattern: &str) -> Result<Vec<String>> {
    let absolute = pattern.starts_with('/');
    let segments: Vec<&str> = pattern.split('/').filter(|s| !s.is_empty()).collect();
    let start = if absolute {
        "/".to_string()
    } else {
        paths::normalize_path(cwd)
    };

    // (full path, text shown to the player)
    let mut candidates = vec![(start, String::new())];
    for (i, segment) in segments.iter().enumerate() {
        let last = i + 1 == segments.len();
        let mut next = Vec::new();

        if !has_glob(segment) {
            for (full, shown) in candidates {
                next.push((
                    paths::resolve_path(&full, segment),
                    join_shown(&shown, segment, absolute),
                ));
            }
            candidates = next;
            continue;
        }

        let matcher = glob_to_regex(segment)?;
        for (full, shown) in candidates {
            let entries = match manager.read_directory(identity, &full).await {
                Ok(Access::Granted(entries)) => entries,
                Ok(Access::Denied(_)) | Err(Error::Io(_)) | Err(Error::NoMount(_)) => continue,
                Err(e) => return Err(e),
            };
            for entry in entries {
                if entry.name.starts_with('.') && !segment.starts_with('.') {
                    continue;
                }
                if !matcher.is_match(&entry.name) {
                    continue;
                }
                if !last && !entry.metadata.file_type.is_dir() {
                    continue;
                }
                next.push((
                    crate::acl::child_path(&full, &entry.name),
                    join_shown(&shown, &entry.name, absolute),
                ));
            }
        }
        candidates = next;
        if candidates.is_empty() {
            break;
        }
    }

    if !segments.iter().any(|s| has_glob(s)) {
        return Ok(Vec::new());
    }
    let mut found: Vec<String> = candidates.into_iter().map(|(_, shown)| shown).collect();
    found.sort();
    Ok(found)
}

fn join_shown(shown: &str, name: &str, absolute: bool) -> String {
    if shown.is_empty() && !absolute {
        name.to_string()
    } else {
        format!("{shown}/{name}")
    }
}

fn has_glob(text: &str) -> bool {
    text.contains(['*', '?', '['])
}

/// Compile one path segment of a glob into an anchored regex.
///
/// `*` matches any run, `?` one character, `[...]` a class (`[!...]`
/// negates). An unclosed `[` is literal.
pub fn glob_to_regex(segment: &str) -> Result<Regex> {
    let chars: Vec<char> = segment.chars().collect();
    let mut out = String::from("^");
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' => out.push_str("[^/]*"),
            '?' => out.push_str("[^/]"),
            '[' => {
                // `]` directly after `[` (or `[!`) belongs to the class
                let skip = if chars.get(i + 1) == Some(&'!') { 2 } else { 1 };
                match chars[i + 1..].iter().skip(skip).position(|&c| c == ']') {
                    Some(offset) => {
                        let close = i + 1 + skip + offset;
                        let mut body = &chars[i + 1..close];
                        out.push('[');
                        if body.first() == Some(&'!') {
                            out.push('^');
                            body = &body[1..];
                        }
                        for (j, &c) in body.iter().enumerate() {
                            if c == '-' && j > 0 && j + 1 < body.len() {
                                out.push('-');
                            } else {
                                out.push_str(&regex::escape(c.encode_utf8(&mut [0u8; 4])));
                            }
                        }
                        out.push(']');
                        i = close;
                    }
                    None => out.push_str(r"\["),
                }
            }
            c => out.push_str(&regex::escape(&c.to_string())),
        }
        i += 1;
    }
    out.push('$');
    Regex::new(&out).map_err(|e| Error::Parse(format!("bad file expression {segment:?}: {e}")))
}

//! Shell option toggles consumed by the tokenizer and parser.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};

/// How much of a command line is subject to `!` history substitution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HistoryLevel {
    /// No history expansion.
    Off,
    /// Only a reference that starts the line is expanded.
    LineStart,
    /// References anywhere in the line, plus `^old^new^` quick substitution.
    #[default]
    Full,
}

impl HistoryLevel {
    /// Convert the numeric level (0, 1 or 2) used in configuration.
    pub fn from_level(level: u8) -> Result<Self> {
        match level {
            0 => Ok(Self::Off),
            1 => Ok(Self::LineStart),
            2 => Ok(Self::Full),
            other => Err(Error::Config(format!(
                "history level must be 0, 1 or 2 (got {other})"
            ))),
        }
    }

    pub fn level(self) -> u8 {
        match self {
            Self::Off => 0,
            Self::LineStart => 1,
            Self::Full => 2,
        }
    }
}

/// A shell variable: either a plain value or a function evaluated on use.
#[derive(Clone)]
pub enum ShellVariable {
    Value(String),
    Dynamic(Arc<dyn Fn() -> String + Send + Sync>),
}

impl ShellVariable {
    /// Create a variable computed each time it is expanded.
    pub fn dynamic(f: impl Fn() -> String + Send + Sync + 'static) -> Self {
        Self::Dynamic(Arc::new(f))
    }

    pub fn resolve(&self) -> String {
        match self {
            Self::Value(v) => v.clone(),
            Self::Dynamic(f) => f(),
        }
    }
}

impl fmt::Debug for ShellVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Self::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

impl From<&str> for ShellVariable {
    fn from(value: &str) -> Self {
        Self::Value(value.to_string())
    }
}

impl From<String> for ShellVariable {
    fn from(value: String) -> Self {
        Self::Value(value)
    }
}

/// Grammar and expansion toggles for one parse.
///
/// The shell keeps one value for its session; a command may supply its own
/// (see [`crate::shell::ShellSettings`]) whose toggles then govern the rest of
/// that command's tokens. Aliases, history, variables and `cwd` always come
/// from the session.
#[derive(Debug, Clone)]
pub struct ShellOptions {
    /// `\` escapes the next character. Default: true
    pub allow_escaping: bool,
    /// `<`, `>` and `>>` are redirection operators. Default: true
    pub allow_file_io: bool,
    /// `'...'` and `"..."` are quoted strings. Default: true
    pub allow_quoting: bool,
    /// `|`, `|&`, `&&`, `||`, `;` and `&` are operators. Default: true
    pub allow_pipelining: bool,
    /// A trailing `\` asks for another line instead of failing. Default: true
    pub allow_line_spanning: bool,
    /// Leading words naming an alias are expanded. Default: true
    pub expand_aliases: bool,
    /// `` `...` `` is a subshell placeholder. Default: true
    pub expand_backticks: bool,
    /// `$name` is a variable reference. Default: true
    pub expand_environment: bool,
    /// Unquoted glob arguments are matched against directories. Default: false
    pub expand_file_expressions: bool,
    /// Variable references are replaced by their values. Default: true
    pub expand_variables: bool,
    /// Default: [`HistoryLevel::Full`]
    pub history_level: HistoryLevel,
    pub aliases: HashMap<String, String>,
    /// Prior raw command lines, oldest first.
    pub history: Vec<String>,
    pub variables: HashMap<String, ShellVariable>,
    pub cwd: String,
}

impl Default for ShellOptions {
    fn default() -> Self {
        Self {
            allow_escaping: true,
            allow_file_io: true,
            allow_quoting: true,
            allow_pipelining: true,
            allow_line_spanning: true,
            expand_aliases: true,
            expand_backticks: true,
            expand_environment: true,
            expand_file_expressions: false,
            expand_variables: true,
            history_level: HistoryLevel::Full,
            aliases: HashMap::new(),
            history: Vec::new(),
            variables: HashMap::new(),
            cwd: "/".to_string(),
        }
    }
}

impl ShellOptions {
    /// Create options with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Options for ordinary in-game verbs: plain words, no operators.
    pub fn restricted() -> Self {
        Self {
            allow_escaping: false,
            allow_file_io: false,
            allow_quoting: false,
            allow_pipelining: false,
            allow_line_spanning: false,
            expand_backticks: false,
            expand_environment: false,
            expand_file_expressions: false,
            expand_variables: false,
            ..Self::default()
        }
    }

    /// Set escaping
    pub fn allow_escaping(mut self, on: bool) -> Self {
        self.allow_escaping = on;
        self
    }

    /// Set quoted strings
    pub fn allow_quoting(mut self, on: bool) -> Self {
        self.allow_quoting = on;
        self
    }

    /// Set redirection
    pub fn allow_file_io(mut self, on: bool) -> Self {
        self.allow_file_io = on;
        self
    }

    /// Set pipelines and command lists
    pub fn allow_pipelining(mut self, on: bool) -> Self {
        self.allow_pipelining = on;
        self
    }

    /// Set line continuation
    pub fn allow_line_spanning(mut self, on: bool) -> Self {
        self.allow_line_spanning = on;
        self
    }

    /// Set alias expansion
    pub fn expand_aliases(mut self, on: bool) -> Self {
        self.expand_aliases = on;
        self
    }

    /// Set backtick recognition
    pub fn expand_backticks(mut self, on: bool) -> Self {
        self.expand_backticks = on;
        self
    }

    /// Set `$name` recognition
    pub fn expand_environment(mut self, on: bool) -> Self {
        self.expand_environment = on;
        self
    }

    /// Set glob expansion
    pub fn expand_file_expressions(mut self, on: bool) -> Self {
        self.expand_file_expressions = on;
        self
    }

    /// Set variable substitution
    pub fn expand_variables(mut self, on: bool) -> Self {
        self.expand_variables = on;
        self
    }

    /// Set history level
    pub fn history_level(mut self, level: HistoryLevel) -> Self {
        self.history_level = level;
        self
    }

    /// Define an alias
    pub fn alias(mut self, name: impl Into<String>, template: impl Into<String>) -> Self {
        self.aliases.insert(name.into(), template.into());
        self
    }

    /// Define a variable
    pub fn variable(mut self, name: impl Into<String>, value: impl Into<ShellVariable>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    /// Replace the history list
    pub fn history<I, S>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.history = entries.into_iter().map(Into::into).collect();
        self
    }

    /// Set the working directory
    pub fn cwd(mut self, cwd: impl Into<String>) -> Self {
        self.cwd = cwd.into();
        self
    }

    /// Toggles from `command`, session state (aliases, history, variables,
    /// cwd) from `self`.
    pub fn for_command(&self, command: &ShellOptions) -> ShellOptions {
        ShellOptions {
            allow_escaping: command.allow_escaping,
            allow_file_io: command.allow_file_io,
            allow_quoting: command.allow_quoting,
            allow_pipelining: command.allow_pipelining,
            allow_line_spanning: command.allow_line_spanning,
            expand_aliases: command.expand_aliases,
            expand_backticks: command.expand_backticks,
            expand_environment: command.expand_environment,
            expand_file_expressions: command.expand_file_expressions,
            expand_variables: command.expand_variables,
            history_level: command.history_level,
            aliases: self.aliases.clone(),
            history: self.history.clone(),
            variables: self.variables.clone(),
            cwd: self.cwd.clone(),
        }
    }

    /// True when `!` references may be expanded at all.
    pub fn history_enabled(&self) -> bool {
        self.history_level != HistoryLevel::Off && !self.history.is_empty()
    }

    /// Look up a single-character alias (such as `'` for `say`).
    pub fn char_alias(&self, ch: char) -> Option<&str> {
        if !self.expand_aliases || ch.is_alphanumeric() {
            return None;
        }
        let mut buf = [0u8; 4];
        self.aliases
            .get(ch.encode_utf8(&mut buf) as &str)
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let opts = ShellOptions::default();
        assert!(opts.allow_pipelining);
        assert!(!opts.expand_file_expressions);
        assert_eq!(opts.history_level, HistoryLevel::Full);
        assert_eq!(opts.cwd, "/");
    }

    #[test]
    fn test_history_level_from_level() {
        assert_eq!(HistoryLevel::from_level(1).unwrap(), HistoryLevel::LineStart);
        assert!(matches!(HistoryLevel::from_level(3), Err(Error::Config(_))));
        assert_eq!(HistoryLevel::Full.level(), 2);
    }

    #[test]
    fn test_for_command_keeps_session_state() {
        let session = ShellOptions::default()
            .alias("l", "look")
            .history(["north"])
            .cwd("/realms");
        let merged = session.for_command(&ShellOptions::restricted());
        assert!(!merged.allow_pipelining);
        assert!(!merged.allow_quoting);
        assert_eq!(merged.aliases.get("l").map(String::as_str), Some("look"));
        assert_eq!(merged.history, vec!["north".to_string()]);
        assert_eq!(merged.cwd, "/realms");
    }

    #[test]
    fn test_char_alias() {
        let opts = ShellOptions::default().alias("'", "say").alias("l", "look");
        assert_eq!(opts.char_alias('\''), Some("say"));
        assert_eq!(opts.char_alias('l'), None);
        assert_eq!(opts.expand_aliases(false).char_alias('\''), None);
    }

    #[test]
    fn test_dynamic_variable() {
        let var = ShellVariable::dynamic(|| "42".to_string());
        assert_eq!(var.resolve(), "42");
        assert_eq!(format!("{:?}", var), "Dynamic(..)");
    }
}

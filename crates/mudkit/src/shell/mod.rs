//! Interactive shell session
//!
//! A [`Shell`] holds one player's session state (aliases, variables,
//! history, working directory) and turns raw input lines into
//! [`ParsedCommand`] trees. Execution belongs to the caller: the shell only
//! decides what a line means.
//!
//! # Example
//!
//! ```rust
//! use mudkit::shell::{Shell, ShellInput};
//!
//! let mut shell = Shell::builder().alias("l", "look $*").build();
//!
//! let ShellInput::Command(cmd) = shell.process_input("l north")? else {
//!     panic!("expected a command");
//! };
//! assert_eq!(cmd.verb, "look");
//! assert_eq!(cmd.args, vec!["north"]);
//!
//! // `!!` repeats the expanded line
//! let ShellInput::Command(again) = shell.process_input("!!")? else {
//!     panic!("expected a command");
//! };
//! assert_eq!(again.verb, "look");
//! # Ok::<(), mudkit::Error>(())
//! ```

pub mod expand;
pub mod options;

pub use options::{HistoryLevel, ShellOptions, ShellVariable};

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::error::{Error, Result};
use crate::fs::FileManager;
use crate::logging_impl::{LogConfig, format_line_for_log};
use crate::parser::{CommandParser, ParsedCommand, Substitution};

/// Default number of history entries kept.
pub const DEFAULT_MAX_HISTORY: usize = 100;

/// Per-verb shell options.
///
/// A verb with settings becomes a [`ShellCommand`](crate::parser::CommandType)
/// and its returned toggles govern the rest of its own arguments.
pub trait ShellSettings: Send + Sync {
    fn shell_settings(&self, verb: &str) -> Option<ShellOptions>;
}

impl ShellSettings for HashMap<String, ShellOptions> {
    fn shell_settings(&self, verb: &str) -> Option<ShellOptions> {
        self.get(verb).cloned()
    }
}

/// What one line of input amounted to.
#[derive(Debug, Clone, PartialEq)]
pub enum ShellInput {
    /// Nothing but whitespace
    Empty,
    /// The line ended in a continuation; more input is needed
    Incomplete,
    /// A `:p` history modifier asked for the expanded line to be shown
    PrintOnly(String),
    Command(ParsedCommand),
}

/// Builder for [`Shell`].
pub struct ShellBuilder {
    name: String,
    identity: String,
    options: ShellOptions,
    settings: Option<Arc<dyn ShellSettings>>,
    max_history: usize,
    log_config: LogConfig,
}

impl Default for ShellBuilder {
    fn default() -> Self {
        Self {
            name: "mudsh".to_string(),
            identity: "guest".to_string(),
            options: ShellOptions::default(),
            settings: None,
            max_history: DEFAULT_MAX_HISTORY,
            log_config: LogConfig::default(),
        }
    }
}

impl ShellBuilder {
    /// Name used to prefix error messages. Default: `mudsh`
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Identity file operations run as. Default: `guest`
    pub fn identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = identity.into();
        self
    }

    /// Session options
    pub fn options(mut self, options: ShellOptions) -> Self {
        self.options = options;
        self
    }

    /// Per-verb options
    pub fn settings(mut self, settings: impl ShellSettings + 'static) -> Self {
        self.settings = Some(Arc::new(settings));
        self
    }

    pub fn alias(mut self, name: impl Into<String>, template: impl Into<String>) -> Self {
        self.options.aliases.insert(name.into(), template.into());
        self
    }

    pub fn variable(mut self, name: impl Into<String>, value: impl Into<ShellVariable>) -> Self {
        self.options.variables.insert(name.into(), value.into());
        self
    }

    /// History entries kept, oldest dropped first. Default: 100
    pub fn max_history(mut self, max: usize) -> Self {
        self.max_history = max;
        self
    }

    pub fn log_config(mut self, config: LogConfig) -> Self {
        self.log_config = config;
        self
    }

    pub fn build(self) -> Shell {
        Shell {
            name: self.name,
            identity: self.identity,
            options: self.options,
            settings: self.settings,
            max_history: self.max_history,
            log_config: self.log_config,
            pending: None,
            last_substitution: None,
        }
    }
}

/// One player's shell session.
pub struct Shell {
    name: String,
    identity: String,
    options: ShellOptions,
    settings: Option<Arc<dyn ShellSettings>>,
    max_history: usize,
    log_config: LogConfig,
    /// Lines waiting for a continuation
    pending: Option<String>,
    last_substitution: Option<Substitution>,
}

impl Default for Shell {
    fn default() -> Self {
        ShellBuilder::default().build()
    }
}

impl Shell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> ShellBuilder {
        ShellBuilder::default()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn options(&self) -> &ShellOptions {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut ShellOptions {
        &mut self.options
    }

    /// Expanded lines, oldest first.
    pub fn history(&self) -> &[String] {
        &self.options.history
    }

    /// True while a continuation line is expected.
    pub fn is_continuing(&self) -> bool {
        self.pending.is_some()
    }

    pub fn last_substitution(&self) -> Option<&Substitution> {
        self.last_substitution.as_ref()
    }

    pub fn set_variable(&mut self, name: impl Into<String>, value: impl Into<ShellVariable>) {
        let name = name.into();
        let value = value.into();
        if let ShellVariable::Value(text) = &value {
            debug!(name = %name, value = %self.log_config.variable_for_log(&name, text), "set variable");
        }
        self.options.variables.insert(name, value);
    }

    pub fn unset_variable(&mut self, name: &str) -> Option<ShellVariable> {
        self.options.variables.remove(name)
    }

    pub fn set_alias(&mut self, name: impl Into<String>, template: impl Into<String>) {
        self.options.aliases.insert(name.into(), template.into());
    }

    pub fn remove_alias(&mut self, name: &str) -> Option<String> {
        self.options.aliases.remove(name)
    }

    pub fn set_cwd(&mut self, cwd: &str) {
        self.options.cwd = crate::paths::resolve_path(&self.options.cwd, cwd);
    }

    /// Interpret one line of input.
    ///
    /// A line ending in `\` is held and joined with the next one. Every line
    /// that parses is added to history in its expanded form, including
    /// print-only lines. Errors leave history untouched.
    pub fn process_input(&mut self, line: &str) -> Result<ShellInput> {
        let text = match self.pending.take() {
            Some(mut pending) => {
                pending.push('\n');
                pending.push_str(line);
                pending
            }
            None => line.to_string(),
        };
        debug!(line = %format_line_for_log(&text, &self.log_config), "processing input");

        let mut parser = CommandParser::new(text.as_str(), self.options.clone())
            .with_last_substitution(self.last_substitution.clone());
        if let Some(settings) = self.settings.as_deref() {
            parser = parser.with_settings(settings);
        }
        let parsed = match parser.parse_line() {
            Ok(parsed) => parsed,
            Err(Error::Incomplete) => {
                self.pending = Some(text);
                return Ok(ShellInput::Incomplete);
            }
            Err(e) => return Err(e),
        };

        if parsed.last_substitution.is_some() {
            self.last_substitution = parsed.last_substitution;
        }
        if !parsed.expanded.trim().is_empty() {
            self.push_history(parsed.expanded.clone());
        }

        if parsed.print_only {
            return Ok(ShellInput::PrintOnly(parsed.expanded));
        }
        Ok(match parsed.command {
            Some(command) => ShellInput::Command(command),
            None => ShellInput::Empty,
        })
    }

    /// Drop a held continuation.
    pub fn cancel_continuation(&mut self) {
        self.pending = None;
    }

    fn push_history(&mut self, line: String) {
        let history = &mut self.options.history;
        history.push(line);
        if history.len() > self.max_history {
            let excess = history.len() - self.max_history;
            history.drain(..excess);
        }
    }

    /// Expand glob arguments through `manager` as this shell's identity.
    pub async fn expand_file_expressions(&self, command: &mut ParsedCommand, manager: &FileManager) -> Result<()> {
        expand::expand_file_expressions(command, manager, &self.identity, &self.options.cwd).await
    }

    /// Format an error for the player, prefixed with the shell name.
    pub fn format_error(&self, error: &Error) -> String {
        format!("{}: {}", self.name, error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::CommandType;
    use pretty_assertions::assert_eq;

    fn command(shell: &mut Shell, line: &str) -> ParsedCommand {
        match shell.process_input(line).unwrap() {
            ShellInput::Command(cmd) => cmd,
            other => panic!("expected a command, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_line() {
        let mut shell = Shell::new();
        assert_eq!(shell.process_input("   ").unwrap(), ShellInput::Empty);
        assert!(shell.history().is_empty());
    }

    #[test]
    fn test_history_recorded_expanded() {
        let mut shell = Shell::new();
        command(&mut shell, "cd /realms");
        command(&mut shell, "ls");
        command(&mut shell, "!cd");
        assert_eq!(shell.history(), ["cd /realms", "ls", "cd /realms"]);
    }

    #[test]
    fn test_history_cap() {
        let mut shell = Shell::builder().max_history(2).build();
        for line in ["one", "two", "three"] {
            command(&mut shell, line);
        }
        assert_eq!(shell.history(), ["two", "three"]);
    }

    #[test]
    fn test_continuation() {
        let mut shell = Shell::new();
        assert_eq!(shell.process_input("say hello \\").unwrap(), ShellInput::Incomplete);
        assert!(shell.is_continuing());
        let cmd = command(&mut shell, "world");
        assert_eq!(cmd.verb, "say");
        assert_eq!(cmd.args, vec!["hello", "world"]);
        assert!(!shell.is_continuing());
    }

    #[test]
    fn test_print_only() {
        let mut shell = Shell::new();
        command(&mut shell, "look north");
        let input = shell.process_input("!!:p").unwrap();
        assert_eq!(input, ShellInput::PrintOnly("look north".to_string()));
        assert_eq!(shell.history().len(), 2);
    }

    #[test]
    fn test_error_leaves_history() {
        let mut shell = Shell::new();
        let err = shell.process_input("say 'oops").unwrap_err();
        assert!(err.is_syntax());
        assert!(shell.history().is_empty());
        assert!(shell.format_error(&err).starts_with("mudsh: "));
    }

    #[test]
    fn test_settings_restrict_verb() {
        let mut settings = HashMap::new();
        settings.insert("say".to_string(), ShellOptions::restricted());
        let mut shell = Shell::builder().settings(settings).build();

        let cmd = command(&mut shell, "say a | b");
        assert_eq!(cmd.cmd_type, CommandType::ShellCommand);
        assert_eq!(cmd.args, vec!["a", "|", "b"]);
        assert!(cmd.next_command.is_none());
    }

    #[test]
    fn test_variables() {
        let mut shell = Shell::new();
        shell.set_variable("target", "orc");
        let cmd = command(&mut shell, "kill $target");
        assert_eq!(cmd.args, vec!["orc"]);
        assert!(shell.unset_variable("target").is_some());
    }

    #[test]
    fn test_set_cwd() {
        let mut shell = Shell::new();
        shell.set_cwd("realms/forest");
        shell.set_cwd("..");
        assert_eq!(shell.options().cwd, "/realms");
    }
}

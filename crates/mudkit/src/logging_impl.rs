//! Logging infrastructure for Mudkit
//!
//! Player input is logged through the helpers here so that what a player
//! types at a password prompt, or stores in a shell variable, does not land
//! in server logs by accident.
//!
//! # Log Levels
//!
//! - **WARN**: Access denials, ACL nodes synthesized for missing directories
//! - **INFO**: Mount table changes
//! - **DEBUG**: Parsed commands, ACL resolution, shell session events
//! - **TRACE**: Individual tokens

use std::borrow::Cow;
use std::collections::HashSet;

/// Configuration for logging behavior
///
/// By default raw command lines are not logged, only their size, and
/// variables whose names look sensitive are redacted.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Whether to redact sensitive data from logs (default: true)
    pub redact_sensitive: bool,

    /// Variable name fragments to redact (case-insensitive)
    pub redact_variables: HashSet<String>,

    /// Whether to include raw command lines in logs (default: false)
    pub log_command_lines: bool,

    /// Maximum length of logged values before truncation (default: 200)
    pub max_value_length: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        let redact_variables = ["PASSWORD", "PASSWD", "SECRET", "TOKEN", "KEY", "CREDENTIAL", "AUTH"]
            .into_iter()
            .map(String::from)
            .collect();
        Self {
            redact_sensitive: true,
            redact_variables,
            log_command_lines: false,
            max_value_length: 200,
        }
    }
}

impl LogConfig {
    /// Create a new log configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Disable sensitive data redaction
    ///
    /// # Warning
    ///
    /// This may expose passwords in logs. Only use in trusted debugging
    /// environments.
    pub fn unsafe_disable_redaction(mut self) -> Self {
        self.redact_sensitive = false;
        self
    }

    /// Add a variable name fragment to redact
    pub fn redact_variable(mut self, pattern: &str) -> Self {
        self.redact_variables.insert(pattern.to_uppercase());
        self
    }

    /// Log raw command lines
    ///
    /// # Warning
    ///
    /// Lines typed at prompts may contain passwords.
    pub fn unsafe_log_command_lines(mut self) -> Self {
        self.log_command_lines = true;
        self
    }

    /// Set maximum length for logged values
    pub fn max_value_length(mut self, len: usize) -> Self {
        self.max_value_length = len;
        self
    }

    /// Check if a variable name should be redacted
    pub fn should_redact_variable(&self, name: &str) -> bool {
        if !self.redact_sensitive {
            return false;
        }
        let upper = name.to_uppercase();
        self.redact_variables.iter().any(|pattern| upper.contains(pattern))
    }

    /// Format a variable value for logging, redacted when its name is
    /// sensitive.
    pub fn variable_for_log<'a>(&self, name: &str, value: &'a str) -> Cow<'a, str> {
        if self.should_redact_variable(name) {
            Cow::Borrowed("[REDACTED]")
        } else {
            self.truncate(value)
        }
    }

    /// Truncate value if it exceeds max length
    ///
    /// Backs off to a char boundary so multi-byte input never panics.
    fn truncate<'a>(&self, value: &'a str) -> Cow<'a, str> {
        if value.len() <= self.max_value_length {
            Cow::Borrowed(value)
        } else {
            let mut end = self.max_value_length;
            while end > 0 && !value.is_char_boundary(end) {
                end -= 1;
            }
            Cow::Owned(format!(
                "{}...[truncated {} bytes]",
                &value[..end],
                value.len() - end
            ))
        }
    }
}

/// Escape characters that could forge extra log lines.
pub fn sanitize_for_log(input: &str) -> String {
    input
        .replace('\n', "\\n")
        .replace('\r', "\\r")
        .replace('\t', "\\t")
        .chars()
        .filter(|c| !c.is_control() || *c == ' ')
        .collect()
}

/// Format a command line for logging
pub fn format_line_for_log(line: &str, config: &LogConfig) -> String {
    if !config.log_command_lines {
        return format!("[line: {} bytes]", line.len());
    }

    let sanitized = sanitize_for_log(line);
    config.truncate(&sanitized).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_redaction() {
        let config = LogConfig::new();
        assert!(config.should_redact_variable("password"));
        assert!(config.should_redact_variable("api_key"));
        assert!(!config.should_redact_variable("hp"));
        assert_eq!(config.variable_for_log("PASSWORD", "hunter2"), "[REDACTED]");
        assert_eq!(config.variable_for_log("hp", "42"), "42");
    }

    #[test]
    fn test_disable_redaction() {
        let config = LogConfig::new().unsafe_disable_redaction();
        assert!(!config.should_redact_variable("password"));
    }

    #[test]
    fn test_truncation() {
        let config = LogConfig::new().max_value_length(20);
        let long_value = "a".repeat(50);
        let truncated = config.truncate(&long_value);
        assert!(truncated.starts_with(&"a".repeat(20)));
        assert!(truncated.contains("truncated 30 bytes"));
    }

    #[test]
    fn test_truncation_multibyte() {
        let config = LogConfig::new().max_value_length(3);
        // 'é' is two bytes; byte 3 falls inside the second one
        let truncated = config.truncate("éé");
        assert!(truncated.starts_with('é'));
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize_for_log("say hi\nINFO forged"), "say hi\\nINFO forged");
        assert_eq!(sanitize_for_log("a\x07b"), "ab");
    }

    #[test]
    fn test_format_line() {
        let hidden = LogConfig::new();
        assert_eq!(format_line_for_log("password hunter2", &hidden), "[line: 16 bytes]");

        let shown = LogConfig::new().unsafe_log_command_lines();
        assert_eq!(format_line_for_log("look\tnorth", &shown), "look\\tnorth");
    }
}

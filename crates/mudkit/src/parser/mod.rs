//! Command line parser
//!
//! Pulls tokens from the [`Tokenizer`] one at a time and groups them into
//! [`ParsedCommand`]s. Each command closes on a joining operator; the
//! resulting `(command, operator)` pairs are folded into a tree by
//! [`link::link`].
//!
//! The parser feeds the tokenizer the options of the command being read, so
//! a verb that registers restricted [`ShellOptions`] (via
//! [`ShellSettings`]) turns operators into plain text for the rest of its
//! own arguments.

pub mod command;
pub mod history;
pub mod lexer;
pub mod link;
pub mod span;
pub mod tokens;

pub use command::{CommandType, Operator, ParsedCommand, PipeTarget, Redirect, RedirectKind};
pub use history::Substitution;
pub use lexer::{LexContext, Tokenizer, tokenize};
pub use span::Position;
pub use tokens::{Token, TokenSource, TokenType};

use tracing::debug;

use crate::error::{Error, Result};
use crate::shell::{ShellOptions, ShellSettings};

/// Where the parser is within the current command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseState {
    /// No command is open; whitespace is skipped until a verb appears
    AwaitingVerb,
    /// A verb has been read and arguments are being collected
    InCommand,
    /// A redirection operator wants its filename
    AwaitingRedirectTarget,
    /// Input is exhausted
    Done,
}

/// Everything learned from parsing one line.
#[derive(Debug, Clone)]
pub struct ParsedLine {
    /// Head of the command tree, `None` for a blank line
    pub command: Option<ParsedCommand>,
    /// The line with history references resolved
    pub expanded: String,
    /// A `:p` modifier asked for the line to be shown, not run
    pub print_only: bool,
    pub last_substitution: Option<Substitution>,
}

struct PendingRedirect {
    token_index: usize,
    kind: RedirectKind,
    target: String,
    started: bool,
}

struct OpenCommand {
    command: ParsedCommand,
    options: ShellOptions,
    redirect: Option<PendingRedirect>,
}

/// Parser for one command line.
pub struct CommandParser<'a> {
    tokenizer: Tokenizer,
    options: ShellOptions,
    settings: Option<&'a dyn ShellSettings>,
    state: ParseState,
    open: Option<OpenCommand>,
}

impl<'a> CommandParser<'a> {
    /// Create a parser using `options` as the session options.
    pub fn new(line: impl Into<String>, options: ShellOptions) -> Self {
        Self {
            tokenizer: Tokenizer::new(line),
            options,
            settings: None,
            state: ParseState::AwaitingVerb,
            open: None,
        }
    }

    /// Look up per-verb options through `settings`.
    pub fn with_settings(mut self, settings: &'a dyn ShellSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Seed the substitution reused by `:&` and `:g&`.
    pub fn with_last_substitution(mut self, sub: Option<Substitution>) -> Self {
        self.tokenizer = self.tokenizer.with_last_substitution(sub);
        self
    }

    pub fn state(&self) -> ParseState {
        self.state
    }

    /// Parse the line into a command tree.
    pub fn parse(self) -> Result<Option<ParsedCommand>> {
        Ok(self.parse_line()?.command)
    }

    /// Parse the line, also returning the expanded text and history state.
    pub fn parse_line(mut self) -> Result<ParsedLine> {
        let mut pairs = Vec::new();
        while let Some((cmd, op)) = self.next_command()? {
            let last = op.is_none();
            pairs.push((cmd, op));
            if last {
                break;
            }
        }
        self.state = ParseState::Done;

        if let Some((_, Some(op))) = pairs.last() {
            return Err(Error::Parse(format!("unexpected end of input after `{op}`")));
        }

        let command = link::link(pairs)?;
        if let Some(head) = &command {
            debug!(
                verb = %head.verb,
                commands = head.walk().len(),
                "parsed command line"
            );
        }
        Ok(ParsedLine {
            command,
            expanded: self.tokenizer.expanded().to_string(),
            print_only: self.tokenizer.print_only(),
            last_substitution: self.tokenizer.last_substitution().cloned(),
        })
    }

    /// Read the next command and the operator that closed it.
    ///
    /// Returns `None` once input is exhausted with no command open.
    pub fn next_command(&mut self) -> Result<Option<(ParsedCommand, Option<Operator>)>> {
        if self.state == ParseState::Done {
            return Ok(None);
        }
        self.state = ParseState::AwaitingVerb;
        loop {
            let ctx = match &self.open {
                Some(open) => LexContext {
                    in_command: true,
                    expression: open.command.cmd_type == CommandType::ExpressionCommand,
                },
                None => LexContext::default(),
            };
            let options = self.open.as_ref().map_or(&self.options, |open| &open.options);
            let Some(token) = self.tokenizer.next_token(options, ctx)? else {
                return self.end_of_input();
            };

            match self.state {
                ParseState::AwaitingVerb => self.await_verb(token)?,
                ParseState::InCommand => {
                    if let Some(op) = self.in_command(token)? {
                        let cmd = self.close()?;
                        return Ok(Some((cmd, Some(op))));
                    }
                }
                ParseState::AwaitingRedirectTarget => self.redirect_target(token)?,
                ParseState::Done => return Ok(None),
            }
        }
    }

    fn await_verb(&mut self, token: Token) -> Result<()> {
        match token.token_type {
            TokenType::Whitespace | TokenType::History | TokenType::HistorySubstitution => Ok(()),
            _ if token.is_verb_class() => {
                self.open = Some(self.open_command(token));
                self.state = ParseState::InCommand;
                Ok(())
            }
            _ => Err(unexpected(self.tokenizer.source(), &token)),
        }
    }

    fn open_command(&self, mut token: Token) -> OpenCommand {
        if token.is(TokenType::Variable) {
            return OpenCommand {
                command: ParsedCommand::new(token, CommandType::ExpressionCommand),
                options: self.options.clone(),
                redirect: None,
            };
        }

        if token.is(TokenType::Word)
            && self.options.expand_aliases
            && self.options.aliases.contains_key(&token.value)
        {
            token.token_type = TokenType::Alias;
        }
        // An alias is looked up under the verb its template starts with
        let lookup = if token.is(TokenType::Alias) {
            self.options
                .aliases
                .get(&token.value)
                .and_then(|t| t.split_whitespace().next())
                .unwrap_or(&token.value)
                .to_string()
        } else {
            token.value.clone()
        };

        let (cmd_type, options) = match self.settings.and_then(|s| s.shell_settings(&lookup)) {
            Some(command_options) => (
                CommandType::ShellCommand,
                self.options.for_command(&command_options),
            ),
            None => (CommandType::MudCommand, self.options.clone()),
        };
        debug!(verb = %lookup, ?cmd_type, "opened command");
        OpenCommand {
            command: ParsedCommand::new(token, cmd_type),
            options,
            redirect: None,
        }
    }

    fn in_command(&mut self, token: Token) -> Result<Option<Operator>> {
        let open = self
            .open
            .as_mut()
            .ok_or_else(|| Error::Internal("argument with no open command".to_string()))?;
        match token.token_type {
            TokenType::History | TokenType::HistorySubstitution => Ok(None),
            TokenType::Operator => {
                if let Some(kind) = RedirectKind::from_token(&token.value) {
                    open.command.tokens.push(token);
                    open.redirect = Some(PendingRedirect {
                        token_index: open.command.tokens.len() - 1,
                        kind,
                        target: String::new(),
                        started: false,
                    });
                    self.state = ParseState::AwaitingRedirectTarget;
                    return Ok(None);
                }
                match token.value.as_str() {
                    "=" => {
                        open.command.tokens.push(token);
                        Ok(None)
                    }
                    "&" => Err(Error::Unsupported("background execution".to_string())),
                    text => match Operator::from_token(text) {
                        Some(op) => Ok(Some(op)),
                        None => Err(unexpected(self.tokenizer.source(), &token)),
                    },
                }
            }
            _ => {
                open.command.tokens.push(token);
                Ok(None)
            }
        }
    }

    fn redirect_target(&mut self, token: Token) -> Result<()> {
        let open = self
            .open
            .as_mut()
            .ok_or_else(|| Error::Internal("redirect with no open command".to_string()))?;
        let started = open.redirect.as_ref().is_some_and(|r| r.started);
        match token.token_type {
            TokenType::History | TokenType::HistorySubstitution => Ok(()),
            TokenType::Whitespace if !started => Ok(()),
            TokenType::Whitespace => {
                complete_redirect(open);
                open.command.tokens.push(token);
                self.state = ParseState::InCommand;
                Ok(())
            }
            TokenType::Operator if !started => Err(unexpected(self.tokenizer.source(), &token)),
            TokenType::Operator => {
                complete_redirect(open);
                self.tokenizer.push_back(token);
                self.state = ParseState::InCommand;
                Ok(())
            }
            _ => {
                if let Some(pending) = open.redirect.as_mut() {
                    let text = if token.is(TokenType::String) {
                        token.value.clone()
                    } else {
                        token.raw_text()
                    };
                    pending.target.push_str(&text);
                    pending.started = true;
                }
                Ok(())
            }
        }
    }

    fn end_of_input(&mut self) -> Result<Option<(ParsedCommand, Option<Operator>)>> {
        match self.state {
            ParseState::AwaitingVerb | ParseState::Done => {
                self.state = ParseState::Done;
                Ok(None)
            }
            ParseState::InCommand => {
                self.state = ParseState::Done;
                Ok(Some((self.close()?, None)))
            }
            ParseState::AwaitingRedirectTarget => {
                let started = self
                    .open
                    .as_ref()
                    .and_then(|o| o.redirect.as_ref())
                    .is_some_and(|r| r.started);
                if !started {
                    return Err(Error::Parse(
                        "near unexpected token `newline`".to_string(),
                    ));
                }
                if let Some(open) = self.open.as_mut() {
                    complete_redirect(open);
                }
                self.state = ParseState::Done;
                Ok(Some((self.close()?, None)))
            }
        }
    }

    /// Close the open command and compile it with its own options.
    fn close(&mut self) -> Result<ParsedCommand> {
        let open = self
            .open
            .take()
            .ok_or_else(|| Error::Internal("no command to close".to_string()))?;
        let mut command = open.command;
        command.compile(&open.options);
        debug!(
            verb = %command.verb,
            args = command.args.len(),
            cmd_type = ?command.cmd_type,
            "closed command"
        );
        Ok(command)
    }
}

fn complete_redirect(open: &mut OpenCommand) {
    if let Some(pending) = open.redirect.take() {
        if let Some(token) = open.command.tokens.get_mut(pending.token_index) {
            token.redirect_target = Some(pending.target.clone());
        }
        open.command.redirects.push(Redirect {
            kind: pending.kind,
            target: pending.target,
        });
    }
}

fn unexpected(source: &str, token: &Token) -> Error {
    let message = format!("near unexpected token `{}`", token.raw_text());
    match token.source {
        TokenSource::Input => {
            let pos = Position::at_offset(source, token.start);
            Error::parse_at(message, pos.line, pos.column)
        }
        TokenSource::History => Error::Parse(message),
    }
}

/// Parse a line with session options and no per-verb settings.
pub fn parse(line: &str, options: &ShellOptions) -> Result<Option<ParsedCommand>> {
    CommandParser::new(line, options.clone()).parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn parse_default(line: &str) -> Option<ParsedCommand> {
        parse(line, &ShellOptions::default()).unwrap()
    }

    #[test]
    fn test_parse_simple_command() {
        let cmd = parse_default("get sword from chest").unwrap();
        assert_eq!(cmd.verb, "get");
        assert_eq!(cmd.args, vec!["sword", "from", "chest"]);
        assert_eq!(cmd.cmd_type, CommandType::MudCommand);
        assert_eq!(cmd.tokens[0].value, "get");
    }

    #[test]
    fn test_blank_line() {
        assert!(parse_default("").is_none());
        assert!(parse_default("   ").is_none());
    }

    #[test]
    fn test_parse_redirect_out() {
        let cmd = parse_default("echo hello > out.txt").unwrap();
        assert_eq!(cmd.args, vec!["hello"]);
        assert_eq!(
            cmd.redirects,
            vec![Redirect {
                kind: RedirectKind::Output,
                target: "out.txt".to_string()
            }]
        );
        let op = cmd.tokens.iter().find(|t| t.is_operator(">")).unwrap();
        assert_eq!(op.redirect_target.as_deref(), Some("out.txt"));
    }

    #[test]
    fn test_parse_redirect_append_then_pipe() {
        let cmd = parse_default("cat <in >>log| wc").unwrap();
        assert_eq!(cmd.redirects.len(), 2);
        assert_eq!(cmd.redirects[0].kind, RedirectKind::Input);
        assert_eq!(cmd.redirects[1].target, "log");
        assert_eq!(cmd.pipe_target, Some(PipeTarget::Stdout));
        assert_eq!(cmd.next_command.as_ref().unwrap().verb, "wc");
    }

    #[test]
    fn test_redirect_without_target() {
        let err = parse("echo >", &ShellOptions::default()).unwrap_err();
        assert!(err.is_syntax());
    }

    #[test]
    fn test_leading_operator() {
        let err = parse("&& look", &ShellOptions::default()).unwrap_err();
        assert!(matches!(err, Error::ParseAt { line: 1, column: 1, .. }));
    }

    #[test]
    fn test_trailing_operator() {
        let err = parse("look &&", &ShellOptions::default()).unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }

    #[test]
    fn test_background_unsupported() {
        let err = parse("sleep 5 &", &ShellOptions::default()).unwrap_err();
        assert!(matches!(err, Error::Unsupported(_)));
    }

    #[test]
    fn test_expression_command() {
        let cmd = parse_default("$gold = 100").unwrap();
        assert_eq!(cmd.cmd_type, CommandType::ExpressionCommand);
        assert!(cmd.tokens[0].is(TokenType::Variable));
        assert_eq!(cmd.args, vec!["=", "100"]);
    }

    #[test]
    fn test_shell_settings_restrict_operators() {
        let mut settings = HashMap::new();
        settings.insert("say".to_string(), ShellOptions::restricted());
        let cmd = CommandParser::new("say a|b && c", ShellOptions::default())
            .with_settings(&settings)
            .parse()
            .unwrap()
            .unwrap();
        assert_eq!(cmd.cmd_type, CommandType::ShellCommand);
        assert_eq!(cmd.args, vec!["a|b", "&&", "c"]);
        assert!(cmd.next_command.is_none());
    }

    #[test]
    fn test_word_alias_retagged() {
        let opts = ShellOptions::default().alias("l", "look $*");
        let cmd = parse("l north", &opts).unwrap().unwrap();
        assert!(cmd.tokens[0].is(TokenType::Alias));
        assert_eq!(cmd.verb, "look");
        assert_eq!(cmd.args, vec!["north"]);
    }

    #[test]
    fn test_parse_line_reports_expansion() {
        let opts = ShellOptions::default().history(["cd /tmp", "ls -la"]);
        let line = CommandParser::new("!!:p", opts).parse_line().unwrap();
        assert!(line.print_only);
        assert_eq!(line.expanded, "ls -la");
    }

    #[test]
    fn test_next_command_state_machine() {
        let mut parser = CommandParser::new("a; b", ShellOptions::default());
        let (first, op) = parser.next_command().unwrap().unwrap();
        assert_eq!(first.verb, "a");
        assert_eq!(op, Some(Operator::Sequence));
        let (second, op) = parser.next_command().unwrap().unwrap();
        assert_eq!(second.verb, "b");
        assert_eq!(op, None);
        assert_eq!(parser.state(), ParseState::Done);
        assert!(parser.next_command().unwrap().is_none());
    }
}

//! Parsed command representation
//!
//! A [`ParsedCommand`] is one executable unit: a verb, its arguments and the
//! tokens they came from. Commands joined by operators form a tree through
//! the owned `conditions`, `alternate` and `next_command` links; see
//! [`super::link`] for how the tree is shaped.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::Serialize;

use super::tokens::{Token, TokenType};
use crate::shell::ShellOptions;

/// `$N`, `$*` or `$name` inside an alias template.
static TEMPLATE_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$(?:(\d+)|(\*)|([A-Za-z_][A-Za-z0-9_]*))")
        .expect("template reference pattern is valid")
});

/// How a command was classified when its verb was read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CommandType {
    /// An in-game verb with no shell settings of its own
    MudCommand,
    /// A verb that supplied its own [`ShellOptions`]
    ShellCommand,
    /// A line whose verb is a `$variable`
    ExpressionCommand,
}

/// Operator joining a command to whatever follows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Operator {
    /// `;`
    Sequence,
    /// `&&`
    And,
    /// `||`
    Or,
    /// `|`
    Pipe,
    /// `|&`
    PipeAll,
}

impl Operator {
    /// Map operator text to a joining operator. Redirections, `&` and `=`
    /// are not joining operators.
    pub fn from_token(text: &str) -> Option<Self> {
        match text {
            ";" => Some(Self::Sequence),
            "&&" => Some(Self::And),
            "||" => Some(Self::Or),
            "|" => Some(Self::Pipe),
            "|&" => Some(Self::PipeAll),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sequence => ";",
            Self::And => "&&",
            Self::Or => "||",
            Self::Pipe => "|",
            Self::PipeAll => "|&",
        }
    }

    pub fn is_pipe(self) -> bool {
        matches!(self, Self::Pipe | Self::PipeAll)
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which output streams flow into the next pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PipeTarget {
    Stdout,
    StdoutAndStderr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RedirectKind {
    /// `<`
    Input,
    /// `>`
    Output,
    /// `>>`
    Append,
}

impl RedirectKind {
    pub fn from_token(text: &str) -> Option<Self> {
        match text {
            "<" => Some(Self::Input),
            ">" => Some(Self::Output),
            ">>" => Some(Self::Append),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Redirect {
    pub kind: RedirectKind,
    pub target: String,
}

/// One command in a parsed line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedCommand {
    pub verb: String,
    pub args: Vec<String>,
    /// Tokens from the verb onward; `tokens[0]` is the verb token
    pub tokens: Vec<Token>,
    pub cmd_type: CommandType,
    /// The operator that followed this command
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operator: Option<Operator>,
    /// Run in order while each succeeds (`&&`)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<ParsedCommand>,
    /// Run when this command (or its conditions) fails (`||`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alternate: Option<Box<ParsedCommand>>,
    /// Pipeline successor when `pipe_target` is set, else sequence successor
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_command: Option<Box<ParsedCommand>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pipe_target: Option<PipeTarget>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub redirects: Vec<Redirect>,
    /// Indices into `args` of unquoted arguments containing glob characters,
    /// filled only when file expressions are enabled for this command
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub glob_args: Vec<usize>,
}

/// One argument assembled from adjacent tokens.
#[derive(Debug, Default)]
struct Word {
    text: String,
    raw: String,
    quoted: bool,
}

impl ParsedCommand {
    /// Open a command on its verb token.
    pub fn new(verb: Token, cmd_type: CommandType) -> Self {
        Self {
            verb: verb.raw_text(),
            args: Vec::new(),
            tokens: vec![verb],
            cmd_type,
            operator: None,
            conditions: Vec::new(),
            alternate: None,
            next_command: None,
            pipe_target: None,
            redirects: Vec::new(),
            glob_args: Vec::new(),
        }
    }

    pub fn is_alias(&self) -> bool {
        self.tokens.first().is_some_and(|t| t.is(TokenType::Alias))
    }

    /// Resolve the verb and arguments from the collected tokens.
    ///
    /// Expands an alias verb through its template and, when enabled,
    /// replaces `$name` references with variable values. Expression commands
    /// keep their arguments exactly as written.
    pub fn compile(&mut self, options: &ShellOptions) {
        let expression = self.cmd_type == CommandType::ExpressionCommand;
        let expand = options.expand_variables && !expression;
        let words = self.words(expand, options);
        let Some((first, rest)) = words.split_first() else {
            return;
        };

        if self.is_alias() {
            if let Some(template) = options.aliases.get(&self.tokens[0].value) {
                let args: Vec<String> = rest.iter().map(|w| w.text.clone()).collect();
                let line = expand_alias(&self.tokens[0].value, template, &args, expand, options);
                let (verb, args) = split_alias_line(&line);
                self.verb = verb;
                self.args = args;
                self.glob_args = if options.expand_file_expressions {
                    (0..self.args.len())
                        .filter(|&i| has_glob(&self.args[i]))
                        .collect()
                } else {
                    Vec::new()
                };
                return;
            }
        }

        if expression {
            self.verb = first.raw.clone();
            self.args = rest.iter().map(|w| w.raw.clone()).collect();
            self.glob_args.clear();
            return;
        }

        self.verb = first.text.clone();
        self.args = rest.iter().map(|w| w.text.clone()).collect();
        self.glob_args = if options.expand_file_expressions {
            rest.iter()
                .enumerate()
                .filter(|(_, w)| !w.quoted && has_glob(&w.raw))
                .map(|(i, _)| i)
                .collect()
        } else {
            Vec::new()
        };
    }

    /// Group tokens into whitespace-separated words.
    fn words(&self, expand: bool, options: &ShellOptions) -> Vec<Word> {
        let mut words = Vec::new();
        let mut current: Option<Word> = None;
        let mut iter = self.tokens.iter().enumerate().peekable();

        while let Some((index, token)) = iter.next() {
            match token.token_type {
                TokenType::Whitespace => words.extend(current.take()),
                TokenType::History | TokenType::HistorySubstitution => {}
                TokenType::Operator => {
                    words.extend(current.take());
                    // Redirections are recorded separately; `=` is a word
                    if RedirectKind::from_token(&token.value).is_none() {
                        words.push(Word {
                            text: token.value.clone(),
                            raw: token.value.clone(),
                            quoted: false,
                        });
                    }
                }
                TokenType::Alias if index == 0 => {
                    words.push(Word {
                        text: token.value.clone(),
                        raw: token.value.clone(),
                        quoted: false,
                    });
                }
                TokenType::Variable => {
                    let mut name = token.value.clone();
                    let mut raw = token.raw_text();
                    while let Some((_, member)) =
                        iter.next_if(|(_, t)| t.is(TokenType::MemberAccess))
                    {
                        name.push('.');
                        name.push_str(&member.value);
                        raw.push_str(&member.raw_text());
                    }
                    let text = if expand {
                        options
                            .variables
                            .get(&name)
                            .map(|v| v.resolve())
                            .unwrap_or_default()
                    } else {
                        raw.clone()
                    };
                    let word = current.get_or_insert_with(Word::default);
                    word.text.push_str(&text);
                    word.raw.push_str(&raw);
                }
                TokenType::String => {
                    let word = current.get_or_insert_with(Word::default);
                    word.text.push_str(&token.value);
                    word.raw.push_str(&token.value);
                    word.quoted = true;
                }
                _ => {
                    let text = token.raw_text();
                    let word = current.get_or_insert_with(Word::default);
                    word.text.push_str(&text);
                    word.raw.push_str(&text);
                }
            }
        }
        words.extend(current);
        words
    }

    /// This command followed by everything reachable from it, depth first.
    pub fn walk(&self) -> Vec<&ParsedCommand> {
        let mut out = vec![self];
        for condition in &self.conditions {
            out.extend(condition.walk());
        }
        if let Some(alternate) = &self.alternate {
            out.extend(alternate.walk());
        }
        if let Some(next) = &self.next_command {
            out.extend(next.walk());
        }
        out
    }

    /// Mutable counterpart of [`ParsedCommand::walk`].
    pub fn for_each_mut(&mut self, f: &mut impl FnMut(&mut ParsedCommand)) {
        f(self);
        for condition in &mut self.conditions {
            condition.for_each_mut(f);
        }
        if let Some(alternate) = self.alternate.as_deref_mut() {
            alternate.for_each_mut(f);
        }
        if let Some(next) = self.next_command.as_deref_mut() {
            next.for_each_mut(f);
        }
    }
}

fn has_glob(text: &str) -> bool {
    text.contains(['*', '?', '['])
}

/// Substitute arguments into an alias template.
///
/// Every `$N`, `$*` and `$name` reference in the template is replaced in a
/// single pass, so text an argument brings in is never substituted again.
/// `$*` takes every argument no `$N` names; without `$*` those arguments are
/// appended.
fn expand_alias(
    name: &str,
    template: &str,
    args: &[String],
    expand: bool,
    options: &ShellOptions,
) -> String {
    let mut used = vec![false; args.len()];
    let mut has_rest = false;
    for caps in TEMPLATE_REF.captures_iter(template) {
        if caps.get(2).is_some() {
            has_rest = true;
        }
        if let Some(n) = caps.get(1).and_then(|m| m.as_str().parse::<usize>().ok()) {
            if (1..=args.len()).contains(&n) {
                used[n - 1] = true;
            }
        }
    }
    let unused: Vec<&str> = args
        .iter()
        .zip(&used)
        .filter(|(_, used)| !**used)
        .map(|(arg, _)| arg.as_str())
        .collect();

    let mut out = TEMPLATE_REF
        .replace_all(template, |caps: &Captures| {
            if let Some(m) = caps.get(1) {
                return match m.as_str().parse::<usize>() {
                    Ok(0) => name.to_string(),
                    Ok(n) if n <= args.len() => args[n - 1].clone(),
                    _ => String::new(),
                };
            }
            if caps.get(2).is_some() {
                return unused.join(" ");
            }
            if expand {
                options
                    .variables
                    .get(&caps[3])
                    .map(|v| v.resolve())
                    .unwrap_or_default()
            } else {
                caps[0].to_string()
            }
        })
        .into_owned();

    if !has_rest && !unused.is_empty() {
        out.push(' ');
        out.push_str(&unused.join(" "));
    }
    out
}

/// Split an expanded alias line into the verb (its leading alphanumeric run)
/// and whitespace-separated arguments.
fn split_alias_line(line: &str) -> (String, Vec<String>) {
    let line = line.trim_start();
    let end = line
        .find(|c: char| !c.is_alphanumeric())
        .unwrap_or(line.len());
    let (verb, rest) = if end == 0 {
        line.split_once(char::is_whitespace).unwrap_or((line, ""))
    } else {
        line.split_at(end)
    };
    (
        verb.to_string(),
        rest.split_whitespace().map(str::to_string).collect(),
    )
}

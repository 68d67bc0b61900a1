//! Tokenizer for command lines
//!
//! Turns one input line into typed tokens, one lexical unit per call. Which
//! characters are special depends on the [`ShellOptions`] the parser passes
//! in with each call: once a command's verb is known, that command's own
//! options take over, so `say a|b` and `ls a|b` lex differently.

use std::sync::LazyLock;

use regex::Regex;
use tracing::trace;

use super::history::{self, Substitution};
use super::tokens::{Token, TokenSource, TokenType};
use crate::error::{Error, Result};
use crate::shell::{HistoryLevel, ShellOptions};

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s+").expect("whitespace pattern is valid"));
static NUMERIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+(?:\.\d+)?").expect("numeric pattern is valid"));
static WORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^[^\s$.=<>|;&'"!`\\]+"#).expect("word pattern is valid")
});
static VARIABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\$(?:([A-Za-z_][A-Za-z0-9_]*)|\{([A-Za-z_][A-Za-z0-9_]*)\})")
        .expect("variable pattern is valid")
});
static MEMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\.([A-Za-z_][A-Za-z0-9_]*)").expect("member pattern is valid")
});

/// Where in the command line the tokenizer is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LexContext {
    /// A command's verb has been seen and the command is still open
    pub in_command: bool,
    /// The open command is an expression (its verb is a variable)
    pub expression: bool,
}

/// Tokenizer over one command line.
///
/// The source is private to the instance; history references splice their
/// resolved text in through the token stack rather than by editing the
/// source, and caret substitution swaps in a freshly computed line.
pub struct Tokenizer {
    source: String,
    index: usize,
    /// Pushed-back or spliced tokens, popped before reading more input
    token_stack: Vec<Token>,
    last_type: Option<TokenType>,
    origin: TokenSource,
    last_substitution: Option<Substitution>,
    print_only: bool,
    restarted: bool,
    /// The line with history references replaced by their text
    expanded: String,
}

impl Tokenizer {
    /// Create a tokenizer for the given input.
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            index: 0,
            token_stack: Vec::new(),
            last_type: None,
            origin: TokenSource::Input,
            last_substitution: None,
            print_only: false,
            restarted: false,
            expanded: String::new(),
        }
    }

    /// Seed the substitution used by `:&`, `:g&` and `:s//new/`.
    pub fn with_last_substitution(mut self, sub: Option<Substitution>) -> Self {
        self.last_substitution = sub;
        self
    }

    /// The (possibly caret-rewritten) source line.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Current byte offset into the source.
    pub fn index(&self) -> usize {
        self.index
    }

    /// The input with every history reference consumed so far resolved.
    pub fn expanded(&self) -> &str {
        &self.expanded
    }

    /// A `:p` modifier was seen.
    pub fn print_only(&self) -> bool {
        self.print_only
    }

    pub fn last_substitution(&self) -> Option<&Substitution> {
        self.last_substitution.as_ref()
    }

    /// Return a token to be produced again by the next call.
    pub fn push_back(&mut self, token: Token) {
        self.token_stack.push(token);
    }

    /// Get the next token, or `None` at end of input.
    pub fn next_token(&mut self, options: &ShellOptions, ctx: LexContext) -> Result<Option<Token>> {
        let token = match self.token_stack.pop() {
            Some(token) => token,
            None => {
                if self.index >= self.source.len() {
                    return Ok(None);
                }
                self.dispatch(options, ctx)?
            }
        };
        trace!(
            token_type = ?token.token_type,
            start = token.start,
            end = token.end,
            "token"
        );
        self.last_type = Some(token.token_type);
        Ok(Some(token))
    }

    fn dispatch(&mut self, options: &ShellOptions, ctx: LexContext) -> Result<Token> {
        let start = self.index;
        let rest = &self.source[start..];
        let Some(ch) = rest.chars().next() else {
            return Err(Error::Internal("tokenizer read past end of input".to_string()));
        };

        // Quick substitution rewrites the whole line and starts over
        if ch == '^'
            && start == 0
            && !ctx.in_command
            && !self.restarted
            && self.origin == TokenSource::Input
            && options.history_level == HistoryLevel::Full
            && !options.history.is_empty()
        {
            let (line, sub) = history::caret_substitute(&self.source, &options.history)?;
            trace!("caret substitution restarted tokenization");
            self.source = line;
            self.index = 0;
            self.restarted = true;
            self.last_substitution = Some(sub);
            self.expanded.clear();
            return Ok(Token::new(TokenType::HistorySubstitution, 0).finish(self.source.clone(), 0));
        }

        if !ctx.in_command && options.char_alias(ch).is_some() {
            return Ok(self.emit(TokenType::Alias, ch.to_string(), ch.len_utf8()));
        }

        if ch == '.'
            && options.expand_variables
            && matches!(
                self.last_type,
                Some(TokenType::Variable | TokenType::MemberAccess)
            )
        {
            if let Some(caps) = MEMBER.captures(rest) {
                let len = caps[0].len();
                let name = caps[1].to_string();
                return Ok(self.emit(TokenType::MemberAccess, name, len));
            }
        }

        if let Some(m) = WHITESPACE.find(rest) {
            let (text, len) = (m.as_str().to_string(), m.end());
            return Ok(self.emit(TokenType::Whitespace, text, len));
        }
        if let Some(m) = NUMERIC.find(rest) {
            let followed_by_word = rest[m.end()..]
                .chars()
                .next()
                .is_some_and(|c| WORD.is_match(c.encode_utf8(&mut [0u8; 4])));
            if !followed_by_word {
                let (text, len) = (m.as_str().to_string(), m.end());
                return Ok(self.emit(TokenType::Numeric, text, len));
            }
        }
        if let Some(m) = WORD.find(rest) {
            let (text, len) = (m.as_str().to_string(), m.end());
            return Ok(self.emit(TokenType::Word, text, len));
        }

        match ch {
            '$' if options.expand_environment => match VARIABLE.captures(rest) {
                Some(caps) => {
                    let len = caps[0].len();
                    let name = caps
                        .get(1)
                        .or_else(|| caps.get(2))
                        .map(|m| m.as_str().to_string())
                        .unwrap_or_default();
                    Ok(self.emit(TokenType::Variable, name, len))
                }
                None => Ok(self.emit(TokenType::Word, "$", 1)),
            },
            '<' if options.allow_file_io => Ok(self.emit(TokenType::Operator, "<", 1)),
            '>' if options.allow_file_io => {
                if rest.starts_with(">>") {
                    Ok(self.emit(TokenType::Operator, ">>", 2))
                } else {
                    Ok(self.emit(TokenType::Operator, ">", 1))
                }
            }
            '|' if options.allow_pipelining => {
                if rest.starts_with("||") {
                    Ok(self.emit(TokenType::Operator, "||", 2))
                } else if rest.starts_with("|&") {
                    Ok(self.emit(TokenType::Operator, "|&", 2))
                } else {
                    Ok(self.emit(TokenType::Operator, "|", 1))
                }
            }
            '&' if options.allow_pipelining => {
                if rest.starts_with("&&") {
                    Ok(self.emit(TokenType::Operator, "&&", 2))
                } else {
                    Ok(self.emit(TokenType::Operator, "&", 1))
                }
            }
            ';' if options.allow_pipelining => Ok(self.emit(TokenType::Operator, ";", 1)),
            '\'' | '"' if options.allow_quoting => self.read_quoted(ch, TokenType::String),
            '`' if options.expand_backticks => self.read_quoted('`', TokenType::Backtick),
            '!' => self.read_history(options, ctx),
            '\\' if options.allow_escaping => self.read_escape(options),
            '=' if ctx.expression => Ok(self.emit(TokenType::Operator, "=", 1)),
            _ => Ok(self.emit(TokenType::Word, ch.to_string(), ch.len_utf8())),
        }
    }

    /// Build a complete token covering `len` bytes and advance past them.
    fn emit(&mut self, token_type: TokenType, value: impl Into<String>, len: usize) -> Token {
        let start = self.index;
        let end = start + len;
        self.expanded.push_str(&self.source[start..end]);
        self.index = end;
        let mut token = Token::new(token_type, start).finish(value, end);
        token.source = self.origin;
        token
    }

    /// Scan to the next unescaped `quote`.
    fn read_quoted(&mut self, quote: char, token_type: TokenType) -> Result<Token> {
        let start = self.index;
        let body = &self.source[start + 1..];
        let mut value = String::new();
        let mut chars = body.char_indices();
        while let Some((idx, c)) = chars.next() {
            if c == '\\' {
                match chars.next() {
                    Some((_, next)) if next == quote || next == '\\' => value.push(next),
                    Some((_, next)) => {
                        value.push('\\');
                        value.push(next);
                    }
                    None => break,
                }
            } else if c == quote {
                return Ok(self.emit(token_type, value, 1 + idx + 1));
            } else {
                value.push(c);
            }
        }
        Err(Error::UnterminatedString {
            quote,
            offset: start,
        })
    }

    fn read_escape(&mut self, options: &ShellOptions) -> Result<Token> {
        let start = self.index;
        let next = self.source[start + 1..].chars().next();
        match next {
            // Continuation: backslash-newline disappears entirely
            Some('\n') => Ok(self.emit(TokenType::Word, "", 2)),
            Some(next) => Ok(self.emit(TokenType::Word, next.to_string(), 1 + next.len_utf8())),
            None if options.allow_line_spanning => Err(Error::Incomplete),
            None => Err(Error::UnterminatedEscape { offset: start }),
        }
    }

    fn read_history(&mut self, options: &ShellOptions, ctx: LexContext) -> Result<Token> {
        let start = self.index;
        let rest = &self.source[start..];
        let next = rest[1..].chars().next();
        let at_line_start = self.source[..start].trim().is_empty();

        let allowed = self.origin == TokenSource::Input
            && options.history_enabled()
            && match options.history_level {
                HistoryLevel::Off => false,
                HistoryLevel::LineStart => at_line_start,
                HistoryLevel::Full => true,
            };
        // `!` before a blank, `=` or `(` is literal, and so is a trailing `!`
        // after other text; only a lone `!` is an empty reference
        let literal = match next {
            None => !at_line_start,
            Some(c) => c.is_whitespace() || c == '=' || c == '(',
        };
        if !allowed || literal {
            return Ok(self.emit(TokenType::Word, "!", 1));
        }

        let resolved = history::resolve(rest, &options.history, self.last_substitution.as_ref())?;
        if let Some(sub) = resolved.substitution.clone() {
            self.last_substitution = Some(sub);
        }
        self.print_only |= resolved.print_only;

        // Spliced text is lexed once, with history expansion off
        let mut child = Tokenizer::new(resolved.text.clone());
        child.origin = TokenSource::History;
        let child_options = ShellOptions {
            history_level: HistoryLevel::Off,
            ..options.clone()
        };
        let mut spliced = Vec::new();
        let mut child_ctx = ctx;
        while let Some(token) = child.next_token(&child_options, child_ctx)? {
            if token.token_type != TokenType::Whitespace {
                child_ctx.in_command = true;
            }
            spliced.push(token);
        }
        self.token_stack.extend(spliced.into_iter().rev());

        let end = start + resolved.consumed;
        self.index = end;
        self.expanded.push_str(&resolved.text);
        let mut token = Token::new(TokenType::History, start).finish(resolved.text, end);
        token.source = self.origin;
        Ok(token)
    }
}

/// Tokenize a whole line with one set of options.
///
/// The context switches to "in command" after the first non-whitespace
/// token, which is enough for inspecting how a line lexes.
pub fn tokenize(source: &str, options: &ShellOptions) -> Result<Vec<Token>> {
    let mut tokenizer = Tokenizer::new(source);
    let mut ctx = LexContext::default();
    let mut tokens = Vec::new();
    while let Some(token) = tokenizer.next_token(options, ctx)? {
        match token.token_type {
            TokenType::Whitespace | TokenType::History | TokenType::HistorySubstitution => {}
            TokenType::Operator if token.value != "=" => ctx = LexContext::default(),
            TokenType::Variable if !ctx.in_command => {
                ctx = LexContext {
                    in_command: true,
                    expression: true,
                };
            }
            _ => ctx.in_command = true,
        }
        tokens.push(token);
    }
    Ok(tokens)
}

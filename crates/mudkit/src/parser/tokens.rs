//! Token types for the tokenizer

use serde::Serialize;

/// Lexical category of a [`Token`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TokenType {
    /// A run of word characters (command name, argument, etc.)
    Word,

    /// A number not followed by word characters
    Numeric,

    /// Spaces, tabs and (continued) newlines
    Whitespace,

    /// `; && || | |& & < > >>` and `=` inside expressions
    Operator,

    /// A quoted string; the value excludes the quotes
    String,

    /// `$name`; the value excludes the `$`
    Variable,

    /// A command verb that names an alias
    Alias,

    /// A `!` history reference; the value is the resolved text
    History,

    /// A `^old^new^` quick substitution that restarted tokenization
    HistorySubstitution,

    /// `.member` following a variable; the value excludes the dot
    MemberAccess,

    /// `` `...` ``; the value is the inner command text
    Backtick,
}

/// The buffer a token's offsets point into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TokenSource {
    /// The line being parsed
    Input,
    /// Text spliced in from a history reference
    History,
}

/// A lexical unit with its location.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Token {
    pub token_type: TokenType,
    pub value: String,
    pub source: TokenSource,
    /// Byte offset of the first character
    pub start: usize,
    /// Byte offset one past the last character
    pub end: usize,
    pub complete: bool,
    /// Filename attached to a redirection operator by the parser
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_target: Option<String>,
}

impl Token {
    /// Create an incomplete token starting at `start`.
    pub fn new(token_type: TokenType, start: usize) -> Self {
        Self {
            token_type,
            value: String::new(),
            source: TokenSource::Input,
            start,
            end: start,
            complete: false,
            redirect_target: None,
        }
    }

    /// Fill in the value and end offset and mark the token complete.
    pub fn finish(mut self, value: impl Into<String>, end: usize) -> Self {
        self.value = value.into();
        self.end = end;
        self.complete = true;
        self
    }

    pub fn is(&self, token_type: TokenType) -> bool {
        self.token_type == token_type
    }

    /// True for an operator token with exactly this text.
    pub fn is_operator(&self, op: &str) -> bool {
        self.token_type == TokenType::Operator && self.value == op
    }

    /// Tokens that may open a command.
    pub fn is_verb_class(&self) -> bool {
        matches!(
            self.token_type,
            TokenType::Word
                | TokenType::Numeric
                | TokenType::Alias
                | TokenType::Variable
                | TokenType::String
        )
    }

    /// Tokens that glue together into one argument when adjacent.
    pub fn is_word_like(&self) -> bool {
        matches!(
            self.token_type,
            TokenType::Word
                | TokenType::Numeric
                | TokenType::String
                | TokenType::Variable
                | TokenType::MemberAccess
                | TokenType::Backtick
                | TokenType::Alias
        )
    }

    /// The text this token stood for in the input line.
    pub fn raw_text(&self) -> String {
        match self.token_type {
            TokenType::Variable => format!("${}", self.value),
            TokenType::MemberAccess => format!(".{}", self.value),
            TokenType::Backtick => format!("`{}`", self.value),
            _ => self.value.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finish_marks_complete() {
        let token = Token::new(TokenType::Word, 3);
        assert!(!token.complete);
        let token = token.finish("look", 7);
        assert!(token.complete);
        assert_eq!(token.value, "look");
        assert_eq!((token.start, token.end), (3, 7));
    }

    #[test]
    fn test_raw_text() {
        let var = Token::new(TokenType::Variable, 0).finish("hp", 3);
        assert_eq!(var.raw_text(), "$hp");
        let member = Token::new(TokenType::MemberAccess, 3).finish("max", 7);
        assert_eq!(member.raw_text(), ".max");
    }
}

//! Source location tracking for error messages
//!
//! Tokens carry byte offsets; [`Position`] turns an offset back into the
//! line/column pair reported to players when a multi-line (continued) command
//! fails to parse.

/// A position in source code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    /// 1-based line number
    pub line: usize,
    /// 1-based column number (character offset within line)
    pub column: usize,
    /// 0-based byte offset from start of input
    pub offset: usize,
}

impl Position {
    /// Create a new position at line 1, column 1, offset 0.
    pub fn new() -> Self {
        Self {
            line: 1,
            column: 1,
            offset: 0,
        }
    }

    /// Advance position by one character.
    pub fn advance(&mut self, ch: char) {
        self.offset += ch.len_utf8();
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
    }

    /// Compute the position of a byte offset within `source`.
    ///
    /// Offsets past the end clamp to the end of input.
    pub fn at_offset(source: &str, offset: usize) -> Self {
        let mut pos = Self::new();
        for ch in source.chars() {
            if pos.offset >= offset {
                break;
            }
            pos.advance(ch);
        }
        pos
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

//! Token types produced by the lexer

use std::fmt;

use crate::finding::Position;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuoteKind {
    /// `'...'`, no escapes
    Single,
    /// `"..."`, backslash escapes and expansions
    Double,
    /// `$'...'`, backslash escapes only
    AnsiC,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Word,
    Glob,
    String(QuoteKind),
    /// `$NAME`, `${...}` or a special parameter; value is the raw text
    Variable,
    /// `$(...)`; value is the inner text
    CommandSubst,
    /// `` `...` ``; value is the inner text
    Backtick,
    Pipe,
    Or,
    Ampersand,
    And,
    Semicolon,
    Newline,
    RedirectIn,
    HereDoc,
    RedirectOut,
    RedirectAppend,
    /// fd-prefixed redirect such as `2>` or `2>>`
    RedirectErr,
    /// descriptor duplication such as `2>&1` or `>&2`
    RedirectDup,
    LeftParen,
    RightParen,
    Unknown,
    Eof,
}

/// One lexical unit. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub value: String,
    pub position: Position,
    /// Byte offset just past the token in the source
    pub end_offset: usize,
}

impl Token {
    pub fn new(kind: TokenKind, value: impl Into<String>, position: Position, end_offset: usize) -> Self {
        Self {
            kind,
            value: value.into(),
            position,
            end_offset,
        }
    }

    pub fn is_operator(&self) -> bool {
        matches!(
            self.kind,
            TokenKind::Pipe
                | TokenKind::Or
                | TokenKind::Ampersand
                | TokenKind::And
                | TokenKind::Semicolon
        )
    }

    pub fn is_redirect(&self) -> bool {
        matches!(
            self.kind,
            TokenKind::RedirectIn
                | TokenKind::HereDoc
                | TokenKind::RedirectOut
                | TokenKind::RedirectAppend
                | TokenKind::RedirectErr
                | TokenKind::RedirectDup
        )
    }

    pub fn is_delimiter(&self) -> bool {
        matches!(
            self.kind,
            TokenKind::Newline | TokenKind::Eof | TokenKind::Semicolon
        )
    }

    /// Tokens that can form part of a command word
    pub fn is_word_like(&self) -> bool {
        matches!(
            self.kind,
            TokenKind::Word
                | TokenKind::Glob
                | TokenKind::String(_)
                | TokenKind::Variable
                | TokenKind::CommandSubst
                | TokenKind::Backtick
        )
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TokenKind::Eof => f.write_str("end of input"),
            TokenKind::Newline => f.write_str("newline"),
            _ => f.write_str(&self.value),
        }
    }
}

/// Bytes allowed inside an unquoted word
pub fn is_word_char(ch: u8) -> bool {
    ch.is_ascii_alphanumeric()
        || matches!(
            ch,
            b'_' | b'-' | b'.' | b'/' | b'=' | b':' | b',' | b'@' | b'%' | b'+' | b'~'
        )
        || is_glob_char(ch)
}

pub fn is_glob_char(ch: u8) -> bool {
    matches!(ch, b'*' | b'?' | b'[' | b']')
}

/// Whether a word should be treated as a glob pattern
pub fn looks_like_glob(word: &str) -> bool {
    if word.contains('*') || word.contains('?') {
        return true;
    }
    match (word.find('['), word.rfind(']')) {
        (Some(open), Some(close)) => close > open + 1,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_detection() {
        assert!(looks_like_glob("*.txt"));
        assert!(looks_like_glob("file?.log"));
        assert!(looks_like_glob("[abc].rs"));
        assert!(!looks_like_glob("["));
        assert!(!looks_like_glob("[]"));
        assert!(!looks_like_glob("plain"));
    }

    #[test]
    fn test_word_chars() {
        for ch in b"az09_-./=:,@%+~*" {
            assert!(is_word_char(*ch), "{} should be a word char", *ch as char);
        }
        for ch in b" |&;<>()'\"$`{}" {
            assert!(!is_word_char(*ch), "{} should not be a word char", *ch as char);
        }
    }
}

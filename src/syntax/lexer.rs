//! Position-tracking lexer for bash-flavoured command text

use crate::error::LexError;
use crate::finding::Position;

use super::token::{is_word_char, looks_like_glob, QuoteKind, Token, TokenKind};

/// Byte-oriented lexer. Never rewinds.
pub struct Lexer<'a> {
    input: &'a str,
    bytes: &'a [u8],
    pos: usize,
    base_offset: usize,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self::with_start(input, Position::start())
    }

    /// Lex a fragment that starts at `start` inside a larger command
    pub fn with_start(input: &'a str, start: Position) -> Self {
        Self {
            input,
            bytes: input.as_bytes(),
            pos: 0,
            base_offset: start.offset,
            line: start.line,
            column: start.column,
        }
    }

    pub fn position(&self) -> Position {
        Position {
            line: self.line,
            column: self.column,
            offset: self.base_offset + self.pos,
        }
    }

    /// Next raw byte, not consumed
    pub fn peek(&self) -> Option<u8> {
        self.peek_at(0)
    }

    fn peek_at(&self, n: usize) -> Option<u8> {
        self.bytes.get(self.pos + n).copied()
    }

    /// Consume one whole character
    fn advance(&mut self) -> Option<char> {
        let ch = self.input[self.pos..].chars().next()?;
        self.pos += ch.len_utf8();
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek() {
            match ch {
                b' ' | b'\t' | b'\r' => {
                    self.advance();
                }
                b'\\' if self.peek_at(1) == Some(b'\n') => {
                    self.advance();
                    self.advance();
                }
                _ => break,
            }
        }
    }

    fn token(&self, kind: TokenKind, value: impl Into<String>, start: Position) -> Token {
        Token::new(kind, value, start, self.base_offset + self.pos)
    }

    /// Lex the whole input, ending with an Eof token
    pub fn tokenize(mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                return Ok(tokens);
            }
        }
    }

    pub fn next_token(&mut self) -> Result<Token, LexError> {
        loop {
            self.skip_whitespace();
            // comments run to the end of the line
            if self.peek() == Some(b'#') {
                while let Some(ch) = self.peek() {
                    if ch == b'\n' {
                        break;
                    }
                    self.advance();
                }
                continue;
            }
            break;
        }

        let start = self.position();
        let Some(ch) = self.peek() else {
            return Ok(self.token(TokenKind::Eof, "", start));
        };

        match ch {
            b'|' => {
                self.advance();
                if self.peek() == Some(b'|') {
                    self.advance();
                    return Ok(self.token(TokenKind::Or, "||", start));
                }
                Ok(self.token(TokenKind::Pipe, "|", start))
            }
            b'&' => {
                self.advance();
                match self.peek() {
                    Some(b'&') => {
                        self.advance();
                        Ok(self.token(TokenKind::And, "&&", start))
                    }
                    Some(b'>') => {
                        self.advance();
                        if self.peek() == Some(b'>') {
                            self.advance();
                            return Ok(self.token(TokenKind::RedirectAppend, "&>>", start));
                        }
                        Ok(self.token(TokenKind::RedirectOut, "&>", start))
                    }
                    _ => Ok(self.token(TokenKind::Ampersand, "&", start)),
                }
            }
            b';' => {
                self.advance();
                Ok(self.token(TokenKind::Semicolon, ";", start))
            }
            b'\n' => {
                self.advance();
                Ok(self.token(TokenKind::Newline, "\n", start))
            }
            b'<' => {
                self.advance();
                if self.peek() == Some(b'<') {
                    self.advance();
                    let mut op = String::from("<<");
                    if let Some(extra @ (b'<' | b'-')) = self.peek() {
                        self.advance();
                        op.push(extra as char);
                    }
                    return Ok(self.token(TokenKind::HereDoc, op, start));
                }
                Ok(self.token(TokenKind::RedirectIn, "<", start))
            }
            b'>' => Ok(self.read_redirect_out(start, "")),
            b'"' => self.read_quoted(b'"', QuoteKind::Double, start),
            b'\'' => self.read_quoted(b'\'', QuoteKind::Single, start),
            b'`' => {
                let inner = self.read_delimited(b'`', true, start)?;
                Ok(self.token(TokenKind::Backtick, inner, start))
            }
            b'$' => self.read_dollar(start),
            b'(' => {
                self.advance();
                Ok(self.token(TokenKind::LeftParen, "(", start))
            }
            b')' => {
                self.advance();
                Ok(self.token(TokenKind::RightParen, ")", start))
            }
            b'0'..=b'9' if self.fd_redirect_len().is_some() => {
                let len = self.fd_redirect_len().unwrap_or(0);
                let fd = self.input[self.pos..self.pos + len].to_string();
                for _ in 0..len {
                    self.advance();
                }
                if self.peek() == Some(b'<') {
                    self.advance();
                    return Ok(self.token(TokenKind::RedirectErr, format!("{}<", fd), start));
                }
                Ok(self.read_redirect_out(start, &fd))
            }
            _ => Ok(self.read_word(start)),
        }
    }

    /// Length of a leading digit run that is directly followed by `>` or `<`
    fn fd_redirect_len(&self) -> Option<usize> {
        let digits = self.bytes[self.pos..]
            .iter()
            .take_while(|b| b.is_ascii_digit())
            .count();
        match self.peek_at(digits) {
            Some(b'>') | Some(b'<') if digits > 0 => Some(digits),
            _ => None,
        }
    }

    fn read_redirect_out(&mut self, start: Position, fd: &str) -> Token {
        self.advance();
        let mut op = format!("{}>", fd);
        match self.peek() {
            Some(b'>') => {
                self.advance();
                op.push('>');
            }
            Some(b'&') => {
                self.advance();
                op.push('&');
                while let Some(ch) = self.peek() {
                    if ch.is_ascii_digit() || ch == b'-' {
                        self.advance();
                        op.push(ch as char);
                    } else {
                        break;
                    }
                }
                return self.token(TokenKind::RedirectDup, op, start);
            }
            Some(b'|') => {
                self.advance();
            }
            _ => {}
        }

        let kind = if !fd.is_empty() {
            TokenKind::RedirectErr
        } else if op.ends_with(">>") {
            TokenKind::RedirectAppend
        } else {
            TokenKind::RedirectOut
        };
        self.token(kind, op, start)
    }

    fn read_quoted(&mut self, quote: u8, kind: QuoteKind, start: Position) -> Result<Token, LexError> {
        let escapes = kind != QuoteKind::Single;
        let inner = self.read_delimited(quote, escapes, start)?;
        Ok(self.token(TokenKind::String(kind), inner, start))
    }

    /// Read up to the closing `close`, returning the raw inner text.
    /// The cursor must sit on the opening delimiter.
    fn read_delimited(&mut self, close: u8, escapes: bool, start: Position) -> Result<String, LexError> {
        self.advance();
        let content_start = self.pos;
        loop {
            match self.peek() {
                None => {
                    return Err(LexError::UnterminatedString {
                        quote: close as char,
                        position: start,
                    })
                }
                Some(b'\\') if escapes => {
                    self.advance();
                    if self.advance().is_none() {
                        return Err(LexError::UnterminatedString {
                            quote: close as char,
                            position: start,
                        });
                    }
                }
                Some(ch) if ch == close => {
                    let inner = self.input[content_start..self.pos].to_string();
                    self.advance();
                    return Ok(inner);
                }
                Some(_) => {
                    self.advance();
                }
            }
        }
    }

    fn read_dollar(&mut self, start: Position) -> Result<Token, LexError> {
        let raw_start = self.pos;
        self.advance();

        match self.peek() {
            Some(b'{') => {
                let mut depth = 0usize;
                while let Some(ch) = self.peek() {
                    self.advance();
                    match ch {
                        b'{' => depth += 1,
                        b'}' => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        _ => {}
                    }
                }
                let raw = self.input[raw_start..self.pos].to_string();
                Ok(self.token(TokenKind::Variable, raw, start))
            }
            Some(b'(') => {
                self.advance();
                let inner = self
                    .read_balanced()
                    .ok_or(LexError::UnterminatedSubstitution { position: start })?;
                Ok(self.token(TokenKind::CommandSubst, inner, start))
            }
            Some(b'\'') => self.read_quoted(b'\'', QuoteKind::AnsiC, start),
            Some(b'"') => self.read_quoted(b'"', QuoteKind::Double, start),
            Some(ch) if ch.is_ascii_alphabetic() || ch == b'_' => {
                while let Some(ch) = self.peek() {
                    if ch.is_ascii_alphanumeric() || ch == b'_' {
                        self.advance();
                    } else {
                        break;
                    }
                }
                let raw = self.input[raw_start..self.pos].to_string();
                Ok(self.token(TokenKind::Variable, raw, start))
            }
            Some(ch) if ch.is_ascii_digit() || b"?@*#$!-".contains(&ch) => {
                self.advance();
                let raw = self.input[raw_start..self.pos].to_string();
                Ok(self.token(TokenKind::Variable, raw, start))
            }
            _ => Ok(self.token(TokenKind::Word, "$", start)),
        }
    }

    /// Read the body of `$(` up to its matching `)`. Quotes and nested
    /// parentheses are honoured. Returns None when input ends first.
    fn read_balanced(&mut self) -> Option<String> {
        let content_start = self.pos;
        let mut depth = 1usize;
        loop {
            let ch = self.peek()?;
            match ch {
                b'\\' => {
                    self.advance();
                    self.advance()?;
                }
                b'\'' | b'"' | b'`' => {
                    self.advance();
                    loop {
                        let inner = self.peek()?;
                        if inner == b'\\' && ch != b'\'' {
                            self.advance();
                            self.advance()?;
                            continue;
                        }
                        self.advance();
                        if inner == ch {
                            break;
                        }
                    }
                }
                b'(' => {
                    depth += 1;
                    self.advance();
                }
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        let inner = self.input[content_start..self.pos].to_string();
                        self.advance();
                        return Some(inner);
                    }
                    self.advance();
                }
                _ => {
                    self.advance();
                }
            }
        }
    }

    fn read_word(&mut self, start: Position) -> Token {
        let word_start = self.pos;
        while let Some(ch) = self.peek() {
            if is_word_char(ch) || (ch == b'#' && self.pos > word_start) {
                self.advance();
            } else if ch == b'\\' {
                self.advance();
                self.advance();
            } else {
                break;
            }
        }

        if self.pos == word_start {
            // unknown input is skipped, never fatal
            let unknown = self.advance().map(String::from).unwrap_or_default();
            return self.token(TokenKind::Unknown, unknown, start);
        }

        let word = &self.input[word_start..self.pos];
        let kind = if looks_like_glob(word) {
            TokenKind::Glob
        } else {
            TokenKind::Word
        };
        self.token(kind, word, start)
    }
}

/// Convenience wrapper lexing a whole command
pub fn tokenize(input: &str) -> Result<Vec<Token>, LexError> {
    Lexer::new(input).tokenize()
}

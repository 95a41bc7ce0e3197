//! Recursive-descent parser producing a best-effort AST plus diagnostics

use tracing::debug;

use crate::error::{ParseError, SyntaxError};
use crate::finding::{Finding, Position};

use super::ast::{
    BackgroundNode, BinaryNode, CommandNode, GlobNode, ListNode, ListSeparator, Node, PipelineNode,
    RedirectKind, RedirectNode, StringNode, SubshellNode, VariableNode,
};
use super::lexer::Lexer;
use super::token::{QuoteKind, Token, TokenKind};

/// Subshells and substitutions nested deeper than this are kept without
/// a parsed body
const MAX_NESTING: usize = 32;

/// Parsed command and the diagnostics recorded along the way
#[derive(Debug, Clone, PartialEq)]
pub struct Ast {
    pub root: Node,
    pub diagnostics: Vec<Finding>,
}

/// Lex and parse a full command
pub fn parse(input: &str) -> Result<Ast, SyntaxError> {
    parse_at(input, Position::start(), 0)
}

fn parse_at(input: &str, start: Position, depth: usize) -> Result<Ast, SyntaxError> {
    let tokens = Lexer::with_start(input, start).tokenize()?;
    debug!(count = tokens.len(), depth, "tokenized command");
    let mut parser = Parser::new(tokens, depth);
    match parser.parse_list(false) {
        Some(root) => Ok(Ast {
            root,
            diagnostics: parser.diagnostics,
        }),
        None => Err(ParseError::NoCommands {
            diagnostics: parser.diagnostics,
        }
        .into()),
    }
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
    diagnostics: Vec<Finding>,
}

impl Parser {
    pub fn new(mut tokens: Vec<Token>, depth: usize) -> Self {
        if tokens.last().map(|t| t.kind) != Some(TokenKind::Eof) {
            let end = tokens.last().map(|t| t.end_offset).unwrap_or(0);
            let position = tokens.last().map(|t| t.position).unwrap_or_else(Position::start);
            tokens.push(Token::new(TokenKind::Eof, "", position, end));
        }
        Self {
            tokens,
            pos: 0,
            depth,
            diagnostics: Vec::new(),
        }
    }

    pub fn diagnostics(&self) -> &[Finding] {
        &self.diagnostics
    }

    fn current(&self) -> &Token {
        // the stream always ends with Eof, which is never consumed past
        let last = self.tokens.len() - 1;
        &self.tokens[self.pos.min(last)]
    }

    fn kind(&self) -> TokenKind {
        self.current().kind
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn current_position(&self) -> Position {
        self.current().position
    }

    fn diagnose(&mut self, message: impl Into<String>, position: Position) {
        self.diagnostics.push(Finding::syntax(message).at(position));
    }

    fn skip_newlines(&mut self) {
        while matches!(self.kind(), TokenKind::Newline | TokenKind::Unknown) {
            self.advance();
        }
    }

    fn at_list_end(&self, in_subshell: bool) -> bool {
        match self.kind() {
            TokenKind::Eof => true,
            TokenKind::RightParen => in_subshell,
            _ => false,
        }
    }

    /// Commands separated by `;`, `&` or newline. A single item is
    /// returned as is, never wrapped in a list.
    pub fn parse_list(&mut self, in_subshell: bool) -> Option<Node> {
        let start = self.current_position();
        let mut items = Vec::new();
        let mut separators = Vec::new();

        loop {
            self.skip_newlines();
            if self.at_list_end(in_subshell) {
                break;
            }

            let Some(item) = self.parse_and_or(in_subshell) else {
                let token = self.current().clone();
                self.diagnose(format!("Unexpected token: {}", token), token.position);
                break;
            };

            match self.kind() {
                TokenKind::Semicolon | TokenKind::Newline => {
                    self.advance();
                    items.push(item);
                    separators.push(ListSeparator::Semicolon);
                }
                TokenKind::Ampersand => {
                    self.advance();
                    let position = item.position();
                    items.push(Node::Background(BackgroundNode {
                        body: Box::new(item),
                        position,
                    }));
                    separators.push(ListSeparator::Ampersand);
                }
                _ if self.at_list_end(in_subshell) => {
                    items.push(item);
                    break;
                }
                _ => {
                    items.push(item);
                    let token = self.current().clone();
                    self.diagnose(format!("Unexpected token: {}", token), token.position);
                    break;
                }
            }
        }

        if items.len() <= 1 {
            return items.pop();
        }
        separators.truncate(items.len() - 1);
        Some(Node::List(ListNode {
            items,
            separators,
            position: start,
        }))
    }

    fn parse_and_or(&mut self, in_subshell: bool) -> Option<Node> {
        let mut left = self.parse_pipeline(in_subshell)?;
        while matches!(self.kind(), TokenKind::And | TokenKind::Or) {
            let op = self.advance()?;
            self.skip_newlines();
            let Some(right) = self.parse_pipeline(in_subshell) else {
                self.diagnose(
                    format!("Unexpected end of command after {}", op.value),
                    self.current_position(),
                );
                break;
            };
            let position = left.position();
            let binary = BinaryNode {
                left: Box::new(left),
                right: Box::new(right),
                position,
            };
            left = if op.kind == TokenKind::And {
                Node::And(binary)
            } else {
                Node::Or(binary)
            };
        }
        Some(left)
    }

    fn parse_pipeline(&mut self, in_subshell: bool) -> Option<Node> {
        let start = self.current_position();
        let mut commands = vec![self.parse_command()?];
        let mut trailing_pipe = false;

        while self.kind() == TokenKind::Pipe {
            self.advance();
            self.skip_newlines();
            let next = match self.kind() {
                TokenKind::Eof
                | TokenKind::Semicolon
                | TokenKind::Ampersand
                | TokenKind::And
                | TokenKind::Or
                | TokenKind::Pipe => None,
                TokenKind::RightParen if in_subshell => None,
                _ => self.parse_command(),
            };
            match next {
                Some(command) => commands.push(command),
                None => {
                    self.diagnose("Unexpected end of command after pipe", self.current_position());
                    trailing_pipe = true;
                    break;
                }
            }
        }

        if commands.len() == 1 && !trailing_pipe {
            return commands.pop();
        }
        Some(Node::Pipeline(PipelineNode {
            commands,
            trailing_pipe,
            position: start,
        }))
    }

    fn parse_command(&mut self) -> Option<Node> {
        if self.kind() == TokenKind::LeftParen {
            return Some(self.parse_subshell());
        }
        if !self.current().is_word_like() && !self.current().is_redirect() {
            return None;
        }

        let position = self.current_position();
        let mut words: Vec<String> = Vec::new();
        let mut children = Vec::new();
        let mut last_end: Option<usize> = None;

        loop {
            let token = self.current().clone();
            if token.is_word_like() {
                self.advance();
                let (text, node) = self.word_part(&token);
                let joined = last_end == Some(token.position.offset);
                match words.last_mut() {
                    Some(word) if joined => word.push_str(&text),
                    _ => words.push(text),
                }
                children.extend(node);
                last_end = Some(token.end_offset);
            } else if token.is_redirect() {
                self.advance();
                children.push(Node::Redirect(self.parse_redirect(&token)));
                last_end = None;
            } else if token.kind == TokenKind::LeftParen && words.len() == 1 {
                // `name()` function definition
                self.advance();
                if self.kind() == TokenKind::RightParen {
                    self.advance();
                }
                words.push("()".to_string());
                last_end = None;
            } else if token.kind == TokenKind::Unknown {
                self.advance();
                last_end = None;
            } else {
                break;
            }
        }

        let mut words = words.into_iter();
        let name = words.next().unwrap_or_default();
        Some(Node::Command(CommandNode {
            name,
            args: words.collect(),
            children,
            position,
        }))
    }

    fn parse_subshell(&mut self) -> Node {
        let position = self.current_position();
        self.advance();
        if self.depth >= MAX_NESTING {
            self.diagnose("Nesting too deep", position);
            self.skip_to_matching_paren(position);
            return Node::Subshell(SubshellNode {
                body: None,
                is_command: false,
                backtick: false,
                position,
            });
        }

        self.depth += 1;
        let body = self.parse_list(true);
        self.depth -= 1;
        if self.kind() == TokenKind::RightParen {
            self.advance();
        } else {
            self.diagnose("Missing closing parenthesis", position);
        }
        Node::Subshell(SubshellNode {
            body: body.map(Box::new),
            is_command: false,
            backtick: false,
            position,
        })
    }

    /// Consume tokens up to and including the `)` closing an already
    /// consumed `(`
    fn skip_to_matching_paren(&mut self, position: Position) {
        let mut open = 1usize;
        loop {
            match self.kind() {
                TokenKind::Eof => {
                    self.diagnose("Missing closing parenthesis", position);
                    return;
                }
                TokenKind::LeftParen => open += 1,
                TokenKind::RightParen => {
                    open -= 1;
                    if open == 0 {
                        self.advance();
                        return;
                    }
                }
                _ => {}
            }
            self.advance();
        }
    }

    /// Text contributed to the enclosing word, plus any structured node
    fn word_part(&mut self, token: &Token) -> (String, Option<Node>) {
        match token.kind {
            TokenKind::Glob => (
                token.value.clone(),
                Some(Node::Glob(GlobNode {
                    pattern: token.value.clone(),
                    position: token.position,
                })),
            ),
            TokenKind::String(quote) => {
                let expansions = if quote == QuoteKind::Double {
                    self.string_expansions(&token.value, token.position)
                } else {
                    Vec::new()
                };
                (
                    token.value.clone(),
                    Some(Node::String(StringNode {
                        value: token.value.clone(),
                        quote,
                        expansions,
                        position: token.position,
                    })),
                )
            }
            TokenKind::Variable => (
                token.value.clone(),
                Some(Node::Variable(VariableNode::from_raw(&token.value, token.position))),
            ),
            TokenKind::CommandSubst => {
                let inner = inner_start(token.position, 2);
                (
                    format!("$({})", token.value),
                    Some(self.substitution(&token.value, inner, token.position, false)),
                )
            }
            TokenKind::Backtick => {
                let inner = inner_start(token.position, 1);
                (
                    format!("`{}`", token.value),
                    Some(self.substitution(&token.value, inner, token.position, true)),
                )
            }
            _ => (token.value.clone(), None),
        }
    }

    fn substitution(&mut self, body: &str, inner: Position, position: Position, backtick: bool) -> Node {
        let parsed = if self.depth >= MAX_NESTING {
            self.diagnose("Command substitution nested too deeply", position);
            None
        } else {
            match parse_at(body, inner, self.depth + 1) {
                Ok(ast) => {
                    self.diagnostics.extend(ast.diagnostics);
                    Some(Box::new(ast.root))
                }
                Err(SyntaxError::Parse(ParseError::NoCommands { diagnostics })) => {
                    self.diagnostics.extend(diagnostics);
                    None
                }
                Err(SyntaxError::Lex(err)) => {
                    self.diagnose(err.to_string(), err.position());
                    None
                }
            }
        };
        Node::Subshell(SubshellNode {
            body: parsed,
            is_command: true,
            backtick,
            position,
        })
    }

    /// Variables and substitutions inside the raw body of a double-quoted string
    fn string_expansions(&mut self, value: &str, position: Position) -> Vec<Node> {
        let start = inner_start(position, 1);
        let mut nodes = Vec::new();
        let (mut line, mut column) = (start.line, start.column);
        let mut idx = 0;

        while let Some(ch) = value[idx..].chars().next() {
            let rest = &value[idx..];
            if ch == '$' || ch == '`' {
                let here = Position {
                    line,
                    column,
                    offset: start.offset + idx,
                };
                let mut lexer = Lexer::with_start(rest, here);
                if let Ok(token) = lexer.next_token() {
                    let consumed = token.end_offset - here.offset;
                    if consumed > 0 {
                        let after = lexer.position();
                        line = after.line;
                        column = after.column;
                        if let (_, Some(node)) = self.word_part(&token) {
                            nodes.push(node);
                        }
                        idx += consumed;
                        continue;
                    }
                }
            }

            // plain text, an escape covers the next character too
            let mut step = ch.len_utf8();
            if ch == '\\' {
                step += rest[1..].chars().next().map_or(0, char::len_utf8);
            }
            for c in rest[..step].chars() {
                if c == '\n' {
                    line += 1;
                    column = 1;
                } else {
                    column += 1;
                }
            }
            idx += step;
        }
        nodes
    }

    fn parse_redirect(&mut self, op: &Token) -> RedirectNode {
        let value = op.value.as_str();
        let digits: String = value.chars().take_while(|c| c.is_ascii_digit()).collect();
        let explicit_fd = digits.parse::<i32>().ok();

        let (kind, default_fd) = match op.kind {
            TokenKind::RedirectIn => (RedirectKind::Input, 0),
            TokenKind::HereDoc => (RedirectKind::Here, 0),
            TokenKind::RedirectAppend => (RedirectKind::Append, 1),
            TokenKind::RedirectErr if value.ends_with(">>") => (RedirectKind::Append, 2),
            TokenKind::RedirectErr if value.ends_with('<') => (RedirectKind::Input, 0),
            TokenKind::RedirectErr => (RedirectKind::Error, 2),
            TokenKind::RedirectDup => (RedirectKind::Duplicate, 1),
            _ => (RedirectKind::Output, 1),
        };
        let fd = explicit_fd.unwrap_or(default_fd);

        let embedded = match op.kind {
            TokenKind::RedirectDup => value.split_once('&').map(|(_, t)| t.to_string()),
            _ => None,
        };
        let target = match embedded {
            Some(target) if !target.is_empty() => target,
            _ => self.redirect_target(),
        };

        RedirectNode {
            kind,
            fd,
            target,
            position: op.position,
        }
    }

    fn redirect_target(&mut self) -> String {
        let mut target = String::new();
        let mut last_end: Option<usize> = None;
        while self.current().is_word_like() {
            let token = self.current().clone();
            if last_end.is_some() && last_end != Some(token.position.offset) {
                break;
            }
            self.advance();
            let (text, _) = self.word_part(&token);
            target.push_str(&text);
            last_end = Some(token.end_offset);
        }
        target
    }
}

/// Position of the body of a delimited token whose opener is `width` bytes
fn inner_start(position: Position, width: usize) -> Position {
    Position {
        line: position.line,
        column: position.column + width,
        offset: position.offset + width,
    }
}

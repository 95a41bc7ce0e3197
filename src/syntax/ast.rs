//! Command AST as a closed set of node kinds

use serde::Serialize;

use crate::finding::{Finding, FindingKind, Position, Severity};

use super::token::QuoteKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Command,
    Pipeline,
    Redirect,
    Subshell,
    Variable,
    String,
    Glob,
    Background,
    List,
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Command(CommandNode),
    Pipeline(PipelineNode),
    Redirect(RedirectNode),
    Subshell(SubshellNode),
    Variable(VariableNode),
    String(StringNode),
    Glob(GlobNode),
    Background(BackgroundNode),
    List(ListNode),
    And(BinaryNode),
    Or(BinaryNode),
}

/// A simple command. `children` holds the structured parts of its words
/// (strings, variables, globs, substitutions) followed by its redirects.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandNode {
    pub name: String,
    pub args: Vec<String>,
    pub children: Vec<Node>,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineNode {
    pub commands: Vec<Node>,
    /// The pipeline ended in `|` with nothing after it
    pub trailing_pipe: bool,
    pub position: Position,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RedirectKind {
    Input,
    Output,
    Error,
    Append,
    Here,
    Duplicate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RedirectNode {
    pub kind: RedirectKind,
    pub fd: i32,
    pub target: String,
    pub position: Position,
}

impl RedirectNode {
    pub fn is_append(&self) -> bool {
        self.kind == RedirectKind::Append
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubshellNode {
    pub body: Option<Box<Node>>,
    /// `$(...)` or backticks, as opposed to a bare `( ... )`
    pub is_command: bool,
    pub backtick: bool,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableNode {
    pub name: String,
    /// Expansion operator inside braces, e.g. `:-default` or `##*:`
    pub modifier: Option<String>,
    pub braced: bool,
    pub position: Position,
}

const SPECIAL_PARAMETERS: &[char] = &['?', '@', '*', '#', '$', '!', '-'];
const MODIFIER_CHARS: &[char] = &[':', '-', '=', '?', '+', '#', '%', '/', '^', ',', '[', '@', '*'];

impl VariableNode {
    /// Build from raw lexer text such as `$HOME` or `${PATH##*:}`
    pub fn from_raw(raw: &str, position: Position) -> Self {
        let body = raw.strip_prefix('$').unwrap_or(raw);
        let Some(inner) = body.strip_prefix('{') else {
            return Self {
                name: body.to_string(),
                modifier: None,
                braced: false,
                position,
            };
        };
        let inner = inner.strip_suffix('}').unwrap_or(inner);

        // ${#NAME} is the length of NAME
        if let Some(rest) = inner.strip_prefix('#') {
            if is_valid_name(rest) {
                return Self {
                    name: rest.to_string(),
                    modifier: Some("#".to_string()),
                    braced: true,
                    position,
                };
            }
        }

        let split = inner
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(inner.len());
        let (name, rest) = if split == 0 {
            match inner.chars().next() {
                Some(c) if SPECIAL_PARAMETERS.contains(&c) => inner.split_at(c.len_utf8()),
                _ => ("", inner),
            }
        } else {
            inner.split_at(split)
        };

        let (name, modifier) = match rest.chars().next() {
            None => (name.to_string(), None),
            Some(c) if !name.is_empty() && MODIFIER_CHARS.contains(&c) => {
                (name.to_string(), Some(rest.to_string()))
            }
            // not a recognised expansion, the whole body is the name
            Some(_) => (inner.to_string(), None),
        };

        Self {
            name,
            modifier,
            braced: true,
            position,
        }
    }

    /// Positional and special parameters are exempt from the name rule
    pub fn is_special(&self) -> bool {
        let mut chars = self.name.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => c.is_ascii_digit() || SPECIAL_PARAMETERS.contains(&c),
            (Some(_), Some(_)) => self.name.chars().all(|c| c.is_ascii_digit()),
            _ => false,
        }
    }
}

/// `[A-Za-z_][A-Za-z0-9_]*`
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StringNode {
    pub value: String,
    pub quote: QuoteKind,
    /// Variables and substitutions found inside a double-quoted string
    pub expansions: Vec<Node>,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GlobNode {
    pub pattern: String,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BackgroundNode {
    pub body: Box<Node>,
    pub position: Position,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ListSeparator {
    #[serde(rename = ";")]
    Semicolon,
    #[serde(rename = "&")]
    Ampersand,
    #[serde(rename = "&&")]
    And,
    #[serde(rename = "||")]
    Or,
}

impl ListSeparator {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListSeparator::Semicolon => ";",
            ListSeparator::Ampersand => "&",
            ListSeparator::And => "&&",
            ListSeparator::Or => "||",
        }
    }
}

/// Commands run in sequence. `separators[i]` follows `items[i]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ListNode {
    pub items: Vec<Node>,
    pub separators: Vec<ListSeparator>,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BinaryNode {
    pub left: Box<Node>,
    pub right: Box<Node>,
    pub position: Position,
}

impl Node {
    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Command(_) => NodeKind::Command,
            Node::Pipeline(_) => NodeKind::Pipeline,
            Node::Redirect(_) => NodeKind::Redirect,
            Node::Subshell(_) => NodeKind::Subshell,
            Node::Variable(_) => NodeKind::Variable,
            Node::String(_) => NodeKind::String,
            Node::Glob(_) => NodeKind::Glob,
            Node::Background(_) => NodeKind::Background,
            Node::List(_) => NodeKind::List,
            Node::And(_) => NodeKind::And,
            Node::Or(_) => NodeKind::Or,
        }
    }

    pub fn position(&self) -> Position {
        match self {
            Node::Command(n) => n.position,
            Node::Pipeline(n) => n.position,
            Node::Redirect(n) => n.position,
            Node::Subshell(n) => n.position,
            Node::Variable(n) => n.position,
            Node::String(n) => n.position,
            Node::Glob(n) => n.position,
            Node::Background(n) => n.position,
            Node::List(n) => n.position,
            Node::And(n) | Node::Or(n) => n.position,
        }
    }

    /// Direct children in source order
    pub fn children(&self) -> Vec<&Node> {
        match self {
            Node::Command(n) => n.children.iter().collect(),
            Node::Pipeline(n) => n.commands.iter().collect(),
            Node::Subshell(n) => n.body.iter().map(|b| b.as_ref()).collect(),
            Node::String(n) => n.expansions.iter().collect(),
            Node::Background(n) => vec![n.body.as_ref()],
            Node::List(n) => n.items.iter().collect(),
            Node::And(n) | Node::Or(n) => vec![n.left.as_ref(), n.right.as_ref()],
            Node::Redirect(_) | Node::Variable(_) | Node::Glob(_) => Vec::new(),
        }
    }

    /// Structural checks on this node only, children are not visited
    pub fn validate(&self) -> Vec<Finding> {
        let mut findings = Vec::new();
        match self {
            Node::Command(n) => {
                if n.name.is_empty() {
                    findings.push(Finding::syntax("Empty command").at(n.position));
                }
            }
            Node::Pipeline(n) => {
                if n.commands.is_empty() {
                    findings.push(Finding::syntax("Empty pipeline").at(n.position));
                }
                if n.trailing_pipe {
                    findings.push(
                        Finding::syntax("Unexpected end of command after pipe")
                            .at(n.position)
                            .with_suggestion("Add a command after the pipe (|) or remove the pipe"),
                    );
                }
            }
            Node::Redirect(n) => {
                if n.target.is_empty() {
                    findings.push(Finding::syntax("Missing redirect target").at(n.position));
                }
                if !(0..=9).contains(&n.fd) {
                    findings.push(
                        Finding::syntax(format!("Invalid file descriptor: {}", n.fd)).at(n.position),
                    );
                }
            }
            Node::Variable(n) => {
                if !n.is_special() && !is_valid_name(&n.name) {
                    findings.push(
                        Finding::new(
                            FindingKind::Syntax,
                            Severity::Error,
                            format!("Invalid variable name: {}", n.name),
                        )
                        .at(n.position)
                        .with_suggestion("Variable names must start with letter or underscore"),
                    );
                }
            }
            _ => {}
        }
        findings
    }
}

impl CommandNode {
    pub fn redirects(&self) -> impl Iterator<Item = &RedirectNode> {
        self.children.iter().filter_map(|child| match child {
            Node::Redirect(r) => Some(r),
            _ => None,
        })
    }

    /// Name followed by args, as the words appeared
    pub fn words(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.args.iter().map(String::as_str))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos() -> Position {
        Position::start()
    }

    #[test]
    fn test_variable_from_raw() {
        let v = VariableNode::from_raw("$HOME", pos());
        assert_eq!(v.name, "HOME");
        assert!(!v.braced);

        let v = VariableNode::from_raw("${PATH##*:}", pos());
        assert_eq!(v.name, "PATH");
        assert_eq!(v.modifier.as_deref(), Some("##*:"));

        let v = VariableNode::from_raw("${NAME:-x}", pos());
        assert_eq!(v.name, "NAME");
        assert_eq!(v.modifier.as_deref(), Some(":-x"));

        let v = VariableNode::from_raw("${#VAR}", pos());
        assert_eq!(v.name, "VAR");

        let v = VariableNode::from_raw("${##}", pos());
        assert_eq!(v.name, "#");
        assert!(v.is_special());
    }

    #[test]
    fn test_invalid_variable_name() {
        let node = Node::Variable(VariableNode::from_raw("${1abc}", pos()));
        let findings = node.validate();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].message, "Invalid variable name: 1abc");

        let node = Node::Variable(VariableNode::from_raw("${foo bar}", pos()));
        assert_eq!(node.validate()[0].message, "Invalid variable name: foo bar");

        for ok in ["$?", "$1", "${10}", "$_x", "${IFS}"] {
            let node = Node::Variable(VariableNode::from_raw(ok, pos()));
            assert!(node.validate().is_empty(), "{} should be valid", ok);
        }
    }

    #[test]
    fn test_validate_is_local() {
        let empty = Node::Command(CommandNode {
            name: String::new(),
            args: vec![],
            children: vec![],
            position: pos(),
        });
        let pipeline = Node::Pipeline(PipelineNode {
            commands: vec![empty],
            trailing_pipe: false,
            position: pos(),
        });
        // the empty child is not reported by its parent
        assert!(pipeline.validate().is_empty());
    }

    #[test]
    fn test_redirect_validation() {
        let node = Node::Redirect(RedirectNode {
            kind: RedirectKind::Output,
            fd: 12,
            target: String::new(),
            position: pos(),
        });
        let messages: Vec<String> = node.validate().into_iter().map(|f| f.message).collect();
        assert_eq!(
            messages,
            vec!["Missing redirect target", "Invalid file descriptor: 12"]
        );
    }

    #[test]
    fn test_valid_names() {
        assert!(is_valid_name("_a1"));
        assert!(is_valid_name("HOME"));
        assert!(!is_valid_name("1a"));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("a-b"));
    }
}

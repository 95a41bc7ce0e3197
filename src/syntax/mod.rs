//! Shell syntax analysis: lexing, parsing and structural validation

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod token;
pub mod validate;

pub use ast::{Node, NodeKind};
pub use parser::{parse, Ast};
pub use validate::{commands, find, validate_tree, walk};

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use crate::error::{LexError, SyntaxError};
use crate::finding::{Finding, FindingKind};

/// Shell dialect. One bash-flavoured parser serves all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShellType {
    Bash,
    Zsh,
    Fish,
    Posix,
    #[default]
    Auto,
}

impl ShellType {
    /// Guess the dialect from telltale constructs
    pub fn detect(command: &str) -> Self {
        if command.contains("[[") && command.contains("]]") {
            ShellType::Bash
        } else if command.contains("setopt") || command.contains("zstyle") {
            ShellType::Zsh
        } else if command.contains("set -x") || command.contains("set -l") {
            ShellType::Fish
        } else {
            ShellType::Posix
        }
    }

    /// Resolve Auto against the command text
    pub fn resolve(self, command: &str) -> Self {
        match self {
            ShellType::Auto => Self::detect(command),
            other => other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ShellType::Bash => "bash",
            ShellType::Zsh => "zsh",
            ShellType::Fish => "fish",
            ShellType::Posix => "posix",
            ShellType::Auto => "auto",
        }
    }
}

impl fmt::Display for ShellType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ShellType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bash" => Ok(ShellType::Bash),
            "zsh" => Ok(ShellType::Zsh),
            "fish" => Ok(ShellType::Fish),
            "posix" | "sh" => Ok(ShellType::Posix),
            "auto" => Ok(ShellType::Auto),
            other => Err(format!("unknown shell '{}'", other)),
        }
    }
}

const UNMATCHED_SINGLE: &str = "Unmatched single quote";
const UNMATCHED_DOUBLE: &str = "Unmatched double quote";

/// Count `quote` characters not preceded by an odd run of backslashes
fn count_unescaped(command: &str, quote: char) -> usize {
    let mut count = 0;
    let mut backslashes = 0;
    for ch in command.chars() {
        if ch == '\\' {
            backslashes += 1;
            continue;
        }
        if ch == quote && backslashes % 2 == 0 {
            count += 1;
        }
        backslashes = 0;
    }
    count
}

/// Quick checks on the raw text that need no parse
pub fn simple_check(command: &str) -> Vec<Finding> {
    let mut findings = Vec::new();

    if count_unescaped(command, '\'') % 2 != 0 {
        findings.push(
            Finding::syntax(UNMATCHED_SINGLE)
                .with_suggestion("Add a closing single quote (') to match the opening quote"),
        );
    }
    if count_unescaped(command, '"') % 2 != 0 {
        findings.push(
            Finding::syntax(UNMATCHED_DOUBLE)
                .with_suggestion("Add a closing double quote (\") to match the opening quote"),
        );
    }

    let trimmed = command.trim();
    if trimmed.ends_with('|') {
        findings.push(
            Finding::syntax("Unexpected end of command after pipe")
                .with_suggestion("Add a command after the pipe (|) or remove the pipe"),
        );
    }
    if trimmed.is_empty() {
        findings.push(Finding::syntax("Empty command"));
    }

    findings
}

/// Outcome of the syntax stage
#[derive(Debug, Clone, Default)]
pub struct SyntaxReport {
    pub ast: Option<Ast>,
    pub findings: Vec<Finding>,
    /// Notes about analysis that could not be completed
    pub warnings: Vec<String>,
}

/// Simple check, parse and tree validation, merged and deduplicated
pub fn analyze(command: &str, strict: bool) -> SyntaxReport {
    let mut report = SyntaxReport {
        findings: simple_check(command),
        ..Default::default()
    };

    match parse(command) {
        Ok(ast) => {
            report.findings.extend(ast.diagnostics.iter().cloned());
            report.findings.extend(validate_tree(&ast.root, strict));
            report.ast = Some(ast);
        }
        Err(SyntaxError::Lex(err)) => {
            let already_reported = match &err {
                LexError::UnterminatedString { quote: '\'', .. } => {
                    has_message(&report.findings, UNMATCHED_SINGLE)
                }
                LexError::UnterminatedString { quote: '"', .. } => {
                    has_message(&report.findings, UNMATCHED_DOUBLE)
                }
                _ => false,
            };
            if !already_reported {
                report
                    .findings
                    .push(Finding::syntax(capitalize(&err.to_string())).at(err.position()));
            }
            report
                .warnings
                .push(format!("Structural analysis skipped: {}", err));
        }
        Err(err @ SyntaxError::Parse(_)) => {
            report.findings.extend(err.diagnostics().iter().cloned());
            if report.findings.is_empty() {
                report.findings.push(Finding::syntax("Empty command"));
            }
        }
    }

    dedupe(&mut report.findings);
    debug!(findings = report.findings.len(), "syntax analysis done");
    report
}

fn has_message(findings: &[Finding], message: &str) -> bool {
    findings.iter().any(|f| f.message == message)
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Keep the first finding for each (kind, message) pair
pub fn dedupe(findings: &mut Vec<Finding>) {
    let mut seen: HashSet<(FindingKind, String)> = HashSet::new();
    findings.retain(|f| seen.insert((f.kind, f.message.clone())));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn messages(findings: &[Finding]) -> Vec<&str> {
        findings.iter().map(|f| f.message.as_str()).collect()
    }

    #[test]
    fn test_detect_shell() {
        assert_eq!(ShellType::detect("[[ -f x ]] && echo y"), ShellType::Bash);
        assert_eq!(ShellType::detect("setopt autocd"), ShellType::Zsh);
        assert_eq!(ShellType::detect("set -x PATH /bin"), ShellType::Fish);
        assert_eq!(ShellType::detect("ls"), ShellType::Posix);
        assert_eq!(ShellType::Auto.resolve("ls"), ShellType::Posix);
        assert_eq!(ShellType::Zsh.resolve("ls"), ShellType::Zsh);
    }

    #[test]
    fn test_quote_parity() {
        assert!(simple_check("echo 'a' \"b\"").is_empty());
        assert_eq!(messages(&simple_check("echo 'a")), vec![UNMATCHED_SINGLE]);
        assert_eq!(messages(&simple_check("echo \"a")), vec![UNMATCHED_DOUBLE]);
        // escaped quotes do not count
        assert!(simple_check(r#"echo \"a"#).is_empty());
        assert_eq!(
            messages(&simple_check(r#"echo \\"a"#)),
            vec![UNMATCHED_DOUBLE]
        );
        // parity is literal: quotes inside the other kind still count
        assert_eq!(messages(&simple_check(r#"echo "it's""#)), vec![UNMATCHED_SINGLE]);
    }

    #[test]
    fn test_trailing_pipe_and_empty() {
        assert_eq!(
            messages(&simple_check("ls | ")),
            vec!["Unexpected end of command after pipe"]
        );
        assert_eq!(messages(&simple_check("  ")), vec!["Empty command"]);
    }

    #[test]
    fn test_analyze_clean_command() {
        let report = analyze("echo \"Hello World\"", false);
        assert!(report.findings.is_empty());
        assert!(report.ast.is_some());
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_analyze_unterminated_quote_reported_once() {
        let report = analyze("echo \"hello", false);
        assert_eq!(messages(&report.findings), vec![UNMATCHED_DOUBLE]);
        assert!(report.ast.is_none());
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn test_analyze_dedupes_trailing_pipe() {
        let report = analyze("cat file |", false);
        assert_eq!(
            messages(&report.findings),
            vec!["Unexpected end of command after pipe"]
        );
    }

    #[test]
    fn test_analyze_empty_command() {
        let report = analyze("", false);
        assert_eq!(messages(&report.findings), vec!["Empty command"]);
        assert!(report.ast.is_none());
    }

    #[test]
    fn test_analyze_unterminated_substitution() {
        let report = analyze("echo $(ls", false);
        assert_eq!(report.findings.len(), 1);
        assert!(report.findings[0]
            .message
            .starts_with("Unterminated command substitution"));
    }
}

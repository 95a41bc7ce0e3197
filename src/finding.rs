//! Uniform finding shape emitted by every analysis stage

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::risk::RiskLevel;

/// Location in the analysed command text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Position {
    /// 1-based line
    pub line: usize,
    /// 1-based column, reset on every newline
    pub column: usize,
    /// Byte offset from the start of the input
    pub offset: usize,
}

impl Position {
    pub fn start() -> Self {
        Self {
            line: 1,
            column: 1,
            offset: 0,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FindingKind {
    Syntax,
    Safety,
    Permission,
    Deprecated,
    Custom,
}

impl FindingKind {
    /// Whether findings of this kind feed the risk aggregator
    pub fn is_safety_relevant(&self) -> bool {
        matches!(self, FindingKind::Safety | FindingKind::Custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        };
        f.write_str(s)
    }
}

/// One reported issue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub kind: FindingKind,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    pub risk_level: RiskLevel,
}

impl Finding {
    pub fn new(kind: FindingKind, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity,
            position: None,
            message: message.into(),
            rule: None,
            suggestion: None,
            risk_level: RiskLevel::Low,
        }
    }

    /// A structural error found while lexing, parsing or walking the AST
    pub fn syntax(message: impl Into<String>) -> Self {
        Self::new(FindingKind::Syntax, Severity::Error, message)
    }

    /// A rule hit whose severity follows from its risk level
    pub fn rule_hit(
        kind: FindingKind,
        rule: impl Into<String>,
        risk_level: RiskLevel,
        message: impl Into<String>,
    ) -> Self {
        let mut finding = Self::new(kind, risk_level.severity(), message);
        finding.rule = Some(rule.into());
        finding.risk_level = risk_level;
        finding
    }

    pub fn at(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        let suggestion = suggestion.into();
        if !suggestion.is_empty() {
            self.suggestion = Some(suggestion);
        }
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_risk(mut self, risk_level: RiskLevel) -> Self {
        self.risk_level = risk_level;
        self
    }

    pub fn rule_name(&self) -> Option<&str> {
        self.rule.as_deref()
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.severity, self.message)?;
        if let Some(pos) = self.position {
            write!(f, " (at {})", pos)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_hit_severity_follows_risk() {
        let low = Finding::rule_hit(FindingKind::Safety, "r", RiskLevel::Low, "m");
        let high = Finding::rule_hit(FindingKind::Safety, "r", RiskLevel::High, "m");
        assert_eq!(low.severity, Severity::Info);
        assert_eq!(high.severity, Severity::Error);
        assert_eq!(high.rule_name(), Some("r"));
    }

    #[test]
    fn test_empty_suggestion_is_dropped() {
        let finding = Finding::syntax("Empty command").with_suggestion("");
        assert!(finding.suggestion.is_none());
    }

    #[test]
    fn test_display_includes_position() {
        let finding = Finding::syntax("Missing redirect target").at(Position {
            line: 1,
            column: 7,
            offset: 6,
        });
        assert_eq!(
            finding.to_string(),
            "[error] Missing redirect target (at 1:7)"
        );
    }
}

//! Safety rules: built-in patterns, user-defined rules and the
//! context-aware git and CI checks

mod builtin;
mod ci;
mod custom;
mod git;

pub use builtin::BuiltinRules;
pub use ci::{CiContext, CiPlatform, CiRules};
pub use custom::{default_rules_path, CustomRule, CustomRuleEngine, RuleFile};
pub use git::{GitContext, GitRules, PROTECTED_BRANCHES};

use regex::Regex;

use crate::error::{RuleError, RuleResult};
use crate::finding::{Finding, FindingKind};
use crate::risk::RiskLevel;

/// A named regex rule ready to match
#[derive(Debug, Clone)]
pub struct PatternRule {
    pub name: String,
    pub description: String,
    pub pattern: Regex,
    pub level: RiskLevel,
    pub message: String,
    pub suggestion: String,
}

impl PatternRule {
    pub fn compile(name: &str, pattern: &str, level: RiskLevel) -> RuleResult<Self> {
        let pattern = Regex::new(pattern).map_err(|source| RuleError::InvalidPattern {
            name: name.to_string(),
            source,
        })?;
        Ok(Self {
            name: name.to_string(),
            description: String::new(),
            pattern,
            level,
            message: String::new(),
            suggestion: String::new(),
        })
    }

    pub fn described(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn with_message(mut self, message: &str, suggestion: &str) -> Self {
        self.message = message.to_string();
        self.suggestion = suggestion.to_string();
        self
    }

    pub fn matches(&self, command: &str) -> bool {
        self.pattern.is_match(command)
    }

    /// At most one finding, raised when the pattern matches anywhere
    pub fn check(&self, command: &str, kind: FindingKind) -> Option<Finding> {
        if !self.matches(command) {
            return None;
        }
        Some(
            Finding::rule_hit(kind, &self.name, self.level, &self.message)
                .with_suggestion(&self.suggestion),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_rejects_bad_pattern() {
        let err = PatternRule::compile("broken", "(unclosed", RiskLevel::High).unwrap_err();
        assert!(matches!(err, RuleError::InvalidPattern { ref name, .. } if name == "broken"));
    }

    #[test]
    fn test_check_builds_finding() {
        let rule = PatternRule::compile("no-npm-force", r"npm\s+.*--force", RiskLevel::Medium)
            .unwrap()
            .with_message("npm --force", "");
        assert!(rule.check("npm install", FindingKind::Custom).is_none());
        let finding = rule.check("npm install --force", FindingKind::Custom).unwrap();
        assert_eq!(finding.kind, FindingKind::Custom);
        assert_eq!(finding.rule_name(), Some("no-npm-force"));
        assert_eq!(finding.risk_level, RiskLevel::Medium);
        assert!(finding.suggestion.is_none());
    }
}

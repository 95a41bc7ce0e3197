//! Risk aggregation: folds findings and environment facts into one
//! ordered assessment

mod context;
mod level;
pub mod permission;

pub use context::{EnvironmentContext, IMPORTANT_PATHS};
pub use level::RiskLevel;
pub use permission::{check_requirements, FsProbe, PermissionProbe, PermissionRequirement};

use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::LazyLock;
use tracing::debug;

use crate::finding::{Finding, FindingKind};

static ELEVATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bsudo\b|\bsu\s").expect("invalid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FactorType {
    Permission,
    Safety,
    Custom,
    System,
    Git,
    Force,
}

impl FactorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FactorType::Permission => "permission",
            FactorType::Safety => "safety",
            FactorType::Custom => "custom",
            FactorType::System => "system",
            FactorType::Git => "git",
            FactorType::Force => "force",
        }
    }
}

impl fmt::Display for FactorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RiskFactor {
    #[serde(rename = "type")]
    pub factor_type: FactorType,
    pub description: String,
    pub level: RiskLevel,
    pub mitigation: String,
}

impl RiskFactor {
    pub fn new(
        factor_type: FactorType,
        level: RiskLevel,
        description: impl Into<String>,
        mitigation: impl Into<String>,
    ) -> Self {
        Self {
            factor_type,
            description: description.into(),
            level,
            mitigation: mitigation.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RiskAssessment {
    pub overall_risk: RiskLevel,
    pub factors: Vec<RiskFactor>,
    pub requires_root: bool,
    pub affects_system: bool,
    pub is_irreversible: bool,
    pub context: EnvironmentContext,
}

impl RiskAssessment {
    pub fn new(context: EnvironmentContext) -> Self {
        Self {
            overall_risk: RiskLevel::Low,
            factors: Vec::new(),
            requires_root: false,
            affects_system: false,
            is_irreversible: false,
            context,
        }
    }

    /// Append a factor, keeping the derived fields in step
    pub fn add_factor(&mut self, factor: RiskFactor) {
        self.factors.push(factor);
        self.recompute();
    }

    fn recompute(&mut self) {
        self.overall_risk = overall(&self.factors);
        self.is_irreversible = self.factors.iter().any(|f| f.level == RiskLevel::Critical);
    }
}

/// Highest factor level, Low when there are none
pub fn overall(factors: &[RiskFactor]) -> RiskLevel {
    factors
        .iter()
        .map(|f| f.level)
        .max()
        .unwrap_or(RiskLevel::Low)
}

pub struct RiskAggregator {
    probe: Box<dyn PermissionProbe + Send + Sync>,
}

impl Default for RiskAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl RiskAggregator {
    pub fn new() -> Self {
        Self::with_probe(FsProbe::new())
    }

    pub fn with_probe(probe: impl PermissionProbe + Send + Sync + 'static) -> Self {
        Self {
            probe: Box::new(probe),
        }
    }

    /// Fold every check into one assessment. Each check always runs; none
    /// short-circuits the others.
    pub fn assess(
        &self,
        command: &str,
        findings: &[Finding],
        env: &EnvironmentContext,
    ) -> RiskAssessment {
        let mut assessment = RiskAssessment::new(env.clone());

        let perms = check_requirements(command, self.probe.as_ref());
        if perms.requires_root {
            assessment.requires_root = true;
            if !perms.missing_permissions.is_empty() {
                assessment.add_factor(RiskFactor::new(
                    FactorType::Permission,
                    RiskLevel::High,
                    "Command requires elevated privileges that are not available",
                    "Run with sudo or as root user",
                ));
            }
        }
        for missing in &perms.missing_permissions {
            assessment.add_factor(RiskFactor::new(
                FactorType::Permission,
                RiskLevel::Medium,
                missing,
                "Ensure you have necessary permissions or use sudo",
            ));
        }

        for finding in findings.iter().filter(|f| f.kind.is_safety_relevant()) {
            let factor_type = match finding.kind {
                FindingKind::Custom => FactorType::Custom,
                _ => FactorType::Safety,
            };
            assessment.add_factor(RiskFactor::new(
                factor_type,
                finding.risk_level,
                &finding.message,
                finding.suggestion.clone().unwrap_or_default(),
            ));
        }

        if ELEVATION.is_match(command) {
            assessment.requires_root = true;
            assessment.add_factor(RiskFactor::new(
                FactorType::Permission,
                RiskLevel::Medium,
                "Command requires elevated privileges",
                "Ensure you understand why root access is needed",
            ));
        }

        if let Some(path) = env
            .important_paths
            .iter()
            .find(|p| references_path(command, p))
        {
            assessment.affects_system = true;
            assessment.add_factor(RiskFactor::new(
                FactorType::System,
                RiskLevel::High,
                format!("Command affects system directory: {}", path),
                "Be extra careful when modifying system directories",
            ));
        }

        if env.is_git_repository {
            if command.contains("git reset --hard") || command.contains("git clean -fd") {
                assessment.add_factor(RiskFactor::new(
                    FactorType::Git,
                    RiskLevel::Medium,
                    "Command will permanently discard git changes",
                    "Consider using 'git stash' to save changes first",
                ));
            }
            if command.contains("force") || command.contains(" -f") {
                assessment.add_factor(RiskFactor::new(
                    FactorType::Force,
                    RiskLevel::Medium,
                    "Force flag detected - bypasses safety checks",
                    "Remove force flag unless absolutely necessary",
                ));
            }
        }

        debug!(
            overall = %assessment.overall_risk,
            factors = assessment.factors.len(),
            "risk assessed"
        );
        assessment
    }
}

/// Whether `path` appears as a whole path prefix, not inside another word
fn references_path(command: &str, path: &str) -> bool {
    command.match_indices(path).any(|(start, _)| {
        let before = command[..start].chars().next_back();
        let after = command[start + path.len()..].chars().next();
        let opens = before.map_or(true, |c| c.is_whitespace() || "'\"=:(<>".contains(c));
        let closes = after.map_or(true, |c| c == '/' || c.is_whitespace() || "'\";|&)".contains(c));
        opens && closes
    })
}

#[cfg(test)]
mod tests {
    use super::permission::tests::StaticProbe;
    use super::*;

    fn aggregator() -> RiskAggregator {
        RiskAggregator::with_probe(StaticProbe {
            root: true,
            ..Default::default()
        })
    }

    fn safety(level: RiskLevel, message: &str) -> Finding {
        Finding::rule_hit(FindingKind::Safety, "test", level, message)
    }

    #[test]
    fn test_no_factors_is_low() {
        let a = aggregator().assess("echo \"Hello World\"", &[], &EnvironmentContext::default());
        assert_eq!(a.overall_risk, RiskLevel::Low);
        assert!(a.factors.is_empty());
        assert!(!a.is_irreversible);
        assert!(!a.requires_root);
    }

    #[test]
    fn test_findings_become_factors() {
        let findings = vec![
            safety(RiskLevel::High, "recursive delete"),
            safety(RiskLevel::Critical, "root delete"),
            Finding::syntax("Unmatched double quote"),
            Finding::rule_hit(FindingKind::Custom, "mine", RiskLevel::Medium, "custom hit"),
        ];
        let a = aggregator().assess("rm -rf build", &findings, &EnvironmentContext::default());
        let types: Vec<FactorType> = a.factors.iter().map(|f| f.factor_type).collect();
        assert_eq!(types, vec![FactorType::Safety, FactorType::Safety, FactorType::Custom]);
        assert_eq!(a.overall_risk, RiskLevel::Critical);
        assert!(a.is_irreversible);
    }

    #[test]
    fn test_overall_is_monotonic() {
        let mut a = RiskAssessment::new(EnvironmentContext::default());
        let mut last = a.overall_risk;
        for level in [RiskLevel::Medium, RiskLevel::Low, RiskLevel::Critical, RiskLevel::High] {
            a.add_factor(RiskFactor::new(FactorType::Safety, level, "x", ""));
            assert!(a.overall_risk >= last);
            assert_eq!(a.overall_risk, last.max(level));
            last = a.overall_risk;
        }
        // dropping factors never raises the level
        let fewer = overall(&a.factors[..2]);
        assert!(fewer <= a.overall_risk);
        assert_eq!(fewer, RiskLevel::Medium);
    }

    #[test]
    fn test_sudo_and_system_paths() {
        let a = aggregator().assess("sudo cat /etc/shadow", &[], &EnvironmentContext::default());
        assert!(a.requires_root);
        assert!(a.affects_system);
        assert_eq!(a.overall_risk, RiskLevel::High);
        assert_eq!(a.factors[1].description, "Command affects system directory: /etc");

        let a = aggregator().assess("ls ./etcetera /tmp/usrdata", &[], &EnvironmentContext::default());
        assert!(!a.affects_system);
    }

    #[test]
    fn test_missing_permissions_raise_factors() {
        let agg = RiskAggregator::with_probe(StaticProbe::with(&["/etc/hosts"], &[]));
        let a = agg.assess("touch /etc/hosts", &[], &EnvironmentContext::default());
        assert!(a.requires_root);
        assert_eq!(a.factors[0].level, RiskLevel::High);
        let permission = a
            .factors
            .iter()
            .filter(|f| f.factor_type == FactorType::Permission)
            .count();
        // elevated privileges plus three missing permissions
        assert_eq!(permission, 4);
    }

    #[test]
    fn test_git_factors_only_in_repository() {
        let repo = EnvironmentContext {
            is_git_repository: true,
            ..Default::default()
        };
        let a = aggregator().assess("git reset --hard && git push --force", &[], &repo);
        let types: Vec<FactorType> = a.factors.iter().map(|f| f.factor_type).collect();
        assert_eq!(types, vec![FactorType::Git, FactorType::Force]);

        let a = aggregator().assess("git push --force", &[], &EnvironmentContext::default());
        assert!(a.factors.is_empty());
    }

    #[test]
    fn test_factor_serializes_type_field() {
        let factor = RiskFactor::new(FactorType::Git, RiskLevel::Medium, "d", "m");
        let json = serde_json::to_value(&factor).unwrap();
        assert_eq!(json["type"], "git");
        assert_eq!(json["level"], "medium");
    }
}

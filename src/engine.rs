//! Validation pipeline: syntax, obfuscation, rules, then risk

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::collections::HashSet;
use std::path::Path;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::config::Config;
use crate::finding::{Finding, FindingKind, Severity};
use crate::obfuscation::{ObfuscationDetector, ObfuscationResult};
use crate::risk::{EnvironmentContext, RiskAggregator, RiskAssessment};
use crate::rules::{BuiltinRules, CiContext, CiRules, CustomRuleEngine, GitContext, GitRules};
use crate::syntax::{self, ShellType};

const OBFUSCATION_RULE: &str = "ObfuscationDetection";
const DEOBFUSCATED_PREFIX: &str = "(deobfuscated) ";

/// Facts about the surroundings, captured once before an analysis
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AnalysisContext {
    pub env: EnvironmentContext,
    pub git: GitContext,
    pub ci: CiContext,
}

impl AnalysisContext {
    /// Probe the working directory, its repository and the CI environment
    pub fn capture() -> Self {
        let env = EnvironmentContext::probe();
        let git = GitContext::probe(&env.current_directory);
        Self {
            env,
            git,
            ci: CiContext::from_env(),
        }
    }

    pub fn capture_at(dir: &Path) -> Self {
        let env = EnvironmentContext::probe_at(dir, dirs::home_dir().as_deref());
        Self {
            git: GitContext::probe(dir),
            env,
            ci: CiContext::from_env(),
        }
    }
}

/// A safer way to write the analysed command
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Suggestion {
    pub message: String,
    pub alternative: String,
    pub explanation: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationResult {
    /// No error-severity finding was raised
    pub valid: bool,
    pub command: String,
    pub shell: ShellType,
    pub errors: Vec<Finding>,
    pub warnings: Vec<Finding>,
    pub suggestions: Vec<Suggestion>,
    pub risk_assessment: RiskAssessment,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub obfuscation: Option<ObfuscationResult>,
    /// Stages that could not complete
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "duration_ms", serialize_with = "as_millis")]
    pub duration: Duration,
}

impl ValidationResult {
    /// All findings, errors first
    pub fn findings(&self) -> impl Iterator<Item = &Finding> {
        self.errors.iter().chain(self.warnings.iter())
    }

    pub fn has_rule(&self, rule: &str) -> bool {
        self.findings().any(|f| f.rule_name() == Some(rule))
    }
}

fn as_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64() * 1000.0)
}

pub struct Engine {
    config: Config,
    obfuscation: ObfuscationDetector,
    builtin: BuiltinRules,
    custom: RwLock<CustomRuleEngine>,
    git: GitRules,
    ci: CiRules,
    risk: RiskAggregator,
}

impl Engine {
    /// Engine without custom rules on disk
    pub fn new(config: Config) -> Self {
        Self::with_custom_rules(config, CustomRuleEngine::in_memory())
    }

    pub fn with_custom_rules(config: Config, custom: CustomRuleEngine) -> Self {
        Self {
            obfuscation: ObfuscationDetector::new(config.obfuscation.confidence_threshold),
            config,
            builtin: BuiltinRules::new(),
            custom: RwLock::new(custom),
            git: GitRules::new(),
            ci: CiRules::new(),
            risk: RiskAggregator::new(),
        }
    }

    /// Engine with custom rules loaded from the configured file. A file
    /// that cannot be loaded leaves the custom set empty.
    pub fn from_config(config: Config) -> Self {
        let custom = match (config.validation.enable_custom_rules, config.rules_path()) {
            (true, Some(path)) => CustomRuleEngine::load(&path).unwrap_or_else(|err| {
                warn!(path = %path.display(), error = %err, "custom rules unavailable");
                CustomRuleEngine::in_memory()
            }),
            _ => CustomRuleEngine::in_memory(),
        };
        Self::with_custom_rules(config, custom)
    }

    pub fn with_aggregator(mut self, risk: RiskAggregator) -> Self {
        self.risk = risk;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn builtin_rules(&self) -> &BuiltinRules {
        &self.builtin
    }

    pub fn custom_rules(&self) -> RwLockReadGuard<'_, CustomRuleEngine> {
        self.custom.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Writer access; mutations from concurrent callers run one at a time
    pub fn custom_rules_mut(&self) -> RwLockWriteGuard<'_, CustomRuleEngine> {
        self.custom.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Context for this engine's enabled checks
    pub fn capture_context(&self) -> AnalysisContext {
        let env = EnvironmentContext::probe();
        let git = if self.config.validation.enable_git_checks {
            GitContext::probe(&env.current_directory)
        } else {
            GitContext::default()
        };
        AnalysisContext {
            env,
            git,
            ci: CiContext::from_env(),
        }
    }

    pub fn validate(&self, command: &str) -> ValidationResult {
        self.validate_with_context(command, &self.capture_context())
    }

    /// Analyse `command` against a fixed context snapshot
    pub fn validate_with_context(&self, command: &str, ctx: &AnalysisContext) -> ValidationResult {
        let started = Instant::now();
        let opts = &self.config.validation;
        let shell = opts.shell.resolve(command);
        let mut findings = Vec::new();
        let mut notes = Vec::new();

        let ast = if opts.enable_syntax_check {
            let report = syntax::analyze(command, opts.strict_mode);
            findings.extend(report.findings);
            notes.extend(report.warnings);
            report.ast
        } else {
            syntax::parse(command).ok()
        };

        let obfuscation = opts.enable_obfuscation_detection.then(|| {
            let result = self.obfuscation.detect(command);
            if result.is_obfuscated {
                let above_threshold = result.confidence >= self.obfuscation.confidence_threshold();
                findings.push(obfuscation_finding(&result, above_threshold));
            }
            result
        });

        findings.extend(self.pattern_findings(command));
        if opts.enable_git_checks {
            findings.extend(self.git.check(command, ast.as_ref(), &ctx.git));
        }
        if opts.enable_ci_checks {
            findings.extend(self.ci.check(command, &ctx.ci));
        }

        if let Some(result) = obfuscation.as_ref() {
            if opts.analyze_deobfuscated && result.has_candidate(command) {
                let extra = self.deobfuscated_findings(&result.deobfuscated, &findings);
                debug!(extra = extra.len(), "rules on deobfuscated candidate");
                findings.extend(extra);
            }
        }

        let risk_assessment = self.risk.assess(command, &findings, &ctx.env);
        let suggestions = suggestions_for(command, &findings, obfuscation.as_ref());
        let (errors, warnings): (Vec<Finding>, Vec<Finding>) = findings
            .into_iter()
            .partition(is_blocking);

        let result = ValidationResult {
            valid: errors.is_empty(),
            command: command.to_string(),
            shell,
            errors,
            warnings,
            suggestions,
            risk_assessment,
            obfuscation,
            notes,
            timestamp: Utc::now(),
            duration: started.elapsed(),
        };
        debug!(
            valid = result.valid,
            errors = result.errors.len(),
            warnings = result.warnings.len(),
            risk = %result.risk_assessment.overall_risk,
            "validation done"
        );
        result
    }

    fn pattern_findings(&self, command: &str) -> Vec<Finding> {
        let mut findings = Vec::new();
        if self.config.validation.enable_safety_check {
            findings.extend(self.builtin.check(command));
        }
        if self.config.validation.enable_custom_rules {
            findings.extend(self.custom_rules().check(command));
        }
        findings
    }

    /// Rule hits on the decoded text that the raw text did not produce
    fn deobfuscated_findings(&self, candidate: &str, existing: &[Finding]) -> Vec<Finding> {
        let mut seen: HashSet<String> = existing
            .iter()
            .filter_map(|f| f.rule.clone())
            .collect();
        self.pattern_findings(candidate)
            .into_iter()
            .filter(|f| f.rule.as_ref().is_some_and(|rule| seen.insert(rule.clone())))
            .map(|mut f| {
                f.message = format!("{}{}", DEOBFUSCATED_PREFIX, f.message);
                f
            })
            .collect()
    }
}

/// Whether a finding makes the command invalid. Syntax problems block only
/// as errors; rule hits block unless they are informational.
fn is_blocking(finding: &Finding) -> bool {
    match finding.kind {
        FindingKind::Syntax => finding.severity == Severity::Error,
        FindingKind::Safety | FindingKind::Custom | FindingKind::Permission => {
            finding.severity != Severity::Info
        }
        FindingKind::Deprecated => false,
    }
}

fn obfuscation_finding(result: &ObfuscationResult, above_threshold: bool) -> Finding {
    let severity = if above_threshold {
        Severity::Error
    } else {
        Severity::Warning
    };
    Finding::rule_hit(
        FindingKind::Safety,
        OBFUSCATION_RULE,
        result.risk_level,
        format!("Command appears to be obfuscated: {}", result.explanation),
    )
    .with_severity(severity)
    .with_suggestion(
        "Obfuscated commands are often used to hide malicious intent. Review the deobfuscated command carefully.",
    )
}

fn suggestions_for(
    command: &str,
    findings: &[Finding],
    obfuscation: Option<&ObfuscationResult>,
) -> Vec<Suggestion> {
    let mut suggestions: Vec<Suggestion> = Vec::new();
    let mut push = |s: Suggestion| {
        if !suggestions.iter().any(|existing| existing.message == s.message) {
            suggestions.push(s);
        }
    };

    for finding in findings {
        match finding.kind {
            FindingKind::Syntax if finding.message.to_lowercase().contains("quote") => {
                push(Suggestion {
                    message: "Consider using single quotes for literal strings".to_string(),
                    alternative: command.replace('"', "'"),
                    explanation: "Single quotes prevent variable expansion and special character interpretation".to_string(),
                })
            }
            FindingKind::Safety if command.contains("rm -rf") => push(Suggestion {
                message: "Use 'trash' command instead of 'rm -rf'".to_string(),
                alternative: command.replace("rm -rf", "trash"),
                explanation: "The trash command moves files to a recoverable location instead of permanent deletion".to_string(),
            }),
            _ => {}
        }
    }

    if let Some(result) = obfuscation.filter(|r| r.has_candidate(command)) {
        push(Suggestion {
            message: "Review the deobfuscated command before running it".to_string(),
            alternative: result.deobfuscated.clone(),
            explanation: "This is what the command decodes to once the obfuscation is removed"
                .to_string(),
        });
    }

    suggestions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::obfuscation::DEFAULT_CONFIDENCE_THRESHOLD;
    use crate::risk::permission::tests::StaticProbe;
    use crate::risk::RiskLevel;
    use crate::rules::{CiPlatform, CustomRule};
    use pretty_assertions::assert_eq;

    fn engine() -> Engine {
        Engine::new(Config::default()).with_aggregator(RiskAggregator::with_probe(StaticProbe {
            root: true,
            ..Default::default()
        }))
    }

    fn run(command: &str) -> ValidationResult {
        engine().validate_with_context(command, &AnalysisContext::default())
    }

    fn rules(result: &ValidationResult) -> Vec<&str> {
        result.findings().filter_map(|f| f.rule_name()).collect()
    }

    #[test]
    fn test_harmless_command() {
        let result = run("echo \"Hello World\"");
        assert!(result.valid);
        assert_eq!(result.findings().count(), 0);
        assert_eq!(result.risk_assessment.overall_risk, RiskLevel::Low);
        assert!(!result.obfuscation.as_ref().unwrap().is_obfuscated);
        assert!(result.suggestions.is_empty());
        assert_eq!(result.shell, ShellType::Posix);
    }

    #[test]
    fn test_root_delete_is_critical() {
        let result = run("rm -rf /");
        assert!(!result.valid);
        assert!(result.has_rule("RecursiveRootDelete"));
        assert_eq!(result.risk_assessment.overall_risk, RiskLevel::Critical);
        assert!(result.risk_assessment.is_irreversible);
        assert_eq!(result.suggestions[0].alternative, "trash /");
    }

    #[test]
    fn test_unmatched_quote_is_invalid() {
        let result = run("echo \"hello");
        assert!(!result.valid);
        assert!(result.errors.iter().any(|f| f.message == "Unmatched double quote"));
        assert_eq!(
            result.suggestions[0].message,
            "Consider using single quotes for literal strings"
        );
    }

    #[test]
    fn test_base64_pipe_to_shell() {
        let result = run("echo \"cm0gLXJmIC8=\" | base64 -d | bash");
        let obf = result.obfuscation.as_ref().unwrap();
        assert!(obf.is_obfuscated);
        assert_eq!(obf.deobfuscated, "rm -rf /");
        assert!(obf.confidence >= 0.9);
        assert!(result.has_rule(OBFUSCATION_RULE));
        assert_eq!(result.risk_assessment.overall_risk, RiskLevel::Critical);

        let decoded = result
            .findings()
            .find(|f| f.rule_name() == Some("RecursiveRootDelete"))
            .unwrap();
        assert!(decoded.message.starts_with(DEOBFUSCATED_PREFIX));
        assert!(result
            .suggestions
            .iter()
            .any(|s| s.alternative == "rm -rf /"));
    }

    #[test]
    fn test_medium_rule_hits_invalidate() {
        for (command, rule) in [
            ("rm *.log", "WildcardWithRm"),
            ("systemctl stop nginx", "ServiceManipulation"),
        ] {
            let result = run(command);
            assert!(!result.valid, "{}", command);
            let hit = result
                .errors
                .iter()
                .find(|f| f.rule_name() == Some(rule))
                .unwrap();
            assert_eq!(hit.severity, Severity::Warning);
        }
    }

    #[test]
    fn test_obfuscation_below_threshold_still_reported() {
        // six substitutions score 0.6: detected, but under the 0.7 threshold
        let result = run("echo $(a)$(b)$(c)$(d)$(e)$(f)");
        let obf = result.obfuscation.as_ref().unwrap();
        assert!(obf.is_obfuscated);
        assert!(obf.confidence < DEFAULT_CONFIDENCE_THRESHOLD);
        let hit = result
            .errors
            .iter()
            .find(|f| f.rule_name() == Some(OBFUSCATION_RULE))
            .unwrap();
        assert_eq!(hit.severity, Severity::Warning);
        assert!(!result.valid);
    }

    #[test]
    fn test_strict_mode_deprecation_does_not_invalidate() {
        let mut config = Config::default();
        config.validation.strict_mode = true;
        config.validation.enable_obfuscation_detection = false;
        let result = Engine::new(config)
            .with_aggregator(RiskAggregator::with_probe(StaticProbe {
                root: true,
                ..Default::default()
            }))
            .validate_with_context("echo `date`", &AnalysisContext::default());
        assert!(result.warnings.iter().any(|f| f.kind == FindingKind::Deprecated));
        assert!(result.valid);
    }

    #[test]
    fn test_deobfuscated_analysis_can_be_disabled() {
        let mut config = Config::default();
        config.validation.analyze_deobfuscated = false;
        let result = Engine::new(config)
            .validate_with_context("echo \"cm0gLXJmIC8=\" | base64 -d | bash", &AnalysisContext::default());
        assert!(!result.has_rule("RecursiveRootDelete"));
        assert!(result.has_rule(OBFUSCATION_RULE));
    }

    #[test]
    fn test_force_push_protected() {
        let result = run("git push --force origin main");
        let hit = result
            .findings()
            .find(|f| f.rule_name() == Some("git-force-push-protected"))
            .unwrap();
        assert_eq!(hit.risk_level, RiskLevel::High);
    }

    #[test]
    fn test_ci_checks_follow_context() {
        let ctx = AnalysisContext {
            ci: CiContext {
                is_ci: true,
                platform: CiPlatform::GithubActions,
            },
            ..Default::default()
        };
        let result = engine().validate_with_context("env", &ctx);
        assert!(result.has_rule("cicd-env-dump"));
        assert!(!run("env").has_rule("cicd-env-dump"));
    }

    #[test]
    fn test_disabled_stages_emit_nothing() {
        let mut config = Config::default();
        config.validation.enable_syntax_check = false;
        config.validation.enable_safety_check = false;
        config.validation.enable_obfuscation_detection = false;
        config.validation.enable_git_checks = false;
        let result = Engine::new(config)
            .with_aggregator(RiskAggregator::with_probe(StaticProbe {
                root: true,
                ..Default::default()
            }))
            .validate_with_context("git push --force origin main \"", &AnalysisContext::default());
        assert!(result.valid);
        assert!(result.obfuscation.is_none());
        assert_eq!(result.findings().count(), 0);
    }

    #[test]
    fn test_custom_rules_are_consulted() {
        let engine = engine();
        engine
            .custom_rules_mut()
            .add(CustomRule::new("no-make-clean", r"make\s+clean", RiskLevel::Medium))
            .unwrap();
        let result = engine.validate_with_context("make clean", &AnalysisContext::default());
        let hit = result
            .findings()
            .find(|f| f.rule_name() == Some("no-make-clean"))
            .unwrap();
        assert_eq!(hit.kind, FindingKind::Custom);
        assert_eq!(result.risk_assessment.overall_risk, RiskLevel::Medium);
    }

    #[test]
    fn test_same_command_same_findings() {
        let engine = engine();
        let ctx = AnalysisContext::default();
        let first = engine.validate_with_context("sudo rm -rf /var/lib/* && git push -f", &ctx);
        let second = engine.validate_with_context("sudo rm -rf /var/lib/* && git push -f", &ctx);
        assert_eq!(first.errors, second.errors);
        assert_eq!(first.warnings, second.warnings);
        assert_eq!(first.risk_assessment, second.risk_assessment);
    }

    #[test]
    fn test_result_serializes() {
        let json = serde_json::to_value(run("rm -rf /")).unwrap();
        assert_eq!(json["valid"], false);
        assert_eq!(json["shell"], "posix");
        assert_eq!(json["risk_assessment"]["overall_risk"], "critical");
        assert!(json["duration_ms"].is_number());
    }
}

use colored::Colorize;
use serde::Serialize;
use std::fmt::Write;

use super::colorize::{risk_badge, ColorScheme};
use crate::engine::ValidationResult;
use crate::finding::Finding;
use crate::rules::CustomRule;
use crate::safety::{HistoryStats, SafetyDecision};

pub struct OutputFormatter {
    json: bool,
}

impl OutputFormatter {
    pub fn new(json: bool) -> Self {
        Self { json }
    }

    pub fn validation(&self, result: &ValidationResult) {
        if self.json {
            print_json(result);
        } else {
            print!("{}", render_validation(result));
        }
    }

    pub fn rules(&self, rules: &[&CustomRule]) {
        if self.json {
            print_json(&rules);
        } else {
            print!("{}", render_rules(rules));
        }
    }

    pub fn history(&self, decisions: &[SafetyDecision]) {
        if self.json {
            print_json(&decisions);
        } else {
            print!("{}", render_history(decisions));
        }
    }

    pub fn stats(&self, stats: &HistoryStats) {
        if self.json {
            print_json(stats);
        } else {
            print!("{}", render_stats(stats));
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
}

fn finding_line(out: &mut String, finding: &Finding) {
    let tag = format!("[{}]", finding.severity);
    let _ = write!(out, "  {} {}", ColorScheme::severity(finding.severity, &tag), finding.message);
    if let Some(rule) = finding.rule_name() {
        let _ = write!(out, " {}", ColorScheme::muted(&format!("({})", rule)));
    }
    if let Some(pos) = finding.position {
        let _ = write!(out, " {}", ColorScheme::muted(&format!("at {}", pos)));
    }
    out.push('\n');
    if let Some(ref suggestion) = finding.suggestion {
        let _ = writeln!(out, "      {}", ColorScheme::muted(suggestion));
    }
}

/// Human-readable report for one validation
pub fn render_validation(result: &ValidationResult) -> String {
    let mut out = String::new();
    let status = if result.valid {
        ColorScheme::success("valid")
    } else {
        ColorScheme::error("invalid")
    };
    let _ = writeln!(
        out,
        "{} {} ({}, {})",
        "Command:".bold(),
        ColorScheme::command(&result.command),
        result.shell,
        status
    );
    let _ = writeln!(
        out,
        "{} {}",
        "Risk:".bold(),
        risk_badge(result.risk_assessment.overall_risk)
    );

    if !result.errors.is_empty() {
        let _ = writeln!(out, "\n{}", "Errors:".bold());
        for finding in &result.errors {
            finding_line(&mut out, finding);
        }
    }
    if !result.warnings.is_empty() {
        let _ = writeln!(out, "\n{}", "Warnings:".bold());
        for finding in &result.warnings {
            finding_line(&mut out, finding);
        }
    }

    if let Some(obf) = result.obfuscation.as_ref().filter(|o| o.is_obfuscated) {
        let _ = writeln!(
            out,
            "\n{} {} ({:.0}% confidence)",
            "Obfuscation:".bold(),
            obf.techniques.join(", "),
            obf.confidence * 100.0
        );
        let _ = writeln!(out, "  decodes to: {}", ColorScheme::command(&obf.deobfuscated));
    }

    let factors = &result.risk_assessment.factors;
    if !factors.is_empty() {
        let _ = writeln!(out, "\n{}", "Risk factors:".bold());
        for factor in factors {
            let _ = writeln!(
                out,
                "  {} {}",
                ColorScheme::risk(factor.level, &format!("[{}]", factor.factor_type)),
                factor.description
            );
        }
    }

    if !result.suggestions.is_empty() {
        let _ = writeln!(out, "\n{}", "Suggestions:".bold());
        for s in &result.suggestions {
            let _ = writeln!(out, "  • {}", s.message);
            let _ = writeln!(out, "    {}", ColorScheme::command(&s.alternative));
        }
    }

    for note in &result.notes {
        let _ = writeln!(out, "\n{}", ColorScheme::muted(note));
    }
    out
}

pub fn render_rules(rules: &[&CustomRule]) -> String {
    if rules.is_empty() {
        return format!("{}\n", ColorScheme::muted("No custom rules"));
    }
    let mut out = String::new();
    for rule in rules {
        let state = if rule.enabled {
            ColorScheme::success("on ")
        } else {
            ColorScheme::muted("off")
        };
        let _ = writeln!(
            out,
            "{} {} {} {}",
            state,
            rule.name.bold(),
            ColorScheme::risk(rule.risk_level(), &format!("[{}]", rule.risk_level())),
            rule.description
        );
        let _ = writeln!(out, "    {}", ColorScheme::muted(&rule.pattern));
    }
    out
}

pub fn render_rule(rule: &CustomRule) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} {}", "Name:".bold(), rule.name);
    if !rule.description.is_empty() {
        let _ = writeln!(out, "{} {}", "Description:".bold(), rule.description);
    }
    let _ = writeln!(out, "{} {}", "Pattern:".bold(), rule.pattern);
    let _ = writeln!(out, "{} {}", "Risk:".bold(), risk_badge(rule.risk_level()));
    if !rule.message.is_empty() {
        let _ = writeln!(out, "{} {}", "Message:".bold(), rule.message);
    }
    if !rule.suggest.is_empty() {
        let _ = writeln!(out, "{} {}", "Suggest:".bold(), rule.suggest);
    }
    let _ = writeln!(out, "{} {}", "Enabled:".bold(), rule.enabled);
    if !rule.tags.is_empty() {
        let _ = writeln!(out, "{} {}", "Tags:".bold(), rule.tags.join(", "));
    }
    out
}

pub fn render_history(decisions: &[SafetyDecision]) -> String {
    if decisions.is_empty() {
        return format!("{}\n", ColorScheme::muted("No recorded decisions"));
    }
    let mut out = String::new();
    for d in decisions {
        let safe = if d.learned_safe { " (marked safe)" } else { "" };
        let _ = writeln!(
            out,
            "{} {} {}{} {}",
            ColorScheme::muted(&d.timestamp.format("%Y-%m-%d %H:%M:%S").to_string()),
            ColorScheme::risk(d.risk_level, &format!("[{}]", d.risk_level)),
            d.decision,
            safe,
            ColorScheme::command(&d.command)
        );
    }
    out
}

pub fn render_stats(stats: &HistoryStats) -> String {
    format!(
        "Total: {}\nProceed: {}\nCancel: {}\nModify: {}\nAuto-denied: {}\nMarked safe: {}\n",
        stats.total, stats.proceed, stats.cancel, stats.modify, stats.auto_denied, stats.learned_safe
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::engine::{AnalysisContext, Engine};
    use crate::risk::RiskLevel;

    fn plain() {
        colored::control::set_override(false);
    }

    #[test]
    fn test_report_lists_findings_and_factors() {
        plain();
        let result = Engine::new(Config::default())
            .validate_with_context("rm -rf /", &AnalysisContext::default());
        let text = render_validation(&result);
        assert!(text.contains("Risk: 🔴 CRITICAL"));
        assert!(text.contains("(RecursiveRootDelete)"));
        assert!(text.contains("Risk factors:"));
        assert!(text.contains("trash /"));
    }

    #[test]
    fn test_clean_report_is_short() {
        plain();
        let result = Engine::new(Config::default())
            .validate_with_context("echo \"Hello World\"", &AnalysisContext::default());
        let text = render_validation(&result);
        assert!(text.contains("valid"));
        assert!(!text.contains("Errors:"));
        assert!(!text.contains("Suggestions:"));
    }

    #[test]
    fn test_rule_rendering() {
        plain();
        let mut rule = CustomRule::new("no-prod", "prod", RiskLevel::High);
        rule.enabled = false;
        rule.tags = vec!["deploy".into()];
        let text = render_rules(&[&rule]);
        assert!(text.starts_with("off no-prod [high]"));
        assert!(render_rule(&rule).contains("Tags: deploy"));
        assert!(render_rules(&[]).contains("No custom rules"));
    }

    #[test]
    fn test_stats_rendering() {
        let stats = HistoryStats {
            total: 3,
            proceed: 1,
            cancel: 1,
            modify: 0,
            auto_denied: 1,
            learned_safe: 0,
        };
        assert!(render_stats(&stats).contains("Auto-denied: 1"));
    }
}

use colored::{ColoredString, Colorize};

use crate::finding::Severity;
use crate::risk::RiskLevel;

pub struct ColorScheme;

impl ColorScheme {
    /// Success message (green)
    pub fn success(text: &str) -> ColoredString {
        text.green()
    }

    /// Error message (red)
    pub fn error(text: &str) -> ColoredString {
        text.red()
    }

    /// Warning message (yellow)
    pub fn warning(text: &str) -> ColoredString {
        text.yellow()
    }

    /// Command text (bright white)
    pub fn command(text: &str) -> ColoredString {
        text.bright_white()
    }

    /// Muted text (bright black/gray)
    pub fn muted(text: &str) -> ColoredString {
        text.bright_black()
    }

    /// Risk level text in the level's colour
    pub fn risk(level: RiskLevel, text: &str) -> ColoredString {
        match level {
            RiskLevel::Low => text.green(),
            RiskLevel::Medium => text.yellow(),
            RiskLevel::High => text.red(),
            RiskLevel::Critical => text.bright_red().bold(),
        }
    }

    pub fn severity(severity: Severity, text: &str) -> ColoredString {
        match severity {
            Severity::Error => text.red(),
            Severity::Warning => text.yellow(),
            Severity::Info => text.blue(),
        }
    }

    /// Print a success indicator
    pub fn print_success(message: &str) {
        println!("{} {}", "✓".green(), message);
    }

    /// Print an error indicator
    pub fn print_error(message: &str) {
        eprintln!("{} {}", "✗".red(), message);
    }

    /// Print a warning indicator
    pub fn print_warning(message: &str) {
        println!("{} {}", "⚠".yellow(), message);
    }
}

/// Upper-case label as shown in reports
pub fn risk_label(level: RiskLevel) -> &'static str {
    match level {
        RiskLevel::Low => "LOW",
        RiskLevel::Medium => "MEDIUM",
        RiskLevel::High => "HIGH",
        RiskLevel::Critical => "CRITICAL",
    }
}

pub fn risk_emoji(level: RiskLevel) -> &'static str {
    match level {
        RiskLevel::Low => "🟢",
        RiskLevel::Medium => "🟡",
        RiskLevel::High => "🟠",
        RiskLevel::Critical => "🔴",
    }
}

/// Emoji plus coloured label, e.g. for a summary header
pub fn risk_badge(level: RiskLevel) -> String {
    format!(
        "{} {}",
        risk_emoji(level),
        ColorScheme::risk(level, risk_label(level))
    )
}

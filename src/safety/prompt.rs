//! Terminal side of the confirmation prompt

use anyhow::Result;
use colored::Colorize;
use std::collections::VecDeque;

use super::education::{Education, GENERAL_TIPS};
use crate::output::{risk_badge, ColorScheme};
use crate::risk::RiskAssessment;

/// One answer to the prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Choice {
    Proceed,
    Cancel,
    Modify,
    MarkSafe,
    Help,
    Invalid,
}

impl Choice {
    pub fn parse(input: &str) -> Self {
        match input.trim().to_lowercase().as_str() {
            "y" | "yes" => Choice::Proceed,
            "n" | "no" => Choice::Cancel,
            "m" | "modify" => Choice::Modify,
            "s" | "safe" => Choice::MarkSafe,
            "?" | "h" | "help" => Choice::Help,
            _ => Choice::Invalid,
        }
    }
}

/// Everything the decision loop shows or asks. Implementations decide
/// how it is rendered.
pub trait Prompter {
    fn show_education(&mut self, education: &Education);
    fn show_summary(&mut self, command: &str, assessment: &RiskAssessment);
    fn show_help(&mut self, assessment: &RiskAssessment);
    fn show_suggestions(&mut self, assessment: &RiskAssessment);
    fn notify(&mut self, message: &str);
    /// One line of input, `None` once input is exhausted
    fn read_line(&mut self) -> Result<Option<String>>;
}

/// Prompter on stdout and `requestty`
#[derive(Debug, Default)]
pub struct TerminalPrompter;

impl TerminalPrompter {
    pub fn new() -> Self {
        Self
    }
}

impl Prompter for TerminalPrompter {
    fn show_education(&mut self, education: &Education) {
        println!();
        println!("{}", ColorScheme::risk(education.level, education.title).bold());
        println!("{}", education.description);
        println!();
        println!("{}", "Potential consequences:".bold());
        for consequence in education.consequences {
            println!("  • {}", consequence);
        }
        println!();
        println!("{}", "Safer alternatives:".bold());
        for alt in education.alternatives {
            println!("  • {}", alt.description);
            println!("    {}", ColorScheme::command(alt.example));
        }
    }

    fn show_summary(&mut self, command: &str, assessment: &RiskAssessment) {
        println!();
        println!("{} {}", "Command:".bold(), ColorScheme::command(command));
        println!("{} {}", "Risk:".bold(), risk_badge(assessment.overall_risk));
        if assessment.requires_root {
            println!("  {}", ColorScheme::warning("Requires root privileges"));
        }
        if assessment.affects_system {
            println!("  {}", ColorScheme::warning("Affects system directories"));
        }
        if assessment.is_irreversible {
            println!("  {}", ColorScheme::error("May be irreversible"));
        }
        for factor in &assessment.factors {
            println!(
                "  {} {}",
                ColorScheme::risk(factor.level, &format!("[{}]", factor.factor_type)),
                factor.description
            );
        }
    }

    fn show_help(&mut self, assessment: &RiskAssessment) {
        println!();
        println!("{}", "Options:".bold());
        println!("  y, yes     run the command");
        println!("  n, no      cancel the command");
        println!("  m, modify  cancel and show safer suggestions");
        println!("  s, safe    run the command and mark it as safe");
        println!("  ?, help    show this help");
        if !assessment.factors.is_empty() {
            println!();
            println!("{}", "Why this was flagged:".bold());
            for factor in &assessment.factors {
                println!("  • {} ({})", factor.description, factor.level);
                if !factor.mitigation.is_empty() {
                    println!("    {}", ColorScheme::muted(&factor.mitigation));
                }
            }
        }
    }

    fn show_suggestions(&mut self, assessment: &RiskAssessment) {
        println!();
        println!("{}", "Suggestions:".bold());
        for factor in assessment.factors.iter().filter(|f| !f.mitigation.is_empty()) {
            println!("  • {}", factor.mitigation);
        }
        println!();
        println!("{}", "General tips:".bold());
        for tip in GENERAL_TIPS {
            println!("  • {}", tip);
        }
    }

    fn notify(&mut self, message: &str) {
        println!("{}", ColorScheme::warning(message));
    }

    fn read_line(&mut self) -> Result<Option<String>> {
        use requestty::ErrorKind;

        match requestty::prompt_one(decision_question()) {
            Ok(answer) => Ok(Some(answer.as_string().unwrap_or_default().to_string())),
            Err(ErrorKind::Eof) | Err(ErrorKind::Interrupted) | Err(ErrorKind::Aborted) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

/// The one-line question asked on every prompt round
pub fn decision_question() -> requestty::Question<'static> {
    requestty::Question::input("decision")
        .message("Proceed? [y]es / [n]o / [m]odify / [s]afe / [?]help")
        .build()
}

/// Prompter fed from a fixed list of answers. Shown output is kept as
/// event lines so callers can inspect what the user would have seen.
#[derive(Debug, Default, Clone)]
pub struct ScriptedPrompter {
    answers: VecDeque<String>,
    pub events: Vec<String>,
}

impl ScriptedPrompter {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: answers.into_iter().map(Into::into).collect(),
            events: Vec::new(),
        }
    }

    /// Number of answers not consumed yet
    pub fn remaining(&self) -> usize {
        self.answers.len()
    }

    pub fn saw(&self, prefix: &str) -> bool {
        self.events.iter().any(|e| e.starts_with(prefix))
    }
}

impl Prompter for ScriptedPrompter {
    fn show_education(&mut self, education: &Education) {
        self.events.push(format!("education: {}", education.title));
    }

    fn show_summary(&mut self, command: &str, assessment: &RiskAssessment) {
        self.events
            .push(format!("summary: {} ({})", command, assessment.overall_risk));
    }

    fn show_help(&mut self, _assessment: &RiskAssessment) {
        self.events.push("help".to_string());
    }

    fn show_suggestions(&mut self, assessment: &RiskAssessment) {
        self.events
            .push(format!("suggestions: {}", assessment.factors.len()));
    }

    fn notify(&mut self, message: &str) {
        self.events.push(format!("notice: {}", message));
    }

    fn read_line(&mut self) -> Result<Option<String>> {
        Ok(self.answers.pop_front())
    }
}

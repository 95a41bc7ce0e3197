//! Interactive decision protocol: turns a risk assessment into allow or deny

mod education;
mod history;
mod prompt;

pub use education::{education_for, Alternative, Education, GENERAL_TIPS};
pub use history::{Decision, DecisionHistory, HistoryStats, SafetyDecision};
pub use prompt::{decision_question, Choice, Prompter, ScriptedPrompter, TerminalPrompter};

use anyhow::Result;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::SafetyConfig;
use crate::risk::{RiskAssessment, RiskLevel};

/// Where the protocol ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PromptState {
    Disabled,
    AutoDenied,
    BypassedTrusted,
    SkippedLowRisk,
    Resolved,
    /// Input ran out or never settled on a decision
    Abandoned,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafetyOutcome {
    pub state: PromptState,
    pub allowed: bool,
    /// The decision, when one was taken
    pub decision: Option<SafetyDecision>,
}

impl SafetyOutcome {
    fn allow(state: PromptState) -> Self {
        Self {
            state,
            allowed: true,
            decision: None,
        }
    }

    fn deny(state: PromptState) -> Self {
        Self {
            state,
            allowed: false,
            decision: None,
        }
    }
}

pub struct SafetyChecker {
    config: SafetyConfig,
    trusted: Vec<PathBuf>,
    history: Arc<DecisionHistory>,
}

impl SafetyChecker {
    pub fn new(config: SafetyConfig) -> Self {
        Self::with_history(config, Arc::new(DecisionHistory::in_memory()))
    }

    pub fn with_history(config: SafetyConfig, history: Arc<DecisionHistory>) -> Self {
        let trusted = config.expanded_trusted_paths();
        Self {
            config,
            trusted,
            history,
        }
    }

    pub fn config(&self) -> &SafetyConfig {
        &self.config
    }

    pub fn history(&self) -> &Arc<DecisionHistory> {
        &self.history
    }

    /// Whether `dir` or one of its ancestors is exactly a trusted path
    pub fn is_trusted(&self, dir: &Path) -> bool {
        dir.ancestors()
            .any(|ancestor| self.trusted.iter().any(|t| t.as_path() == ancestor))
    }

    /// Run the protocol for one command. Transitions are tried in a fixed
    /// order, and only the prompt ever waits for input.
    pub fn check(
        &self,
        command: &str,
        assessment: Option<&RiskAssessment>,
        prompter: &mut dyn Prompter,
    ) -> Result<SafetyOutcome> {
        let assessment = match assessment {
            Some(a) if self.config.enabled => a,
            _ => return Ok(SafetyOutcome::allow(PromptState::Disabled)),
        };
        let risk = assessment.overall_risk;

        if let Some(limit) = self.config.auto_deny_level {
            if risk > limit {
                info!(%risk, %limit, "command auto-denied");
                prompter.notify(&format!(
                    "Command blocked: {} risk exceeds the auto-deny level ({})",
                    risk, limit
                ));
                let decision = SafetyDecision::new(command, risk, Decision::AutoDenied);
                self.record(&decision)?;
                return Ok(SafetyOutcome {
                    state: PromptState::AutoDenied,
                    allowed: false,
                    decision: Some(decision),
                });
            }
        }

        // Critical risk is always confirmed, even in trusted directories
        if self.config.bypass_trusted_paths
            && risk < RiskLevel::Critical
            && self.is_trusted(&assessment.context.current_directory)
        {
            debug!(cwd = %assessment.context.current_directory.display(), "trusted path, no prompt");
            return Ok(SafetyOutcome::allow(PromptState::BypassedTrusted));
        }

        if risk == RiskLevel::Low {
            return Ok(SafetyOutcome::allow(PromptState::SkippedLowRisk));
        }

        self.prompt(command, assessment, prompter)
    }

    fn prompt(
        &self,
        command: &str,
        assessment: &RiskAssessment,
        prompter: &mut dyn Prompter,
    ) -> Result<SafetyOutcome> {
        let risk = assessment.overall_risk;
        if self.config.show_education {
            if let Some(education) = education_for(risk) {
                prompter.show_education(education);
            }
        }
        prompter.show_summary(command, assessment);

        for _ in 0..self.config.max_prompt_attempts {
            let Some(line) = prompter.read_line()? else {
                debug!("prompt input closed");
                return Ok(SafetyOutcome::deny(PromptState::Abandoned));
            };

            let decision = match Choice::parse(&line) {
                Choice::Proceed => SafetyDecision::new(command, risk, Decision::Proceed),
                Choice::Cancel => {
                    prompter.notify("Command cancelled for safety.");
                    SafetyDecision::new(command, risk, Decision::Cancel)
                }
                Choice::Modify => {
                    prompter.show_suggestions(assessment);
                    SafetyDecision::new(command, risk, Decision::Modify)
                }
                Choice::MarkSafe => {
                    prompter.notify("Command marked as safe.");
                    SafetyDecision::new(command, risk, Decision::Proceed).learned_safe()
                }
                Choice::Help => {
                    prompter.show_help(assessment);
                    continue;
                }
                Choice::Invalid => {
                    prompter.notify("Invalid choice. Please try again.");
                    continue;
                }
            };

            self.record(&decision)?;
            return Ok(SafetyOutcome {
                state: PromptState::Resolved,
                allowed: decision.decision.allows(),
                decision: Some(decision),
            });
        }

        warn!(attempts = self.config.max_prompt_attempts, "no decision taken, denying");
        prompter.notify("Too many invalid answers, command cancelled.");
        Ok(SafetyOutcome::deny(PromptState::Abandoned))
    }

    fn record(&self, decision: &SafetyDecision) -> Result<()> {
        if self.config.track_decisions {
            self.history.record(decision.clone())?;
        }
        Ok(())
    }
}

//! Configuration module - handles loading and merging configs

mod defaults;
mod loader;

pub use defaults::*;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::obfuscation::DEFAULT_CONFIDENCE_THRESHOLD;
use crate::risk::RiskLevel;
use crate::syntax::ShellType;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub validation: ValidationConfig,

    #[serde(default)]
    pub obfuscation: ObfuscationConfig,

    #[serde(default)]
    pub rules: RulesConfig,

    #[serde(default)]
    pub safety: SafetyConfig,
}

/// Which analysis stages run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationConfig {
    #[serde(default)]
    pub shell: ShellType,

    #[serde(default = "default_true")]
    pub enable_syntax_check: bool,

    #[serde(default = "default_true")]
    pub enable_safety_check: bool,

    #[serde(default = "default_true")]
    pub enable_custom_rules: bool,

    #[serde(default = "default_true")]
    pub enable_obfuscation_detection: bool,

    #[serde(default = "default_true")]
    pub enable_git_checks: bool,

    #[serde(default = "default_true")]
    pub enable_ci_checks: bool,

    /// Also warn about deprecated constructs
    #[serde(default)]
    pub strict_mode: bool,

    /// Run the rules again on the deobfuscated candidate
    #[serde(default = "default_true")]
    pub analyze_deobfuscated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObfuscationConfig {
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RulesConfig {
    /// Custom rule file, defaults to the per-user config directory
    #[serde(default)]
    pub path: Option<String>,
}

/// Interactive confirmation settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_true")]
    pub show_education: bool,

    #[serde(default = "default_true")]
    pub track_decisions: bool,

    /// Deny without asking when the risk is above this level
    #[serde(default)]
    pub auto_deny_level: Option<RiskLevel>,

    #[serde(default = "default_true")]
    pub bypass_trusted_paths: bool,

    #[serde(default = "default_trusted_paths")]
    pub trusted_paths: Vec<String>,

    #[serde(default = "default_max_prompt_attempts")]
    pub max_prompt_attempts: usize,

    #[serde(default)]
    pub history_path: Option<String>,
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_confidence_threshold() -> f64 {
    DEFAULT_CONFIDENCE_THRESHOLD
}

fn default_trusted_paths() -> Vec<String> {
    DEFAULT_TRUSTED_PATHS.iter().map(|p| p.to_string()).collect()
}

fn default_max_prompt_attempts() -> usize {
    DEFAULT_MAX_PROMPT_ATTEMPTS
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            shell: ShellType::Auto,
            enable_syntax_check: true,
            enable_safety_check: true,
            enable_custom_rules: true,
            enable_obfuscation_detection: true,
            enable_git_checks: true,
            enable_ci_checks: true,
            strict_mode: false,
            analyze_deobfuscated: true,
        }
    }
}

impl Default for ObfuscationConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
        }
    }
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            show_education: true,
            track_decisions: true,
            auto_deny_level: None,
            bypass_trusted_paths: true,
            trusted_paths: default_trusted_paths(),
            max_prompt_attempts: default_max_prompt_attempts(),
            history_path: None,
        }
    }
}

impl SafetyConfig {
    /// Trusted paths with `~` expanded
    pub fn expanded_trusted_paths(&self) -> Vec<PathBuf> {
        self.trusted_paths.iter().map(|p| expand_path(p)).collect()
    }
}

impl Config {
    /// Custom rule file location
    pub fn rules_path(&self) -> Option<PathBuf> {
        match self.rules.path {
            Some(ref path) => Some(expand_path(path)),
            None => crate::rules::default_rules_path(),
        }
    }

    /// Decision history file location
    pub fn history_path(&self) -> PathBuf {
        if let Some(ref path) = self.safety.history_path {
            expand_path(path)
        } else {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(APP_NAME)
                .join(HISTORY_FILE)
        }
    }

    pub fn to_toml(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

pub fn expand_path(path: &str) -> PathBuf {
    let expanded = shellexpand::tilde(path);
    PathBuf::from(expanded.as_ref())
}

/// Commented default config file
pub fn template() -> &'static str {
    CONFIG_TEMPLATE
}

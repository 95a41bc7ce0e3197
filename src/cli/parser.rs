//! Command-line arguments

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

use crate::risk::RiskLevel;
use crate::syntax::ShellType;

#[derive(Debug, Parser)]
#[command(
    name = "cmdguard",
    version,
    about = "Analyze shell commands before they run",
    propagate_version = true
)]
pub struct Cli {
    /// Debug logging on stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colorized output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Read this config file instead of the usual lookup
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Custom rules file
    #[arg(long, global = true, value_name = "FILE")]
    pub rules: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Analyze a command and report findings (exit 1 when invalid)
    Check(CheckArgs),

    /// Analyze a command and ask for confirmation (exit 1 when denied)
    Safety(SafetyArgs),

    /// Manage custom rules
    Rules {
        #[command(subcommand)]
        action: RulesAction,
    },

    /// Show recorded decisions
    History {
        /// Print counts per decision instead of entries
        #[arg(long)]
        stats: bool,

        /// Output in JSON format
        #[arg(long)]
        json: bool,

        /// Show at most this many recent entries
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,
    },

    /// Print the effective configuration
    Config {
        /// Print a commented default config file instead
        #[arg(long)]
        template: bool,
    },

    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Args)]
pub struct AnalysisArgs {
    /// Shell dialect (bash, zsh, fish, posix, auto)
    #[arg(long, value_name = "SHELL")]
    pub shell: Option<ShellType>,

    /// Also warn about deprecated constructs
    #[arg(long)]
    pub strict: bool,
}

#[derive(Debug, Args)]
pub struct CheckArgs {
    #[command(flatten)]
    pub analysis: AnalysisArgs,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,

    /// The command to analyze
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

#[derive(Debug, Args)]
pub struct SafetyArgs {
    #[command(flatten)]
    pub analysis: AnalysisArgs,

    /// Deny without asking above this risk level
    #[arg(long, value_name = "LEVEL")]
    pub auto_deny: Option<RiskLevel>,

    /// Skip the risk explanation before the prompt
    #[arg(long)]
    pub no_education: bool,

    /// The command to analyze
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

#[derive(Debug, Subcommand)]
pub enum RulesAction {
    /// List custom rules
    List {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Show one rule
    Show { name: String },

    /// Add a rule
    Add {
        name: String,
        pattern: String,
        #[command(flatten)]
        fields: RuleFields,

        /// Add the rule disabled
        #[arg(long)]
        disabled: bool,
    },

    /// Change a rule; fields left out keep their value
    Update {
        name: String,
        #[arg(long)]
        pattern: Option<String>,
        #[command(flatten)]
        fields: RuleFields,
    },

    /// Delete a rule
    Delete { name: String },

    /// Enable a rule
    Enable { name: String },

    /// Disable a rule
    Disable { name: String },

    /// Show every rule matching a command, enabled or not
    Test {
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
}

#[derive(Debug, Args)]
pub struct RuleFields {
    /// low, medium, high or critical
    #[arg(long)]
    pub risk: Option<String>,

    #[arg(long)]
    pub description: Option<String>,

    #[arg(long)]
    pub message: Option<String>,

    #[arg(long)]
    pub suggest: Option<String>,

    /// Comma-separated tags
    #[arg(long, value_delimiter = ',')]
    pub tags: Option<Vec<String>>,
}

/// Join the words of a trailing command back into one string
pub fn join_command(words: &[String]) -> String {
    words.join(" ")
}

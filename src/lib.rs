//! cmdguard - analyze shell commands before they run.
//!
//! A command string goes through syntax analysis, obfuscation detection
//! and the safety rules, and the findings are folded into one risk
//! assessment. [`safety::SafetyChecker`] turns that assessment into an
//! allow or deny decision, asking the user when needed.
//!
//! ```no_run
//! use cmdguard::{Config, Engine};
//!
//! let engine = Engine::from_config(Config::load()?);
//! let result = engine.validate("rm -rf /");
//! assert!(!result.valid);
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod cli;
pub mod completions;
pub mod config;
pub mod engine;
pub mod error;
pub mod finding;
pub mod obfuscation;
pub mod output;
pub mod risk;
pub mod rules;
pub mod safety;
pub mod syntax;

pub use config::Config;
pub use engine::{AnalysisContext, Engine, Suggestion, ValidationResult};
pub use error::{LexError, ParseError, RuleError, SyntaxError};
pub use finding::{Finding, FindingKind, Position, Severity};
pub use obfuscation::{ObfuscationDetector, ObfuscationResult};
pub use risk::{RiskAssessment, RiskFactor, RiskLevel};

//! CLI module - handles argument parsing and command execution

mod parser;

pub use parser::*;

use anyhow::{bail, Context, Result};
use colored::Colorize;
use std::sync::Arc;
use tracing::warn;

use crate::config::{template, Config};
use crate::engine::Engine;
use crate::output::{render_rule, ColorScheme, OutputFormatter};
use crate::risk::RiskLevel;
use crate::rules::{CustomRule, CustomRuleEngine};
use crate::safety::{DecisionHistory, SafetyChecker, TerminalPrompter};

/// Exit code when the command is invalid or was denied
const EXIT_BLOCKED: i32 = 1;
/// Exit code when the prompt was interrupted
const EXIT_INTERRUPTED: i32 = 130;

/// Main entry point for the CLI, returns the process exit code
pub async fn run(cli: Cli) -> Result<i32> {
    if cli.no_color {
        colored::control::set_override(false);
    }

    let mut config = load_config(&cli)?;
    if let Some(ref path) = cli.rules {
        config.rules.path = Some(path.display().to_string());
    }

    match cli.command {
        Commands::Check(args) => {
            apply_analysis(&mut config, &args.analysis);
            let engine = Engine::from_config(config);
            let result = engine.validate(&join_command(&args.command));
            OutputFormatter::new(args.json).validation(&result);
            Ok(if result.valid { 0 } else { EXIT_BLOCKED })
        }
        Commands::Safety(args) => {
            apply_analysis(&mut config, &args.analysis);
            if args.auto_deny.is_some() {
                config.safety.auto_deny_level = args.auto_deny;
            }
            if args.no_education {
                config.safety.show_education = false;
            }
            run_safety(config, join_command(&args.command)).await
        }
        Commands::Rules { action } => run_rules(&config, action),
        Commands::History { stats, json, limit } => {
            let history = DecisionHistory::open(config.history_path())?;
            let out = OutputFormatter::new(json);
            if stats {
                out.stats(&history.stats());
            } else {
                let entries = history.entries();
                let skip = entries.len().saturating_sub(limit);
                out.history(&entries[skip..]);
            }
            Ok(0)
        }
        Commands::Config { template: true } => {
            print!("{}", template());
            Ok(0)
        }
        Commands::Config { template: false } => {
            print!("{}", config.to_toml()?);
            Ok(0)
        }
        Commands::Completions { shell } => {
            crate::completions::generate_completions(shell);
            Ok(0)
        }
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    match cli.config {
        Some(ref path) => {
            if !path.exists() {
                bail!("Config file not found: {}", path.display());
            }
            let mut config = Config::load_layers(std::slice::from_ref(path))?;
            config.apply_env_overrides(|key| std::env::var(key).ok());
            Ok(config)
        }
        None => Config::load(),
    }
}

fn apply_analysis(config: &mut Config, args: &AnalysisArgs) {
    if let Some(shell) = args.shell {
        config.validation.shell = shell;
    }
    if args.strict {
        config.validation.strict_mode = true;
    }
}

async fn run_safety(config: Config, command: String) -> Result<i32> {
    let engine = Engine::from_config(config.clone());
    let result = engine.validate(&command);
    OutputFormatter::new(false).validation(&result);

    let history = if config.safety.track_decisions {
        DecisionHistory::open(config.history_path()).unwrap_or_else(|err| {
            warn!(error = %err, "decision history unavailable, keeping it in memory");
            DecisionHistory::in_memory()
        })
    } else {
        DecisionHistory::in_memory()
    };
    let checker = SafetyChecker::with_history(config.safety, Arc::new(history));
    let assessment = result.risk_assessment;

    // The prompt blocks on the terminal, so it runs off the async workers
    let prompt = tokio::task::spawn_blocking(move || {
        let mut prompter = TerminalPrompter::new();
        checker.check(&command, Some(&assessment), &mut prompter)
    });

    let outcome = tokio::select! {
        joined = prompt => joined.context("Prompt task failed")??,
        _ = tokio::signal::ctrl_c() => {
            println!();
            ColorScheme::print_warning("Interrupted, command not confirmed.");
            return Ok(EXIT_INTERRUPTED);
        }
    };

    if outcome.allowed {
        ColorScheme::print_success("Command allowed");
        Ok(0)
    } else {
        ColorScheme::print_error("Command denied");
        Ok(EXIT_BLOCKED)
    }
}

fn rules_engine(config: &Config) -> Result<CustomRuleEngine> {
    let Some(path) = config.rules_path() else {
        bail!("No custom rules location; set [rules] path or pass --rules");
    };
    CustomRuleEngine::load(&path)
        .with_context(|| format!("Failed to load rules from {}", path.display()))
}

fn run_rules(config: &Config, action: RulesAction) -> Result<i32> {
    let mut engine = rules_engine(config)?;

    match action {
        RulesAction::List { json } => {
            let rules: Vec<&CustomRule> = engine.list().collect();
            OutputFormatter::new(json).rules(&rules);
        }
        RulesAction::Show { name } => match engine.get(&name) {
            Some(rule) => print!("{}", render_rule(rule)),
            None => bail!("Rule '{}' not found", name),
        },
        RulesAction::Add {
            name,
            pattern,
            fields,
            disabled,
        } => {
            let mut rule = CustomRule::new(name.clone(), pattern, RiskLevel::Medium);
            apply_fields(&mut rule, fields);
            rule.enabled = !disabled;
            engine.add(rule)?;
            ColorScheme::print_success(&format!("Added rule '{}'", name));
        }
        RulesAction::Update {
            name,
            pattern,
            fields,
        } => {
            let Some(current) = engine.get(&name).cloned() else {
                bail!("Rule '{}' not found", name);
            };
            let mut rule = current;
            if let Some(pattern) = pattern {
                rule.pattern = pattern;
            }
            apply_fields(&mut rule, fields);
            engine.update(&name, rule)?;
            ColorScheme::print_success(&format!("Updated rule '{}'", name));
        }
        RulesAction::Delete { name } => {
            engine.delete(&name)?;
            ColorScheme::print_success(&format!("Deleted rule '{}'", name));
        }
        RulesAction::Enable { name } => {
            engine.enable(&name)?;
            ColorScheme::print_success(&format!("Enabled rule '{}'", name));
        }
        RulesAction::Disable { name } => {
            engine.disable(&name)?;
            ColorScheme::print_success(&format!("Disabled rule '{}'", name));
        }
        RulesAction::Test { command } => {
            let command = join_command(&command);
            let matched = engine.test(&command);
            if matched.is_empty() {
                println!("{}", ColorScheme::muted("No rule matches"));
            }
            for rule in matched {
                let state = if rule.enabled { "" } else { " (disabled)" };
                println!(
                    "{} {}{}",
                    "✓".green(),
                    rule.name.bold(),
                    ColorScheme::muted(state)
                );
            }
        }
    }
    Ok(0)
}

fn apply_fields(rule: &mut CustomRule, fields: RuleFields) {
    if let Some(risk) = fields.risk {
        rule.risk = risk;
    }
    if let Some(description) = fields.description {
        rule.description = description;
    }
    if let Some(message) = fields.message {
        rule.message = message;
    }
    if let Some(suggest) = fields.suggest {
        rule.suggest = suggest;
    }
    if let Some(tags) = fields.tags {
        rule.tags = tags;
    }
}

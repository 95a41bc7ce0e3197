//! Default configuration values

/// Directory name under the platform config and data dirs
pub const APP_NAME: &str = "cmdguard";

pub const HISTORY_FILE: &str = "history.json";

/// Directories where confirmation is skipped
pub const DEFAULT_TRUSTED_PATHS: &[&str] = &["~/projects", "~/dev", "~/code", "~/src"];

/// Prompt rounds before an undecided prompt denies
pub const DEFAULT_MAX_PROMPT_ATTEMPTS: usize = 5;

pub const CONFIG_TEMPLATE: &str = r#"# cmdguard configuration
#
# Looked up in order, later files override earlier ones:
#   ~/.config/cmdguard/config.toml
#   ~/cmdguard.toml
#   ./cmdguard.toml or ./.cmdguard.toml

[validation]
# bash, zsh, fish, posix or auto
shell = "auto"
enable_syntax_check = true
enable_safety_check = true
enable_custom_rules = true
enable_obfuscation_detection = true
enable_git_checks = true
enable_ci_checks = true
# Warn about deprecated constructs such as backticks
strict_mode = false
# Run the rules again on decoded payloads
analyze_deobfuscated = true

[obfuscation]
confidence_threshold = 0.7

[rules]
# path = "~/.config/cmdguard/rules.toml"

[safety]
enabled = true
show_education = true
track_decisions = true
# Deny without asking above this level: low, medium, high
# auto_deny_level = "high"
bypass_trusted_paths = true
trusted_paths = ["~/projects", "~/dev", "~/code", "~/src"]
max_prompt_attempts = 5
# history_path = "~/.local/share/cmdguard/history.json"
"#;

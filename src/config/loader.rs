//! Configuration loader - handles TOML config hierarchy

use super::{Config, APP_NAME};
use crate::risk::RiskLevel;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

impl Config {
    /// Load configuration with precedence:
    /// 1. CLI arguments (handled separately by the cli module)
    /// 2. Environment variables
    /// 3. ./cmdguard.toml or ./.cmdguard.toml (project local)
    /// 4. ~/cmdguard.toml (home directory)
    /// 5. ~/.config/cmdguard/config.toml (XDG config)
    /// 6. Defaults (hardcoded)
    pub fn load() -> Result<Self> {
        let files: Vec<PathBuf> = [
            Self::find_xdg_config(),
            Self::find_home_config(),
            Self::find_local_config(),
        ]
        .into_iter()
        .flatten()
        .collect();

        let mut config = Self::load_layers(&files)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Merge the given files, lowest precedence first. Keys a later file
    /// leaves out keep the value from the earlier ones.
    pub fn load_layers(files: &[PathBuf]) -> Result<Self> {
        let mut merged = toml::Table::new();
        for path in files {
            match Self::read_table(path) {
                Ok(table) => {
                    debug!(path = %path.display(), "config layer");
                    merge_tables(&mut merged, table);
                }
                Err(err) => warn!(path = %path.display(), error = %err, "ignoring config file"),
            }
        }
        toml::Value::Table(merged)
            .try_into::<Config>()
            .context("Invalid configuration")
    }

    /// Find XDG config file
    /// On Linux: ~/.config/cmdguard/config.toml
    /// On macOS: ~/Library/Application Support/cmdguard/config.toml OR ~/.config/cmdguard/config.toml
    fn find_xdg_config() -> Option<PathBuf> {
        if let Some(config_dir) = dirs::config_dir() {
            let path = config_dir.join(APP_NAME).join("config.toml");
            if path.exists() {
                return Some(path);
            }
        }

        // On macOS, also check ~/.config/ for Unix compatibility
        #[cfg(target_os = "macos")]
        {
            if let Some(home) = dirs::home_dir() {
                let path = home.join(".config").join(APP_NAME).join("config.toml");
                if path.exists() {
                    return Some(path);
                }
            }
        }

        None
    }

    /// Find home directory config
    fn find_home_config() -> Option<PathBuf> {
        let home = dirs::home_dir()?;
        let path = home.join("cmdguard.toml");
        if path.exists() {
            Some(path)
        } else {
            None
        }
    }

    /// Find project local config
    fn find_local_config() -> Option<PathBuf> {
        let cwd = std::env::current_dir().ok()?;

        let path = cwd.join("cmdguard.toml");
        if path.exists() {
            return Some(path);
        }

        let path = cwd.join(".cmdguard.toml");
        if path.exists() {
            return Some(path);
        }

        None
    }

    fn read_table(path: &Path) -> Result<toml::Table> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(strict) = lookup("CMDGUARD_STRICT") {
            self.validation.strict_mode = parse_bool(&strict);
        }
        if let Some(no_prompt) = lookup("CMDGUARD_NO_PROMPT") {
            self.safety.enabled = !parse_bool(&no_prompt);
        }
        if let Some(path) = lookup("CMDGUARD_RULES_PATH") {
            if !path.is_empty() {
                self.rules.path = Some(path);
            }
        }
        if let Some(level) = lookup("CMDGUARD_AUTO_DENY") {
            match level.parse::<RiskLevel>() {
                Ok(level) => self.safety.auto_deny_level = Some(level),
                Err(_) if level.is_empty() || level.eq_ignore_ascii_case("none") => {
                    self.safety.auto_deny_level = None
                }
                Err(err) => warn!(error = %err, "ignoring CMDGUARD_AUTO_DENY"),
            }
        }
    }

    /// Load config from a TOML string (for testing)
    #[cfg(test)]
    pub fn from_toml(content: &str) -> Result<Config> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }
}

/// Recursive merge, overlay wins on scalars and arrays
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming)
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

/// Parse boolean from string (true/false/1/0/yes/no)
fn parse_bool(s: &str) -> bool {
    matches!(s.to_lowercase().as_str(), "true" | "1" | "yes" | "on")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::ShellType;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.validation.enable_syntax_check);
        assert!(config.validation.analyze_deobfuscated);
        assert!(!config.validation.strict_mode);
        assert_eq!(config.validation.shell, ShellType::Auto);
        assert_eq!(config.obfuscation.confidence_threshold, 0.7);
        assert!(config.rules.path.is_none());
        assert!(config.safety.track_decisions);
    }

    #[test]
    fn test_parse_minimal_config() {
        let toml = r#"
[validation]
strict_mode = true
"#;
        let config = Config::from_toml(toml).unwrap();
        assert!(config.validation.strict_mode);
        // Everything else keeps its default
        assert!(config.validation.enable_git_checks);
        assert!(config.safety.enabled);
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
[validation]
shell = "zsh"
enable_ci_checks = false

[obfuscation]
confidence_threshold = 0.9

[rules]
path = "/etc/cmdguard/rules.toml"

[safety]
auto_deny_level = "high"
trusted_paths = ["/work"]
max_prompt_attempts = 3
"#;
        let config = Config::from_toml(toml).unwrap();
        assert_eq!(config.validation.shell, ShellType::Zsh);
        assert!(!config.validation.enable_ci_checks);
        assert_eq!(config.obfuscation.confidence_threshold, 0.9);
        assert_eq!(config.rules.path.as_deref(), Some("/etc/cmdguard/rules.toml"));
        assert_eq!(config.safety.auto_deny_level, Some(RiskLevel::High));
        assert_eq!(config.safety.trusted_paths, vec!["/work"]);
        assert_eq!(config.safety.max_prompt_attempts, 3);
    }

    #[test]
    fn test_layers_merge_per_key() {
        let dir = TempDir::new().unwrap();
        let xdg = dir.path().join("config.toml");
        let local = dir.path().join("cmdguard.toml");
        std::fs::write(&xdg, "[validation]\nstrict_mode = true\n[safety]\nmax_prompt_attempts = 2\n")
            .unwrap();
        std::fs::write(&local, "[safety]\nshow_education = false\n").unwrap();

        let config = Config::load_layers(&[xdg, local]).unwrap();
        assert!(config.validation.strict_mode);
        assert_eq!(config.safety.max_prompt_attempts, 2);
        assert!(!config.safety.show_education);
    }

    #[test]
    fn test_later_layer_wins() {
        let dir = TempDir::new().unwrap();
        let home = dir.path().join("home.toml");
        let local = dir.path().join("local.toml");
        std::fs::write(&home, "[safety]\ntrusted_paths = [\"/a\", \"/b\"]\n").unwrap();
        std::fs::write(&local, "[safety]\ntrusted_paths = [\"/c\"]\n").unwrap();

        let config = Config::load_layers(&[home, local]).unwrap();
        assert_eq!(config.safety.trusted_paths, vec!["/c"]);
    }

    #[test]
    fn test_broken_layer_is_skipped() {
        let dir = TempDir::new().unwrap();
        let broken = dir.path().join("broken.toml");
        let good = dir.path().join("good.toml");
        std::fs::write(&broken, "[validation\nstrict_mode = ").unwrap();
        std::fs::write(&good, "[validation]\nenable_git_checks = false\n").unwrap();

        let config = Config::load_layers(&[broken, good]).unwrap();
        assert!(!config.validation.enable_git_checks);
    }

    #[test]
    fn test_wrong_type_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[safety]\nmax_prompt_attempts = \"many\"\n").unwrap();
        assert!(Config::load_layers(&[path]).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_env_overrides(env(&[
            ("CMDGUARD_STRICT", "yes"),
            ("CMDGUARD_NO_PROMPT", "1"),
            ("CMDGUARD_RULES_PATH", "/tmp/r.toml"),
            ("CMDGUARD_AUTO_DENY", "medium"),
        ]));
        assert!(config.validation.strict_mode);
        assert!(!config.safety.enabled);
        assert_eq!(config.rules.path.as_deref(), Some("/tmp/r.toml"));
        assert_eq!(config.safety.auto_deny_level, Some(RiskLevel::Medium));

        config.apply_env_overrides(env(&[("CMDGUARD_AUTO_DENY", "none")]));
        assert_eq!(config.safety.auto_deny_level, None);

        config.apply_env_overrides(env(&[("CMDGUARD_AUTO_DENY", "extreme")]));
        assert_eq!(config.safety.auto_deny_level, None);
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("TRUE"));
        assert!(parse_bool("on"));
        assert!(!parse_bool("0"));
        assert!(!parse_bool("nope"));
    }
}

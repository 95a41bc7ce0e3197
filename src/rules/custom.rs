//! User-defined rules persisted as TOML

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::PatternRule;
use crate::error::{RuleError, RuleResult};
use crate::finding::{Finding, FindingKind};
use crate::risk::RiskLevel;

const FILE_HEADER: &str = r#"# cmdguard custom rules
#
# Each [[rules]] table defines one rule:
#   name        unique identifier
#   description what the rule checks for
#   pattern     regular expression matched against the whole command
#   risk        low, medium, high or critical
#   message     shown when the rule matches
#   suggest     optional fix or safer alternative
#   enabled     optional, defaults to true
#   tags        optional list of labels

"#;

const DEFAULT_RULES: &str = r#"
[[rules]]
name = "no-force-push-main"
description = "Prevent force push to main branch"
pattern = 'git\s+push\s+.*--force.*\s+(origin\s+)?(main|master)'
risk = "high"
message = "Force pushing to main branch is dangerous and can cause data loss"
suggest = "Create a feature branch instead or use --force-with-lease"
tags = ["git", "security"]

[[rules]]
name = "no-curl-pipe-bash"
description = "Prevent curl | bash pattern"
pattern = 'curl\s+.*\|\s*(sudo\s+)?bash'
risk = "critical"
message = "Piping curl output directly to bash is extremely dangerous"
suggest = "Download the script first, review it, then execute"
tags = ["security", "download"]

[[rules]]
name = "no-password-in-command"
description = "Prevent passwords in command line"
pattern = '--password[= ]|PASS(WORD)?=|-p\s+\S+'
risk = "critical"
message = "Never include passwords directly in commands"
suggest = "Use environment variables or secure credential storage"
tags = ["security", "credentials"]

[[rules]]
name = "no-npm-force"
description = "Warn about npm --force flag"
pattern = 'npm\s+.*--force'
risk = "medium"
message = "Using --force with npm can lead to broken dependencies"
suggest = "Try to resolve conflicts without --force first"
tags = ["npm", "development"]

[[rules]]
name = "docker-privileged"
description = "Warn about privileged Docker containers"
pattern = 'docker\s+run\s+.*--privileged'
risk = "high"
message = "Running privileged containers bypasses Docker security"
suggest = "Use specific capabilities instead of --privileged"
tags = ["docker", "security"]

[[rules]]
name = "recursive-chmod-777"
description = "Prevent chmod 777 on directories"
pattern = 'chmod\s+.*\b777\b.*-R|chmod\s+.*-R.*\b777\b'
risk = "high"
message = "Setting 777 permissions recursively is a security risk"
suggest = "Use more restrictive permissions like 755 or 644"
tags = ["permissions", "security"]

[[rules]]
name = "aws-credentials-exposed"
description = "Prevent AWS credential exposure"
pattern = 'AWS_(SECRET_)?ACCESS_KEY|aws_access_key_id|aws_secret_access_key'
risk = "critical"
message = "Command may expose AWS credentials"
suggest = "Use AWS credential file or IAM roles"
tags = ["aws", "security", "credentials"]

[[rules]]
name = "drop-database-prod"
description = "Prevent dropping production databases"
pattern = 'DROP\s+DATABASE.*(prod|production)'
risk = "critical"
message = "Attempting to drop what appears to be a production database"
suggest = "Double-check the database name and consider a backup first"
tags = ["database", "destructive"]
"#;

/// Where rules live when no path is configured
pub fn default_rules_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("cmdguard").join("rules.toml"))
}

/// A rule as it is written to disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomRule {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub pattern: String,
    /// Kept verbatim; unknown values evaluate as medium
    #[serde(default = "default_risk")]
    pub risk: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub suggest: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub tags: Vec<String>,
}

fn default_risk() -> String {
    RiskLevel::Medium.as_str().to_string()
}

fn default_enabled() -> bool {
    true
}

impl CustomRule {
    pub fn new(name: impl Into<String>, pattern: impl Into<String>, risk: RiskLevel) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            pattern: pattern.into(),
            risk: risk.as_str().to_string(),
            message: String::new(),
            suggest: String::new(),
            enabled: true,
            tags: Vec::new(),
        }
    }

    pub fn risk_level(&self) -> RiskLevel {
        RiskLevel::parse_lenient(&self.risk)
    }

    fn compile(&self) -> RuleResult<PatternRule> {
        if self.name.trim().is_empty() || self.pattern.is_empty() {
            return Err(RuleError::MissingField);
        }
        let compiled = PatternRule::compile(&self.name, &self.pattern, self.risk_level())?;
        Ok(self.with_regex(compiled.pattern))
    }

    fn with_regex(&self, pattern: Regex) -> PatternRule {
        let message = if self.message.is_empty() {
            format!("Custom rule '{}' matched", self.name)
        } else {
            self.message.clone()
        };
        PatternRule {
            name: self.name.clone(),
            description: self.description.clone(),
            pattern,
            level: self.risk_level(),
            message,
            suggestion: self.suggest.clone(),
        }
    }
}

/// On-disk document: an ordered list of `[[rules]]` tables
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleFile {
    #[serde(default)]
    pub rules: Vec<CustomRule>,
}

#[derive(Debug, Clone)]
struct Entry {
    rule: CustomRule,
    compiled: PatternRule,
}

/// Insertion-ordered custom rules with their compiled patterns.
///
/// Every mutation builds the new rule list aside, persists it, and only
/// then replaces the live set, so a failed write leaves the engine as it was.
#[derive(Debug, Clone, Default)]
pub struct CustomRuleEngine {
    path: Option<PathBuf>,
    entries: Vec<Entry>,
}

impl CustomRuleEngine {
    /// Empty engine that never touches the filesystem
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load rules from `path`, writing and loading the default set when
    /// the file does not exist yet
    pub fn load(path: impl Into<PathBuf>) -> RuleResult<Self> {
        let path = path.into();
        if !path.exists() {
            debug!(path = %path.display(), "writing default rules file");
            write_file(&path, &format!("{}{}", FILE_HEADER, DEFAULT_RULES.trim_start()))?;
        }
        let content = fs::read_to_string(&path).map_err(|source| RuleError::Io {
            path: path.clone(),
            source,
        })?;
        let mut engine = Self::from_toml(&content)?;
        engine.path = Some(path);
        Ok(engine)
    }

    /// Parse a rules document. Entries that fail to deserialize, lack a
    /// name or pattern, repeat an earlier name, or carry an invalid regex
    /// are skipped with a warning.
    pub fn from_toml(content: &str) -> RuleResult<Self> {
        let document: toml::Table = toml::from_str(content)?;
        let raw = match document.get("rules") {
            Some(toml::Value::Array(items)) => items.clone(),
            _ => Vec::new(),
        };

        let mut entries: Vec<Entry> = Vec::with_capacity(raw.len());
        for value in raw {
            let rule = match value.try_into::<CustomRule>() {
                Ok(rule) => rule,
                Err(err) => {
                    warn!(error = %err, "skipping malformed custom rule");
                    continue;
                }
            };
            if entries.iter().any(|e| e.rule.name == rule.name) {
                warn!(rule = %rule.name, "skipping duplicate custom rule");
                continue;
            }
            match rule.compile() {
                Ok(compiled) => entries.push(Entry { rule, compiled }),
                Err(err) => warn!(rule = %rule.name, error = %err, "skipping custom rule"),
            }
        }

        debug!(count = entries.len(), "custom rules loaded");
        Ok(Self { path: None, entries })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn list(&self) -> impl Iterator<Item = &CustomRule> {
        self.entries.iter().map(|e| &e.rule)
    }

    pub fn get(&self, name: &str) -> Option<&CustomRule> {
        self.list().find(|r| r.name == name)
    }

    pub fn to_toml(&self) -> RuleResult<String> {
        let file = RuleFile {
            rules: self.list().cloned().collect(),
        };
        Ok(format!("{}{}", FILE_HEADER, toml::to_string(&file)?))
    }

    /// Write the full rule set to the backing file, if there is one
    pub fn save(&self) -> RuleResult<()> {
        match &self.path {
            Some(path) => write_file(path, &self.to_toml()?),
            None => Ok(()),
        }
    }

    pub fn add(&mut self, rule: CustomRule) -> RuleResult<()> {
        let compiled = rule.compile()?;
        if self.get(&rule.name).is_some() {
            return Err(RuleError::Duplicate(rule.name));
        }
        let mut entries = self.entries.clone();
        entries.push(Entry { rule, compiled });
        self.commit(entries)
    }

    /// Replace a rule, keeping its name. An empty pattern keeps the
    /// current one; the regex is recompiled only when the pattern changed.
    pub fn update(&mut self, name: &str, mut rule: CustomRule) -> RuleResult<()> {
        let index = self.index_of(name)?;
        let current = &self.entries[index];
        rule.name = name.to_string();
        if rule.pattern.is_empty() {
            rule.pattern = current.rule.pattern.clone();
        }

        let compiled = if rule.pattern == current.rule.pattern {
            rule.with_regex(current.compiled.pattern.clone())
        } else {
            rule.compile()?
        };

        let mut entries = self.entries.clone();
        entries[index] = Entry { rule, compiled };
        self.commit(entries)
    }

    pub fn delete(&mut self, name: &str) -> RuleResult<()> {
        let index = self.index_of(name)?;
        let mut entries = self.entries.clone();
        entries.remove(index);
        self.commit(entries)
    }

    pub fn enable(&mut self, name: &str) -> RuleResult<()> {
        self.set_enabled(name, true)
    }

    pub fn disable(&mut self, name: &str) -> RuleResult<()> {
        self.set_enabled(name, false)
    }

    /// Every rule whose pattern matches, enabled or not
    pub fn test(&self, command: &str) -> Vec<&CustomRule> {
        self.entries
            .iter()
            .filter(|e| e.compiled.matches(command))
            .map(|e| &e.rule)
            .collect()
    }

    /// Findings for every enabled rule that matches
    pub fn check(&self, command: &str) -> Vec<Finding> {
        self.entries
            .iter()
            .filter(|e| e.rule.enabled)
            .filter_map(|e| e.compiled.check(command, FindingKind::Custom))
            .collect()
    }

    fn set_enabled(&mut self, name: &str, enabled: bool) -> RuleResult<()> {
        let index = self.index_of(name)?;
        let mut entries = self.entries.clone();
        entries[index].rule.enabled = enabled;
        self.commit(entries)
    }

    fn index_of(&self, name: &str) -> RuleResult<usize> {
        self.entries
            .iter()
            .position(|e| e.rule.name == name)
            .ok_or_else(|| RuleError::NotFound(name.to_string()))
    }

    fn commit(&mut self, entries: Vec<Entry>) -> RuleResult<()> {
        let candidate = Self {
            path: self.path.clone(),
            entries,
        };
        candidate.save()?;
        *self = candidate;
        Ok(())
    }
}

fn write_file(path: &Path, content: &str) -> RuleResult<()> {
    let io_err = |source| RuleError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
    }
    fs::write(path, content).map_err(io_err)
}

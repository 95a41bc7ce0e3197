//! Append-only record of interactive decisions, optionally kept in a JSON file

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::debug;

use crate::risk::RiskLevel;

/// Outcome of one decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Decision {
    Proceed,
    Cancel,
    Modify,
    AutoDenied,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Proceed => "proceed",
            Decision::Cancel => "cancel",
            Decision::Modify => "modify",
            Decision::AutoDenied => "auto-denied",
        }
    }

    /// Whether the command may run after this decision
    pub fn allows(&self) -> bool {
        matches!(self, Decision::Proceed)
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyDecision {
    pub command: String,
    pub risk_level: RiskLevel,
    pub decision: Decision,
    pub timestamp: DateTime<Utc>,
    /// Set when the user marked the command safe. Nothing is suppressed
    /// on later runs because of it.
    #[serde(default)]
    pub learned_safe: bool,
}

impl SafetyDecision {
    pub fn new(command: impl Into<String>, risk_level: RiskLevel, decision: Decision) -> Self {
        Self {
            command: command.into(),
            risk_level,
            decision,
            timestamp: Utc::now(),
            learned_safe: false,
        }
    }

    pub fn learned_safe(mut self) -> Self {
        self.learned_safe = true;
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HistoryStats {
    pub total: usize,
    pub proceed: usize,
    pub cancel: usize,
    pub modify: usize,
    pub auto_denied: usize,
    pub learned_safe: usize,
}

impl HistoryStats {
    pub fn from_decisions<'a>(decisions: impl IntoIterator<Item = &'a SafetyDecision>) -> Self {
        let mut stats = Self::default();
        for d in decisions {
            stats.total += 1;
            match d.decision {
                Decision::Proceed => stats.proceed += 1,
                Decision::Cancel => stats.cancel += 1,
                Decision::Modify => stats.modify += 1,
                Decision::AutoDenied => stats.auto_denied += 1,
            }
            if d.learned_safe {
                stats.learned_safe += 1;
            }
        }
        stats
    }
}

/// Decision log shared by every prompt in the process. Appends are
/// serialized by the lock, and the file, when there is one, is rewritten
/// while the lock is held.
#[derive(Debug, Default)]
pub struct DecisionHistory {
    path: Option<PathBuf>,
    entries: Mutex<Vec<SafetyDecision>>,
}

impl DecisionHistory {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open a history file, starting empty when it does not exist yet
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            if content.trim().is_empty() {
                Vec::new()
            } else {
                serde_json::from_str(&content)
                    .with_context(|| format!("Invalid decision history in {}", path.display()))?
            }
        } else {
            Vec::new()
        };
        debug!(path = %path.display(), entries = entries.len(), "decision history loaded");
        Ok(Self {
            path: Some(path),
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn record(&self, decision: SafetyDecision) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.push(decision);
        if let Some(path) = &self.path {
            save(path, &entries)?;
        }
        Ok(())
    }

    /// Snapshot of every decision, oldest first
    pub fn entries(&self) -> Vec<SafetyDecision> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> HistoryStats {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        HistoryStats::from_decisions(entries.iter())
    }
}

fn save(path: &Path, entries: &[SafetyDecision]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let content = serde_json::to_string_pretty(entries)?;
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_decision_serializes_kebab_case() {
        assert_eq!(
            serde_json::to_string(&Decision::AutoDenied).unwrap(),
            "\"auto-denied\""
        );
        assert_eq!(Decision::AutoDenied.to_string(), "auto-denied");
        assert!(Decision::Proceed.allows());
        assert!(!Decision::Modify.allows());
    }

    #[test]
    fn test_stats_count_each_outcome() {
        let history = DecisionHistory::in_memory();
        history
            .record(SafetyDecision::new("rm -rf build", RiskLevel::High, Decision::Proceed))
            .unwrap();
        history
            .record(SafetyDecision::new("rm -rf /", RiskLevel::Critical, Decision::AutoDenied))
            .unwrap();
        history
            .record(SafetyDecision::new("dd if=x of=/dev/sda", RiskLevel::Critical, Decision::Cancel))
            .unwrap();
        history
            .record(
                SafetyDecision::new("chmod -R 777 .", RiskLevel::High, Decision::Proceed)
                    .learned_safe(),
            )
            .unwrap();

        assert_eq!(
            history.stats(),
            HistoryStats {
                total: 4,
                proceed: 2,
                cancel: 1,
                modify: 0,
                auto_denied: 1,
                learned_safe: 1,
            }
        );
        assert_eq!(history.entries()[0].command, "rm -rf build");
    }

    #[test]
    fn test_persisted_history_reloads() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("history.json");

        let history = DecisionHistory::open(&path).unwrap();
        assert!(history.is_empty());
        history
            .record(SafetyDecision::new("git push -f", RiskLevel::High, Decision::Modify))
            .unwrap();
        let written = history.entries();

        let reloaded = DecisionHistory::open(&path).unwrap();
        assert_eq!(reloaded.entries(), written);
        assert_eq!(reloaded.path(), Some(path.as_path()));
    }

    #[test]
    fn test_invalid_history_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(DecisionHistory::open(&path).is_err());
    }

    #[test]
    fn test_concurrent_appends_are_all_kept() {
        let history = Arc::new(DecisionHistory::in_memory());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let history = Arc::clone(&history);
                std::thread::spawn(move || {
                    for j in 0..25 {
                        history
                            .record(SafetyDecision::new(
                                format!("cmd {} {}", i, j),
                                RiskLevel::Medium,
                                Decision::Cancel,
                            ))
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(history.len(), 200);
        assert_eq!(history.stats().cancel, 200);
    }
}

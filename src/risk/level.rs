//! Ordered risk levels shared by every analysis stage

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::finding::Severity;

/// Risk level of a command or of one factor contributing to it.
///
/// The declaration order is the severity order, so `Ord` gives
/// `Low < Medium < High < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub const ALL: [RiskLevel; 4] = [
        RiskLevel::Low,
        RiskLevel::Medium,
        RiskLevel::High,
        RiskLevel::Critical,
    ];

    /// Parse a persisted risk string, reading anything unknown as Medium
    pub fn parse_lenient(value: &str) -> Self {
        value.parse().unwrap_or(RiskLevel::Medium)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }

    /// Severity a finding carries when it is raised at this risk level
    pub fn severity(&self) -> Severity {
        SEVERITY_TABLE
            .iter()
            .find(|(level, _)| level == self)
            .map(|(_, severity)| *severity)
            .unwrap_or(Severity::Warning)
    }
}

/// Risk level to finding severity. Levels missing here map to Warning.
const SEVERITY_TABLE: &[(RiskLevel, Severity)] = &[
    (RiskLevel::Low, Severity::Info),
    (RiskLevel::Medium, Severity::Warning),
    (RiskLevel::High, Severity::Error),
    (RiskLevel::Critical, Severity::Error),
];

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(RiskLevel::Low),
            "medium" => Ok(RiskLevel::Medium),
            "high" => Ok(RiskLevel::High),
            "critical" => Ok(RiskLevel::Critical),
            other => Err(format!(
                "unknown risk level '{}' (expected low, medium, high or critical)",
                other
            )),
        }
    }
}

//! What each risk level means, shown before the prompt

use crate::risk::RiskLevel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Alternative {
    pub description: &'static str,
    pub example: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Education {
    pub level: RiskLevel,
    pub title: &'static str,
    pub description: &'static str,
    pub consequences: &'static [&'static str],
    pub alternatives: &'static [Alternative],
}

const EDUCATION: &[Education] = &[
    Education {
        level: RiskLevel::Critical,
        title: "CRITICAL RISK: System Destruction Warning",
        description: "This command could permanently damage your system or delete critical data.",
        consequences: &[
            "Complete system failure requiring reinstallation",
            "Permanent loss of all data",
            "Corruption of system files",
            "Loss of user accounts and configurations",
        ],
        alternatives: &[
            Alternative {
                description: "Use specific paths instead of root directory",
                example: "rm -rf /tmp/specific-folder",
            },
            Alternative {
                description: "Use trash command for recoverable deletion",
                example: "trash /path/to/file",
            },
        ],
    },
    Education {
        level: RiskLevel::High,
        title: "HIGH RISK: Dangerous Operation Detected",
        description: "This command performs potentially harmful operations that could affect system stability or security.",
        consequences: &[
            "Security vulnerabilities",
            "Service disruptions",
            "Data exposure",
            "Difficult to reverse changes",
        ],
        alternatives: &[
            Alternative {
                description: "Review scripts before executing",
                example: "curl -o script.sh URL && less script.sh && bash script.sh",
            },
            Alternative {
                description: "Use restrictive permissions",
                example: "chmod 755 instead of chmod 777",
            },
        ],
    },
    Education {
        level: RiskLevel::Medium,
        title: "MEDIUM RISK: Caution Advised",
        description: "This command could have unintended consequences. Please review carefully.",
        consequences: &[
            "Potential data loss",
            "May affect other users",
            "Could require cleanup",
        ],
        alternatives: &[
            Alternative {
                description: "Test with dry-run first",
                example: "rsync --dry-run source/ dest/",
            },
            Alternative {
                description: "Create backups before modifying",
                example: "cp -a original original.bak",
            },
        ],
    },
];

/// General advice printed when the user chooses to modify a command
pub const GENERAL_TIPS: &[&str] = &[
    "Use absolute paths to avoid mistakes",
    "Test commands with --dry-run or -n flags when available",
    "Create backups before destructive operations",
    "Use version control for important files",
];

/// Education for a level. Low risk has none.
pub fn education_for(level: RiskLevel) -> Option<&'static Education> {
    EDUCATION.iter().find(|e| e.level == level)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_prompted_level_has_education() {
        for level in [RiskLevel::Medium, RiskLevel::High, RiskLevel::Critical] {
            let edu = education_for(level).unwrap();
            assert!(!edu.consequences.is_empty());
            assert!(!edu.alternatives.is_empty());
        }
        assert!(education_for(RiskLevel::Low).is_none());
    }

    #[test]
    fn test_critical_title() {
        assert_eq!(
            education_for(RiskLevel::Critical).unwrap().title,
            "CRITICAL RISK: System Destruction Warning"
        );
    }
}

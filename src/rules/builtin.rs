//! Built-in destructive command patterns

use tracing::warn;

use super::PatternRule;
use crate::finding::{Finding, FindingKind};
use crate::risk::RiskLevel;

struct BuiltinRule {
    name: &'static str,
    description: &'static str,
    pattern: &'static str,
    level: RiskLevel,
    message: &'static str,
    suggestion: &'static str,
}

const BUILTIN_RULES: &[BuiltinRule] = &[
    // Deletion
    BuiltinRule {
        name: "RecursiveRootDelete",
        description: "Detects recursive deletion of root directory",
        pattern: r"\brm\s+(-[a-zA-Z]*r[a-zA-Z]*f|-[a-zA-Z]*f[a-zA-Z]*r)\s+/(\s|$)",
        level: RiskLevel::Critical,
        message: "CRITICAL: This command will recursively delete your entire system!",
        suggestion: "Never run 'rm -rf /' - it will destroy your system. If you need to clean up, specify exact paths.",
    },
    BuiltinRule {
        name: "RecursiveHomeDelete",
        description: "Detects recursive deletion of home directory",
        pattern: r"\brm\s+(-[a-zA-Z]*r[a-zA-Z]*f|-[a-zA-Z]*f[a-zA-Z]*r)\s+(~|\$HOME|\$\{HOME\})(/|\s|$)",
        level: RiskLevel::Critical,
        message: "CRITICAL: This command will recursively delete your entire home directory!",
        suggestion: "Be extremely careful with 'rm -rf ~' - specify exact subdirectories instead.",
    },
    BuiltinRule {
        name: "RecursiveDelete",
        description: "Detects potentially dangerous recursive deletion",
        pattern: r"\brm\s+(-[a-zA-Z]*r[a-zA-Z]*f|-[a-zA-Z]*f[a-zA-Z]*r)",
        level: RiskLevel::High,
        message: "Warning: Recursive deletion detected. This will permanently delete files and directories.",
        suggestion: "Consider using 'trash' command instead of 'rm -rf' for recoverable deletion.",
    },
    // Remote execution
    BuiltinRule {
        name: "CurlBash",
        description: "Detects piping curl output directly to bash",
        pattern: r"curl\s+[^|]+\|\s*(sudo\s+)?(bash|sh)",
        level: RiskLevel::High,
        message: "Security Risk: Executing remote scripts without verification is dangerous.",
        suggestion: "Download the script first, review it, then execute: curl -o script.sh URL && cat script.sh",
    },
    // Disk
    BuiltinRule {
        name: "DDCommand",
        description: "Detects dd command which can overwrite disks",
        pattern: r"\bdd\s+.*of=/dev/[a-zA-Z]",
        level: RiskLevel::Critical,
        message: "CRITICAL: dd command targeting a device - this can destroy disk data!",
        suggestion: "Double-check the 'of=' parameter. Consider using 'dd status=progress' to monitor.",
    },
    // Permissions
    BuiltinRule {
        name: "ChmodRecursive777",
        description: "Detects making files world-writable",
        pattern: r"chmod\s+(-[a-zA-Z]*R|--recursive)\s+777",
        level: RiskLevel::High,
        message: "Security Risk: Making files world-writable (777) is a major security vulnerability.",
        suggestion: "Use more restrictive permissions like 755 or 644. Only give write access when necessary.",
    },
    BuiltinRule {
        name: "ForkBomb",
        description: "Detects fork bomb patterns",
        pattern: r":\(\)\s*\{.*:\|:&.*\};:",
        level: RiskLevel::Critical,
        message: "CRITICAL: Fork bomb detected! This will crash your system.",
        suggestion: "This is a fork bomb that creates infinite processes. Never run this command.",
    },
    BuiltinRule {
        name: "SudoPasswordPipe",
        description: "Detects piping passwords to sudo",
        pattern: r"echo\s+[^|]+\|\s*sudo\s+-S",
        level: RiskLevel::High,
        message: "Security Risk: Piping passwords to sudo is insecure and may be logged.",
        suggestion: "Use 'sudo' directly or configure NOPASSWD in sudoers for automation.",
    },
    // Files
    BuiltinRule {
        name: "TruncateFile",
        description: "Detects file truncation",
        pattern: r">\s*/[^/\s]+",
        level: RiskLevel::Medium,
        message: "Warning: '>' will overwrite the file completely. Data will be lost.",
        suggestion: "Use '>>' to append instead of '>' to overwrite, or backup the file first.",
    },
    BuiltinRule {
        name: "SystemDirectoryModification",
        description: "Detects modifications to system directories",
        pattern: r"(rm|mv|chmod|chown)\s+.*(/etc|/usr|/bin|/sbin|/lib|/boot|/sys|/proc)",
        level: RiskLevel::High,
        message: "System directory modification detected. This could affect system stability.",
        suggestion: "Ensure you have backups and understand the impact. Consider using configuration management tools.",
    },
    BuiltinRule {
        name: "WildcardWithRm",
        description: "Detects rm with wildcards",
        pattern: r"rm\s+[^|]*\*",
        level: RiskLevel::Medium,
        message: "Wildcard deletion detected. This may delete more files than intended.",
        suggestion: "Use 'ls' first to verify which files match the pattern before deletion.",
    },
    // System state
    BuiltinRule {
        name: "ServiceManipulation",
        description: "Detects service start/stop/restart commands",
        pattern: r"(systemctl|service)\s+(stop|restart|disable|mask)",
        level: RiskLevel::Medium,
        message: "Service manipulation detected. This may affect system services.",
        suggestion: "Ensure you understand the service dependencies before stopping or disabling services.",
    },
    BuiltinRule {
        name: "NetworkConfigChange",
        description: "Detects network configuration changes",
        pattern: r"(ifconfig|ip\s+addr|iptables|firewall-cmd)\s+",
        level: RiskLevel::High,
        message: "Network configuration change detected. This may affect connectivity.",
        suggestion: "Have a backup access method ready in case network access is lost.",
    },
    BuiltinRule {
        name: "KernelModuleOperation",
        description: "Detects kernel module operations",
        pattern: r"(insmod|rmmod|modprobe)\s+",
        level: RiskLevel::High,
        message: "Kernel module operation detected. This affects core system functionality.",
        suggestion: "Ensure the module is compatible with your kernel version.",
    },
    // Git and databases
    BuiltinRule {
        name: "GitForceOperation",
        description: "Detects git force operations",
        pattern: r"git\s+.*--force|git\s+push\s+.*-f",
        level: RiskLevel::Medium,
        message: "Git force operation detected. This may overwrite remote history.",
        suggestion: "Consider if force push is necessary. It can cause issues for other collaborators.",
    },
    BuiltinRule {
        name: "DatabaseDropOperation",
        description: "Detects database drop operations",
        pattern: r"(DROP\s+(DATABASE|TABLE)|mysql.*-e.*drop|psql.*-c.*drop)",
        level: RiskLevel::Critical,
        message: "Database drop operation detected! This will permanently delete data.",
        suggestion: "Create a backup before dropping databases or tables.",
    },
];

/// The fixed rule set every engine starts from
pub struct BuiltinRules {
    rules: Vec<PatternRule>,
}

impl Default for BuiltinRules {
    fn default() -> Self {
        Self::new()
    }
}

impl BuiltinRules {
    pub fn new() -> Self {
        Self {
            rules: BUILTIN_RULES
                .iter()
                .filter_map(|rule| {
                    match PatternRule::compile(rule.name, rule.pattern, rule.level) {
                        Ok(compiled) => Some(
                            compiled
                                .described(rule.description)
                                .with_message(rule.message, rule.suggestion),
                        ),
                        Err(err) => {
                            warn!(rule = rule.name, error = %err, "skipping built-in rule");
                            None
                        }
                    }
                })
                .collect(),
        }
    }

    pub fn rules(&self) -> &[PatternRule] {
        &self.rules
    }

    pub fn get(&self, name: &str) -> Option<&PatternRule> {
        self.rules.iter().find(|r| r.name == name)
    }

    /// One finding per matching rule, in table order
    pub fn check(&self, command: &str) -> Vec<Finding> {
        self.rules
            .iter()
            .filter_map(|rule| rule.check(command, FindingKind::Safety))
            .collect()
    }
}

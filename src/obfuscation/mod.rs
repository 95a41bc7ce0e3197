//! Obfuscation detection over raw command text

mod techniques;

pub use techniques::{looks_like_command, Detection, Technique, TECHNIQUES};

use serde::Serialize;
use tracing::debug;

use crate::risk::RiskLevel;

/// Confidence a single technique needs before it counts
const DETECTION_FLOOR: f64 = 0.5;

pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.7;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObfuscationResult {
    pub is_obfuscated: bool,
    pub confidence: f64,
    pub techniques: Vec<String>,
    /// Best plaintext candidate, the input itself when nothing was found
    pub deobfuscated: String,
    pub risk_level: RiskLevel,
    pub explanation: String,
}

impl ObfuscationResult {
    fn clean(command: &str) -> Self {
        Self {
            is_obfuscated: false,
            confidence: 0.0,
            techniques: Vec::new(),
            deobfuscated: command.to_string(),
            risk_level: RiskLevel::Low,
            explanation: String::new(),
        }
    }

    /// Whether the candidate differs from what was analysed
    pub fn has_candidate(&self, command: &str) -> bool {
        self.is_obfuscated && self.deobfuscated.trim() != command.trim()
    }
}

pub struct ObfuscationDetector {
    techniques: &'static [Technique],
    confidence_threshold: f64,
}

impl ObfuscationDetector {
    pub fn new(confidence_threshold: f64) -> Self {
        Self {
            techniques: TECHNIQUES,
            confidence_threshold,
        }
    }

    pub fn confidence_threshold(&self) -> f64 {
        self.confidence_threshold
    }

    pub fn detect(&self, command: &str) -> ObfuscationResult {
        let mut result = ObfuscationResult::clean(command);

        for technique in self.techniques {
            let Some(hit) = (technique.detect)(command) else {
                continue;
            };
            if hit.confidence <= DETECTION_FLOOR {
                continue;
            }
            debug!(technique = technique.name, confidence = hit.confidence, "obfuscation technique matched");

            result.is_obfuscated = true;
            result.techniques.push(technique.name.to_string());
            // strictly greater, so earlier techniques win ties
            if hit.confidence > result.confidence {
                result.confidence = hit.confidence;
                result.deobfuscated = hit.candidate;
            }
            result.risk_level = result.risk_level.max(hit.level.unwrap_or(technique.level));
        }

        if result.is_obfuscated {
            result.explanation = explain(&result);
        }
        result
    }

    /// Obfuscated with at least the configured confidence
    pub fn is_obfuscated(&self, command: &str) -> bool {
        let result = self.detect(command);
        result.is_obfuscated && result.confidence >= self.confidence_threshold
    }
}

impl Default for ObfuscationDetector {
    fn default() -> Self {
        Self::new(DEFAULT_CONFIDENCE_THRESHOLD)
    }
}

fn explain(result: &ObfuscationResult) -> String {
    let mut text = format!(
        "This command appears to be obfuscated using {} technique(s):\n",
        result.techniques.len()
    );
    for (i, technique) in result.techniques.iter().enumerate() {
        text.push_str(&format!("{}. {}\n", i + 1, technique));
    }
    text.push_str(&format!("\nConfidence: {:.0}%\n", result.confidence * 100.0));
    text.push_str(&format!("Risk Level: {}\n", result.risk_level));
    if !result.deobfuscated.is_empty() {
        text.push_str(&format!("\nDeobfuscated command:\n{}\n", result.deobfuscated));
    }
    text.push_str("\nObfuscated commands are often used to hide malicious intent.");
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn detector() -> ObfuscationDetector {
        ObfuscationDetector::default()
    }

    #[test]
    fn test_base64_piped_to_shell() {
        let result = detector().detect("echo \"cm0gLXJmIC8=\" | base64 -d | bash");
        assert!(result.is_obfuscated);
        assert_eq!(result.deobfuscated, "rm -rf /");
        assert_eq!(result.risk_level, RiskLevel::Critical);
        assert!(result.confidence >= 0.9);
        assert_eq!(result.techniques, vec!["Base64 Encoding"]);
    }

    #[test]
    fn test_plain_command_is_clean() {
        let result = detector().detect("echo \"Hello World\"");
        assert!(!result.is_obfuscated);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.deobfuscated, "echo \"Hello World\"");
        assert_eq!(result.risk_level, RiskLevel::Low);
        assert!(result.explanation.is_empty());
    }

    #[test]
    fn test_not_obfuscated_cases() {
        for command in [r#"DIR="/tmp"; ls $DIR"#, r##"echo "#FF0000""##, "ls -la"] {
            assert!(!detector().detect(command).is_obfuscated, "{}", command);
        }
    }

    #[test]
    fn test_ifs_substitution() {
        let result = detector().detect("rm${IFS}-rf${IFS}/");
        assert!(result.techniques.contains(&"Character Substitution".to_string()));
        assert_eq!(result.deobfuscated, "rm -rf /");
        assert_eq!(result.risk_level, RiskLevel::Medium);
    }

    #[test]
    fn test_confidence_at_floor_is_not_detected() {
        // five substitutions give exactly 0.5
        let result = detector().detect("$(a)$(b)$(c)$(d)$(e)");
        assert!(!result.is_obfuscated);
        let result = detector().detect("$(a)$(b)$(c)$(d)$(e)$(f)");
        assert!(result.is_obfuscated);
        assert_eq!(result.techniques, vec!["Command Substitution Abuse"]);
    }

    #[test]
    fn test_multiple_techniques() {
        let result = detector().detect(r#"a="r"; b="m"; eval $a$b${IFS}-rf${IFS}/"#);
        assert!(result.techniques.len() >= 2);
        assert!(result.confidence >= 0.7);
        assert_eq!(result.risk_level, RiskLevel::Critical);
        // eval has the highest confidence, its candidate is the raw text
        assert_eq!(result.confidence, 0.9);
    }

    #[test]
    fn test_ties_keep_first_candidate() {
        // both unicode and character substitution score 0.7
        let result = detector().detect(r"echo \u0041${IFS}x");
        assert_eq!(
            result.techniques,
            vec!["Unicode Escapes", "Character Substitution"]
        );
        assert_eq!(result.deobfuscated, "echo A${IFS}x");
    }

    #[test]
    fn test_threshold_gate() {
        let strict = ObfuscationDetector::new(0.75);
        assert!(!strict.is_obfuscated("rm${IFS}-rf${IFS}/"));
        assert!(detector().is_obfuscated("rm${IFS}-rf${IFS}/"));
    }

    #[test]
    fn test_explanation_lists_techniques() {
        let result = detector().detect("echo 'bHMgLWxhIC9ldGMvcGFzc3dk' | base64 -d");
        assert!(result.explanation.contains("1. Base64 Encoding"));
        assert!(result.explanation.contains("Confidence: 90%"));
        assert!(result.explanation.contains("ls -la /etc/passwd"));
    }
}

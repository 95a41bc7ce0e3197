//! Snapshot of the environment a command would run in

use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Directories whose modification affects the whole system
pub const IMPORTANT_PATHS: &[&str] = &[
    "/etc", "/usr", "/bin", "/sbin", "/boot", "/dev", "/proc", "/sys", "/lib", "/lib64", "/var",
    "/opt", "/root",
];

/// How far above the working directory to look for `.git`
const GIT_SEARCH_DEPTH: usize = 5;

/// Read-only view of where the command runs. Probed once per analysis
/// and never refreshed while that analysis is in progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvironmentContext {
    pub current_directory: PathBuf,
    pub is_git_repository: bool,
    pub is_home_directory: bool,
    pub is_system_path: bool,
    pub has_write_permission: bool,
    pub important_paths: Vec<String>,
}

impl Default for EnvironmentContext {
    fn default() -> Self {
        Self {
            current_directory: PathBuf::new(),
            is_git_repository: false,
            is_home_directory: false,
            is_system_path: false,
            has_write_permission: false,
            important_paths: IMPORTANT_PATHS.iter().map(|p| p.to_string()).collect(),
        }
    }
}

impl EnvironmentContext {
    /// Probe the process working directory
    pub fn probe() -> Self {
        match std::env::current_dir() {
            Ok(cwd) => Self::probe_at(&cwd, dirs::home_dir().as_deref()),
            Err(err) => {
                debug!(error = %err, "no working directory, using empty context");
                Self::default()
            }
        }
    }

    pub fn probe_at(dir: &Path, home: Option<&Path>) -> Self {
        let mut ctx = Self {
            current_directory: dir.to_path_buf(),
            ..Default::default()
        };
        ctx.is_home_directory = home.is_some_and(|home| dir.starts_with(home));
        ctx.is_system_path = ctx.important_paths.iter().any(|p| dir.starts_with(p));
        ctx.has_write_permission = can_create_in(dir);
        ctx.is_git_repository = find_git_dir(dir);
        debug!(
            cwd = %dir.display(),
            git = ctx.is_git_repository,
            writable = ctx.has_write_permission,
            "environment context"
        );
        ctx
    }
}

/// Whether a file can be created in `dir`. The file is anonymous and
/// gone once dropped, so nothing in `dir` is touched.
fn can_create_in(dir: &Path) -> bool {
    tempfile::tempfile_in(dir).is_ok()
}

fn find_git_dir(dir: &Path) -> bool {
    dir.ancestors()
        .take(GIT_SEARCH_DEPTH + 1)
        .any(|candidate| candidate.join(".git").is_dir())
}

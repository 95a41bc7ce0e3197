//! Permission requirements derived from the command text

use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Paths that need root to modify
const SYSTEM_PATHS: &[&str] = &[
    "/etc", "/usr", "/bin", "/sbin", "/boot", "/dev", "/proc", "/sys", "/lib", "/lib64",
    "/var/log", "/opt", "/root",
];

static ROOT_VERBS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(sudo|systemctl|service|apt|apt-get|yum|dnf|pacman|mount|umount|fdisk|parted|mkfs|iptables|firewall-cmd|ufw|useradd|userdel|usermod|groupadd|chown)\b|\bchmod\b.*[0-7]{3}|\bsu\s",
    )
    .expect("invalid regex")
});

static WRITE_VERBS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r">|\b(rm|mv|cp|mkdir|touch|tee)\b|\bsed\s+-i").expect("invalid regex")
});

const OPERATORS: &[&str] = &["|", "||", "&&", ";", ">", ">>", "<", "<<", "&"];

/// Filesystem and process facts the permission analysis needs
pub trait PermissionProbe {
    fn is_root(&self) -> bool;
    fn can_write(&self, path: &Path) -> bool;
    fn exists(&self, path: &Path) -> bool;
}

/// Probe backed by the real filesystem and process credentials
#[derive(Debug, Clone, Default)]
pub struct FsProbe {
    uid: Option<u32>,
    gid: Option<u32>,
}

impl FsProbe {
    pub fn new() -> Self {
        let (uid, gid) = process_ids();
        Self { uid, gid }
    }
}

#[cfg(unix)]
fn process_ids() -> (Option<u32>, Option<u32>) {
    use std::os::unix::fs::MetadataExt;

    // /proc/self is owned by the effective user
    if let Ok(meta) = fs::metadata("/proc/self") {
        return (Some(meta.uid()), Some(meta.gid()));
    }
    let id = |flag: &str| {
        std::process::Command::new("id")
            .arg(flag)
            .output()
            .ok()
            .and_then(|out| String::from_utf8_lossy(&out.stdout).trim().parse().ok())
    };
    (id("-u"), id("-g"))
}

#[cfg(not(unix))]
fn process_ids() -> (Option<u32>, Option<u32>) {
    (None, None)
}

impl PermissionProbe for FsProbe {
    fn is_root(&self) -> bool {
        self.uid == Some(0)
    }

    #[cfg(unix)]
    fn can_write(&self, path: &Path) -> bool {
        use std::os::unix::fs::MetadataExt;

        let Ok(meta) = fs::metadata(path) else {
            return false;
        };
        if self.is_root() {
            return true;
        }
        let mode = meta.mode();
        if Some(meta.uid()) == self.uid {
            mode & 0o200 != 0
        } else if Some(meta.gid()) == self.gid {
            mode & 0o020 != 0
        } else {
            mode & 0o002 != 0
        }
    }

    #[cfg(not(unix))]
    fn can_write(&self, path: &Path) -> bool {
        fs::metadata(path).is_ok_and(|meta| !meta.permissions().readonly())
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionRequirement {
    pub requires_root: bool,
    pub requires_write: bool,
    pub affected_paths: Vec<String>,
    pub missing_permissions: Vec<String>,
}

pub fn is_system_path(path: &Path) -> bool {
    SYSTEM_PATHS.iter().any(|p| path.starts_with(p))
}

/// Words that look like filesystem paths, quotes stripped
pub fn extract_paths(command: &str) -> Vec<String> {
    command
        .split_whitespace()
        .filter(|token| !token.starts_with('-') && !OPERATORS.contains(token))
        .map(|token| token.trim_matches(|c: char| c == '"' || c == '\''))
        .filter(|token| token.contains('/') || token.starts_with('~'))
        .map(str::to_string)
        .collect()
}

pub fn check_requirements(command: &str, probe: &dyn PermissionProbe) -> PermissionRequirement {
    let mut req = PermissionRequirement {
        requires_root: ROOT_VERBS.is_match(command),
        requires_write: WRITE_VERBS.is_match(command),
        affected_paths: extract_paths(command),
        ..Default::default()
    };
    let is_root = probe.is_root();

    for raw in &req.affected_paths {
        let mut path = PathBuf::from(shellexpand::tilde(raw).into_owned());
        if !probe.exists(&path) {
            match path.parent() {
                Some(parent) if probe.exists(parent) => path = parent.to_path_buf(),
                _ => continue,
            }
        }

        if req.requires_write && !probe.can_write(&path) {
            req.missing_permissions
                .push(format!("Write permission required for: {}", path.display()));
        }
        if is_system_path(&path) && !is_root {
            req.requires_root = true;
            if req.requires_write {
                req.missing_permissions.push(format!(
                    "Root access required to modify system path: {}",
                    path.display()
                ));
            }
        }
    }

    if req.requires_root && !is_root {
        req.missing_permissions
            .push("Command requires root privileges but running as regular user".to_string());
    }
    req
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashSet;

    /// Probe answering from fixed sets
    #[derive(Default)]
    pub(crate) struct StaticProbe {
        pub root: bool,
        pub existing: HashSet<PathBuf>,
        pub writable: HashSet<PathBuf>,
    }

    impl StaticProbe {
        pub fn with(existing: &[&str], writable: &[&str]) -> Self {
            Self {
                root: false,
                existing: existing.iter().map(PathBuf::from).collect(),
                writable: writable.iter().map(PathBuf::from).collect(),
            }
        }
    }

    impl PermissionProbe for StaticProbe {
        fn is_root(&self) -> bool {
            self.root
        }

        fn can_write(&self, path: &Path) -> bool {
            self.root || self.writable.contains(path)
        }

        fn exists(&self, path: &Path) -> bool {
            self.existing.contains(path)
        }
    }

    #[test]
    fn test_extract_paths() {
        assert_eq!(
            extract_paths("cp -r ./src '/tmp/out' | tee ~/log > x"),
            vec!["./src", "/tmp/out", "~/log"]
        );
        assert!(extract_paths("echo \"Hello World\"").is_empty());
    }

    #[test]
    fn test_plain_command_needs_nothing() {
        let req = check_requirements("echo \"Hello World\"", &StaticProbe::default());
        assert_eq!(req, PermissionRequirement::default());
    }

    #[test]
    fn test_root_verbs_use_word_boundaries() {
        let probe = StaticProbe::default();
        assert!(check_requirements("sudo ls", &probe).requires_root);
        assert!(check_requirements("systemctl restart nginx", &probe).requires_root);
        assert!(check_requirements("chmod 644 file", &probe).requires_root);
        assert!(!check_requirements("ls ./mountpoints", &probe).requires_root);
        assert!(!check_requirements("echo superuser", &probe).requires_root);
    }

    #[test]
    fn test_missing_write_permission() {
        let probe = StaticProbe::with(&["/srv/data"], &[]);
        let req = check_requirements("rm /srv/data/old.log", &probe);
        assert!(req.requires_write);
        // missing file falls back to its parent
        assert_eq!(
            req.missing_permissions,
            vec!["Write permission required for: /srv/data"]
        );
    }

    #[test]
    fn test_system_path_requires_root() {
        let probe = StaticProbe::with(&["/etc/hosts"], &[]);
        let req = check_requirements("touch /etc/hosts", &probe);
        assert!(req.requires_root);
        assert_eq!(
            req.missing_permissions,
            vec![
                "Write permission required for: /etc/hosts",
                "Root access required to modify system path: /etc/hosts",
                "Command requires root privileges but running as regular user",
            ]
        );

        let root = StaticProbe {
            root: true,
            ..StaticProbe::with(&["/etc/hosts"], &[])
        };
        let req = check_requirements("touch /etc/hosts", &root);
        assert!(req.missing_permissions.is_empty());
    }

    #[test]
    fn test_unknown_paths_are_skipped() {
        let req = check_requirements("rm /nowhere/at/all", &StaticProbe::default());
        assert!(req.requires_write);
        assert!(req.missing_permissions.is_empty());
    }
}

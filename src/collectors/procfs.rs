use crate::models::process::ProcessRecord;
use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use std::fs;
use std::io::ErrorKind;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Reader over a proc filesystem mount (normally `/proc`).
#[derive(Debug, Clone)]
pub struct ProcFs {
    root: PathBuf,
}

impl Default for ProcFs {
    fn default() -> Self {
        Self::new("/proc")
    }
}

impl ProcFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn pid_dir(&self, pid: u32) -> PathBuf {
        self.root.join(pid.to_string())
    }

    /// Numeric entries of the process table.
    pub fn pids(&self) -> Vec<u32> {
        let dir = match fs::read_dir(&self.root) {
            Ok(d)  => d,
            Err(e) => {
                warn!(root = %self.root.display(), error = %e, "cannot list process table");
                return Vec::new();
            }
        };
        let mut pids: Vec<u32> = dir
            .flatten()
            .filter_map(|entry| entry.file_name().to_string_lossy().parse().ok())
            .collect();
        pids.sort_unstable();
        pids
    }

    /// Read one process. None means it exited before we could stat it.
    pub fn read_record(&self, pid: u32) -> Option<ProcessRecord> {
        let dir = self.pid_dir(pid);
        let owner_uid = match fs::metadata(&dir) {
            Ok(m)  => m.uid(),
            Err(e) => {
                if e.kind() != ErrorKind::NotFound {
                    debug!(pid, error = %e, "stat failed, skipping process");
                }
                return None;
            }
        };

        Some(ProcessRecord {
            pid,
            owner_uid,
            environment:   read_environ(&dir.join("environ"), pid),
            stderr_target: read_fd_link(&dir.join("fd").join("2"), pid),
        })
    }

    /// One full pass over the process table.
    pub fn scan(&self) -> Vec<ProcessRecord> {
        self.pids().into_iter().filter_map(|pid| self.read_record(pid)).collect()
    }

    /// argv of `pid`, or None if it cannot be read.
    pub fn cmdline(&self, pid: u32) -> Option<Vec<String>> {
        let raw = fs::read(self.pid_dir(pid).join("cmdline")).ok()?;
        Some(split_nul(&raw))
    }

    /// True if a process with this pid exists, even one we may not signal.
    pub fn is_alive(&self, pid: u32) -> bool {
        let Ok(raw) = i32::try_from(pid) else { return false };
        if raw <= 0 {
            return false;
        }
        match kill(Pid::from_raw(raw), None) {
            Ok(())            => true,
            Err(Errno::EPERM) => true,
            Err(_)            => false,
        }
    }
}

fn read_environ(path: &Path, pid: u32) -> Vec<String> {
    match fs::read(path) {
        Ok(raw) => split_nul(&raw),
        Err(e) if matches!(e.kind(), ErrorKind::PermissionDenied | ErrorKind::NotFound) => Vec::new(),
        Err(e) => {
            debug!(pid, error = %e, "unreadable environment");
            Vec::new()
        }
    }
}

fn read_fd_link(path: &Path, pid: u32) -> Option<PathBuf> {
    match fs::read_link(path) {
        Ok(target) => Some(target),
        Err(e) if matches!(e.kind(), ErrorKind::PermissionDenied | ErrorKind::NotFound) => None,
        Err(e) => {
            debug!(pid, error = %e, "unreadable stderr link");
            None
        }
    }
}

fn split_nul(raw: &[u8]) -> Vec<String> {
    raw.split(|b| *b == 0)
        .filter(|chunk| !chunk.is_empty())
        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::os::unix::fs::symlink;

    /// Lay out a fake /proc/<pid> with the given environment and fd 2 target.
    pub(crate) fn fake_process(root: &Path, pid: u32, env: &[&str], stderr: Option<&str>) {
        let dir = root.join(pid.to_string());
        fs::create_dir_all(dir.join("fd")).unwrap();
        let mut environ = Vec::new();
        for entry in env {
            environ.extend_from_slice(entry.as_bytes());
            environ.push(0);
        }
        fs::write(dir.join("environ"), environ).unwrap();
        if let Some(target) = stderr {
            symlink(target, dir.join("fd").join("2")).unwrap();
        }
    }

    #[test]
    fn lists_only_numeric_entries() {
        let tmp = tempfile::tempdir().unwrap();
        fake_process(tmp.path(), 42, &[], None);
        fake_process(tmp.path(), 7, &[], None);
        fs::create_dir(tmp.path().join("self")).unwrap();
        fs::write(tmp.path().join("uptime"), "1.0 2.0\n").unwrap();

        assert_eq!(ProcFs::new(tmp.path()).pids(), vec![7, 42]);
    }

    #[test]
    fn missing_root_yields_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let procfs = ProcFs::new(tmp.path().join("absent"));
        assert!(procfs.scan().is_empty());
    }

    #[test]
    fn reads_environment_and_stderr() {
        let tmp = tempfile::tempdir().unwrap();
        fake_process(tmp.path(), 100, &["DISPLAY=:1", "XAUTHORITY=/home/u/.Xauth"], Some("/dev/pts/3"));

        let rec = ProcFs::new(tmp.path()).read_record(100).unwrap();
        assert_eq!(rec.pid, 100);
        assert_eq!(rec.environment, vec!["DISPLAY=:1", "XAUTHORITY=/home/u/.Xauth"]);
        assert_eq!(rec.stderr_target, Some(PathBuf::from("/dev/pts/3")));
        assert_eq!(rec.owner_uid, nix::unistd::geteuid().as_raw());
    }

    #[test]
    fn missing_pieces_degrade_to_empty() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir(tmp.path().join("55")).unwrap();

        let rec = ProcFs::new(tmp.path()).read_record(55).unwrap();
        assert!(rec.environment.is_empty());
        assert!(rec.stderr_target.is_none());
    }

    #[test]
    fn vanished_process_is_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(ProcFs::new(tmp.path()).read_record(999).is_none());
    }

    #[test]
    fn cmdline_splits_argv() {
        let tmp = tempfile::tempdir().unwrap();
        fake_process(tmp.path(), 9, &[], None);
        fs::write(tmp.path().join("9").join("cmdline"), b"/usr/bin/batt-notify\0-d\x0015\0").unwrap();

        let argv = ProcFs::new(tmp.path()).cmdline(9).unwrap();
        assert_eq!(argv, vec!["/usr/bin/batt-notify", "-d", "15"]);
    }

    #[test]
    fn own_process_is_alive() {
        assert!(ProcFs::default().is_alive(std::process::id()));
        assert!(!ProcFs::default().is_alive(0));
    }
}

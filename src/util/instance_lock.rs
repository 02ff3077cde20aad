//! Single-instance lock guarding the graphical alert phase.
//!
//! The lock is a plain file holding the holder's decimal pid. There is no
//! advisory locking: exclusivity rests on exclusive creation (a hard link of
//! a fully written staging file) followed by a read-back of the lock file,
//! and a recorded pid only counts while it is still a live notifier. A stale
//! file is seized by renaming it aside and checking it still holds the pid
//! that was judged stale.
//!
//! ```text
//! Unlocked --inspect--> Absent ------------------\
//!                   \-> Stale(pid) --rename+check-+--create+verify--> LockedByUs
//!                   \-> HeldByPeer(pid) --------------------------> LockedByOther
//! LockedByUs --release/drop--> Unlocked
//! ```

use crate::collectors::procfs::ProcFs;
use crate::error::NotifyError;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Answers whether a recorded pid is another running notifier.
pub trait PeerProbe {
    fn is_live_notifier(&self, pid: u32) -> bool;
}

/// Checks liveness and the argv[0] basename through the proc filesystem.
#[derive(Debug, Clone)]
pub struct ProcPeerProbe {
    procfs:   ProcFs,
    identity: String,
}

impl ProcPeerProbe {
    pub fn new(procfs: ProcFs, identity: impl Into<String>) -> Self {
        Self { procfs, identity: identity.into() }
    }

    /// Identity of the running binary, taken from our own argv[0].
    pub fn for_current_process(procfs: ProcFs) -> Self {
        let argv0 = std::env::args().next().unwrap_or_default();
        Self::new(procfs, program_name(&argv0))
    }
}

impl PeerProbe for ProcPeerProbe {
    fn is_live_notifier(&self, pid: u32) -> bool {
        if !self.procfs.is_alive(pid) {
            return false;
        }
        match self.procfs.cmdline(pid) {
            Some(argv) => argv.first().is_some_and(|a| program_name(a) == self.identity),
            None       => false,
        }
    }
}

fn program_name(argv0: &str) -> String {
    Path::new(argv0)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// What the lock file currently says.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockObservation {
    Absent,
    /// Recorded pid is dead, reused, ours, or unreadable.
    Stale(Option<u32>),
    HeldByPeer(u32),
}

pub enum LockOutcome {
    Acquired(InstanceGuard),
    HeldByOther(u32),
}

pub struct InstanceLock<P> {
    path:  PathBuf,
    pid:   u32,
    probe: P,
}

impl InstanceLock<ProcPeerProbe> {
    pub fn for_current_process(path: impl Into<PathBuf>, procfs: ProcFs) -> Self {
        Self::new(path, std::process::id(), ProcPeerProbe::for_current_process(procfs))
    }
}

impl<P: PeerProbe> InstanceLock<P> {
    pub fn new(path: impl Into<PathBuf>, pid: u32, probe: P) -> Self {
        Self { path: path.into(), pid, probe }
    }

    pub fn inspect(&self) -> Result<LockObservation, NotifyError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(t) => t,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(LockObservation::Absent),
            Err(source) => return Err(self.io_error(source)),
        };
        Ok(match text.trim().parse::<u32>() {
            Ok(pid) if pid != self.pid && self.probe.is_live_notifier(pid) => LockObservation::HeldByPeer(pid),
            Ok(pid) => LockObservation::Stale(Some(pid)),
            Err(_)  => LockObservation::Stale(None),
        })
    }

    pub fn acquire(&self) -> Result<LockOutcome, NotifyError> {
        match self.inspect()? {
            LockObservation::HeldByPeer(pid) => {
                debug!(pid, path = %self.path.display(), "lock held by running notifier");
                return Ok(LockOutcome::HeldByOther(pid));
            }
            LockObservation::Stale(recorded) => {
                info!(recorded = ?recorded, path = %self.path.display(), "seizing stale lock");
                if let Some(holder) = self.seize_stale(recorded)? {
                    return Ok(LockOutcome::HeldByOther(holder));
                }
            }
            LockObservation::Absent => {}
        }
        self.create_and_verify()
    }

    /// Move the stale file out of the way in one step, then make sure it was
    /// the file we judged stale. A peer may have seized and replaced it
    /// meanwhile; its lock is put back and its pid returned.
    fn seize_stale(&self, recorded: Option<u32>) -> Result<Option<u32>, NotifyError> {
        let claim = self.side_path("claim");
        match fs::rename(&self.path, &claim) {
            Ok(()) => {}
            // Another contender moved it first; creation decides between us.
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(self.io_error(source)),
        }

        let claimed = fs::read_to_string(&claim)
            .ok()
            .and_then(|t| t.trim().parse::<u32>().ok());
        if claimed == recorded {
            self.discard(&claim);
            return Ok(None);
        }

        let holder = claimed.unwrap_or(0);
        match fs::hard_link(&claim, &self.path) {
            Ok(()) => debug!(pid = holder, path = %self.path.display(), "lock was seized by a peer, restored it"),
            Err(e) => warn!(pid = holder, path = %self.path.display(), error = %e, "cannot restore peer's lock"),
        }
        self.discard(&claim);
        Ok(Some(holder))
    }

    fn create_and_verify(&self) -> Result<LockOutcome, NotifyError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }

        // Publish a fully written file under the lock name in one step, so a
        // peer never reads a half-written pid.
        let staging = self.side_path("new");
        let published = write_pid(&staging, self.pid).and_then(|()| fs::hard_link(&staging, &self.path));
        self.discard(&staging);
        match published {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
            Err(source) => return Err(self.io_error(source)),
        }

        // A racing peer may have created or replaced the file in between.
        let recorded = fs::read_to_string(&self.path)
            .ok()
            .and_then(|t| t.trim().parse::<u32>().ok());
        match recorded {
            Some(pid) if pid == self.pid => {
                debug!(pid, path = %self.path.display(), "lock acquired");
                Ok(LockOutcome::Acquired(InstanceGuard {
                    path:     self.path.clone(),
                    pid:      self.pid,
                    released: false,
                }))
            }
            Some(pid) => Ok(LockOutcome::HeldByOther(pid)),
            None => {
                warn!(path = %self.path.display(), "lock file unreadable after create");
                Ok(LockOutcome::HeldByOther(0))
            }
        }
    }

    /// Per-process sibling of the lock file, e.g. `alert.lock.new.1234`.
    fn side_path(&self, tag: &str) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(format!(".{}.{}", tag, self.pid));
        self.path.with_file_name(name)
    }

    fn discard(&self, side: &Path) {
        match fs::remove_file(side) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => debug!(path = %side.display(), error = %e, "cannot remove lock side file"),
        }
    }

    fn io_error(&self, source: std::io::Error) -> NotifyError {
        NotifyError::Lock { path: self.path.clone(), source }
    }
}

fn write_pid(path: &Path, pid: u32) -> std::io::Result<()> {
    let mut file = OpenOptions::new().write(true).create(true).truncate(true).open(path)?;
    writeln!(file, "{}", pid)?;
    file.sync_all()
}

/// Held lock; removes the file when released or dropped.
#[derive(Debug)]
pub struct InstanceGuard {
    path:     PathBuf,
    pid:      u32,
    released: bool,
}

impl InstanceGuard {
    pub fn release(mut self) {
        self.remove();
    }

    fn remove(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        let still_ours = fs::read_to_string(&self.path)
            .ok()
            .and_then(|t| t.trim().parse::<u32>().ok())
            == Some(self.pid);
        if !still_ours {
            warn!(path = %self.path.display(), "lock no longer records our pid, leaving it");
            return;
        }
        match fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "lock released"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "failed to remove lock"),
        }
    }
}

impl Drop for InstanceGuard {
    fn drop(&mut self) {
        self.remove();
    }
}

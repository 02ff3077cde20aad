use crate::error::NotifyError;
use nix::unistd::{getegid, geteuid, setegid, seteuid, Gid, Uid};
use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, error};

/// The effective uid/gid are process-wide; only one impersonation at a time.
static IMPERSONATION: Mutex<()> = Mutex::new(());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub uid: u32,
    pub gid: u32,
}

impl Identity {
    /// Owner of `path`, used to find the user behind an X authority file.
    pub fn of_file(path: &Path) -> Result<Self, NotifyError> {
        let meta = fs::metadata(path).map_err(|source| NotifyError::Authority {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self { uid: meta.uid(), gid: meta.gid() })
    }

    pub fn current_effective() -> Self {
        Self { uid: geteuid().as_raw(), gid: getegid().as_raw() }
    }
}

/// Restores the saved effective ids, user first then group.
struct Restore {
    saved: Identity,
}

impl Drop for Restore {
    fn drop(&mut self) {
        if let Err(e) = seteuid(Uid::from_raw(self.saved.uid)) {
            error!(uid = self.saved.uid, error = %e, "failed to restore effective uid");
        }
        if let Err(e) = setegid(Gid::from_raw(self.saved.gid)) {
            error!(gid = self.saved.gid, error = %e, "failed to restore effective gid");
        }
        debug!(uid = self.saved.uid, gid = self.saved.gid, "identity restored");
    }
}

/// Run `f` with the effective group then user switched to `target`.
///
/// The caller's effective identity is back in place when this returns,
/// whether `f` succeeded, failed or panicked.
pub fn with_identity<T>(target: Identity, f: impl FnOnce() -> T) -> Result<T, NotifyError> {
    let _critical = IMPERSONATION.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

    let saved = Identity::current_effective();
    if saved == target {
        return Ok(f());
    }

    let fail = |source| NotifyError::Privilege { uid: target.uid, gid: target.gid, source };

    setegid(Gid::from_raw(target.gid)).map_err(fail)?;
    if let Err(e) = seteuid(Uid::from_raw(target.uid)) {
        if let Err(undo) = setegid(Gid::from_raw(saved.gid)) {
            error!(gid = saved.gid, error = %undo, "failed to restore effective gid");
        }
        return Err(fail(e));
    }
    debug!(uid = target.uid, gid = target.gid, "identity assumed");

    let _restore = Restore { saved };
    Ok(f())
}

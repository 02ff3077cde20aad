use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

const SOCKET_PREFIX: &str = "socket:";
const NULL_DEVICE:   &str = "/dev/null";

/// One graphical login, identified by its display and X authority file.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct DisplaySession {
    pub display:   String,
    pub authority: PathBuf,
}

impl DisplaySession {
    pub fn new(display: &str, authority: impl Into<PathBuf>) -> Self {
        Self { display: canonicalize_display(display), authority: authority.into() }
    }
}

/// Append the default screen (".0") when the display has none.
///
/// The screen suffix is a `.` after the last `:`; ":0" and ":0.0" name the
/// same screen and must collapse to one session.
pub fn canonicalize_display(display: &str) -> String {
    let host_end = display.rfind(':').unwrap_or(0);
    if display[host_end..].contains('.') {
        display.to_string()
    } else {
        format!("{}.0", display)
    }
}

/// A controlling terminal worth writing to.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct TerminalTarget(PathBuf);

impl TerminalTarget {
    /// Returns None for sockets and the null device.
    pub fn from_link_target(target: &Path) -> Option<Self> {
        let text = target.to_string_lossy();
        if text.starts_with(SOCKET_PREFIX) || text == NULL_DEVICE {
            return None;
        }
        Some(Self(target.to_path_buf()))
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}

/// Everything one discovery pass found to alert.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Targets {
    pub displays:  BTreeSet<DisplaySession>,
    pub terminals: BTreeSet<TerminalTarget>,
}

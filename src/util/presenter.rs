use crate::alerts::{AlertPresenter, PresentOutcome};
use crate::error::NotifyError;
use crate::models::session::DisplaySession;
use crate::sessions::{AUTHORITY_VAR, DISPLAY_VAR};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const POLL:  Duration = Duration::from_millis(200);
/// Headroom for helpers that enforce the timeout themselves.
const GRACE: Duration = Duration::from_secs(5);

/// Shows the alert by running an external dialog helper (xmessage by default)
/// against the session's display.
#[derive(Debug, Clone)]
pub struct CommandPresenter {
    pub program: String,
    /// `{message}` and `{timeout}` (whole seconds) are substituted per call.
    pub args:    Vec<String>,
}

impl CommandPresenter {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self { program: program.into(), args }
    }

    fn build_args(&self, text: &str, timeout: Duration) -> Vec<String> {
        let secs = timeout.as_secs().to_string();
        self.args
            .iter()
            .map(|a| a.replace("{timeout}", &secs).replace("{message}", text))
            .collect()
    }

    /// Wait for the helper, closing it once `timeout` plus a grace period
    /// has passed. A helper that exits on its own after `timeout` (its own
    /// timer fired) also counts as timed out.
    fn wait_bounded(&self, child: &mut Child, timeout: Duration) -> Result<PresentOutcome, NotifyError> {
        let start = Instant::now();
        let deadline = timeout + GRACE;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    let waited = start.elapsed();
                    debug!(program = %self.program, %status, waited_ms = waited.as_millis() as u64, "alert helper exited");
                    return Ok(if waited >= timeout { PresentOutcome::TimedOut } else { PresentOutcome::Acknowledged });
                }
                Ok(None) if start.elapsed() >= deadline => break,
                Ok(None) => std::thread::sleep(POLL),
                Err(source) => {
                    return Err(NotifyError::Presenter { program: self.program.clone(), source });
                }
            }
        }

        warn!(program = %self.program, pid = child.id(), "alert not dismissed in time, closing it");
        match i32::try_from(child.id()) {
            Ok(raw) => {
                if let Err(e) = kill(Pid::from_raw(raw), Signal::SIGTERM) {
                    debug!(program = %self.program, pid = raw, error = %e, "SIGTERM failed");
                }
            }
            Err(_) => debug!(program = %self.program, pid = child.id(), "pid out of range, skipping SIGTERM"),
        }
        let term_sent = Instant::now();
        while term_sent.elapsed() < GRACE {
            if let Ok(Some(_)) = child.try_wait() {
                return Ok(PresentOutcome::TimedOut);
            }
            std::thread::sleep(POLL);
        }
        if let Err(e) = child.kill() {
            debug!(program = %self.program, error = %e, "kill failed");
        }
        if let Err(e) = child.wait() {
            debug!(program = %self.program, error = %e, "reaping helper failed");
        }
        Ok(PresentOutcome::TimedOut)
    }
}

impl Default for CommandPresenter {
    fn default() -> Self {
        Self::new(
            "xmessage",
            ["-center", "-buttons", "OK:0", "-timeout", "{timeout}", "{message}"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        )
    }
}

impl AlertPresenter for CommandPresenter {
    fn present(&self, session: &DisplaySession, text: &str, timeout: Duration) -> Result<PresentOutcome, NotifyError> {
        let mut child = Command::new(&self.program)
            .args(self.build_args(text, timeout))
            .env(DISPLAY_VAR, &session.display)
            .env(AUTHORITY_VAR, &session.authority)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .spawn()
            .map_err(|source| NotifyError::Presenter { program: self.program.clone(), source })?;

        debug!(program = %self.program, pid = child.id(), display = %session.display, "alert helper started");
        self.wait_bounded(&mut child, timeout)
    }
}

use crate::error::NotifyError;
use crate::models::session::{DisplaySession, TerminalTarget};
use crate::util::instance_lock::{InstanceLock, LockOutcome, PeerProbe};
use crate::util::privilege::{self, Identity};
use std::fs::OpenOptions;
use std::io::Write;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_TERMINAL_TEMPLATE: &str = "Battery is low ({minutes} mins to go)";
pub const DEFAULT_DIALOG_TEMPLATE:   &str = "Battery getting low {minutes} mins left";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertMessage {
    pub minutes_left: u32,
}

impl AlertMessage {
    /// Fill `{minutes}` in a message template.
    pub fn render(&self, template: &str) -> String {
        template.replace("{minutes}", &self.minutes_left.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    Acknowledged,
    TimedOut,
}

/// Something that can put a modal alert on a display and wait for it.
pub trait AlertPresenter {
    /// Blocks until the alert is dismissed or `timeout` elapses.
    fn present(&self, session: &DisplaySession, text: &str, timeout: Duration) -> Result<PresentOutcome, NotifyError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub failed:    usize,
    pub skipped:   usize,
}

impl DeliveryReport {
    pub fn merge(self, other: DeliveryReport) -> DeliveryReport {
        DeliveryReport {
            delivered: self.delivered + other.delivered,
            failed:    self.failed    + other.failed,
            skipped:   self.skipped   + other.skipped,
        }
    }
}

/// Write one line to every terminal. A closed terminal only costs itself.
pub fn alert_terminals<'a, I>(terminals: I, text: &str) -> DeliveryReport
where
    I: IntoIterator<Item = &'a TerminalTarget>,
{
    let mut report = DeliveryReport::default();
    for term in terminals {
        let written = OpenOptions::new()
            .append(true)
            .open(term.path())
            .and_then(|mut f| writeln!(f, "{}", text));
        match written {
            Ok(()) => {
                debug!(terminal = %term.path().display(), "terminal alerted");
                report.delivered += 1;
            }
            Err(e) => {
                warn!(terminal = %term.path().display(), error = %e, "cannot write to terminal");
                report.failed += 1;
            }
        }
    }
    report
}

/// Show the dialog on each display as the user owning its authority file.
///
/// Sessions are handled one after another; each privilege switch is closed
/// before the next one opens.
pub fn alert_displays<'a, I, A>(displays: I, text: &str, presenter: &A, timeout: Duration) -> DeliveryReport
where
    I: IntoIterator<Item = &'a DisplaySession>,
    A: AlertPresenter + ?Sized,
{
    let mut report = DeliveryReport::default();
    for session in displays {
        let owner = match Identity::of_file(&session.authority) {
            Ok(id) => id,
            Err(e) => {
                warn!(display = %session.display, error = %e, "skipping display");
                report.skipped += 1;
                continue;
            }
        };

        let shown = privilege::with_identity(owner, || presenter.present(session, text, timeout));
        match shown {
            Ok(Ok(outcome)) => {
                debug!(display = %session.display, uid = owner.uid, ?outcome, "display alerted");
                report.delivered += 1;
            }
            Ok(Err(e)) | Err(e) => {
                warn!(display = %session.display, uid = owner.uid, error = %e, "display alert failed");
                report.failed += 1;
            }
        }
    }
    report
}

/// Graphical phase under the single-instance lock.
///
/// Returns None when another notifier already has dialogs up.
pub fn alert_displays_exclusive<'a, I, A, P>(
    lock: &InstanceLock<P>,
    displays: I,
    text: &str,
    presenter: &A,
    timeout: Duration,
) -> Result<Option<DeliveryReport>, NotifyError>
where
    I: IntoIterator<Item = &'a DisplaySession>,
    A: AlertPresenter + ?Sized,
    P: PeerProbe,
{
    let guard = match lock.acquire()? {
        LockOutcome::Acquired(guard) => guard,
        LockOutcome::HeldByOther(pid) => {
            info!(pid, "another notifier is showing alerts, skipping displays");
            return Ok(None);
        }
    };
    let report = alert_displays(displays, text, presenter, timeout);
    guard.release();
    Ok(Some(report))
}

use crate::collectors::procfs::ProcFs;
use crate::models::process::ProcessRecord;
use crate::models::session::{DisplaySession, TerminalTarget, Targets};
use tracing::debug;

pub const DISPLAY_VAR:   &str = "DISPLAY";
pub const AUTHORITY_VAR: &str = "XAUTHORITY";

/// Fold process records into the displays and terminals to alert.
///
/// A display is only recorded when the same process carries both the
/// display and its authority file. Sessions of different users that share
/// an identical pair collapse into one entry.
pub fn resolve<'a, I>(records: I) -> Targets
where
    I: IntoIterator<Item = &'a ProcessRecord>,
{
    let mut targets = Targets::default();

    for rec in records {
        let disp = rec.env_value(DISPLAY_VAR).filter(|v| !v.is_empty());
        let auth = rec.env_value(AUTHORITY_VAR).filter(|v| !v.is_empty());
        if let (Some(disp), Some(auth)) = (disp, auth) {
            if targets.displays.insert(DisplaySession::new(disp, auth)) {
                debug!(pid = rec.pid, uid = rec.owner_uid, display = %disp, authority = %auth, "found display session");
            }
        }

        if let Some(term) = rec.stderr_target.as_deref().and_then(TerminalTarget::from_link_target) {
            targets.terminals.insert(term);
        }
    }

    targets
}

/// Scan the process table and resolve it in one go.
pub fn discover(procfs: &ProcFs) -> Targets {
    let records = procfs.scan();
    let targets = resolve(&records);
    debug!(
        processes = records.len(),
        displays  = targets.displays.len(),
        terminals = targets.terminals.len(),
        "discovery finished"
    );
    targets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::procfs::tests::fake_process;
    use std::path::{Path, PathBuf};

    fn rec(pid: u32, env: &[&str], stderr: Option<&str>) -> ProcessRecord {
        ProcessRecord {
            pid,
            owner_uid: 1000,
            environment: env.iter().map(|s| s.to_string()).collect(),
            stderr_target: stderr.map(PathBuf::from),
        }
    }

    #[test]
    fn display_and_terminal_from_separate_processes() {
        let records = vec![
            rec(10, &["DISPLAY=:1", "XAUTHORITY=/home/u/.Xauth"], None),
            rec(11, &["HOME=/home/u"], Some("/dev/pts/3")),
        ];
        let targets = resolve(&records);

        let displays: Vec<_> = targets.displays.into_iter().collect();
        assert_eq!(displays, vec![DisplaySession {
            display:   ":1.0".into(),
            authority: "/home/u/.Xauth".into(),
        }]);
        let terminals: Vec<_> = targets.terminals.iter().map(|t| t.path().to_path_buf()).collect();
        assert_eq!(terminals, vec![PathBuf::from("/dev/pts/3")]);
    }

    #[test]
    fn display_without_authority_is_ignored() {
        let records = vec![rec(20, &["DISPLAY=:0"], Some("/dev/null"))];
        let targets = resolve(&records);
        assert!(targets.displays.is_empty());
        assert!(targets.terminals.is_empty());
    }

    #[test]
    fn authority_without_display_is_ignored() {
        let records = vec![rec(21, &["XAUTHORITY=/home/u/.Xauth"], None)];
        assert!(resolve(&records).displays.is_empty());
    }

    #[test]
    fn empty_values_count_as_absent() {
        let records = vec![rec(22, &["DISPLAY=", "XAUTHORITY=/home/u/.Xauth"], None)];
        assert!(resolve(&records).displays.is_empty());
    }

    #[test]
    fn same_session_from_many_processes_collapses() {
        let records = vec![
            rec(30, &["DISPLAY=:0", "XAUTHORITY=/home/u/.Xauthority"], Some("/dev/pts/1")),
            rec(31, &["XAUTHORITY=/home/u/.Xauthority", "DISPLAY=:0.0"], Some("/dev/pts/1")),
            rec(32, &["DISPLAY=:0", "XAUTHORITY=/home/u/.Xauthority"], Some("socket:[991]")),
        ];
        let targets = resolve(&records);
        assert_eq!(targets.displays.len(), 1);
        assert_eq!(targets.terminals.len(), 1);
    }

    #[test]
    fn excluded_terminals_never_appear_in_any_order() {
        let mut records = vec![
            rec(1, &[], Some("/dev/null")),
            rec(2, &[], Some("socket:[1]")),
            rec(3, &[], Some("/dev/pts/0")),
            rec(4, &[], Some("/dev/tty2")),
        ];
        for _ in 0..records.len() {
            records.rotate_left(1);
            let targets = resolve(&records);
            let paths: Vec<&Path> = targets.terminals.iter().map(|t| t.path()).collect();
            assert_eq!(paths, vec![Path::new("/dev/pts/0"), Path::new("/dev/tty2")]);
        }
        records.reverse();
        assert_eq!(resolve(&records).terminals.len(), 2);
    }

    #[test]
    fn discover_reads_fake_process_table() {
        let tmp = tempfile::tempdir().unwrap();
        fake_process(tmp.path(), 300, &["DISPLAY=:1", "XAUTHORITY=/home/u/.Xauth"], Some("/dev/null"));
        fake_process(tmp.path(), 301, &["TERM=xterm"], Some("/dev/pts/3"));
        fake_process(tmp.path(), 302, &["DISPLAY=:2"], Some("socket:[77]"));

        let targets = discover(&ProcFs::new(tmp.path()));
        assert_eq!(targets.displays.len(), 1);
        assert!(targets.displays.contains(&DisplaySession::new(":1", "/home/u/.Xauth")));
        assert_eq!(targets.terminals.len(), 1);
        assert!(targets.terminals.iter().any(|t| t.path() == Path::new("/dev/pts/3")));
    }
}

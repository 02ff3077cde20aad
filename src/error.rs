use std::path::PathBuf;
use thiserror::Error;

/// Failures raised while delivering an alert or coordinating with peers.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("cannot read authority file {path}: {source}")]
    Authority {
        path:   PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot switch to uid {uid} / gid {gid}: {source}")]
    Privilege {
        uid:    u32,
        gid:    u32,
        #[source]
        source: nix::Error,
    },

    #[error("alert helper `{program}` failed: {source}")]
    Presenter {
        program: String,
        #[source]
        source:  std::io::Error,
    },

    #[error("lock file {path}: {source}")]
    Lock {
        path:   PathBuf,
        #[source]
        source: std::io::Error,
    },
}

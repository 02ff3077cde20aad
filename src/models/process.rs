use std::path::PathBuf;

/// Best-effort view of one live process, rebuilt on every discovery pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessRecord {
    pub pid:           u32,
    /// Owner of the /proc/<pid> directory.
    pub owner_uid:     u32,
    /// Raw `KEY=VALUE` entries in the order the kernel reports them.
    pub environment:   Vec<String>,
    /// Where fd 2 points, unfiltered.
    pub stderr_target: Option<PathBuf>,
}

impl ProcessRecord {
    /// Value of the first `key=` entry, if any.
    pub fn env_value(&self, key: &str) -> Option<&str> {
        self.environment.iter().find_map(|entry| {
            entry.strip_prefix(key).and_then(|rest| rest.strip_prefix('='))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(env: &[&str]) -> ProcessRecord {
        ProcessRecord {
            pid: 1,
            environment: env.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn env_value_matches_whole_key() {
        let rec = record(&["DISPLAYX=:9", "DISPLAY=:1", "DISPLAY=:2"]);
        assert_eq!(rec.env_value("DISPLAY"), Some(":1"));
        assert_eq!(rec.env_value("XAUTHORITY"), None);
    }

    #[test]
    fn env_value_keeps_equals_in_value() {
        let rec = record(&["OPTS=a=b"]);
        assert_eq!(rec.env_value("OPTS"), Some("a=b"));
    }
}

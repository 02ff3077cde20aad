use crate::alerts::{DEFAULT_DIALOG_TEMPLATE, DEFAULT_TERMINAL_TEMPLATE};
use crate::util::presenter::CommandPresenter;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub presenter: PresenterConfig,

    #[serde(default)]
    pub messages: MessagesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Mount point of the proc filesystem to scan for sessions
    pub proc_root: PathBuf,
    /// Single-instance lock for the dialog phase
    pub lock_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenterConfig {
    /// Dialog helper run against each display (xmessage, zenity, ...)
    pub program: String,
    /// Arguments; `{message}` and `{timeout}` are substituted
    pub args: Vec<String>,
    /// Dismiss a dialog nobody answered after this many seconds
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MessagesConfig {
    /// Line written to terminals; `{minutes}` is substituted
    pub terminal: String,
    /// Dialog text; `{minutes}` is substituted
    pub dialog: String,
}

// ── Defaults ─────────────────────────────────────────────────────────

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            proc_root: PathBuf::from("/proc"),
            lock_path: PathBuf::from("/var/cache/batt_checker/alert.lock"),
        }
    }
}

impl Default for PresenterConfig {
    fn default() -> Self {
        let helper = CommandPresenter::default();
        Self { program: helper.program, args: helper.args, timeout_secs: 300 }
    }
}

impl Default for MessagesConfig {
    fn default() -> Self {
        Self {
            terminal: DEFAULT_TERMINAL_TEMPLATE.into(),
            dialog:   DEFAULT_DIALOG_TEMPLATE.into(),
        }
    }
}

impl PresenterConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    pub fn build(&self) -> CommandPresenter {
        CommandPresenter::new(self.program.clone(), self.args.clone())
    }
}

// ── Load / Save ───────────────────────────────────────────────────────

impl Config {
    /// Load from `explicit` or the per-user config path.
    ///
    /// A missing default file is created with defaults (best-effort); a file
    /// that fails to parse is reported and defaults are used.
    pub fn load(explicit: Option<&Path>) -> Self {
        let path = match explicit.map(Path::to_path_buf).or_else(Config::config_path) {
            Some(p) => p,
            None    => return Config::default(),
        };
        match try_load(&path) {
            Ok(c)  => c,
            Err(e) if explicit.is_none() && !path.exists() => {
                debug!(path = %path.display(), error = %e, "no config file, writing defaults");
                let _ = try_write_defaults(&path);
                Config::default()
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring unusable config");
                Config::default()
            }
        }
    }

    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("batt-notify").join("batt-notify.toml"))
    }
}

fn try_load(path: &Path) -> Result<Config> {
    let text = fs::read_to_string(path)?;
    let cfg: Config = toml::from_str(&text)?;
    Ok(cfg)
}

fn try_write_defaults(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let text = toml::to_string_pretty(&Config::default())?;
    fs::write(path, format!("# batt-notify configuration\n# Generated on first run, edit freely\n\n{}", text))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_other_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("batt-notify.toml");
        fs::write(&path, "[presenter]\nprogram = \"zenity\"\nargs = [\"--info\", \"--text={message}\"]\n").unwrap();

        let cfg = Config::load(Some(&path));
        assert_eq!(cfg.presenter.program, "zenity");
        assert_eq!(cfg.presenter.timeout_secs, 300);
        assert_eq!(cfg.general.proc_root, PathBuf::from("/proc"));
        assert_eq!(cfg.messages.terminal, DEFAULT_TERMINAL_TEMPLATE);
    }

    #[test]
    fn broken_file_falls_back_to_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("batt-notify.toml");
        fs::write(&path, "[general\nlock_path = ").unwrap();

        let cfg = Config::load(Some(&path));
        assert_eq!(cfg.general.lock_path, GeneralConfig::default().lock_path);
        assert_eq!(fs::read_to_string(&path).unwrap(), "[general\nlock_path = ");
    }

    #[test]
    fn defaults_survive_toml_round_trip() {
        let text = toml::to_string_pretty(&Config::default()).unwrap();
        let back: Config = toml::from_str(&text).unwrap();
        assert_eq!(back.presenter.args, PresenterConfig::default().args);
        assert_eq!(back.presenter.timeout(), Duration::from_secs(300));
    }

    #[test]
    fn zero_timeout_is_clamped() {
        let cfg = PresenterConfig { timeout_secs: 0, ..Default::default() };
        assert_eq!(cfg.timeout(), Duration::from_secs(1));
    }
}

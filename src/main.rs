mod alerts;
mod collectors;
mod config;
mod error;
mod models;
mod sessions;
mod util;

use alerts::AlertMessage;
use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::Shell;
use collectors::procfs::ProcFs;
use config::Config;
use std::path::PathBuf;
use tracing::{info, warn, Level};
use util::instance_lock::InstanceLock;

#[derive(Parser, Debug)]
#[command(name = "batt-notify", about = "Warn every logged-in session that the battery is low", version = "0.1")]
struct Cli {
    /// Minutes of battery left
    #[arg(required_unless_present_any = ["list", "print_config", "completions"])]
    minutes: Option<u32>,

    /// Enable debug output
    #[arg(short, long)]
    debug: bool,

    /// Use this config file instead of the per-user one
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Alert terminals only; never show dialogs
    #[arg(long)]
    terminals_only: bool,

    /// Print the discovered displays and terminals as JSON and exit
    #[arg(long)]
    list: bool,

    /// Print config file path and current values, then exit
    #[arg(long)]
    print_config: bool,

    /// Print a shell completion script and exit
    #[arg(long, value_name = "SHELL")]
    completions: Option<Shell>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug);

    if let Some(shell) = cli.completions {
        clap_complete::generate(shell, &mut Cli::command(), "batt-notify", &mut std::io::stdout());
        return Ok(());
    }

    let cfg = Config::load(cli.config.as_deref());
    if cli.print_config {
        return run_print_config(&cfg, cli.config.clone());
    }
    if cli.list {
        return run_list(&cfg);
    }

    match cli.minutes {
        Some(minutes) => run_notify(&cfg, AlertMessage { minutes_left: minutes }, cli.terminals_only),
        None          => Ok(()),
    }
}

fn init_logging(debug: bool) {
    let level = if debug { Level::DEBUG } else { Level::WARN };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run_notify(cfg: &Config, msg: AlertMessage, terminals_only: bool) -> Result<()> {
    let procfs  = ProcFs::new(&cfg.general.proc_root);
    let targets = sessions::discover(&procfs);

    let mut report = alerts::alert_terminals(&targets.terminals, &msg.render(&cfg.messages.terminal));

    if !terminals_only && !targets.displays.is_empty() {
        let lock = InstanceLock::for_current_process(&cfg.general.lock_path, procfs.clone());
        let presenter = cfg.presenter.build();
        let shown = alerts::alert_displays_exclusive(
            &lock,
            &targets.displays,
            &msg.render(&cfg.messages.dialog),
            &presenter,
            cfg.presenter.timeout(),
        );
        match shown {
            Ok(Some(r)) => report = report.merge(r),
            Ok(None)    => {}
            Err(e)      => warn!(error = %e, "dialog phase skipped"),
        }
    }

    info!(
        minutes   = msg.minutes_left,
        delivered = report.delivered,
        failed    = report.failed,
        skipped   = report.skipped,
        "alert run finished"
    );
    Ok(())
}

fn run_list(cfg: &Config) -> Result<()> {
    use serde_json::json;

    let targets = sessions::discover(&ProcFs::new(&cfg.general.proc_root));
    let snapshot = json!({
        "timestamp": chrono::Local::now().to_rfc3339(),
        "displays":  targets.displays,
        "terminals": targets.terminals,
    });
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

fn run_print_config(cfg: &Config, explicit: Option<PathBuf>) -> Result<()> {
    let path = explicit
        .or_else(Config::config_path)
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|| "(unknown)".to_string());
    println!("Config: {}", path);
    println!();
    println!("[general]");
    println!("  proc_root    = {}", cfg.general.proc_root.display());
    println!("  lock_path    = {}", cfg.general.lock_path.display());
    println!();
    println!("[presenter]");
    println!("  program      = {}", cfg.presenter.program);
    println!("  args         = {:?}", cfg.presenter.args);
    println!("  timeout_secs = {}", cfg.presenter.timeout_secs);
    println!();
    println!("[messages]");
    println!("  terminal     = {:?}", cfg.messages.terminal);
    println!("  dialog       = {:?}", cfg.messages.dialog);
    Ok(())
}

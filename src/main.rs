// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use downwatch::colors::{self, symbols};
use downwatch::config::{self, Config, ConfigOverrides};
use downwatch::error::describe;
use downwatch::logging::{self, Verbosity};
use downwatch::monitor::DownloadMonitor;
use downwatch::notify::{format_title_line, ConsoleNotifier, StatusNotifier};
use downwatch::orchestrator::{detectors_from_config, is_config_error, Orchestrator};
use downwatch::WatchError;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Exit codes following sysexits.h conventions
mod exit_codes {
    /// Success - session completed or was cancelled by the user
    pub const SUCCESS: i32 = 0;
    /// General error - unspecified error
    pub const ERROR: i32 = 1;
    /// Service unavailable - no launcher could be found
    pub const SERVICE_UNAVAILABLE: i32 = 69;
    /// Configuration error - invalid or unreadable config
    pub const CONFIG: i32 = 78;
}

use exit_codes::*;

/// downwatch - shut down once your game downloads finish.
#[derive(Parser)]
#[command(name = "downwatch")]
#[command(version = VERSION)]
#[command(about = "Shut the machine down once game downloads and installs finish.")]
#[command(long_about = "downwatch - download watcher\n\n\
    Watch and shut down:   downwatch\n\
    Rehearse safely:       downwatch --dry-run\n\
    What is downloading:   downwatch status\n\
    Configure:             downwatch config show\n\n\
    Press Ctrl+C at any time to stop; a pending shutdown is cancelled.")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log what would happen instead of shutting down
    #[arg(long, global = true)]
    dry_run: bool,

    /// Verification window after downloads go idle (seconds)
    #[arg(long, value_name = "SECS", global = true)]
    delay: Option<u64>,

    /// Seconds between polls
    #[arg(long, value_name = "SECS", global = true)]
    interval: Option<u64>,

    /// Consecutive idle polls required before shutdown
    #[arg(long, value_name = "N", global = true)]
    checks: Option<u32>,

    /// Delay handed to the OS shutdown command (seconds)
    #[arg(long, value_name = "SECS", global = true)]
    shutdown_delay: Option<u64>,

    /// Steam install folder
    #[arg(long, value_name = "DIR", global = true)]
    steam_path: Option<PathBuf>,

    /// Epic Games Launcher data folder
    #[arg(long, value_name = "DIR", global = true)]
    epic_path: Option<PathBuf>,

    /// Do not watch Steam
    #[arg(long, global = true)]
    no_steam: bool,

    /// Do not watch the Epic Games Launcher
    #[arg(long, global = true)]
    no_epic: bool,

    /// Config file (default: ~/.downwatch/config.json)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Quiet mode: only warnings, errors and the final outcome
    #[arg(short = 'q', long, global = true)]
    quiet: bool,

    /// Verbose mode: detailed output for debugging
    #[arg(short = 'v', long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch downloads and shut down when they finish (default)
    Run,

    /// Show what is downloading right now and exit
    #[command(alias = "s")]
    Status,

    /// Show configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration as JSON
    Show,
    /// Print the config file location
    Path,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            verification_delay_secs: self.delay,
            polling_interval_secs: self.interval,
            required_idle_checks: self.checks,
            shutdown_delay_secs: self.shutdown_delay,
            dry_run: self.dry_run,
            steam_path: self.steam_path.clone(),
            epic_path: self.epic_path.clone(),
            no_steam: self.no_steam,
            no_epic: self.no_epic,
        }
    }

    fn config_path(&self) -> Result<PathBuf> {
        match &self.config {
            Some(path) => Ok(path.clone()),
            None => config::default_config_path().context("Could not locate the config file"),
        }
    }
}

fn load_effective_config(cli: &Cli) -> Result<Config, WatchError> {
    let path = match &cli.config {
        Some(path) => path.clone(),
        None => config::default_config_path()?,
    };
    let mut config = config::load_config_from(&path)?;
    config.apply_overrides(&cli.overrides());
    Ok(config)
}

fn exit_code_for(error: &WatchError) -> i32 {
    if is_config_error(error) {
        CONFIG
    } else if matches!(error, WatchError::NoLaunchers) {
        SERVICE_UNAVAILABLE
    } else {
        ERROR
    }
}

fn fail(error: &WatchError) -> ! {
    eprintln!("{}", describe(error));
    std::process::exit(exit_code_for(error));
}

fn handle_config(cli: &Cli, command: Option<&ConfigCommands>) -> Result<()> {
    match command {
        None | Some(ConfigCommands::Show) => {
            let config = load_effective_config(cli).unwrap_or_else(|e| fail(&e));
            let json = serde_json::to_string_pretty(&config).context("Failed to serialize config")?;
            println!("{}", json);
        }
        Some(ConfigCommands::Path) => {
            println!("{}", cli.config_path()?.display());
        }
    }
    Ok(())
}

fn show_status(config: Config) -> Result<()> {
    let notifier: Arc<dyn StatusNotifier> = Arc::new(ConsoleNotifier::new(true));
    let mut monitor = DownloadMonitor::new(detectors_from_config(&config), notifier, config.polling_interval());
    if let Err(e) = monitor.initialize_detectors() {
        fail(&e);
    }

    let titles = monitor.fetch_active();
    let launchers = monitor.active_launchers().join(", ");
    if titles.is_empty() {
        println!("{} Nothing downloading ({})", symbols::SUCCESS.green(), launchers);
        return Ok(());
    }

    println!("{} {} ({})", symbols::INFO.cyan(), "Active downloads".bold(), launchers);
    println!("{}", colors::separator(72));
    for status in &titles {
        println!("{}", format_title_line(status));
    }
    Ok(())
}

async fn run_session(config: Config, quiet: bool) -> Result<()> {
    let notifier: Arc<dyn StatusNotifier> = Arc::new(ConsoleNotifier::new(quiet));
    if config.dry_run {
        notifier.status("Dry run: no shutdown will be scheduled");
    }

    let mut orchestrator = Orchestrator::from_config(config, notifier);
    let token = CancellationToken::new();

    let handle = orchestrator.interrupt_handle(token.clone());
    ctrlc::set_handler(move || handle.interrupt()).context("Failed to install Ctrl+C handler")?;

    if let Err(e) = orchestrator.monitor_and_shutdown(token).await {
        fail(&e);
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Err(e) = logging::init(Verbosity::from_flags(cli.quiet, cli.verbose)) {
        eprintln!("{} Failed to initialize logging: {}", symbols::WARNING.yellow(), e);
    }

    if let Some(Commands::Config { command }) = &cli.command {
        return handle_config(&cli, command.as_ref());
    }

    // Configuration errors are reported before any monitoring starts
    let config = load_effective_config(&cli).unwrap_or_else(|e| fail(&e));
    if let Err(e) = config.validate() {
        fail(&e);
    }

    if let Some(Commands::Status) = cli.command {
        show_status(config)?;
        return Ok(());
    }

    let runtime = tokio::runtime::Runtime::new().expect("Failed to create Tokio runtime");
    runtime.block_on(run_session(config, cli.quiet))?;

    std::process::exit(SUCCESS);
}

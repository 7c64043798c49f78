use browser_backup::backup::backup_config::{BackupConfig, DEFAULT_CONFIG_PATH};
use browser_backup::backup::catalog::{CatalogEnv, PathCatalog, Platform};
use browser_backup::backup::logging::{setup_logging, ConsoleTarget, LogHandle};
use browser_backup::backup::restore::{instance_applications, list_instances};
use browser_backup::backup::result_error::result::Result;
use browser_backup::backup::retention::RetentionSweeper;
use browser_backup::backup::run::{BackupRun, RestoreRun};
use browser_backup::backup::selector::DataCategory;
use browser_backup::backup::validate::validate_application_id;
use chrono::Local;
use clap::{ArgAction, Parser, Subcommand};
use itertools::Itertools;
use std::path::PathBuf;
use std::process::exit;
use tracing::{error, info, warn};

/// Back up and restore browser profiles
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Location of config file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
    /// Directory holding the timestamped backup instances
    #[arg(short, long, default_value = "backups")]
    backup_root: PathBuf,
    /// Directory for the per-run log files
    #[arg(short, long, default_value = "logs")]
    log_dir: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Back up every enabled browser found on this machine
    Backup {
        /// Only back up these data categories (repeatable). Default: as configured
        #[arg(long = "only", value_parser = parse_category)]
        only: Vec<DataCategory>,
    },
    /// Restore a backup instance into the live browser directories
    Restore {
        /// Backup instance directory. Default: the newest one
        #[arg(short, long)]
        instance: Option<PathBuf>,
        /// Only restore these applications (repeatable). Default: all
        #[arg(long = "app", value_parser = parse_application_id)]
        apps: Vec<String>,
    },
    /// List backup instances, newest first
    List,
    /// Delete backup instances older than the retention period
    Sweep,
    /// Inspect or edit the configuration file
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Print the effective configuration
    Show,
    /// Write the default configuration file, replacing any existing one
    Init,
    /// Enable or disable one browser
    SetApp {
        #[arg(value_parser = parse_application_id)]
        id: String,
        #[arg(action = ArgAction::Set)]
        enabled: bool,
    },
    /// Enable or disable one data category
    SetCategory {
        #[arg(value_parser = parse_category)]
        category: DataCategory,
        #[arg(action = ArgAction::Set)]
        enabled: bool,
    },
    /// Enable every data category
    AllCategories,
    /// Number of applications backed up in parallel
    SetWorkers { workers: usize },
    /// Verify every copied file with SHA-256
    SetVerify {
        #[arg(action = ArgAction::Set)]
        enabled: bool,
    },
    /// Days a backup instance is kept before being swept
    SetRetention { days: u32 },
    /// Edit the excluded path substrings
    #[command(subcommand)]
    Exclude(ExcludeCommand),
}

#[derive(Subcommand, Debug)]
enum ExcludeCommand {
    /// Skip files whose path contains this substring
    Add { pattern: String },
    /// Stop skipping files for this substring
    Remove { pattern: String },
}

fn parse_category(s: &str) -> std::result::Result<DataCategory, String> {
    DataCategory::parse(s).ok_or_else(|| {
        format!(
            "unknown category {s:?}, expected one of: {}",
            DataCategory::ALL.iter().join(", ")
        )
    })
}

fn parse_application_id(s: &str) -> std::result::Result<String, String> {
    validate_application_id(s)
        .map(|_| s.to_string())
        .map_err(|e| e.to_string())
}

fn log_prefix(command: &Command) -> &'static str {
    match command {
        Command::Backup { .. } | Command::Sweep | Command::List => "browser_backup",
        Command::Restore { .. } => "browser_restore",
        Command::Config(_) => "settings_manager",
    }
}

/// Commands whose stdout is meant to be read or piped keep it free of logs.
fn console_target(command: &Command) -> ConsoleTarget {
    match command {
        Command::List | Command::Config(_) => ConsoleTarget::Stderr,
        Command::Backup { .. } | Command::Restore { .. } | Command::Sweep => ConsoleTarget::Stdout,
    }
}

/// Applies one edit. `Show` and `Init` leave the config as it is.
fn edit_config(config: &mut BackupConfig, cmd: ConfigCommand) {
    match cmd {
        ConfigCommand::Show | ConfigCommand::Init => {}
        ConfigCommand::SetApp { id, enabled } => config.set_application_enabled(&id, enabled),
        ConfigCommand::SetCategory { category, enabled } => {
            config.set_category_enabled(category, enabled)
        }
        ConfigCommand::AllCategories => config.select_all_categories(),
        ConfigCommand::SetWorkers { workers } => {
            config.set_max_workers(workers);
        }
        ConfigCommand::SetVerify { enabled } => {
            config.set_verify_copies(enabled);
        }
        ConfigCommand::SetRetention { days } => {
            config.set_retention_days(days);
        }
        ConfigCommand::Exclude(ExcludeCommand::Add { pattern }) => {
            if !config.add_excluded(&pattern) {
                warn!("{pattern:?} is already excluded");
            }
        }
        ConfigCommand::Exclude(ExcludeCommand::Remove { pattern }) => {
            if !config.remove_excluded(&pattern) {
                warn!("{pattern:?} was not excluded");
            }
        }
    }
}

fn catalog() -> PathCatalog {
    PathCatalog::builder()
        .platform(Platform::current())
        .env(CatalogEnv::from_system())
        .build()
}

/// Ok(false) when the command ran but something in it failed.
fn run_command(args: Args, log: &LogHandle) -> Result<bool> {
    let log_file = Some(log.path().to_path_buf());
    match args.command {
        Command::Backup { only } => {
            let mut config = BackupConfig::load_or_default(&args.config);
            if !only.is_empty() {
                config.select_categories(only);
            }
            let report = BackupRun::builder()
                .config(config)
                .catalog(catalog())
                .backup_root(args.backup_root)
                .maybe_log_file(log_file)
                .build()
                .execute()?;
            println!("\n{report}");
            Ok(report.is_complete_success())
        }
        Command::Restore { instance, apps } => {
            let config = BackupConfig::load_or_default(&args.config);
            let report = RestoreRun::builder()
                .catalog(catalog())
                .backup_root(args.backup_root)
                .maybe_instance(instance)
                .maybe_applications((!apps.is_empty()).then_some(apps))
                .verify(config.verify_copies())
                .max_workers(config.max_workers())
                .maybe_log_file(log_file)
                .build()
                .execute()?;
            println!("\n{report}");
            Ok(report.is_complete_success())
        }
        Command::List => {
            let instances = list_instances(&args.backup_root)?;
            if instances.is_empty() {
                println!("No backups found in {:?}", args.backup_root);
            }
            for instance in instances {
                let apps = instance_applications(&instance)?;
                println!("{}  [{}]", instance.display(), apps.join(", "));
            }
            Ok(true)
        }
        Command::Sweep => {
            let config = BackupConfig::load_or_default(&args.config);
            let days = config.retention_days();
            let removed =
                RetentionSweeper::new(days).sweep(&args.backup_root, Local::now().to_utc());
            info!("Removed {} backup(s) older than {days} day(s)", removed.len());
            Ok(true)
        }
        Command::Config(cmd) => {
            let mut config = match cmd {
                ConfigCommand::Init => BackupConfig::default(),
                _ => BackupConfig::load_or_default(&args.config),
            };
            if let ConfigCommand::Show = cmd {
                println!("{}", serde_json::to_string_pretty(&config)?);
                return Ok(true);
            }
            edit_config(&mut config, cmd);
            config.save(&args.config)?;
            info!("Saved settings to {:?}", args.config);
            Ok(true)
        }
    }
}

fn real_main() -> i32 {
    let args = Args::parse();
    let log = match setup_logging(
        &args.log_dir,
        log_prefix(&args.command),
        &Local::now(),
        console_target(&args.command),
    ) {
        Ok(log) => log,
        Err(e) => {
            eprintln!("{e}");
            return 1;
        }
    };

    match run_command(args, &log) {
        Ok(true) => 0,
        Ok(false) => {
            error!("Completed with errors. Check the logs for details: {:?}", log.path());
            1
        }
        Err(e) => {
            error!("{e}");
            1
        }
    }
}

fn main() {
    // The log guard lives inside real_main so it is flushed before exiting.
    exit(real_main());
}

// rsign - reconcile authority and commercial road-sign registries

mod exit_codes;
mod query;
mod recon;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use roadsigns_feeds::{AppConfig, FeedMode};
use roadsigns_recon::{FetchError, ReconError};

use exit_codes::{recon_exit_code, EXIT_SUCCESS};

#[derive(Parser)]
#[command(name = "rsign")]
#[command(about = "Reconcile authority and commercial road-sign registries")]
#[command(long_version = long_version())]
#[command(version)]
struct Cli {
    /// Config file (TOML). Without one, the built-in mock feeds are used
    #[arg(long, short = 'c', global = true, env = "RSIGN_CONFIG")]
    config: Option<PathBuf>,

    /// State file, overriding feeds.state_file
    #[arg(long, global = true, env = "RSIGN_STATE")]
    state: Option<PathBuf>,

    /// More log output on stderr (-v info, -vv debug). RUST_LOG wins when set
    #[arg(long, short = 'v', global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch both registries, reconcile, and commit a new snapshot
    #[command(after_help = "\
Examples:
  rsign refresh
  rsign -c rsign.toml refresh --json")]
    Refresh {
        /// Print the pass summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show a filtered, sorted page of the committed snapshot
    #[command(after_help = "\
Examples:
  rsign list
  rsign list --source both --status conflict
  rsign list --search 'уступи' --sort status --desc --page 1 --page-size 20
  rsign list --json")]
    List(query::ListArgs),

    /// Write the filtered, sorted snapshot as CSV
    #[command(after_help = "\
Examples:
  rsign export -o signs.csv
  rsign export --status new --status updated > fresh.csv")]
    Export(query::ExportArgs),

    /// Count entities per status and per source
    Summary(query::SummaryArgs),

    /// Check the config file and print the effective settings
    Validate {
        /// Print the effective config as JSON
        #[arg(long)]
        json: bool,
    },
}

fn long_version() -> &'static str {
    concat!(
        env!("CARGO_PKG_VERSION"),
        " (", env!("GIT_COMMIT_HASH"), ")",
        "\ntarget:  ", env!("TARGET"),
    )
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format_timestamp(None)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = load_config(cli.config.as_ref(), cli.state).and_then(|config| match cli.command {
        Commands::Refresh { json } => recon::cmd_refresh(&config, json),
        Commands::List(args) => query::cmd_list(&config, args),
        Commands::Export(args) => query::cmd_export(&config, args),
        Commands::Summary(args) => query::cmd_summary(&config, args),
        Commands::Validate { json } => recon::cmd_validate(&config, cli.config.as_deref(), json),
    });

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

fn load_config(path: Option<&PathBuf>, state: Option<PathBuf>) -> Result<AppConfig, CliError> {
    let mut config = match path {
        Some(path) => AppConfig::load(path).map_err(CliError::from)?,
        None => AppConfig::default(),
    };
    if let Some(state) = state {
        config.feeds.state_file = Some(state);
    }
    Ok(config)
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn new(code: u8, msg: impl Into<String>) -> Self {
        Self { code, message: msg.into(), hint: None }
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl From<ReconError> for CliError {
    fn from(err: ReconError) -> Self {
        let code = recon_exit_code(&err);
        let hint = match &err {
            ReconError::Fetch { error: FetchError::Timeout { .. }, .. } => {
                Some("raise engine.fetch.timeout_secs or check the feed; the previous snapshot is unchanged")
            }
            ReconError::Fetch { .. } => Some("the previous snapshot is unchanged"),
            ReconError::State(_) => Some("check feeds.state_file (or --state); nothing was published"),
            ReconError::ConfigParse(_) | ReconError::ConfigValidation(_) => {
                Some("run `rsign validate -c <file>` after fixing the config")
            }
            _ => None,
        };
        Self {
            code,
            message: err.to_string(),
            hint: hint.map(String::from),
        }
    }
}

/// Name of the feed mode, for human output.
pub(crate) fn mode_label(mode: FeedMode) -> &'static str {
    match mode {
        FeedMode::Mock => "mock",
        FeedMode::Live => "live",
        FeedMode::File => "file",
    }
}

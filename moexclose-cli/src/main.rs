//! moexclose CLI: fetch, plan, config and inspect commands.
//!
//! Commands:
//! - `fetch`: download daily closes from MOEX ISS and write the wide table
//! - `plan`: print the request windows without touching the network
//! - `config`: print or write the default configuration as TOML
//! - `inspect`: summarize a previously written wide table

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use moexclose_core::{
    check_delimiter, read_wide_csv, run_pipeline, IssClient, LoaderConfig, LogProgress,
};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "moexclose",
    version,
    about = "moexclose: daily closing prices from MOEX ISS as a date × security table"
)]
struct Cli {
    /// Log at debug level (RUST_LOG takes precedence).
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Options shared by commands that resolve a loader configuration.
#[derive(Args)]
struct ConfigArgs {
    /// Path to a TOML config file. Defaults are used when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Start date (YYYY-MM-DD).
    #[arg(long)]
    start: Option<String>,

    /// End date (YYYY-MM-DD).
    #[arg(long)]
    end: Option<String>,

    /// Calendar days per request window.
    #[arg(long)]
    window_days: Option<u32>,
}

#[derive(Subcommand)]
enum Commands {
    /// Download closing prices and write the semicolon-delimited table.
    Fetch {
        #[command(flatten)]
        common: ConfigArgs,

        /// Securities to fetch (e.g., LQDT TGLD). Replaces the configured list.
        securities: Vec<String>,

        /// Output file. Overwritten on success.
        #[arg(long)]
        output: Option<PathBuf>,

        /// Trading board (e.g., TQTF).
        #[arg(long)]
        board: Option<String>,
    },
    /// Print the request windows and pairing count without fetching.
    Plan {
        #[command(flatten)]
        common: ConfigArgs,
    },
    /// Print the default configuration as TOML.
    Config {
        /// Write to this file instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Summarize a wide table written by `fetch`.
    Inspect {
        /// File to read.
        file: PathBuf,

        /// Field delimiter used in the file.
        #[arg(long, default_value_t = ';')]
        delimiter: char,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(err) = run(cli.command) {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Fetch {
            common,
            securities,
            output,
            board,
        } => run_fetch(common, securities, output, board),
        Commands::Plan { common } => run_plan(common),
        Commands::Config { output } => run_config(output.as_deref()),
        Commands::Inspect { file, delimiter } => run_inspect(&file, delimiter),
    }
}

/// Load the config file (or defaults) and apply CLI overrides.
///
/// Validation is left to the caller, once every override is in place.
fn resolve_config(args: ConfigArgs) -> Result<LoaderConfig> {
    let mut config = match &args.config {
        Some(path) => LoaderConfig::load_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => LoaderConfig::default(),
    };

    if let Some(start) = args.start.as_deref() {
        config.start_date = parse_date(start)?;
    }
    if let Some(end) = args.end.as_deref() {
        config.end_date = parse_date(end)?;
    }
    if let Some(days) = args.window_days {
        config.window_days = days;
    }

    Ok(config)
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .with_context(|| format!("invalid date '{s}', expected YYYY-MM-DD"))
}

fn run_fetch(
    common: ConfigArgs,
    securities: Vec<String>,
    output: Option<PathBuf>,
    board: Option<String>,
) -> Result<()> {
    let mut config = resolve_config(common)?;
    if !securities.is_empty() {
        config.securities = securities;
    }
    if let Some(output) = output {
        config.output = output;
    }
    if let Some(board) = board {
        config.board = board;
    }
    config.validate()?;
    tracing::debug!(?config, "resolved configuration");

    let client = IssClient::new(&config)?;
    let summary = run_pipeline(&config, &client, &LogProgress)?;

    println!();
    println!("=== Download Summary ===");
    println!(
        "Period:      {} to {} ({} windows of {} days)",
        config.start_date, config.end_date, summary.windows, config.window_days
    );
    println!(
        "Requests:    {} ({} ok, {} skipped)",
        summary.pairings, summary.succeeded, summary.skipped
    );
    println!("Rows:        {}", summary.rows);
    println!(
        "Table:       {} dates x {} securities",
        summary.dates, summary.securities
    );
    println!("Saved to:    {}", summary.output.display());

    Ok(())
}

fn run_plan(common: ConfigArgs) -> Result<()> {
    let config = resolve_config(common)?;
    config.validate()?;

    let windows = config.windows();
    println!(
        "{} windows of {} days, {} securities, {} requests",
        windows.len(),
        config.window_days,
        config.securities.len(),
        config.pairing_count()
    );
    println!();
    println!("{:<4} {:<12} {:<12}", "#", "From", "Till");
    println!("{}", "-".repeat(28));
    for (i, w) in windows.iter().enumerate() {
        println!(
            "{:<4} {:<12} {:<12}",
            i + 1,
            w.start.to_string(),
            w.end.to_string()
        );
    }
    if let Some(last) = windows.last() {
        if last.end > config.end_date {
            println!();
            println!(
                "Note: last window extends past {} (not clamped)",
                config.end_date
            );
        }
    }

    Ok(())
}

fn run_config(output: Option<&Path>) -> Result<()> {
    let text = LoaderConfig::default().to_toml()?;
    match output {
        Some(path) => {
            std::fs::write(path, &text)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("Default config written to: {}", path.display());
        }
        None => print!("{text}"),
    }
    Ok(())
}

fn run_inspect(file: &Path, delimiter: char) -> Result<()> {
    let table = read_wide_csv(file, check_delimiter(delimiter)?)?;

    println!("File:        {}", file.display());
    match (table.first_date(), table.last_date()) {
        (Some(first), Some(last)) => {
            println!("Dates:       {} ({first} to {last})", table.rows.len())
        }
        _ => println!("Dates:       0"),
    }
    println!("Securities:  {}", table.securities.len());
    println!();
    println!("{:<8} {:>8} {:>8}", "Security", "Closes", "Missing");
    println!("{}", "-".repeat(26));
    for (sec, filled) in table.coverage() {
        println!(
            "{:<8} {:>8} {:>8}",
            sec,
            filled,
            table.rows.len() - filled
        );
    }

    Ok(())
}

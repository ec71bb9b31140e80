mod config;
mod export;
mod extract;
mod logging;
mod net;
mod orchestrator;
mod prompt;
mod targets;

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use config::{AppConfig, ShareMode};
use export::{export_json, export_targets_json, write_summary, ExportOptions};
use extract::{ExtractProgress, ExtractionFilter, Extractor};
use net::{
    Authenticator, Credentials, MountedShareConnector, NetUseConnector, PingProber, Prober,
    ShareConnector,
};
use orchestrator::{CredentialPrompt, Orchestrator};
use prompt::{NoPrompt, TerminalPrompt};
use targets::{LookupTable, Selection, Target};

#[derive(Parser, Debug)]
#[command(name = "station-pull")]
#[command(version = "0.1.0")]
#[command(about = "Pull inspection images and logs from remote camera stations", long_about = None)]
struct Args {
    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Config file (default: <config dir>/station-pull/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check whether a station answers a ping
    Probe {
        /// Station address
        address: String,
    },

    /// Show the stations a lookup table resolves to
    Targets {
        /// CSV lookup table with IP and Estacion columns
        #[arg(long)]
        table: PathBuf,

        /// Only these addresses (can be repeated; default: every row)
        #[arg(short, long = "select", action = clap::ArgAction::Append)]
        select: Vec<String>,

        /// Output JSON
        #[arg(long)]
        json: bool,
    },

    /// Connect to stations and copy matching files
    Extract(ExtractArgs),
}

#[derive(clap::Args, Debug)]
struct ExtractArgs {
    /// Single station address
    #[arg(long, conflicts_with = "table", required_unless_present = "table")]
    ip: Option<String>,

    /// CSV lookup table with IP and Estacion columns
    #[arg(long)]
    table: Option<PathBuf>,

    /// Only these table addresses (can be repeated)
    #[arg(short, long = "select", requires = "table", action = clap::ArgAction::Append)]
    select: Vec<String>,

    /// File extensions to copy (can be repeated or comma separated)
    #[arg(short, long = "ext", value_delimiter = ',', action = clap::ArgAction::Append)]
    ext: Vec<String>,

    /// Inspection tag the file name must contain: Pass, Fail or all
    #[arg(short, long)]
    tag: Option<String>,

    /// Folder receiving one sub-folder per station
    #[arg(short, long, default_value = ".")]
    dest: PathBuf,

    /// Account used instead of the configured default
    #[arg(short, long)]
    user: Option<String>,

    /// Password used instead of the configured default
    #[arg(long, env = "STATION_PULL_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Never ask for credentials after a rejected login
    #[arg(long)]
    no_prompt: bool,

    /// Read shares from <DIR>/<address> instead of using net use
    #[arg(long)]
    mount_root: Option<PathBuf>,

    /// Output a JSON report instead of the summary
    #[arg(long)]
    json: bool,

    /// Only report targets that failed (with --json)
    #[arg(long, requires = "json")]
    failed_only: bool,
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();
    logging::init(args.verbose);

    let config = AppConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    match args.command {
        Command::Probe { address } => run_probe(&config, &address),
        Command::Targets { table, select, json } => run_targets(&table, select, json),
        Command::Extract(extract_args) => run_extract(&config, extract_args),
    }
}

fn run_probe(config: &AppConfig, address: &str) -> Result<ExitCode> {
    let prober = PingProber::new(config.probe_timeout());
    if prober.probe(address.trim()).is_reachable() {
        println!("{} is reachable", address);
        Ok(ExitCode::SUCCESS)
    } else {
        println!("{} is unreachable", address);
        Ok(ExitCode::FAILURE)
    }
}

fn selection_from(select: Vec<String>) -> Selection {
    if select.is_empty() {
        Selection::All
    } else {
        Selection::Addresses(select)
    }
}

fn load_table(path: &Path) -> Result<LookupTable> {
    let table = LookupTable::from_path(path)
        .with_context(|| format!("Failed to load lookup table {}", path.display()))?;
    if table.is_empty() {
        warn!(path = %path.display(), "lookup table has no usable rows");
    } else {
        info!(path = %path.display(), rows = table.len(), "lookup table loaded");
    }
    Ok(table)
}

fn run_targets(table_path: &Path, select: Vec<String>, json: bool) -> Result<ExitCode> {
    let table = load_table(table_path)?;
    let targets = table.resolve(&selection_from(select));

    let mut stdout = io::stdout();
    if json {
        export_targets_json(&targets, &mut stdout)?;
        println!(); // Final newline
    } else {
        for target in &targets {
            writeln!(stdout, "{}\t{}", target.address, target.label.as_deref().unwrap_or("-"))?;
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn resolve_targets(args: &ExtractArgs) -> Result<Vec<Target>> {
    match (&args.ip, &args.table) {
        (Some(ip), _) => Ok(targets::resolve_single(ip)?),
        (None, Some(path)) => Ok(load_table(path)?.resolve(&selection_from(args.select.clone()))),
        (None, None) => anyhow::bail!("Either --ip or --table is required"),
    }
}

fn build_connector(config: &AppConfig, mount_root: Option<PathBuf>) -> Arc<dyn ShareConnector> {
    let mode = match mount_root {
        Some(mount_root) => ShareMode::Mounted { mount_root },
        None => config.share_mode.clone(),
    };

    match mode {
        ShareMode::NetUse => Arc::new(NetUseConnector::new(
            config.share_name.clone(),
            config.auth_timeout(),
        )),
        ShareMode::Mounted { mount_root } => Arc::new(MountedShareConnector::new(mount_root)),
    }
}

fn default_credentials(
    config: &AppConfig,
    user: Option<String>,
    password: Option<String>,
) -> Credentials {
    let configured = config.default_credentials();
    match (user, password) {
        (None, None) => configured,
        (user, password) => Credentials::new(
            user.unwrap_or_else(|| configured.user.clone()),
            password.unwrap_or_else(|| configured.secret().to_string()),
        ),
    }
}

fn run_extract(config: &AppConfig, args: ExtractArgs) -> Result<ExitCode> {
    let targets = resolve_targets(&args)?;
    let filter = ExtractionFilter::new(&args.ext, args.tag.as_deref());
    info!(
        targets = targets.len(),
        extensions = ?filter.extensions(),
        tag = filter.inspection_tag().unwrap_or("all"),
        "starting extraction"
    );

    let prober: Arc<dyn Prober> = Arc::new(PingProber::new(config.probe_timeout()));
    let connector = build_connector(config, args.mount_root.clone());
    let credentials = default_credentials(config, args.user.clone(), args.password.clone());
    let authenticator = Authenticator::new(Arc::clone(&prober), connector, credentials);

    let mut prompt: Box<dyn CredentialPrompt> = if args.no_prompt || args.json {
        Box::new(NoPrompt)
    } else {
        Box::new(TerminalPrompt::new(authenticator.default_credentials().user.clone()))
    };

    let mut extractor = Extractor::new(config.extract_options());
    let mut progress_handle = None;
    if !args.json {
        let (tx, rx) = mpsc::sync_channel(1000);
        extractor = extractor.with_progress(tx);
        progress_handle = Some(spawn_progress_bar(rx));
    }

    let result = {
        let orchestrator =
            Orchestrator::new(&authenticator, &extractor, prober, config.orchestrator_options());
        orchestrator.run(&targets, &filter, &args.dest, prompt.as_mut())
    };

    // Closes the progress channel
    drop(extractor);
    if let Some(handle) = progress_handle {
        let _ = handle.join();
    }

    let report = result?;

    if args.json {
        let export_options = ExportOptions {
            failed_only: args.failed_only,
        };
        let mut stdout = io::stdout();
        export_json(&report, &export_options, &mut stdout)?;
        println!(); // Final newline
    } else {
        write_summary(&report, &mut io::stderr())?;
    }

    Ok(if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

const PROGRESS_TEMPLATE: &str = "{msg:20} {bar:40.cyan/blue} {pos}/{len} [{elapsed_precise}]";

/// Render extraction progress until the sending side is dropped.
fn spawn_progress_bar(rx: Receiver<ExtractProgress>) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut bar: Option<ProgressBar> = None;

        for progress in rx {
            match progress {
                ExtractProgress::Started { address, total, .. } => {
                    let pb = ProgressBar::new(total);
                    if let Ok(style) = ProgressStyle::default_bar().template(PROGRESS_TEMPLATE) {
                        pb.set_style(style.progress_chars("=> "));
                    }
                    pb.set_message(address);
                    bar = Some(pb);
                }
                ExtractProgress::FileProcessed { current, .. } => {
                    if let Some(pb) = &bar {
                        pb.set_position(current);
                    }
                }
                ExtractProgress::Completed { copied, total, errors } => {
                    if let Some(pb) = bar.take() {
                        pb.finish_with_message(format!(
                            "{}/{} copied, {} failed",
                            copied, total, errors
                        ));
                    }
                }
            }
        }
    })
}

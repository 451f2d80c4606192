//! Breachwatch CLI

use anyhow::Context;
use breachwatch_checker::{
    BreachEvidence, BreachedEntry, CheckOrchestrator, MemoryDatabase, SessionOutcome,
};
use breachwatch_core::{AppConfig, BreachSource, SessionConfig};
use clap::{Args, Parser, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "breachwatch")]
#[command(about = "Check password database entries against known breaches")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to the platform config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Check the entries of a JSON export
    Check(CheckArgs),

    /// List supported breach sources
    Sources,

    /// Write the default configuration file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Args)]
#[allow(clippy::struct_excessive_bools)]
struct CheckArgs {
    /// JSON export of the database (`{"entries": [...]}`)
    #[arg(short, long)]
    export: PathBuf,

    /// Check against every supported source
    #[arg(long, conflicts_with = "source")]
    all: bool,

    /// Source to check against (have-i-been-pwned, cloudbleed, pwned-passwords)
    #[arg(short, long)]
    source: Option<BreachSource>,

    /// Mark breached entries for expiry in the report
    #[arg(long)]
    expire: bool,

    /// Only check entries older than each source's threshold
    #[arg(long)]
    old_only: bool,

    /// Also check entries in the recycle bin
    #[arg(long)]
    include_deleted: bool,

    /// Print results as JSON instead of a table
    #[arg(long)]
    json: bool,
}

impl CheckArgs {
    fn session_config(&self) -> SessionConfig {
        let defaults = SessionConfig::default();
        SessionConfig {
            check_all_backends: self.all,
            selected_backend: self.source.unwrap_or(defaults.selected_backend),
            expire_entries: self.expire,
            only_check_old_entries: self.old_only,
            ignore_deleted_entries: !self.include_deleted,
        }
    }
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let default = if verbose {
        "debug"
    } else {
        "info,breachwatch=debug"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn load_config(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    let config = match path {
        Some(path) => {
            let mut config = AppConfig::load_from(path)
                .with_context(|| format!("loading config from {}", path.display()))?;
            config.apply_env_overrides();
            config.validate()?;
            config
        }
        None => AppConfig::load_with_env().context("loading config")?,
    };
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Check(args) => cmd_check(cli.config.as_deref(), &args).await,
        Commands::Sources => {
            cmd_sources();
            Ok(())
        }
        Commands::InitConfig { force } => {
            let path = cmd_init_config(cli.config.as_deref(), force)?;
            println!("Wrote default configuration to {}", path.display());
            Ok(())
        }
    }
}

async fn cmd_check(config_path: Option<&Path>, args: &CheckArgs) -> anyhow::Result<()> {
    info!("Starting breachwatch v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(config_path)?;
    let database = MemoryDatabase::load_json(&args.export)
        .with_context(|| format!("reading export {}", args.export.display()))?;
    let orchestrator = CheckOrchestrator::from_config(&config)?;

    let mut handle = orchestrator.start(Arc::new(database), args.session_config())?;

    let cancel = handle.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling check");
            cancel.cancel();
        }
    });

    let mut stderr = std::io::stderr();
    while let Some(update) = handle.next_progress().await {
        let _ = write!(stderr, "\r[{:>3.0}%] {:<60}", update.percent, update.text);
        let _ = stderr.flush();
    }
    let _ = writeln!(stderr);

    let outcome = handle.outcome().await?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(outcome.results())?);
    } else {
        print_table(outcome.results());
    }

    match outcome {
        SessionOutcome::Completed { .. } => {
            println!("{}", outcome.summary());
            Ok(())
        }
        SessionOutcome::Cancelled { .. } => {
            println!("{}", outcome.summary());
            std::process::exit(130);
        }
        SessionOutcome::Failed { .. } => anyhow::bail!("{}", outcome.summary()),
    }
}

fn cmd_sources() {
    println!("Supported breach sources:");
    for source in BreachSource::ALL {
        println!("  {:<20} {}", source.as_str(), source.display_name());
    }
}

fn cmd_init_config(path: Option<&Path>, force: bool) -> anyhow::Result<PathBuf> {
    let config = AppConfig::default();
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => AppConfig::config_path()?,
    };
    if path.exists() && !force {
        anyhow::bail!("{} already exists, pass --force to overwrite", path.display());
    }
    config
        .save_to(&path)
        .with_context(|| format!("writing config to {}", path.display()))?;
    info!("Wrote default configuration to {}", path.display());
    Ok(path)
}

fn describe(evidence: &BreachEvidence) -> String {
    match evidence {
        BreachEvidence::SiteBreach {
            title, breach_date, ..
        } => format!("{title} breach on {breach_date}"),
        BreachEvidence::CloudflareLeak { domain } => format!("{domain} served via Cloudflare"),
        BreachEvidence::PasswordExposure { occurrences } => {
            format!("password seen {occurrences} times")
        }
    }
}

fn table_row(source: &str, entry: &str, group: &str, username: &str, evidence: &str, expire: &str) -> String {
    format!("{source:<18} {entry:<28} {group:<20} {username:<24} {evidence:<40} {expire}")
}

fn record_row(record: &BreachedEntry) -> String {
    table_row(
        record.source.display_name(),
        &record.title,
        &record.group,
        &record.username,
        &describe(&record.evidence),
        if record.expire { "yes" } else { "" },
    )
}

fn print_table(results: &[BreachedEntry]) {
    if results.is_empty() {
        return;
    }

    println!(
        "{}",
        table_row("SOURCE", "ENTRY", "GROUP", "USERNAME", "EVIDENCE", "EXPIRE")
    );
    for record in results {
        println!("{}", record_row(record));
    }
}

//! Roll-Harvester main entry point
//!
//! This is the command-line interface for the Roll-Harvester crawler.

use clap::{Parser, Subcommand, ValueEnum};
use roll_harvester::archive::ArchiveManager;
use roll_harvester::captcha::{CaptchaSolver, CommandSolver};
use roll_harvester::config::{load_config_with_hash, Config};
use roll_harvester::crawler::{archive_local_groups, collect_captchas, convert_remote_backlog, crawl};
use roll_harvester::output::print_conversion_report;
use roll_harvester::{DataLayout, HarvestError, Tier};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Roll-Harvester: a resumable crawler for captcha-gated electoral rolls
///
/// Walks the roll catalog, fetches every part through the captcha-gated
/// download endpoints, optionally converts the PDFs to per-page WebP images,
/// and ships finished language groups to remote object storage.
#[derive(Parser, Debug)]
#[command(name = "roll-harvester")]
#[command(version = "1.0.0")]
#[command(about = "A resumable electoral roll crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Crawl the catalog and fetch every unarchived language group
    Crawl {
        /// Only crawl these state codes
        #[arg(long, value_delimiter = ',')]
        states: Vec<String>,
    },

    /// Package and upload every sealed language group already on disk
    Archive {
        #[arg(value_enum)]
        tier: TierArg,
    },

    /// Convert raw archives from the remote and ship their pages
    Convert {
        /// Keep raw archives in the remote after their pages are shipped
        #[arg(long)]
        keep_remote: bool,
    },

    /// Save captcha challenges for labelling
    CollectCaptchas {
        /// Number of challenges to fetch
        #[arg(long, default_value_t = 100)]
        count: usize,

        /// Directory receiving the images
        #[arg(long)]
        out: PathBuf,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum TierArg {
    Raw,
    Pages,
}

impl From<TierArg> for Tier {
    fn from(arg: TierArg) -> Self {
        match arg {
            TierArg::Raw => Tier::Raw,
            TierArg::Pages => Tier::Pages,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let config = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            cfg
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if let Err(e) = run(cli.command, config).await {
        tracing::error!("{}", e);
        return Err(e.into());
    }
    Ok(())
}

async fn run(command: Command, config: Config) -> Result<(), HarvestError> {
    match command {
        Command::Crawl { states } => {
            let solver: Arc<dyn CaptchaSolver> = Arc::new(CommandSolver::new(&config.captcha.command)?);
            let archive = open_archive(&config)?;
            crawl(config, solver, archive, states).await?;
        }
        Command::Archive { tier } => {
            let archive = require_archive(&config)?;
            let shipped = archive_local_groups(&archive, tier.into()).await?;
            println!("Shipped {} archives", shipped);
        }
        Command::Convert { keep_remote } => {
            let archive = require_archive(&config)?;
            let report = convert_remote_backlog(archive, &config.conversion, keep_remote).await?;
            print_conversion_report(&report);
        }
        Command::CollectCaptchas { count, out } => {
            let saved = collect_captchas(&config, &out, count).await?;
            println!("Saved {} captchas to {}", saved, out.display());
        }
    }
    Ok(())
}

fn open_archive(config: &Config) -> Result<Option<Arc<ArchiveManager>>, HarvestError> {
    let Some(remote) = &config.remote else {
        return Ok(None);
    };
    let layout = DataLayout::new(&config.storage.data_dir);
    Ok(Some(Arc::new(ArchiveManager::from_config(layout, remote)?)))
}

fn require_archive(config: &Config) -> Result<Arc<ArchiveManager>, HarvestError> {
    open_archive(config)?.ok_or_else(|| {
        HarvestError::Config(roll_harvester::ConfigError::Validation(
            "this command needs a [remote] section".to_string(),
        ))
    })
}

/// Sets up logging based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("roll_harvester=info,warn"),
            1 => EnvFilter::new("roll_harvester=debug,info"),
            2 => EnvFilter::new("roll_harvester=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

use anyhow::Result;
use clap::{Parser, Subcommand};
use semsift::Config;
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod commands;

#[derive(Parser)]
#[command(author, version = env!("CARGO_PKG_VERSION"), about = "Find and avoid duplicate media with embedding similarity", long_about = None)]
struct Cli {
    /// Configuration file path (default: semsift.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbosity level (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Partition a folder of images into unique and similar sets
    Sift(commands::sift::SiftArgs),

    /// List embedding engines in the registry
    Engines,

    /// Download model files for an engine
    Fetch {
        /// Engine name (from the registry)
        name: String,

        /// Re-download even if files are already present
        #[arg(long)]
        force: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Sift(args) => commands::sift::execute(&config, args),
        Commands::Engines => commands::engines::execute(&config),
        Commands::Fetch { name, force } => commands::fetch::execute(&config, &name, force),
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

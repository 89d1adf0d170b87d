use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use scancast::Config;
use tracing_subscriber::prelude::*;

mod cmd_discover;
mod cmd_prepare;
mod cmd_send;

/// Stream sliced G-code to a galvo scan card over UDP broadcast.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(name = "scancast")]
struct Cli {
    /// Config file to use
    #[arg(long, short, default_value = "scancast.toml")]
    config: String,

    /// Print debug info
    #[arg(long)]
    debug: bool,

    /// Print logs as json
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream a G-code file to the scan card, layer by layer.
    Send {
        /// Path of the G-code file to stream.
        #[arg(required_unless_present = "from_artifacts", conflicts_with = "from_artifacts")]
        file: Option<PathBuf>,

        /// Stream a prepared artifact directory instead of G-code.
        #[arg(long)]
        from_artifacts: Option<PathBuf>,

        /// Ask before moving on to each next layer.
        #[arg(long)]
        confirm: bool,
    },
    /// Extract and resample a G-code file into per-layer artifacts.
    Prepare {
        /// Path of the G-code file to prepare.
        file: PathBuf,

        /// Directory the artifacts are written to.
        #[arg(long, short)]
        out: PathBuf,
    },
    /// Print the subnet broadcast address frames would go to.
    Discover,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(if cli.debug { "debug" } else { "info" })
    });

    // Initialize tracing.
    if cli.json {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::Layer::default()
                    .json()
                    .with_filter(filter),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::Layer::default().with_filter(filter))
            .init();
    }

    let cfg = Config::load(&cli.config)?;
    cfg.validate()?;

    match cli.command {
        Commands::Send {
            ref file,
            ref from_artifacts,
            confirm,
        } => cmd_send::main(&cli, &cfg, file.as_deref(), from_artifacts.as_deref(), confirm).await,
        Commands::Prepare { ref file, ref out } => cmd_prepare::main(&cli, &cfg, file, out).await,
        Commands::Discover => cmd_discover::main(&cli, &cfg).await,
    }
}

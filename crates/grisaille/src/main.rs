//! Grisaille CLI - batch grayscale/resize processing with archive download.
//!
//! Submitted images are resized to the configured size, converted to
//! grayscale and kept in a local content store. Processed images can then be
//! bundled into a single `.tar.gz`.
//!
//! # Usage
//!
//! ```bash
//! # Process a few files and a directory
//! grisaille submit cat.jpg dog.png ./holiday/
//!
//! # Bundle processed outputs
//! grisaille download cat.jpg dog.png -o pets.tar.gz
//!
//! # View configuration
//! grisaille config show
//! ```

use clap::{Parser, Subcommand};

mod cli;
mod logging;

/// Grisaille - batch grayscale/resize processing with archive download.
#[derive(Parser, Debug)]
#[command(name = "grisaille")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Transform images and store the results
    Submit(cli::submit::SubmitArgs),

    /// Bundle stored results into a .tar.gz archive
    Download(cli::download::DownloadArgs),

    /// View and manage configuration
    Config(cli::config::ConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logging isn't initialized yet, so config warnings go through eprintln.
    let config = match grisaille_core::Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "Warning: Failed to load config: {e}\n  \
                 Using default configuration. Check your config file with `grisaille config path`."
            );
            grisaille_core::Config::default()
        }
    };
    logging::init_from_config(&config, cli.verbose, cli.json_logs);

    tracing::debug!("Grisaille v{}", grisaille_core::VERSION);

    match cli.command {
        Commands::Submit(args) => cli::submit::execute(args, config).await,
        Commands::Download(args) => cli::download::execute(args, config).await,
        Commands::Config(args) => cli::config::execute(args).await,
    }
}

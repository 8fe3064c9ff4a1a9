//! The `grisaille submit` command: transform images and store the results.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use clap::{Args, ValueEnum};
use grisaille_core::output::OutputFormat as CoreOutputFormat;
use grisaille_core::{
    BatchReport, BatchStats, CancelFlag, Config, FileDiscovery, Grisaille, OutputWriter, Upload,
};

/// Arguments for the `submit` command.
#[derive(Args, Debug)]
pub struct SubmitArgs {
    /// Image files or directories to submit
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Report file (defaults to stdout)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Report format
    #[arg(short, long, value_enum, default_value = "json")]
    pub format: OutputFormat,

    /// Number of parallel workers (defaults to the configured value)
    #[arg(short, long)]
    pub parallel: Option<usize>,
}

/// Supported report formats.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum OutputFormat {
    /// Single JSON object with results and stats
    Json,
    /// One JSON object per job (newline-delimited)
    Jsonl,
}

impl From<OutputFormat> for CoreOutputFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Json => CoreOutputFormat::Json,
            OutputFormat::Jsonl => CoreOutputFormat::JsonLines,
        }
    }
}

/// Execute the submit command.
pub async fn execute(args: SubmitArgs, mut config: Config) -> anyhow::Result<()> {
    if let Some(parallel) = args.parallel {
        config.processing.parallel_workers = parallel;
    }

    let discovery = FileDiscovery::new(config.processing.clone());
    let files = discovery.discover_all(args.inputs.as_slice());
    if files.is_empty() {
        tracing::warn!("No supported image files found in {:?}", args.inputs);
        return Ok(());
    }
    tracing::info!(
        "Found {} image(s) ({:.1} MB)",
        files.len(),
        FileDiscovery::total_size(&files) as f64 / 1_000_000.0
    );

    let uploads = read_uploads(&files);
    let grisaille = Grisaille::new(config)?;

    let cancel = CancelFlag::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, finishing running jobs");
            on_interrupt.cancel();
        }
    });

    let report = grisaille.submit_with_cancel(uploads, &cancel).await;

    for failure in report.failures() {
        if let grisaille_core::JobOutcome::Failure { kind, reason } = &failure.outcome {
            tracing::error!("Failed: {} ({:?}) - {}", failure.source_name, kind, reason);
        }
    }

    write_report(&report, &args)?;
    print_summary(&report.stats);

    if report.stats.succeeded > 0 {
        tracing::info!(
            "Stored in {:?}; bundle with `grisaille download <NAME>...`",
            grisaille.config().store_dir()
        );
    }
    Ok(())
}

/// Read discovered files into uploads, skipping files that cannot be read.
fn read_uploads(files: &[grisaille_core::DiscoveredFile]) -> Vec<Upload> {
    files
        .iter()
        .filter_map(|file| match file.read() {
            Ok(upload) => Some(upload),
            Err(e) => {
                tracing::error!("Failed to read {:?}: {}", file.path, e);
                None
            }
        })
        .collect()
}

fn write_report(report: &BatchReport, args: &SubmitArgs) -> anyhow::Result<()> {
    match &args.output {
        Some(path) => {
            let file = File::create(path)?;
            let mut writer = OutputWriter::new(BufWriter::new(file), args.format.into(), true);
            writer.write_report(report)?;
            writer.flush()?;
            tracing::info!("Report written to {:?}", path);
        }
        None => {
            let stdout = std::io::stdout();
            let mut writer = OutputWriter::new(stdout.lock(), args.format.into(), true);
            writer.write_report(report)?;
            writer.into_inner().flush()?;
        }
    }
    Ok(())
}

fn print_summary(stats: &BatchStats) {
    eprintln!();
    eprintln!("  ====================================");
    eprintln!("               Summary");
    eprintln!("  ====================================");
    eprintln!("    Succeeded:    {:>8}", stats.succeeded);
    if stats.failed > 0 {
        eprintln!("    Failed:       {:>8}", stats.failed);
    }
    eprintln!("  ------------------------------------");
    eprintln!("    Total:        {:>8}", stats.succeeded + stats.failed);
    eprintln!("    Duration:     {:>7.1}s", stats.total_seconds);
    eprintln!("    Rate:         {:>7.1} img/sec", stats.images_per_second);
    eprintln!("  ====================================");
}

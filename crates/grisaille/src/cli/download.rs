//! The `grisaille download` command: bundle stored results into an archive.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use clap::Args;
use grisaille_core::archive::ARCHIVE_EXTENSION;
use grisaille_core::{BatchReport, Config, Grisaille, JobResult};

/// Arguments for the `download` command.
#[derive(Args, Debug)]
pub struct DownloadArgs {
    /// Output names to include
    #[arg(required_unless_present = "from_report")]
    pub names: Vec<String>,

    /// Also include every successful output listed in a submit report (JSON or JSONL)
    #[arg(long)]
    pub from_report: Option<PathBuf>,

    /// Archive path (defaults to processed_images_<timestamp>.tar.gz)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Execute the download command.
pub async fn execute(args: DownloadArgs, config: Config) -> anyhow::Result<()> {
    let mut names: BTreeSet<String> = args.names.into_iter().collect();
    if let Some(report) = &args.from_report {
        let from_report = load_report_names(report)?;
        tracing::info!("Loaded {} output name(s) from {:?}", from_report.len(), report);
        names.extend(from_report);
    }
    if names.is_empty() {
        anyhow::bail!("Nothing to download: no output names given");
    }

    let dest = args
        .output
        .unwrap_or_else(|| PathBuf::from(default_archive_name(Local::now())));

    let grisaille = Grisaille::new(config)?;
    let summary = grisaille.export(names, &dest).await?;

    eprintln!(
        "  {} image(s), {:.1} MB -> {:.1} MB",
        summary.entries,
        summary.uncompressed_bytes as f64 / 1_000_000.0,
        summary.archive_bytes as f64 / 1_000_000.0
    );
    println!("{}", dest.display());
    Ok(())
}

/// `processed_images_<yyyyMMddHHmmss>.tar.gz`
fn default_archive_name(now: DateTime<Local>) -> String {
    format!(
        "processed_images_{}.{ARCHIVE_EXTENSION}",
        now.format("%Y%m%d%H%M%S")
    )
}

/// Collect successful output names from a report written by `submit`.
///
/// Accepts the JSON report object or JSONL (one job result per line).
fn load_report_names(path: &Path) -> anyhow::Result<BTreeSet<String>> {
    let content = std::fs::read_to_string(path)?;
    let trimmed = content.trim_start();

    let results: Vec<JobResult> = if trimmed.starts_with('{') && !is_jsonl(trimmed) {
        serde_json::from_str::<BatchReport>(trimmed)?.results
    } else {
        let mut results = Vec::new();
        for (number, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<JobResult>(line) {
                Ok(result) => results.push(result),
                Err(e) => tracing::warn!("Skipping line {} of {:?}: {}", number + 1, path, e),
            }
        }
        results
    };

    Ok(results
        .iter()
        .filter_map(|r| r.output_name().map(str::to_string))
        .collect())
}

/// A JSONL report has one complete object on its first line.
fn is_jsonl(content: &str) -> bool {
    content
        .lines()
        .next()
        .is_some_and(|first| serde_json::from_str::<JobResult>(first).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const JSONL: &str = r#"{"source_name":"a.png","status":"success","output_name":"a.png","width":500,"height":500,"size_bytes":10,"content_hash":"x"}
{"source_name":"b.png","status":"failure","kind":"decode","reason":"not an image"}
{"source_name":"c.png","status":"success","output_name":"c.png","width":500,"height":500,"size_bytes":12,"content_hash":"y"}
"#;

    #[test]
    fn test_default_archive_name() {
        let now = Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(
            default_archive_name(now),
            "processed_images_20240309070501.tar.gz"
        );
    }

    #[test]
    fn test_load_report_names_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.jsonl");
        std::fs::write(&path, JSONL).unwrap();

        let names = load_report_names(&path).unwrap();
        assert_eq!(
            names.into_iter().collect::<Vec<_>>(),
            vec!["a.png".to_string(), "c.png".to_string()]
        );
    }

    #[test]
    fn test_load_report_names_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        let results: Vec<&str> = JSONL.lines().collect();
        let json = format!(
            "{{\n  \"results\": [{}],\n  \"stats\": {{\"succeeded\": 2, \"failed\": 1, \"total_seconds\": 0.5, \"images_per_second\": 6.0}}\n}}",
            results.join(",")
        );
        std::fs::write(&path, json).unwrap();

        let names = load_report_names(&path).unwrap();
        assert_eq!(names.len(), 2);
        assert!(names.contains("c.png"));
    }

    #[test]
    fn test_load_report_names_skips_corrupt_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.jsonl");
        std::fs::write(&path, format!("{JSONL}{{broken\n")).unwrap();

        let names = load_report_names(&path).unwrap();
        assert_eq!(names.len(), 2);
    }

    #[tokio::test]
    async fn test_execute_missing_name_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.storage.store_dir = dir.path().join("store");
        config.storage.archive_dir = dir.path().join("downloads");
        let dest = dir.path().join("out.tar.gz");

        let args = DownloadArgs {
            names: vec!["ghost.png".to_string()],
            from_report: None,
            output: Some(dest.clone()),
        };
        assert!(execute(args, config).await.is_err());
        assert!(!dest.exists());
    }
}

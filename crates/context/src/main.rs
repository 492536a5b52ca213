//! RagForge batch ingestion
//!
//! Loads files (or every supported file under a directory) into the
//! persistent index using the same pipeline as the upload endpoint.

use anyhow::{bail, Context};
use clap::Parser;
use ragforge_common::config::AppConfig;
use ragforge_common::telemetry;
use ragforge_context::RagOrchestrator;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const INGESTIBLE_EXTENSIONS: &[&str] = &["pdf", "txt", "md", "csv"];

#[derive(Parser, Debug)]
#[command(author, version, about = "Ingest documents into the RagForge knowledge base", long_about = None)]
struct Args {
    /// Files or directories to ingest
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Descend into subdirectories
    #[arg(short, long)]
    recursive: bool,

    /// TOML configuration file (defaults to layered config/ + environment)
    #[arg(short, long)]
    config: Option<String>,

    /// Stop at the first failing file
    #[arg(long)]
    fail_fast: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => AppConfig::from_file(path),
        None => AppConfig::load(),
    }
    .context("failed to load configuration")?;

    telemetry::init_tracing(&config.observability)?;
    info!("Starting RagForge ingest v{}", ragforge_common::VERSION);

    let orchestrator = RagOrchestrator::from_config(&config)?;

    let files = collect_files(&args.paths, args.recursive).await?;
    if files.is_empty() {
        bail!("no ingestible files found (supported: {})", INGESTIBLE_EXTENSIONS.join(", "));
    }

    let mut total_chunks = 0usize;
    let mut failed = 0usize;

    for file in &files {
        match orchestrator.process_document(file).await {
            Ok(summary) => {
                total_chunks += summary.total_chunks;
                info!(path = %file.display(), chunks = summary.total_chunks, "Ingested");
            }
            Err(e) if args.fail_fast => {
                return Err(e).with_context(|| format!("failed to ingest {}", file.display()));
            }
            Err(_) => failed += 1,
        }
    }

    info!(files = files.len(), failed, total_chunks, "Ingestion finished");

    if failed > 0 {
        bail!("{} of {} files failed to ingest", failed, files.len());
    }
    Ok(())
}

/// Expand directories into the supported files they hold, sorted for a
/// stable ingestion order
async fn collect_files(paths: &[PathBuf], recursive: bool) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending: Vec<(PathBuf, bool)> = paths.iter().map(|p| (p.clone(), true)).collect();

    while let Some((path, top_level)) = pending.pop() {
        let metadata = tokio::fs::metadata(&path)
            .await
            .with_context(|| format!("cannot access {}", path.display()))?;

        if metadata.is_file() {
            if top_level || is_ingestible(&path) {
                files.push(path);
            }
            continue;
        }

        if !top_level && !recursive {
            continue;
        }

        let mut entries = tokio::fs::read_dir(&path)
            .await
            .with_context(|| format!("cannot list {}", path.display()))?;
        while let Some(entry) = entries.next_entry().await? {
            pending.push((entry.path(), false));
        }
    }

    files.sort();
    files.dedup();

    for file in files.iter().filter(|f| !is_ingestible(f)) {
        warn!(path = %file.display(), "Unrecognized extension, reading as text");
    }
    Ok(files)
}

fn is_ingestible(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| INGESTIBLE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_collect_files_filters_and_recurses() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("nested");
        std::fs::create_dir(&nested).unwrap();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        std::fs::write(dir.path().join("image.png"), [0u8; 4]).unwrap();
        std::fs::write(nested.join("b.PDF"), "b").unwrap();

        let flat = collect_files(&[dir.path().to_path_buf()], false).await.unwrap();
        assert_eq!(flat, vec![dir.path().join("a.txt")]);

        let deep = collect_files(&[dir.path().to_path_buf()], true).await.unwrap();
        assert_eq!(deep, vec![dir.path().join("a.txt"), nested.join("b.PDF")]);
    }

    #[tokio::test]
    async fn test_explicit_file_is_kept_regardless_of_extension() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("notes.log");
        std::fs::write(&file, "log line").unwrap();

        let files = collect_files(&[file.clone()], false).await.unwrap();
        assert_eq!(files, vec![file]);
    }

    #[test]
    fn test_args_require_a_path() {
        assert!(Args::try_parse_from(["ragforge-ingest"]).is_err());
        let args = Args::try_parse_from(["ragforge-ingest", "-r", "docs"]).unwrap();
        assert!(args.recursive);
        assert_eq!(args.paths, vec![PathBuf::from("docs")]);
    }
}

//! DocSift — command-line driver for the document analysis pipeline.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use docsift_analyze::Ruleset;
use docsift_core::{Catalog, PipelineConfig, RawDocument};
use docsift_runtime::Orchestrator;
use docsift_store::{ResultRepository, SqliteResultStore};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn print_help() {
    println!("DocSift — document extraction, classification and summarization");
    println!();
    println!("Usage: docsift <command>");
    println!();
    println!("Commands:");
    println!("  process <file>... [--store [dir]]   Analyze files and print JSON results");
    println!("  catalog [path]                      Validate a catalog and print its summary");
    println!("  help                                Show this help message");
    println!();
    println!("Environment:");
    println!("  DOCSIFT_CATALOG, DOCSIFT_EXTRACTION_TIMEOUT_SECS, DOCSIFT_MAX_DOCUMENT_MB,");
    println!("  DOCSIFT_TESSERACT, DOCSIFT_OCR_LANG, DOCSIFT_DATA_DIR, RUST_LOG");
}

/// Split `process` arguments into input files and the optional store directory.
/// `--store` takes the next argument unless it is an existing file or another flag.
fn parse_process_args(
    args: &[String],
    config: &PipelineConfig,
) -> (Vec<PathBuf>, Option<PathBuf>) {
    let mut files = Vec::new();
    let mut store = None;
    let mut iter = args.iter().peekable();
    while let Some(arg) = iter.next() {
        if arg == "--store" {
            let dir = match iter.peek() {
                Some(next) if !next.starts_with("--") && !Path::new(next.as_str()).is_file() => {
                    iter.next().map(PathBuf::from)
                }
                _ => None,
            };
            store = Some(dir.unwrap_or_else(|| config.data_dir.clone()));
        } else {
            files.push(PathBuf::from(arg));
        }
    }
    (files, store)
}

async fn run_process(args: &[String]) -> anyhow::Result<bool> {
    let config = PipelineConfig::from_env()?;
    let (files, store_dir) = parse_process_args(args, &config);
    if files.is_empty() {
        eprintln!("Usage: docsift process <file>... [--store [dir]]");
        std::process::exit(1);
    }

    let orchestrator = Arc::new(
        Orchestrator::new(config)
            .map_err(|e| anyhow::anyhow!("Failed to start pipeline: {}", e))?,
    );

    let mut documents = Vec::with_capacity(files.len());
    for path in &files {
        let bytes = std::fs::read(path)
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        documents.push(RawDocument::new(bytes, filename));
    }

    let results = orchestrator.process_batch(documents).await;

    let store = match store_dir {
        Some(dir) => Some(
            SqliteResultStore::open(&dir)
                .map_err(|e| anyhow::anyhow!("Failed to open store: {}", e))?,
        ),
        None => None,
    };

    let mut all_ok = true;
    for result in &results {
        println!("{}", serde_json::to_string_pretty(result)?);
        if !result.success {
            all_ok = false;
            warn!(
                "{} failed: {}",
                result.filename,
                result.error.as_deref().unwrap_or("unknown error")
            );
        }
        if let Some(store) = &store {
            let stored = store
                .save(result)
                .map_err(|e| anyhow::anyhow!("Failed to store {}: {}", result.filename, e))?;
            info!("Stored {} as {}", result.filename, stored.id);
        }
    }
    Ok(all_ok)
}

fn run_catalog(path: Option<&String>) -> bool {
    let loaded = match path {
        Some(path) => Catalog::load(Path::new(path)),
        None => PipelineConfig::from_env().and_then(|config| config.load_catalog()),
    };
    let compiled = loaded.and_then(Ruleset::compile);
    let ruleset = match compiled {
        Ok(ruleset) => ruleset,
        Err(e) => {
            eprintln!("Invalid catalog: {}", e);
            return false;
        }
    };

    let catalog = ruleset.catalog();
    println!("Catalog version: {}", catalog.version);
    println!("Document types ({}):", catalog.document_types.len());
    for spec in &catalog.document_types {
        println!(
            "  {:<16} {} keywords, {} patterns, vocabulary: {}",
            spec.document_type.as_str(),
            spec.keywords.len(),
            spec.patterns.len(),
            spec.vocabulary.as_deref().unwrap_or("-")
        );
    }
    println!("Vocabularies ({}):", catalog.vocabularies.len());
    for vocabulary in &catalog.vocabularies {
        println!("  {:<16} {} terms", vocabulary.name, vocabulary.terms.len());
    }
    true
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        print_help();
        std::process::exit(1);
    }

    let ok = match args[1].as_str() {
        "process" => run_process(&args[2..]).await?,
        "catalog" => run_catalog(args.get(2)),
        "--help" | "-h" | "help" => {
            print_help();
            return Ok(());
        }
        _ => {
            eprintln!("Unknown command: {}. Use 'docsift help' for usage.", args[1]);
            std::process::exit(1);
        }
    };

    if !ok {
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_process_args_without_store() {
        let (files, store) =
            parse_process_args(&args(&["a.pdf", "b.csv"]), &PipelineConfig::default());
        assert_eq!(files, vec![PathBuf::from("a.pdf"), PathBuf::from("b.csv")]);
        assert!(store.is_none());
    }

    #[test]
    fn test_store_defaults_to_data_dir() {
        let config = PipelineConfig::default();
        let (files, store) = parse_process_args(&args(&["a.txt", "--store"]), &config);
        assert_eq!(files, vec![PathBuf::from("a.txt")]);
        assert_eq!(store, Some(config.data_dir));
    }

    #[test]
    fn test_store_does_not_swallow_existing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("scan.txt");
        std::fs::write(&file, "hello").unwrap();
        let file_arg = file.to_string_lossy().into_owned();
        let config = PipelineConfig::default();
        let (files, store) = parse_process_args(&args(&["--store", &file_arg]), &config);
        assert_eq!(files, vec![file]);
        assert_eq!(store, Some(config.data_dir));
    }

    #[test]
    fn test_store_with_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        let dir_arg = dir.path().to_string_lossy().into_owned();
        let (files, store) = parse_process_args(
            &args(&["a.txt", "--store", &dir_arg]),
            &PipelineConfig::default(),
        );
        assert_eq!(files, vec![PathBuf::from("a.txt")]);
        assert_eq!(store.as_deref(), Some(dir.path()));
    }
}

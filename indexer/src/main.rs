use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};
use walkdir::WalkDir;
use wordindex::persist::{load_index, load_meta, IndexPaths};
use wordindex::{assign_ids, DefaultSource, Document, DocumentInput, FileSink, IndexConfig, Pipeline, Source, StopWords};

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Build a bucketed inverted index with a map-reduce pass", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the index from a JSON/JSONL document list or a directory of text files
    Build {
        /// Input path (file or directory)
        #[arg(long)]
        input: String,
        /// Output index directory
        #[arg(long)]
        output: String,
        /// JSON config file (bucketCapacity, stopWords, fetchTimeoutSecs, maxConcurrentMappers)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Stop-word list, one word per line
        #[arg(long)]
        stop_words: Option<PathBuf>,
        /// Surviving terms per bucket
        #[arg(long)]
        bucket_capacity: Option<usize>,
        /// Maximum documents mapped at once
        #[arg(long)]
        concurrency: Option<usize>,
        /// Per-document fetch timeout in seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
    /// Print the summary of a built index, or the occurrences of one term
    Show {
        /// Index directory path
        #[arg(long, default_value = "./index")]
        index: String,
        #[arg(long)]
        term: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { input, output, config, stop_words, bucket_capacity, concurrency, timeout_secs } => {
            let mut cfg = match config {
                Some(path) => IndexConfig::from_json_file(&path)?,
                None => IndexConfig::default(),
            };
            if let Some(path) = stop_words {
                cfg.stop_words = StopWords::from_file(&path)?;
            }
            if let Some(n) = bucket_capacity { cfg.bucket_capacity = n; }
            if let Some(n) = concurrency { cfg.max_concurrent_mappers = n; }
            if let Some(n) = timeout_secs { cfg.fetch_timeout_secs = n; }
            cfg.validate()?;
            build_index(&input, &output, cfg).await
        }
        Commands::Show { index, term } => show_index(&index, term.as_deref()),
    }
}

async fn build_index(input: &str, output: &str, config: IndexConfig) -> Result<()> {
    let documents = load_documents(Path::new(input))?;
    tracing::info!(documents = documents.len(), input, "loaded documents");

    let source = DefaultSource::new(config.fetch_timeout())?;
    let pipeline = Pipeline::new(config, source);
    let sink = FileSink::new(output);
    let batch = pipeline.run_and_persist(documents, &sink).await?;

    for w in &batch.warnings {
        tracing::warn!(doc_id = w.document_id, doc = %w.document_name, kind = ?w.kind, reason = %w.reason, "document did not contribute");
    }
    println!("{}", serde_json::to_string_pretty(&batch)?);
    Ok(())
}

fn show_index(index_dir: &str, term: Option<&str>) -> Result<()> {
    let paths = IndexPaths::new(index_dir);
    match term {
        Some(term) => {
            let index = load_index(&paths).with_context(|| format!("failed to load index from {index_dir}"))?;
            let occurrences = index.get(term).unwrap_or_default();
            println!("{}", serde_json::to_string_pretty(occurrences)?);
        }
        None => {
            let meta = load_meta(&paths)?;
            println!("{}", serde_json::to_string_pretty(&meta)?);
        }
    }
    Ok(())
}

/// Documents get ids `1..=N` in the order they are read.
fn load_documents(input: &Path) -> Result<Vec<Document>> {
    let mut inputs = Vec::new();
    if input.is_dir() {
        let mut files: Vec<PathBuf> = WalkDir::new(input)
            .into_iter()
            .filter_map(|e| e.ok())
            .map(|e| e.into_path())
            .filter(|p| p.is_file() && matches!(p.extension().and_then(|s| s.to_str()), Some("txt" | "md")))
            .collect();
        files.sort();
        for path in files {
            let name = path.strip_prefix(input).unwrap_or(&path).to_string_lossy().into_owned();
            inputs.push(DocumentInput { name, source: Source::Path(path) });
        }
    } else if input.extension().and_then(|s| s.to_str()) == Some("jsonl") {
        read_jsonl(input, &mut inputs)?;
    } else if input.is_file() {
        read_json(input, &mut inputs)?;
    } else {
        bail!("input {} does not exist", input.display());
    }
    Ok(assign_ids(inputs))
}

fn read_jsonl(file: &Path, inputs: &mut Vec<DocumentInput>) -> Result<()> {
    let reader = BufReader::new(File::open(file)?);
    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() { continue; }
        let doc: DocumentInput = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}: invalid document", file.display(), lineno + 1))?;
        inputs.push(doc);
    }
    Ok(())
}

fn read_json(file: &Path, inputs: &mut Vec<DocumentInput>) -> Result<()> {
    let reader = BufReader::new(File::open(file)?);
    let json: serde_json::Value = serde_json::from_reader(reader)?;
    match json {
        serde_json::Value::Array(arr) => {
            for v in arr {
                inputs.push(serde_json::from_value(v)?);
            }
        }
        serde_json::Value::Object(_) => inputs.push(serde_json::from_value(json)?),
        _ => bail!("{} holds neither a document nor a list of documents", file.display()),
    }
    Ok(())
}

//! kiln-run: Flatten one window of documents into schema-bound tables
//!
//! Usage:
//!   # Stage everything locally, upload nothing
//!   kiln-run --plan demos/pipeline.toml --source demos/documents.json \
//!       --start 2024-01-01 --end 2024-01-01
//!
//!   # Mirror artifacts into an upload directory
//!   DATA_STARTED_DATE=2024-01-01 DATA_ENDED_DATE=2024-01-31 \
//!       kiln-run --plan demos/pipeline.toml --source exports/decisions.jsonl \
//!       --upload-dir /mnt/warehouse
//!
//! String settings may name a secret instead of a value:
//! `--source '{aws_secret}decision_export'` resolves through `--secrets`.

// Use MiMalloc allocator for better performance (recommended by simd-json)
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{Context, Result};
use chrono::{FixedOffset, NaiveDate};
use clap::Parser;
use kiln::output::{DryRunSink, MirrorSink, StorageSink, TableWriter};
use kiln::pipeline::{Pipeline, PipelinePlan};
use kiln::secrets::{JsonFileSecretSource, NoSecrets, SecretResolver, SecretSource};
use kiln::source::{JsonFileSource, Window};
use std::path::PathBuf;
use tracing::{info, Level};

#[derive(Parser, Debug)]
#[command(name = "kiln-run")]
#[command(about = "Flatten a window of nested documents into schema-bound tables", long_about = None)]
struct Args {
    /// Pipeline plan (TOML)
    #[arg(long, value_name = "FILE")]
    plan: PathBuf,

    /// Document export to read (JSON array or NDJSON)
    #[arg(long, env = "KILN_SOURCE")]
    source: String,

    /// First day of the window (YYYY-MM-DD)
    #[arg(long, env = "DATA_STARTED_DATE")]
    start: NaiveDate,

    /// Last day of the window, inclusive (YYYY-MM-DD)
    #[arg(long, env = "DATA_ENDED_DATE")]
    end: NaiveDate,

    /// Document field holding the request timestamp
    #[arg(long, default_value = "request_time")]
    timestamp_field: String,

    /// Offset in hours of document timestamps written without one
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    source_offset_hours: i32,

    /// Bucket prefix of every object key
    #[arg(long, env = "KILN_BUCKET", default_value = "kw")]
    bucket: String,

    /// Local staging directory
    #[arg(long, default_value = "staging")]
    staging_dir: PathBuf,

    /// Mirror artifacts into this directory; without it nothing is uploaded
    #[arg(long, env = "KILN_UPLOAD_DIR")]
    upload_dir: Option<String>,

    /// Secret bundle (flat JSON object) for `{aws_secret}` settings
    #[arg(long, env = "KILN_SECRETS_FILE")]
    secrets: Option<PathBuf>,

    /// Log at debug level
    #[arg(long, short = 'v')]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(if args.verbose { Level::DEBUG } else { Level::INFO })
        .init();

    let secret_source: Box<dyn SecretSource> = match &args.secrets {
        Some(path) => Box::new(JsonFileSecretSource::new(path)),
        None => Box::new(NoSecrets),
    };
    let resolver = SecretResolver::new(secret_source);

    let source_path = resolver
        .resolve_value(&args.source)
        .context("Failed to resolve --source")?;
    let upload_dir = args
        .upload_dir
        .as_deref()
        .map(|raw| resolver.resolve_value(raw))
        .transpose()
        .context("Failed to resolve --upload-dir")?;

    let window = Window::from_dates(args.start, args.end).context("Invalid extraction window")?;
    let offset = FixedOffset::east_opt(args.source_offset_hours * 3600)
        .context("--source-offset-hours is out of range")?;

    let plan = PipelinePlan::load(&args.plan)
        .with_context(|| format!("Failed to load plan {}", args.plan.display()))?;

    let sink: Box<dyn StorageSink> = match upload_dir {
        Some(dir) => Box::new(MirrorSink::new(dir)),
        None => Box::new(DryRunSink),
    };
    let writer = TableWriter::new(&args.staging_dir, &args.bucket, window.as_of(), sink);

    let mut source = JsonFileSource::new(&source_path)
        .with_timestamp_field(&args.timestamp_field)
        .with_assumed_offset(offset);

    info!(
        start = %args.start,
        end = %args.end,
        datasets = plan.datasets.len(),
        "starting run"
    );

    let mut pipeline = Pipeline::new(plan, writer);
    let summary = pipeline
        .run_window(&mut source, &window)
        .context("Pipeline run failed")?;

    info!(
        documents = summary.documents,
        tables = summary.tables.len(),
        records = summary.total_records(),
        "done"
    );
    Ok(())
}

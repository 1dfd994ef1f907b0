//! Lineage Ingest - metadata lineage crawler

use anyhow::{Context, Result};
use clap::Parser;
use lineage_common::logging::{init_logging, LogConfig, LogLevel};
use lineage_common::types::load_batch;
use lineage_ingest::{CrawlConfig, JsonLinesSink, LineageCrawler, MemorySink, RecordSink};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "lineage-ingest")]
#[command(author, version, about = "Metadata lineage crawler")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Parser, Debug)]
enum Command {
    /// Crawl the lineage of a batch of records
    Crawl {
        /// JSON file holding an array of records
        #[arg(short, long)]
        input: PathBuf,

        /// Append resolved records to this JSON-lines file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Metadata service base URL
        #[arg(long, env = "LINEAGE_BASE_URL")]
        base_url: Option<String>,

        /// Stop crawling below this depth
        #[arg(long)]
        max_depth: Option<u32>,

        /// Per-request timeout in seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    // Logs go to stderr so stdout carries only records.
    // Environment variables take precedence over flags
    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("lineage-ingest")
        .console_stderr(true)
        .build()
        .merge_env()?;

    let _guard = init_logging(&log_config)?;

    match cli.command {
        Command::Crawl {
            input,
            output,
            base_url,
            max_depth,
            timeout_secs,
        } => {
            let mut config = CrawlConfig::from_env()?;
            if let Some(base_url) = base_url {
                config = config.with_base_url(base_url);
            }
            if let Some(max_depth) = max_depth {
                config = config.with_max_depth(max_depth);
            }
            if let Some(secs) = timeout_secs {
                config = config.with_request_timeout_secs(secs);
            }
            config.validate()?;

            crawl(&config, &input, output).await?;
        },
    }

    Ok(())
}

async fn crawl(config: &CrawlConfig, input: &Path, output: Option<PathBuf>) -> Result<()> {
    let path = input.to_path_buf();
    let records = tokio::task::spawn_blocking(move || load_batch(path))
        .await?
        .with_context(|| format!("Failed to load batch from {}", input.display()))?;

    info!(
        input = %input.display(),
        records = records.len(),
        base_url = %config.base_url,
        max_depth = config.max_depth,
        "Starting crawl"
    );

    let memory = Arc::new(MemorySink::new());
    let jsonl = output.map(|path| Arc::new(JsonLinesSink::new(path)));
    let sink: Arc<dyn RecordSink> = match &jsonl {
        Some(sink) => Arc::clone(sink) as Arc<dyn RecordSink>,
        None => memory.clone(),
    };

    let crawler = LineageCrawler::new(config, sink)?;
    let batch = crawler.with_table_detail_references(records);

    let started = Instant::now();
    let Some(batch_id) = crawler.submit_batch(batch) else {
        info!("Nothing to crawl");
        return Ok(());
    };
    crawler.wait_idle().await;

    match jsonl {
        Some(sink) => info!(
            batch_id = %batch_id,
            written = sink.written(),
            output = %sink.path().display(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Crawl complete"
        ),
        None => {
            let written = memory.write_json_lines(std::io::stdout().lock())?;
            info!(
                batch_id = %batch_id,
                records = written,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Crawl complete"
            );
        },
    }

    Ok(())
}

mod config;
mod crawl;
mod error;
mod loader;
mod output;
mod parser;

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;

use config::ChunkConfig;

#[derive(Parser)]
#[command(name = "docs_chunker", about = "Chunk crawled documentation pages for search ingestion")]
struct Cli {
    /// Config file (default: ./chunker.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Turn a crawl export into chunk files
    Transform {
        /// Crawl export (default: newest crawl_results*.json in --dir)
        #[arg(short, long)]
        input: Option<PathBuf>,
        /// Directory searched for crawl exports
        #[arg(long, default_value = ".")]
        dir: PathBuf,
        /// Where chunks_*.json and chunks.md are written
        #[arg(short, long, default_value = ".")]
        out_dir: PathBuf,
        #[arg(long)]
        max_words: Option<usize>,
        #[arg(long)]
        max_depth: Option<usize>,
        /// Attach semantic and fulltext boost phrases
        #[arg(long)]
        boost: bool,
    },
    /// Upload a chunk file in batches
    Load {
        /// Chunk file (default: newest chunks*.json, boosted files excluded)
        #[arg(short, long)]
        input: Option<PathBuf>,
        /// Update existing chunks by tracking id instead of creating them
        #[arg(long)]
        upsert: bool,
        /// Dataset variable name or suffix, e.g. "boost" for TRIEVE_DATASET_ID_BOOST
        #[arg(short, long)]
        dataset: Option<String>,
        /// Log batches without sending them
        #[arg(long)]
        dry_run: bool,
    },
    /// Summarize a chunk file
    Stats {
        /// Chunk file (default: newest chunks*.json, boosted files excluded)
        #[arg(short, long)]
        input: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let mut config = ChunkConfig::load(cli.config.as_deref())?;

    let result = match cli.command {
        Commands::Transform {
            input,
            dir,
            out_dir,
            max_words,
            max_depth,
            boost,
        } => {
            if let Some(n) = max_words {
                config.max_words = n;
            }
            if let Some(d) = max_depth {
                config.max_depth = d;
            }
            config.boost |= boost;
            config.validate()?;

            let input = match input {
                Some(path) => path,
                None => crawl::latest_crawl_file(&dir)?,
            };
            let config = config.with_timestamp(crawl::batch_timestamp(&input));
            info!("Batch {} from {}", config.timestamp, input.display());

            let pages = crawl::read_crawl_results(&input, &config)?;
            println!("Chunking {} pages...", pages.len());
            let chunks = parser::process_pages(&pages, &config)?;

            let json = output::write_json(&chunks, &out_dir, &config.timestamp, config.boost)?;
            let report = output::write_markdown(&chunks, &out_dir)?;
            println!(
                "Wrote {} chunks to {} ({})",
                chunks.len(),
                json.display(),
                report.display()
            );
            Ok(())
        }
        Commands::Load {
            input,
            upsert,
            dataset,
            dry_run,
        } => {
            let input = chunk_file(input)?;
            let chunks = output::read_chunks(&input)?;
            if chunks.is_empty() {
                println!("No chunks in {}.", input.display());
                return Ok(());
            }
            let target = loader::Target::from_env(&config.api_base_url, dataset.as_deref(), dry_run)?;
            println!(
                "{} {} chunks from {} to {}...",
                if upsert { "Upserting" } else { "Creating" },
                chunks.len(),
                input.display(),
                target.dataset_name
            );
            let stats = loader::load_chunks(chunks, &target, upsert, dry_run).await?;
            println!("Done: {} chunks in {} batches.", stats.chunks, stats.batches);
            Ok(())
        }
        Commands::Stats { input } => {
            let input = chunk_file(input)?;
            let chunks = output::read_chunks(&input)?;
            let s = output::ChunkStats::from_chunks(&chunks);
            println!("Total chunks:      {}", s.total);
            println!("Average length:    {:.2} words", s.average_words);
            println!("Heading first:     {}", s.heading_first);
            if let Some((words, id)) = &s.smallest {
                println!("Smallest:          {} words ({})", words, id);
            }
            if let Some((words, id)) = &s.largest {
                println!("Largest:           {} words ({})", words, id);
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn chunk_file(input: Option<PathBuf>) -> Result<PathBuf> {
    match input {
        Some(path) => Ok(path),
        None => output::latest_chunks_file(Path::new(".")),
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

mod assemble;
mod browser;
mod chunks;
mod config;
mod error;
mod extract;
mod model;
mod partition;
mod results;
mod scraper;

use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{Args, Parser, Subcommand};

use crate::browser::ChromeRenderer;
use crate::config::{require_dir, Access, AssemblerParams, PartitionerParams, ScraperParams};
use crate::extract::ExtractRules;

#[derive(Parser)]
#[command(
    name = "cheapest_scraper",
    about = "Split search URLs into chunks, scrape them with headless Chromium, pick the cheapest product"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Filter source URLs and write them as numbered chunk files
    Partition(PartitionArgs),
    /// Scrape every chunk file and write one result document per chunk
    Scrape(ScrapeArgs),
    /// Reduce all chunk results to the single cheapest item
    Assemble(AssembleArgs),
    /// Partition + scrape + assemble in one go
    Run(RunArgs),
}

#[derive(Args)]
struct PartitionArgs {
    /// Files holding URLs (JSON array, {"urls": [...]}, or one per line)
    #[arg(long, env = "SOURCE_DIR")]
    source_dir: PathBuf,
    #[arg(long, env = "CHUNKS_DIR")]
    chunks_dir: PathBuf,
    /// JSON, e.g. {"chunk_size": 2, "urls": ["https://www.amazon.com/s?k=echo"]}
    #[arg(long, env = "PARTITIONER_PARAMS", default_value = "{}")]
    params: String,
}

#[derive(Args)]
struct ScrapeArgs {
    #[arg(long, env = "CHUNKS_DIR")]
    chunks_dir: PathBuf,
    #[arg(long, env = "TASK_RESULTS_DIR")]
    results_dir: PathBuf,
    /// JSON, e.g. {"headless": true, "timeout": 30000, "delay_between_requests": 2}
    #[arg(long, env = "APP_PARAMS", default_value = "{}")]
    params: String,
}

#[derive(Args)]
struct AssembleArgs {
    #[arg(long, env = "TASK_RESULTS_DIR")]
    results_dir: PathBuf,
    #[arg(long, env = "OUTPUT_DIR")]
    output_dir: PathBuf,
    #[arg(long, env = "ASSEMBLER_PARAMS", default_value = "{}")]
    params: String,
}

#[derive(Args)]
struct RunArgs {
    #[arg(long, env = "SOURCE_DIR")]
    source_dir: PathBuf,
    #[arg(long, env = "CHUNKS_DIR")]
    chunks_dir: PathBuf,
    #[arg(long, env = "TASK_RESULTS_DIR")]
    results_dir: PathBuf,
    #[arg(long, env = "OUTPUT_DIR")]
    output_dir: PathBuf,
    #[arg(long, env = "PARTITIONER_PARAMS", default_value = "{}")]
    partitioner_params: String,
    #[arg(long, env = "APP_PARAMS", default_value = "{}")]
    scraper_params: String,
    #[arg(long, env = "ASSEMBLER_PARAMS", default_value = "{}")]
    assembler_params: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Partition(args) => run_partition(&args.source_dir, &args.chunks_dir, &args.params),
        Commands::Scrape(args) => run_scrape(&args.chunks_dir, &args.results_dir, &args.params).await,
        Commands::Assemble(args) => run_assemble(&args.results_dir, &args.output_dir, &args.params),
        Commands::Run(args) => {
            // Validate everything up front so a bad output dir fails before any scraping.
            require_dir("Source", &args.source_dir, Access::Read)?;
            require_dir("Chunks", &args.chunks_dir, Access::Write)?;
            require_dir("Task results", &args.results_dir, Access::Write)?;
            require_dir("Output", &args.output_dir, Access::Write)?;

            run_partition(&args.source_dir, &args.chunks_dir, &args.partitioner_params)?;
            run_scrape(&args.chunks_dir, &args.results_dir, &args.scraper_params).await?;
            run_assemble(&args.results_dir, &args.output_dir, &args.assembler_params)
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn run_partition(source_dir: &Path, chunks_dir: &Path, raw_params: &str) -> anyhow::Result<()> {
    require_dir("Source", source_dir, Access::Read)?;
    require_dir("Chunks", chunks_dir, Access::Write)?;
    let params = PartitionerParams::load(raw_params)?;

    let report = partition::run(source_dir, chunks_dir, &params)?;
    println!(
        "Created {} chunks from {} valid URLs ({} seen).",
        report.chunks.len(),
        report.urls_valid,
        report.urls_seen
    );
    Ok(())
}

async fn run_scrape(chunks_dir: &Path, results_dir: &Path, raw_params: &str) -> anyhow::Result<()> {
    require_dir("Chunks", chunks_dir, Access::Read)?;
    require_dir("Task results", results_dir, Access::Write)?;
    let params = ScraperParams::load(raw_params)?;
    let rules = ExtractRules::new(params.title_patterns.as_deref())?;

    if chunks::list_chunks(chunks_dir)?.is_empty() {
        println!("No chunk files in {}. Run 'partition' first.", chunks_dir.display());
        return Ok(());
    }

    let renderer = ChromeRenderer::launch(params.headless).await?;
    let stats = scraper::scrape_chunks(&renderer, chunks_dir, results_dir, &params, &rules).await;
    renderer.shutdown().await;
    let stats = stats?;

    println!(
        "Done: {} chunks, {} URLs ({} items, {} errors, {} dropped).",
        stats.chunks, stats.urls, stats.items, stats.errors, stats.dropped
    );
    if stats.skipped_chunks > 0 {
        println!("Skipped {} unreadable chunk files.", stats.skipped_chunks);
    }
    Ok(())
}

fn run_assemble(results_dir: &Path, output_dir: &Path, raw_params: &str) -> anyhow::Result<()> {
    require_dir("Task results", results_dir, Access::Read)?;
    require_dir("Output", output_dir, Access::Write)?;
    let params = AssemblerParams::load(raw_params)?;

    let agg = assemble::run(results_dir, output_dir, &params)?;
    match &agg.cheapest_item {
        Some(item) => println!(
            "Cheapest of {} items: {} at {} ({})",
            agg.total_items_analyzed,
            truncate(&item.title, 60),
            item.price_display,
            item.url
        ),
        None => println!("No priced items among {} analyzed.", agg.total_items_analyzed),
    }
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
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

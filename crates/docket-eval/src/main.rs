//! docket evaluation tool
//!
//! Scores retrieval engines against a judged dataset and compares saved
//! runs.
//!
//! # Usage
//!
//! ```bash
//! # Score the default engine and save the report
//! cargo run -p docket-eval --release -- run \
//!     --corpus data/opinions --dataset eval/dataset.json --output runs/
//!
//! # Score several engines over the same index
//! cargo run -p docket-eval --release -- run \
//!     --corpus data/opinions --dataset eval/dataset.json --engine bm25,citation_fusion
//!
//! # Paired comparison of two saved reports
//! cargo run -p docket-eval --release -- compare runs/bm25.json runs/citation_fusion.json
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use docket_core::embedding::build_embedder;
use docket_core::evaluation::{load_dataset, EvaluationReport, Scorer};
use docket_core::processing::EmbeddingProgress;
use docket_core::search::{build_engine, EngineKind, IndexSet};
use docket_core::EngineConfig;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

// =============================================================================
// CLI
// =============================================================================

#[derive(Parser, Debug)]
#[command(name = "docket-eval", version)]
#[command(about = "Evaluate docket retrieval quality")]
struct Args {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Score one or more engines against a judged dataset
    Run(RunArgs),
    /// Compare two saved reports query by query
    Compare {
        /// Baseline report
        baseline: PathBuf,
        /// Candidate report
        candidate: PathBuf,
    },
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    /// Corpus directory of `{id}.json` opinions
    #[arg(long, env = "DOCKET_CORPUS")]
    corpus: PathBuf,

    /// Judged dataset (JSON)
    #[arg(long)]
    dataset: PathBuf,

    /// Index directory, shared across runs over the same corpus
    #[arg(long, default_value = "target/eval-index")]
    index_dir: PathBuf,

    /// Engine configuration file (default: ./docket.toml if present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Engines to score (comma-separated), or `all`
    #[arg(long, value_delimiter = ',', default_value = "citation_fusion")]
    engine: Vec<String>,

    /// Results requested per query
    #[arg(long, default_value_t = docket_core::config::DEFAULT_TOP_K)]
    top_k: usize,

    /// Queries evaluated at once
    #[arg(long, default_value_t = 1)]
    concurrency: usize,

    /// Write `{engine}.json` reports into this directory
    #[arg(long)]
    output: Option<PathBuf>,

    /// Discard the stored index and build from scratch
    #[arg(long)]
    rebuild: bool,

    /// Print one line per query
    #[arg(long)]
    per_query: bool,
}

// =============================================================================
// Setup
// =============================================================================

fn init_logging(verbose: bool, json: bool) {
    let default = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn bar_style() -> Result<ProgressStyle> {
    Ok(ProgressStyle::default_bar()
        .template("{msg:>16} [{bar:40}] {pos}/{len}")
        .context("Invalid progress template")?
        .progress_chars("=> "))
}

/// Parses `--engine` values; `all` expands to every engine.
fn parse_engines(names: &[String]) -> Result<Vec<EngineKind>> {
    if names.iter().any(|n| n.trim() == "all") {
        return Ok(EngineKind::ALL.to_vec());
    }
    let mut kinds = Vec::with_capacity(names.len());
    for name in names {
        let kind: EngineKind = name.parse().map_err(anyhow::Error::msg)?;
        if !kinds.contains(&kind) {
            kinds.push(kind);
        }
    }
    if kinds.is_empty() {
        bail!("No engine selected");
    }
    Ok(kinds)
}

async fn open_index(args: &RunArgs, config: EngineConfig) -> Result<Arc<IndexSet>> {
    let embedder = build_embedder(&config.embedding).context("Failed to create embedder")?;
    std::fs::create_dir_all(&args.index_dir).with_context(|| {
        format!("Failed to create index directory: {}", args.index_dir.display())
    })?;

    let pb = ProgressBar::with_draw_target(None, ProgressDrawTarget::hidden());
    pb.set_style(bar_style()?);
    let mut current_view = None;
    let on_progress = |progress: EmbeddingProgress| {
        if current_view != Some(progress.view) {
            current_view = Some(progress.view);
            pb.set_draw_target(ProgressDrawTarget::stderr());
            pb.reset();
            pb.set_length(progress.texts_total as u64);
            pb.set_message(format!("embed {}", progress.view));
        }
        pb.set_position(progress.texts_completed as u64);
    };

    let index = IndexSet::initialize(
        &args.corpus,
        &args.index_dir,
        embedder,
        config,
        args.rebuild,
        on_progress,
    )
    .await
    .with_context(|| format!("Failed to open index for corpus {}", args.corpus.display()))?;
    pb.finish_and_clear();

    Ok(Arc::new(index))
}

// =============================================================================
// Commands
// =============================================================================

async fn run(args: RunArgs) -> Result<()> {
    let kinds = parse_engines(&args.engine)?;
    let config = EngineConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    let dataset = load_dataset(&args.dataset)?;
    if dataset.is_empty() {
        bail!("Dataset {} has no judged queries", args.dataset.display());
    }

    let index = open_index(&args, config).await?;
    eprintln!(
        "Evaluating {} queries over {} opinions",
        dataset.len(),
        index.len()
    );

    let scorer = Scorer::new()
        .with_top_k(args.top_k)
        .with_concurrency(args.concurrency);

    let mut reports = Vec::with_capacity(kinds.len());
    for kind in kinds {
        let engine = build_engine(kind, index.clone());

        let pb = ProgressBar::new(dataset.len() as u64);
        pb.set_style(bar_style()?);
        pb.set_message(kind.to_string());
        let report = scorer
            .run_with_progress(engine.as_ref(), &dataset, |_| pb.inc(1))
            .await?;
        pb.finish_and_clear();

        print!("{}", report.scorecard());
        if args.per_query {
            print_per_query(&report);
        }

        if let Some(dir) = &args.output {
            let path = save_report(&report, dir)?;
            eprintln!("Saved {}", path.display());
        }
        reports.push(report);
    }

    if let Some((baseline, rest)) = reports.split_first() {
        for candidate in rest {
            println!();
            print!("{}", baseline.compare(candidate).table());
        }
    }

    Ok(())
}

fn save_report(report: &EvaluationReport, dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory: {}", dir.display()))?;
    let path = dir.join(format!("{}.json", report.engine));
    report.write_json(&path)?;
    info!(path = %path.display(), "Wrote report");
    Ok(path)
}

fn print_per_query(report: &EvaluationReport) {
    println!();
    println!("{:<12} {:>7} {:>7} {:>7} {:>8}  query", "id", "MRR", "nDCG@10", "R@20", "ms");
    for result in &report.per_query {
        let text: String = result.query_text.chars().take(40).collect();
        println!(
            "{:<12} {:>7.3} {:>7.3} {:>7.3} {:>8.1}  {}",
            result.query_id,
            result.metrics.mrr,
            result.metrics.ndcg_10,
            result.metrics.recall_20,
            result.elapsed_ms,
            text
        );
    }
}

fn compare(baseline: &Path, candidate: &Path) -> Result<()> {
    let a = EvaluationReport::read_json(baseline)
        .with_context(|| format!("Failed to read report {}", baseline.display()))?;
    let b = EvaluationReport::read_json(candidate)
        .with_context(|| format!("Failed to read report {}", candidate.display()))?;

    let comparison = a.compare(&b);
    if comparison.paired_queries == 0 {
        bail!("Reports share no query ids");
    }
    print!("{}", comparison.table());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose, args.log_json);

    match args.command {
        Command::Run(run_args) => run(run_args).await,
        Command::Compare {
            baseline,
            candidate,
        } => compare(&baseline, &candidate),
    }
}

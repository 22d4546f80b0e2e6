//! docket - search a legal-opinion corpus from the command line.
//!
//! # Usage
//!
//! ```bash
//! # Build (or resume building) the index for a corpus
//! docket --corpus data/opinions build
//!
//! # Search with the default citation-aware engine
//! docket --corpus data/opinions search "Section 87103(a) disqualification"
//!
//! # Compare engines and see how a query was routed
//! docket --corpus data/opinions search "gift limits" --engine bm25 -n 5
//! docket --corpus data/opinions search "87103(a)" --explain --json
//! ```

mod config;
mod output;
mod search;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use config::{index_dir, load_engine_config, FlagOverrides};
use docket_core::config::EmbeddingProvider;
use docket_core::search::EngineKind;
use search::{execute_search, open_index, IndexLocation};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Hybrid lexical, semantic and citation search over advisory opinions.
#[derive(Parser)]
#[command(name = "docket", version, about)]
struct Cli {
    /// Corpus directory of `{id}.json` opinions
    #[arg(long, env = "DOCKET_CORPUS", global = true, default_value = "data/opinions")]
    corpus: PathBuf,

    /// Index directory (default: platform data directory)
    #[arg(long, global = true)]
    index_dir: Option<PathBuf>,

    /// Engine configuration file (default: ./docket.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Embedding provider, overriding the configuration
    #[arg(long, value_enum, global = true)]
    provider: Option<ProviderArg>,

    /// Circuit-breaker threshold, overriding the configuration
    #[arg(long, global = true)]
    cb_threshold: Option<f32>,

    /// Discard the stored index and build from scratch
    #[arg(long, global = true)]
    rebuild: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build or load the index and report its size
    Build,
    /// Run one query
    Search {
        /// Search query
        query: String,

        /// Maximum number of results to return
        #[arg(short = 'n', long, default_value_t = docket_core::config::DEFAULT_TOP_K)]
        top_k: usize,

        /// Retrieval engine
        #[arg(long, default_value = "citation_fusion", value_parser = parse_engine)]
        engine: EngineKind,

        /// Show the route taken and per-arm scores
        #[arg(long)]
        explain: bool,

        /// Output results as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ProviderArg {
    Hashing,
    Http,
}

impl From<ProviderArg> for EmbeddingProvider {
    fn from(arg: ProviderArg) -> Self {
        match arg {
            ProviderArg::Hashing => EmbeddingProvider::Hashing,
            ProviderArg::Http => EmbeddingProvider::Http,
        }
    }
}

fn parse_engine(s: &str) -> Result<EngineKind, String> {
    s.parse()
}

/// Installs the log subscriber on stderr. `RUST_LOG` wins over `--verbose`.
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

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_json);

    let flags = FlagOverrides {
        cb_threshold: cli.cb_threshold,
        provider: cli.provider.map(Into::into),
    };
    let engine_config = load_engine_config(cli.config.as_deref(), &flags)?;
    let index_dir = index_dir(cli.index_dir.as_ref())?;

    let location = IndexLocation {
        corpus: &cli.corpus,
        index_dir: &index_dir,
        rebuild: cli.rebuild,
    };
    let index = open_index(location, engine_config).await?;

    match cli.command {
        Command::Build => {
            let manifest = index.manifest();
            let views: Vec<&str> = manifest.views.iter().map(|v| v.as_str()).collect();
            println!(
                "Index ready: {} opinions, views [{}], embedder {} ({} dims)\n  {}",
                index.len(),
                views.join(", "),
                manifest.embedder,
                manifest.embedding_dimension,
                index_dir.display()
            );
        }
        Command::Search {
            query,
            top_k,
            engine,
            explain,
            json,
        } => {
            let outcome = execute_search(index, engine, &query, top_k).await?;
            let output = if json {
                output::format_json(&query, engine.as_str(), &outcome)
            } else {
                output::format_human(&query, &outcome, explain)
            };
            println!("{}", output);
        }
    }

    Ok(())
}

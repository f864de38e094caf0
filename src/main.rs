//! # tell-me-why CLI (`tmw`)
//!
//! ## Usage
//!
//! ```bash
//! tmw --config ./config/tmw.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `tmw init` | Create the vector store and the documents directory |
//! | `tmw ingest` | Load, split, embed and store the documents tree |
//! | `tmw query "<question>"` | Answer a question from the index |
//! | `tmw stats` | Summarise what is indexed |
//! | `tmw models` | Show configured models and whether they are reachable |
//! | `tmw serve` | Start the HTTP API |
//! | `tmw config` | Print the effective configuration |
//!
//! ## Examples
//!
//! ```bash
//! # Re-index from scratch
//! tmw ingest --force
//!
//! # Count what would be indexed, write nothing
//! tmw ingest --path ../my-app --dry-run
//!
//! # Ask the cloud model, machine-readable output
//! tmw query "Where are routes guarded?" --provider claude --json
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use tell_me_why::assistant::{Assistant, ModelStatus, QueryResult};
use tell_me_why::config::{self, Config};
use tell_me_why::ingest::IngestResult;
use tell_me_why::llm::ProviderKind;
use tell_me_why::store::SqliteStore;
use tell_me_why::{server, stats};

/// tell-me-why: ask questions about your private code and docs.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/tmw.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "tmw",
    about = "tell-me-why: a local-first RAG assistant for your private code and docs",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/tmw.toml`. A missing file means all defaults.
    #[arg(long, global = true, default_value = "./config/tmw.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the index database and the documents directory.
    ///
    /// Idempotent: running it again leaves existing data untouched.
    Init,

    /// Ingest the documents tree into the vector store.
    ///
    /// Files that cannot be read or embedded are skipped and reported.
    Ingest {
        /// Directory to ingest instead of `paths.docs_root`.
        #[arg(long)]
        path: Option<PathBuf>,

        /// Clear the collection before ingesting.
        #[arg(long)]
        force: bool,

        /// Load and split only; report counts without embedding or writing.
        #[arg(long)]
        dry_run: bool,
    },

    /// Answer a question using retrieved context.
    Query {
        /// The question.
        question: String,

        /// `local` (alias `ollama`) or `cloud` (alias `claude`).
        /// Defaults to `llm.default`.
        #[arg(long, value_parser = parse_provider)]
        provider: Option<ProviderKind>,

        /// Print the full result as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show index statistics.
    Stats,

    /// Show configured models and their availability.
    Models,

    /// Start the HTTP API on `server.bind`.
    Serve,

    /// Print the effective configuration (after defaults and environment
    /// overrides) as TOML. The cloud API key is never printed.
    Config,
}

fn parse_provider(s: &str) -> std::result::Result<ProviderKind, String> {
    s.parse::<ProviderKind>().map_err(|e| e.to_string())
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let cfg = config::load_config(&cli.config)?;
    init_tracing(&cfg.logging.level);

    match cli.command {
        Commands::Init => run_init(&cfg).await?,
        Commands::Ingest {
            path,
            force,
            dry_run,
        } => {
            let assistant = Assistant::open(cfg).await?;
            let result = if dry_run {
                assistant.dry_run(path.as_deref()).await?
            } else {
                assistant.ingest(path.as_deref(), force).await?
            };
            print_ingest(&result);
        }
        Commands::Query {
            question,
            provider,
            json,
        } => {
            let assistant = Assistant::open(cfg).await?;
            let result = assistant.query(&question, provider).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_answer(&result);
            }
        }
        Commands::Stats => {
            let index_file = cfg.index_path();
            let assistant = Assistant::open(cfg).await?;
            let summary = assistant.stats().await?;
            print!("{}", stats::render(&summary, Some(&index_file)));
        }
        Commands::Models => {
            let assistant = Assistant::open(cfg).await?;
            let models = assistant.models().await;
            println!("Default provider: {}", models.default);
            println!();
            print_model("local", &models.local);
            print_model("cloud", &models.cloud);
        }
        Commands::Serve => {
            let assistant = Arc::new(Assistant::open(cfg).await?.with_config_path(&cli.config));
            server::run_server(assistant).await?;
        }
        Commands::Config => {
            let rendered =
                toml::to_string_pretty(&cfg).context("Failed to render configuration")?;
            print!("{}", rendered);
        }
    }

    Ok(())
}

async fn run_init(cfg: &Config) -> Result<()> {
    std::fs::create_dir_all(&cfg.paths.docs_root).with_context(|| {
        format!(
            "Failed to create documents directory: {}",
            cfg.paths.docs_root.display()
        )
    })?;
    std::fs::create_dir_all(&cfg.paths.vector_store).with_context(|| {
        format!(
            "Failed to create vector store directory: {}",
            cfg.paths.vector_store.display()
        )
    })?;

    let index = cfg.index_path();
    let store = SqliteStore::open(&index, &cfg.store.collection).await?;
    store.close().await;

    println!("Index initialized at {}", index.display());
    println!("Put code and docs under {}", cfg.paths.docs_root.display());
    Ok(())
}

fn print_ingest(result: &IngestResult) {
    println!("{}", result.message);
    println!("  documents: {}", result.documents_processed);
    println!("  chunks:    {}", result.chunks_created);
    if !result.warnings.is_empty() {
        println!();
        println!("Skipped:");
        for w in &result.warnings {
            println!("  - {}", w);
        }
    }
}

fn print_answer(result: &QueryResult) {
    println!("{}", result.answer);
    if !result.sources.is_empty() {
        println!();
        println!("Sources:");
        for (i, source) in result.sources.iter().enumerate() {
            println!("  [{}] {} ({:.3})", i + 1, source.file, source.score);
        }
    }
    println!();
    println!("{} ({})", result.privacy_note, result.model);
}

fn print_model(label: &str, status: &ModelStatus) {
    let availability = if status.available {
        "available"
    } else {
        "unavailable"
    };
    print!("  {:<6} {:<28} {}", label, status.model, availability);
    if let Some(endpoint) = &status.endpoint {
        print!("  {}", endpoint);
    }
    println!();
    println!("         {}", status.privacy);
}

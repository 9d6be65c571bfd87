//! # Campus QA CLI (`campus`)
//!
//! ## Usage
//!
//! ```bash
//! campus --config ./config/campus.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `campus chunk` | Chunk course documents into a JSON-lines chunk store |
//! | `campus ingest` | Embed a chunk store and write its vector index |
//! | `campus retrieve "<query>"` | Show the chunks nearest to a query |
//! | `campus ask "<question>"` | Answer a question from retrieved chunks |
//! | `campus inspect` | Show index size, build time and consistency |
//!
//! Every command takes `--course` and `--semester`; with neither, the
//! configured default chunk store and index are used.
//!
//! API keys (`GEMINI_API_KEY`, `OPENAI_API_KEY`) are read from the
//! environment, and from a `.env` file in the working directory if present.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use campus_qa::models::Scope;
use campus_qa::progress::ProgressMode;
use campus_qa::{chunk_cmd, config, ingest, inspect, qa, retriever};

/// Campus QA: retrieval-augmented answers over course material.
#[derive(Parser)]
#[command(name = "campus", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/campus.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Course and semester selecting one chunk store and index.
#[derive(Args, Clone, Debug)]
struct ScopeArgs {
    /// Course folder name (e.g. `FY`).
    #[arg(long, requires = "semester")]
    course: Option<String>,

    /// Semester folder name (e.g. `Sem-1`).
    #[arg(long, requires = "course")]
    semester: Option<String>,
}

impl ScopeArgs {
    fn scope(&self) -> anyhow::Result<Option<Scope>> {
        match (&self.course, &self.semester) {
            (None, None) => Ok(None),
            (course, semester) => Scope::from_parts(course.as_deref(), semester.as_deref()).map(Some),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Chunk course documents into a JSON-lines chunk store.
    ///
    /// Walks `docs_dir/<course>/<semester>/<subject>/`, splits each
    /// document into pages on form feeds and each page into overlapping
    /// word windows.
    Chunk {
        #[command(flatten)]
        scope: ScopeArgs,

        /// Write the chunk store here instead of the scope's default path.
        #[arg(long)]
        output: Option<PathBuf>,

        /// Only count documents, pages and chunks.
        #[arg(long)]
        dry_run: bool,
    },

    /// Embed a chunk store and write its vector index.
    Ingest {
        #[command(flatten)]
        scope: ScopeArgs,

        /// Embed at most this many chunks (0 = all). Falls back to `INGEST_LIMIT`.
        #[arg(long)]
        limit: Option<usize>,

        /// Progress output on stderr. Defaults to `human` on a terminal, `off` otherwise.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// Show the chunks nearest to a query.
    Retrieve {
        query: String,

        #[command(flatten)]
        scope: ScopeArgs,

        /// Number of chunks to return (default: `retrieval.top_k`).
        #[arg(long)]
        top_k: Option<usize>,

        /// Print hits as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Answer a question from retrieved course material.
    Ask {
        question: String,

        #[command(flatten)]
        scope: ScopeArgs,

        /// Number of chunks to put in the prompt (default: `retrieval.top_k`).
        #[arg(long)]
        top_k: Option<usize>,

        /// Print the answer and its sources as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show index size, build time and whether it matches its chunk store.
    Inspect {
        #[command(flatten)]
        scope: ScopeArgs,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("campus_qa=info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Chunk {
            scope,
            output,
            dry_run,
        } => {
            chunk_cmd::run_chunk(&cfg, scope.scope()?.as_ref(), output, dry_run)?;
        }
        Commands::Ingest {
            scope,
            limit,
            progress,
        } => {
            let progress = progress.unwrap_or_else(ProgressMode::default_for_tty);
            ingest::run_ingest(&cfg, scope.scope()?.as_ref(), limit, progress).await?;
        }
        Commands::Retrieve {
            query,
            scope,
            top_k,
            json,
        } => {
            retriever::run_retrieve(&cfg, &query, top_k, scope.scope()?.as_ref(), json).await?;
        }
        Commands::Ask {
            question,
            scope,
            top_k,
            json,
        } => {
            qa::run_ask(&cfg, &question, scope.scope()?.as_ref(), top_k, json).await?;
        }
        Commands::Inspect { scope } => {
            inspect::run_inspect(&cfg, scope.scope()?.as_ref())?;
        }
    }

    Ok(())
}

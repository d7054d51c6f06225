//! # health-rag CLI
//!
//! ## Usage
//!
//! ```bash
//! health-rag [--config ./health-rag.toml] <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `create_context <path>...` | Build a vector index from files and folders |
//! | `query <words>...` | Answer a question, with retrieval when an index is given |
//! | `chat_mode` | Interactive chat with conversation memory |
//! | `pull_model <name>` | Download a model with `ollama pull` |
//! | `remove_model <name>` | Delete a model with `ollama rm` |
//!
//! ## Exit codes
//!
//! `0` on success (skipped files included), `1` on any error, `2` when
//! `create_context` found nothing to index.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use health_rag::chat::{self, DEFAULT_SESSION_ID};
use health_rag::config;
use health_rag::ingest::{self, IngestOutcome};
use health_rag::ollama_cli;
use health_rag::progress::ProgressMode;
use health_rag::query;

/// health-rag — ingest documents into a local vector index and ask an
/// Ollama model about them.
#[derive(Parser)]
#[command(name = "health-rag", version, about)]
struct Cli {
    /// Path to a TOML configuration file. Built-in defaults apply without one.
    ///
    /// See `config/health-rag.example.toml` for every key.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a vector store from files and/or folders.
    ///
    /// Folders are searched recursively for supported files. Problem
    /// files are reported and skipped; the store is rebuilt from scratch.
    #[command(name = "create_context")]
    CreateContext {
        /// Paths to input files and/or folders.
        #[arg(required = true)]
        input_paths: Vec<PathBuf>,

        /// Directory to save the vector store.
        #[arg(long = "save_dir", short = 's', default_value = "vector_store")]
        save_dir: PathBuf,

        /// Embedding model to use [default: embedding.model, else nomic-embed-text].
        #[arg(long = "embedding_model", short = 'm')]
        embedding_model: Option<String>,

        /// Progress output on stderr [default: human when stderr is a terminal].
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// Ask a question, retrieving context from a vector store if given.
    Query {
        /// The query; multiple words are joined with spaces.
        #[arg(required = true)]
        query: Vec<String>,

        /// Path to a vector store directory created by `create_context`.
        #[arg(long = "vectorstore_path")]
        vectorstore_path: Option<PathBuf>,
    },

    /// Start an interactive chat session with memory.
    #[command(name = "chat_mode")]
    ChatMode {
        /// Conversation memory key.
        #[arg(long = "session-id", default_value = DEFAULT_SESSION_ID)]
        session_id: String,
    },

    /// Pull a model using the Ollama CLI.
    #[command(name = "pull_model")]
    PullModel {
        /// Model name (e.g. `llama3.2:1b`).
        model: String,
    },

    /// Remove a model using the Ollama CLI.
    #[command(name = "remove_model")]
    RemoveModel {
        /// Model name (e.g. `llama3.2:1b`).
        model: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let cfg = config::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::CreateContext {
            input_paths,
            save_dir,
            embedding_model,
            progress,
        } => {
            let progress = progress.unwrap_or_else(ProgressMode::default_for_tty);
            let outcome = ingest::run_create_context(
                &cfg,
                input_paths,
                &save_dir,
                embedding_model.as_deref(),
                progress,
            )
            .await?;
            if let IngestOutcome::Empty { .. } = outcome {
                return Ok(ExitCode::from(2));
            }
        }
        Commands::Query {
            query,
            vectorstore_path,
        } => {
            query::run_query(&cfg, &query, vectorstore_path.as_deref()).await?;
        }
        Commands::ChatMode { session_id } => {
            chat::run_chat_mode(&cfg, &session_id).await?;
        }
        Commands::PullModel { model } => {
            ollama_cli::pull_model(&model)?;
        }
        Commands::RemoveModel { model } => {
            ollama_cli::remove_model(&model)?;
        }
    }

    Ok(ExitCode::SUCCESS)
}

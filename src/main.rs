//! # docqa
//!
//! Command-line front end for the document question-answering backend.
//!
//! ## Commands
//!
//! - `docqa populate [--reset] [DIR]` - Index every document under a directory
//! - `docqa ingest <FILE>` - Store and index one document
//! - `docqa ask <QUESTION>` - Answer from the indexed documents
//! - `docqa list` - Show indexed sources
//! - `docqa delete <NAME>` - Remove a source and its stored file
//! - `docqa status` - Show index and model server status
//! - `docqa config init` - Write the default configuration file

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;

use docqa_backend::core::config::{AppConfig, AppPaths, ConfigService};
use docqa_backend::core::logging;
use docqa_backend::events::ChannelEvent;
use docqa_backend::rag::DocumentRecord;
use docqa_backend::state::AppState;

#[derive(Parser)]
#[command(name = "docqa")]
#[command(about = "Ask questions about your documents")]
#[command(version)]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format (text, json)
    #[arg(short, long, global = true, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Index every supported document under a directory
    Populate {
        /// Directory to read documents from
        #[arg(default_value = "data")]
        dir: PathBuf,

        /// Clear the index first
        #[arg(long)]
        reset: bool,
    },

    /// Store one document and index its chunks
    Ingest {
        file: PathBuf,

        /// Display name (defaults to the file name)
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Answer a question from the indexed documents
    Ask { question: String },

    /// List indexed sources and uploaded documents
    List,

    /// Delete a source, its chunks and its stored file
    Delete { name: String },

    /// Show index and model server status
    Status,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write the default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
    /// Print the effective configuration
    Show,
}

#[derive(Serialize)]
struct ListOutput {
    sources: Vec<String>,
    documents: Vec<DocumentRecord>,
}

#[derive(Serialize)]
struct StatusOutput {
    db_path: String,
    chunks: usize,
    sources: usize,
    embedding_model: String,
    indexed_with: Option<String>,
    language_model: String,
    ollama_url: String,
    ollama_reachable: bool,
    installed_models: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let paths = Arc::new(AppPaths::new());
    logging::init(&paths, cli.verbose);
    let config_service = ConfigService::new(paths.clone());

    let command = match cli.command {
        Commands::Config { action } => return run_config(&config_service, &action),
        command => command,
    };

    let state = AppState::initialize(paths).await?;

    match command {
        Commands::Populate { dir, reset } => {
            if reset {
                println!("Clearing index");
                state.ingestor.reset().await?;
            }
            let report = state
                .ingestor
                .populate(&dir)
                .await
                .with_context(|| format!("Failed to populate from {}", dir.display()))?;
            if report.added == 0 {
                println!("No new chunks to add ({} already indexed)", report.chunks);
            } else {
                println!("Added {} of {} chunks", report.added, report.chunks);
            }
        }
        Commands::Ingest { file, name } => {
            let bytes = tokio::fs::read(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let name = name.unwrap_or_else(|| {
                file.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default()
            });
            let added = state.ingestor.ingest(&bytes, &name).await?;
            println!("Indexed {}: {} new chunks", name, added);
        }
        Commands::Ask { question } => ask(&state, &question).await?,
        Commands::List => {
            let output = ListOutput {
                sources: state.ingestor.list_sources().await?.into_iter().collect(),
                documents: state.ingestor.list_documents().await?,
            };
            match cli.format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&output)?),
                OutputFormat::Text => {
                    if output.sources.is_empty() {
                        println!("No documents indexed");
                    }
                    for source in &output.sources {
                        println!("{}", source);
                    }
                }
            }
        }
        Commands::Delete { name } => {
            let removed = state.ingestor.delete(&name).await?;
            println!("Deleted {} ({} chunks)", name, removed);
        }
        Commands::Status => {
            let output = status(&state).await?;
            match cli.format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&output)?),
                OutputFormat::Text => print_status(&output),
            }
        }
        Commands::Config { .. } => {}
    }

    Ok(())
}

fn run_config(service: &ConfigService, action: &ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Init { force } => {
            let path = service.config_write_path();
            if path.exists() && !force {
                anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
            }
            let written = service.save_config(&AppConfig::default())?;
            println!("Wrote {}", written.display());
        }
        ConfigAction::Show => {
            let config = service.load_config()?;
            print!("{}", serde_yaml::to_string(&config)?);
        }
    }
    Ok(())
}

/// Stream the answer through the event hub and print it as it arrives.
async fn ask(state: &AppState, question: &str) -> Result<()> {
    let channel = state.config.rag.channel.clone();
    let answer = state.engine.answer(question).await?;

    let mut rx = state.events.subscribe(&channel).await;
    let printer = tokio::spawn(async move {
        let mut stdout = std::io::stdout();
        loop {
            match rx.recv().await {
                Ok(ChannelEvent::Message { text }) => {
                    let _ = write!(stdout, "{}", text);
                    let _ = stdout.flush();
                }
                Ok(ChannelEvent::Done) | Ok(ChannelEvent::Error { .. }) => break,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Dropped {} answer fragments", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
        let _ = writeln!(stdout);
    });

    let relayed = state.events.relay(&channel, answer.stream).await;
    let _ = printer.await;
    relayed?;

    if !answer.sources.is_empty() {
        println!("Sources: {}", answer.sources.join(", "));
    }
    Ok(())
}

async fn status(state: &AppState) -> Result<StatusOutput> {
    let ollama_reachable = state.ollama.health_check().await;
    let installed_models = if ollama_reachable {
        state
            .ollama
            .list_models()
            .await
            .map(|models| models.into_iter().map(|m| m.name).collect())
            .unwrap_or_default()
    } else {
        Vec::new()
    };

    Ok(StatusOutput {
        db_path: state.paths.db_path.display().to_string(),
        chunks: state.store.count().await?,
        sources: state.store.list_sources().await?.len(),
        embedding_model: state.config.ollama.embedding_model.clone(),
        indexed_with: state.store.embedding_model().await?,
        language_model: state.config.ollama.language_model.clone(),
        ollama_url: state.ollama.base_url().to_string(),
        ollama_reachable,
        installed_models,
    })
}

fn print_status(status: &StatusOutput) {
    println!("Index:            {}", status.db_path);
    println!("Chunks:           {}", status.chunks);
    println!("Sources:          {}", status.sources);
    println!(
        "Embedding model:  {} (index built with {})",
        status.embedding_model,
        status.indexed_with.as_deref().unwrap_or("-")
    );
    println!("Language model:   {}", status.language_model);
    println!(
        "Ollama:           {} ({})",
        status.ollama_url,
        if status.ollama_reachable { "reachable" } else { "unreachable" }
    );
    for model in &status.installed_models {
        println!("  - {}", model);
    }
}

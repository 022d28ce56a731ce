//! ragchat CLI - session retrieval from the terminal
//!
//! # Commands
//!
//! ```bash
//! # Ingest a file and a snippet into a session
//! ragchat add --session 4f6c... --file notes.md "remember the milk"
//!
//! # Show the context retrieved for a question
//! ragchat retrieve --session 4f6c... "what should I buy?" --scores
//!
//! # Build the grounded prompt sent to the model
//! ragchat prompt --session 4f6c... "what should I buy?"
//!
//! # Offline, without downloading a model
//! ragchat --embedder hashing sessions
//! ```

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ragchat_lib::{
    config::{EmbedderBackend, RagConfig},
    docstore::DocumentStore,
    embed::{Embedder, LazyEmbedder},
    prompt::{rag_prompt, NO_KNOWLEDGE},
    session::SessionManager,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ragchat")]
#[command(about = "Session-scoped retrieval for terminal chat")]
#[command(version)]
struct Cli {
    /// Config file (defaults to ~/.ollama_chat/ragchat.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding session indexes
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Embedding backend: "minilm", "ollama" or "hashing"
    #[arg(long, global = true)]
    embedder: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add texts and file contents to a session
    Add {
        /// Session identifier
        #[arg(short, long)]
        session: String,

        /// File to ingest as one document (repeatable)
        #[arg(short, long = "file")]
        files: Vec<PathBuf>,

        /// Texts to ingest, one document each
        texts: Vec<String>,
    },

    /// Print the context retrieved for a query
    Retrieve {
        /// Session identifier
        #[arg(short, long)]
        session: String,

        /// Query to search for
        query: String,

        /// Number of documents to return
        #[arg(short, long)]
        k: Option<usize>,

        /// Show each hit with its score instead of the joined context
        #[arg(long)]
        scores: bool,
    },

    /// Print the grounded prompt for a query
    Prompt {
        /// Session identifier
        #[arg(short, long)]
        session: String,

        /// The user's question
        query: String,

        /// Number of documents to include
        #[arg(short, long)]
        k: Option<usize>,
    },

    /// Show document count and dimension of a session
    Stats {
        /// Session identifier
        #[arg(short, long)]
        session: String,
    },

    /// List sessions with stored retrieval state
    Sessions,
}

fn load_config(cli: &Cli) -> Result<RagConfig> {
    let mut config = match &cli.config {
        Some(path) => RagConfig::load_from(path)?,
        None => RagConfig::load()?,
    };
    if let Some(dir) = &cli.data_dir {
        config.data_dir = dir.clone();
    }
    if let Some(backend) = &cli.embedder {
        config.embedder.backend = backend.parse::<EmbedderBackend>()?;
    }
    tracing::debug!(
        data_dir = %config.data_dir.display(),
        backend = ?config.embedder.backend,
        "config loaded"
    );
    Ok(config)
}

fn read_documents(files: &[PathBuf], texts: Vec<String>) -> Result<Vec<String>> {
    let mut docs = Vec::with_capacity(files.len() + texts.len());
    for path in files {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        docs.push(content);
    }
    docs.extend(texts);
    Ok(docs)
}

/// The embedder is only built once something needs embedding, so `stats`
/// and empty sessions work without a model or a running server.
fn build_manager(config: &RagConfig) -> SessionManager<LazyEmbedder> {
    SessionManager::from_config(LazyEmbedder::new(config.embedder.clone()), config)
}

fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;

    match cli.command {
        Commands::Add {
            session,
            files,
            texts,
        } => {
            let docs = read_documents(&files, texts)?;
            if docs.is_empty() {
                println!("Nothing to add");
                return Ok(());
            }
            let manager = build_manager(&config);
            let added = manager.add_documents(&session, &docs)?;
            let stats = manager.stats(&session)?;
            println!(
                "Added {added} documents to '{session}' ({} total, model {})",
                stats.documents,
                manager.embedder().model_name()
            );
        }

        Commands::Retrieve {
            session,
            query,
            k,
            scores,
        } => {
            let k = k.unwrap_or(config.top_k);
            let manager = build_manager(&config);
            if scores {
                let found = manager.search(&session, &query, k)?;
                if found.is_empty() {
                    println!("No documents found");
                }
                for (i, doc) in found.iter().enumerate() {
                    println!("#{} (score: {:.4}, id: {})", i + 1, doc.score, doc.record.id);
                    println!("---");
                    let preview: String = doc.record.text.chars().take(300).collect();
                    let ellipsis = if doc.record.text.chars().count() > 300 { "..." } else { "" };
                    println!("{preview}{ellipsis}\n");
                }
            } else {
                println!("{}", manager.retrieve(&session, &query, k)?);
            }
        }

        Commands::Prompt { session, query, k } => {
            let manager = build_manager(&config);
            let context = manager.retrieve(&session, &query, k.unwrap_or(config.top_k))?;
            match rag_prompt(&query, &context) {
                Some(prompt) => println!("{prompt}"),
                None => println!("{NO_KNOWLEDGE}"),
            }
        }

        Commands::Stats { session } => {
            let stats = build_manager(&config).stats(&session)?;
            println!("Session:    {session}");
            println!("Documents:  {}", stats.documents);
            match stats.dimension {
                Some(dim) => println!("Dimension:  {dim}"),
                None => println!("Dimension:  (no index yet)"),
            }
        }

        // listing needs no model
        Commands::Sessions => {
            let sessions = DocumentStore::new(&config.data_dir).sessions()?;
            if sessions.is_empty() {
                println!("No sessions in {}", config.data_dir.display());
            }
            for name in sessions {
                println!("{name}");
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // embedding and index I/O block, keep them off the async workers
    tokio::task::spawn_blocking(move || run(cli))
        .await
        .context("command task panicked")?
}

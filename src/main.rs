//! # ragchat CLI
//!
//! ## Usage
//!
//! ```bash
//! ragchat --config ./config/ragchat.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ragchat build-index` | Embed the CSV sources into the vector index |
//! | `ragchat serve` | Start the HTTP chat server |
//! | `ragchat chat [--rag]` | Interactive terminal chat |
//! | `ragchat search "<query>"` | Print the documents retrieved for a query |
//!
//! API keys are read from the environment; a `.env` file in the working
//! directory is loaded first.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use ragchat::config;
use ragchat::generator::Bot;
use ragchat::retriever::Retriever;
use ragchat::{chat_loop, ingest, llm, logging, server};

/// Retrieval-augmented chat over tabular data.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. Built-in defaults are used when the file does not exist.
#[derive(Parser)]
#[command(name = "ragchat", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/ragchat.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the vector index from the configured CSV sources.
    ///
    /// Overwrites any existing index. Requires the embedding API key.
    BuildIndex,

    /// Start the HTTP chat server on `[server].bind`.
    Serve,

    /// Chat with the bot in the terminal.
    ///
    /// Type `exit`, `quit` or `salir` to leave.
    Chat {
        /// Retrieve context for every question.
        #[arg(long)]
        rag: bool,
    },

    /// Show the documents retrieved for a query.
    Search {
        /// The search query string.
        query: String,

        /// Number of documents to return (defaults to `[retrieval].top_k`).
        #[arg(long)]
        k: Option<i64>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let dotenv = config::load_dotenv();
    logging::init();
    if let Err(e) = dotenv {
        tracing::warn!("ignoring .env: {}", e);
    }

    let cli = Cli::parse();
    let cfg = config::load_or_default(&cli.config)?;

    match cli.command {
        Commands::BuildIndex => {
            ingest::run_build_index(&cfg).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Chat { rag } => {
            let model = llm::create_chat_model(&cfg.llm)?;
            let mut bot = Bot::from_config(&cfg.llm, model);
            let retriever = if rag {
                Some(Retriever::open(&cfg).await?)
            } else {
                None
            };
            let stdin = std::io::stdin();
            chat_loop::run_loop(&mut bot, retriever.as_ref(), stdin.lock(), std::io::stdout())
                .await?;
        }
        Commands::Search { query, k } => {
            let retriever = Retriever::open(&cfg).await?;
            let docs = retriever.search(&query, k).await;
            if docs.is_empty() {
                println!("No results.");
            }
            for (i, doc) in docs.iter().enumerate() {
                println!("{}. [{}] {}", i + 1, doc.id, doc.title);
                println!("   {}", doc.content);
            }
        }
    }

    Ok(())
}

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use faq_retriever::Result;
use faq_retriever::commands::{ask, build_index, search, show_status, validate_catalog};
use faq_retriever::config::{Config, run_interactive_config, show_config};
use faq_retriever::policy::DialogMode;

#[derive(Parser)]
#[command(name = "faq-retriever")]
#[command(about = "Semantic search over an FAQ knowledge base with confidence-tiered answers")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure the encoder, paths and answer thresholds
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Encode the FAQ catalog and write a fresh index
    Build {
        /// Catalog JSON file, overriding the configured path
        #[arg(long)]
        catalog: Option<PathBuf>,
        /// Index directory, overriding the configured path
        #[arg(long)]
        index_dir: Option<PathBuf>,
    },
    /// List the entries closest to a query
    Search {
        /// Free-text query
        query: String,
        /// Number of results, defaults to retrieval.top_k
        #[arg(short, long)]
        k: Option<usize>,
    },
    /// Answer a query: direct answer, suggestions, or no match
    Ask {
        /// Free-text query
        query: String,
        /// Threshold set to apply: "faq" or "dialog"
        #[arg(long, default_value = "faq")]
        mode: DialogMode,
    },
    /// Check the catalog file and summarize its categories
    Validate {
        /// Catalog JSON file, overriding the configured path
        #[arg(long)]
        catalog: Option<PathBuf>,
    },
    /// Show the persisted index and whether it matches the catalog
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config()?;
            } else {
                run_interactive_config()?;
            }
        }
        Commands::Build { catalog, index_dir } => {
            build_index(&Config::load_default()?, catalog, index_dir).await?;
        }
        Commands::Search { query, k } => {
            search(&Config::load_default()?, query, k).await?;
        }
        Commands::Ask { query, mode } => {
            ask(&Config::load_default()?, query, mode).await?;
        }
        Commands::Validate { catalog } => {
            validate_catalog(&Config::load_default()?, catalog)?;
        }
        Commands::Status => {
            show_status(&Config::load_default()?).await?;
        }
    }

    Ok(())
}

//! CLI command definitions and parsing
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "trilane",
    version,
    about = "Multi-tenant hybrid retrieval over dense, sparse and late-interaction vectors",
    long_about = "Trilane indexes a document corpus into a vector store with three representations \
                  per document, then serves tenant-scoped searches that prefetch candidates with \
                  dense and sparse vectors and rerank them with late-interaction MaxSim."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/trilane/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Bulk-load a JSONL corpus and finalize the dense index
    Index {
        /// Corpus file (defaults to indexing.corpus_path)
        #[arg(long, value_name = "FILE")]
        corpus: Option<PathBuf>,

        /// Stop after this many documents
        #[arg(short = 'n', long)]
        max_documents: Option<usize>,
    },

    /// Run the HTTP search service
    Serve {
        /// Listen address (defaults to service.listen_addr)
        #[arg(short, long)]
        listen: Option<String>,
    },

    /// Run one search from the command line
    Search {
        /// Search query text
        query: String,

        /// Restrict results to one tenant, e.g. user_5
        #[arg(short, long)]
        user_id: Option<String>,

        /// Maximum number of results to return
        #[arg(short, long)]
        limit: Option<u64>,

        /// Show results in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Check that the storage engine is reachable
    Health,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Validate configuration file
    Validate {
        /// Path to config file (defaults to standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Initialize default configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

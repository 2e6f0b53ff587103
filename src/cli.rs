use std::{path::PathBuf, time::Duration};

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use dongyo::{filter::Categories, indexer::DEFAULT_BATCH_SIZE};

#[derive(Debug, Parser)]
#[command(
    name = "dongyo",
    about = "Find reference songs by meaning and keywords"
)]
pub struct Cli {
    /// Override the XDG data directory
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Metadata snapshot to load (default: <data-dir>/corpus.json)
    #[arg(long, global = true)]
    pub metadata: Option<PathBuf>,

    /// Embedding index to load (default: <data-dir>/embeddings.redb)
    #[arg(long = "index", global = true, value_name = "PATH")]
    pub index_path: Option<PathBuf>,

    /// Override the embedding model name
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// Override the embedding service base URL
    #[arg(long, global = true)]
    pub embedding_url: Option<String>,

    /// Embedding request timeout in seconds (default: 30)
    #[arg(
        long,
        global = true,
        value_name = "SECS",
        value_parser = parse_timeout
    )]
    pub embedding_timeout: Option<Duration>,

    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Retrieve the songs that best match a query
    Search(SearchArgs),
    /// Show one song by its document index
    Get(GetArgs),
    /// Show the loaded corpus and configuration
    Status(StatusArgs),
    /// Embed the metadata snapshot and write the embedding index
    BuildIndex(BuildIndexArgs),
    /// Manage the embedding model configuration
    Model {
        #[command(subcommand)]
        action: ModelAction,
    },
    /// Start MCP server for AI agent integration
    Mcp,
    /// Generate shell completions
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

// -- Model --

#[derive(Debug, Subcommand)]
pub enum ModelAction {
    /// Show the currently resolved embedding settings
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Persist a default embedding model in config.redb
    Set {
        /// Embedding model name
        name: String,
        /// Also persist the embedding service base URL
        #[arg(long)]
        url: Option<String>,
    },
    /// Clear the stored settings (revert to defaults)
    Clear,
}

// -- Search --

#[derive(Debug, Parser)]
pub struct SearchArgs {
    /// The search query
    pub query: String,

    /// Number of results to return
    #[arg(short = 'n', long, default_value = "5")]
    pub count: usize,

    /// Category filter as name=value (can be repeated)
    #[arg(short = 'c', long = "category", value_parser = parse_category)]
    pub categories: Vec<(String, String)>,

    /// Rank by vector distance only, skipping keyword fusion
    #[arg(long)]
    pub vector_only: bool,

    /// Rank by keywords alone if the embedding service is unavailable
    #[arg(long)]
    pub keyword_fallback: bool,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,
}

impl SearchArgs {
    /// The category mapping, or `None` when no `--category` was given.
    pub fn category_map(&self) -> Option<Categories> {
        (!self.categories.is_empty())
            .then(|| self.categories.iter().cloned().collect())
    }
}

fn parse_category(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got {raw:?}"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("category name is empty in {raw:?}"));
    }
    Ok((name.to_string(), value.to_string()))
}

fn parse_timeout(raw: &str) -> Result<Duration, String> {
    dongyo::config::parse_timeout(raw).map_err(|e| e.to_string())
}

// -- Get --

#[derive(Debug, Parser)]
pub struct GetArgs {
    /// Document index (0-based)
    pub document: usize,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Print only title and feature summary
    #[arg(long)]
    pub meta: bool,
}

// -- Status --

#[derive(Debug, Parser)]
pub struct StatusArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Build index --

#[derive(Debug, Parser)]
pub struct BuildIndexArgs {
    /// Documents per embedding request
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,

    /// Hide the progress bar
    #[arg(long)]
    pub no_progress: bool,
}

// -- Completions --

#[derive(Debug, Parser)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CompletionsArgs {
    /// Generate shell completions and print to stdout.
    pub fn generate(&self) {
        let mut cmd = Cli::command();
        clap_complete::generate(
            self.shell,
            &mut cmd,
            "dongyo",
            &mut std::io::stdout(),
        );
    }
}

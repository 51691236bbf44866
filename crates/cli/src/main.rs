//! Chunkstore CLI - chunkstore command

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod cmd;
mod util;

/// Chunkstore - Content-addressed, deduplicating chunk storage
#[derive(Parser)]
#[command(name = "chunkstore")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Store directory (default: $CHUNKSTORE_DIR or ./.chunkstore)
    #[arg(long, global = true)]
    dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new store
    Init {
        /// Score bytes kept per bucket entry (1-32)
        #[arg(long)]
        score_width: Option<usize>,
        /// Maximum number of buckets (0 = unbounded)
        #[arg(long)]
        max_buckets: Option<u32>,
        /// Flush the content log after every write
        #[arg(long)]
        sync_on_write: bool,
    },
    /// Store chunks and print their scores
    Write {
        /// Chunk type tag (0-255)
        #[arg(short = 't', long = "type", default_value = "0")]
        chunk_type: u8,
        /// Files to store, one chunk each ("-" or none reads stdin)
        files: Vec<PathBuf>,
    },
    /// Print the chunk stored under a score
    Read {
        /// Score as 64 hex digits
        score: String,
        /// Write the payload to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show bucket, trie and log statistics
    Stats,
    /// List routing trie leaves
    Tree,
    /// Cross-check the content log against the index
    Check,
    /// Show the store configuration
    Config {
        /// Print a commented example configuration instead
        #[arg(long)]
        example: bool,
    },
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let dir = util::resolve_store_dir(cli.dir);

    match cli.command {
        Commands::Init {
            score_width,
            max_buckets,
            sync_on_write,
        } => cmd::init::run(&dir, score_width, max_buckets, sync_on_write),
        Commands::Write { chunk_type, files } => cmd::write::run(&dir, chunk_type, &files),
        Commands::Read { score, output } => cmd::read::run(&dir, &score, output.as_deref()),
        Commands::Stats => cmd::stats::run(&dir),
        Commands::Tree => cmd::tree::run(&dir),
        Commands::Check => cmd::check::run(&dir),
        Commands::Config { example } => cmd::config::run(&dir, example),
    }
}

//! Create a new store

use anyhow::{Context, Result};
use chunkstore_core::{Store, StoreConfig};
use owo_colors::OwoColorize;
use std::path::Path;

pub fn run(
    dir: &Path,
    score_width: Option<usize>,
    max_buckets: Option<u32>,
    sync_on_write: bool,
) -> Result<()> {
    let defaults = StoreConfig::default();
    let config = StoreConfig {
        score_width: score_width.unwrap_or(defaults.score_width),
        max_buckets: max_buckets.unwrap_or(defaults.max_buckets),
        sync_on_write,
    };

    let store = Store::create(dir, config)
        .with_context(|| format!("Failed to initialize store at {}", dir.display()))?;
    let config = store.config().clone();
    store.close()?;

    println!(
        "{} store at {}",
        "Initialized".green().bold(),
        dir.display()
    );
    println!();
    println!("  {} = {}", "score_width".cyan(), config.score_width);
    println!(
        "  {} = {}",
        "max_buckets".cyan(),
        if config.max_buckets == 0 {
            "unbounded".to_string()
        } else {
            config.max_buckets.to_string()
        }
    );
    println!("  {} = {}", "sync_on_write".cyan(), config.sync_on_write);
    Ok(())
}

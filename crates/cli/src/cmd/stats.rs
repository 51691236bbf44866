//! Show store statistics

use anyhow::Result;
use owo_colors::OwoColorize;
use std::path::Path;

use crate::util;

pub fn run(dir: &Path) -> Result<()> {
    let store = util::open_store(dir)?;
    let stats = store.stats();
    let config = store.config();

    println!("{}", "Chunkstore Statistics".bold());
    println!("{}: {}\n", "Location".dimmed(), dir.display().dimmed());

    println!("{}", "[log]".yellow());
    println!("  {} = {}", "records".cyan(), stats.records);
    println!(
        "  {} = {} {}",
        "bytes".cyan(),
        stats.log_bytes,
        format!("({})", util::format_size(stats.log_bytes)).dimmed()
    );

    println!("\n{}", "[index]".yellow());
    println!("  {} = {}", "buckets".cyan(), stats.buckets);
    println!("  {} = {}", "entries".cyan(), stats.entries);
    println!(
        "  {} = {} / {:.1} / {}",
        "fill (min/mean/max)".cyan(),
        stats.min_fill,
        stats.mean_fill,
        stats.max_fill
    );
    println!("  {} = {}", "score_width".cyan(), config.score_width);

    println!("\n{}", "[trie]".yellow());
    println!("  {} = {}", "slots".cyan(), stats.trie_slots);
    println!("  {} = {}", "depth".cyan(), stats.trie_depth);
    Ok(())
}

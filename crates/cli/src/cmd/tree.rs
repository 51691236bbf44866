//! List routing trie leaves

use anyhow::Result;
use owo_colors::OwoColorize;
use std::path::Path;

use crate::util;

pub fn run(dir: &Path) -> Result<()> {
    let store = util::open_store(dir)?;
    let leaves = store.leaves();

    println!(
        "{} {}",
        "Routing trie:".bold(),
        format!("{} leaves", leaves.len()).dimmed()
    );
    for (bits, id, bucket) in leaves {
        let path = if bits.is_empty() { "(root)".to_string() } else { bits };
        println!(
            "  {:<24} {} {:>5} {}",
            path.cyan(),
            format!("bucket {:>4}", id).yellow(),
            bucket.len(),
            "entries".dimmed()
        );
    }
    Ok(())
}

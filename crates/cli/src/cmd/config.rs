//! Show store configuration

use anyhow::Result;
use chunkstore_core::StoreConfig;
use owo_colors::OwoColorize;
use std::path::Path;

use crate::util;

pub fn run(dir: &Path, example: bool) -> Result<()> {
    if example {
        print!("{}", StoreConfig::example());
        return Ok(());
    }

    let store = util::open_store(dir)?;
    println!("{}", "Store Configuration".bold());
    println!(
        "{}: {}\n",
        "Location".dimmed(),
        dir.join("config.toml").display().dimmed()
    );
    print!("{}", store.config().to_toml()?);
    Ok(())
}

//! Verify that every record is indexed and every entry points at a record

use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use std::path::Path;

use crate::util;

pub fn run(dir: &Path) -> Result<()> {
    let mut store = util::open_store(dir)?;
    let records = store.check().context("Store check failed")?;
    println!(
        "{} {} records indexed and resolvable",
        "OK".green().bold(),
        records
    );
    Ok(())
}

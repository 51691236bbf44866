//! Fetch a chunk by score

use anyhow::{Context, Result};
use chunkstore_core::{Error, Score};
use std::io::{self, Write};
use std::path::Path;

use crate::util;

pub fn run(dir: &Path, score: &str, output: Option<&Path>) -> Result<()> {
    let score: Score = score
        .trim()
        .parse()
        .with_context(|| format!("Invalid score '{}'", score))?;
    let mut store = util::open_store(dir)?;

    let (chunk_type, data) = match store.read(&score) {
        Ok(found) => found,
        Err(Error::NotFound(_)) => anyhow::bail!("Chunk not found: {}", score),
        Err(e) => return Err(e).context("Failed to read chunk"),
    };
    tracing::debug!(%score, %chunk_type, len = data.len(), "chunk read");

    match output {
        Some(path) => std::fs::write(path, &data)
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(&data)?;
            stdout.flush()?;
        }
    }
    Ok(())
}

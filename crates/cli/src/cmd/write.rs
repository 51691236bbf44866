//! Store chunks from files or stdin

use anyhow::{Context, Result};
use chunkstore_core::ChunkType;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::util;

pub fn run(dir: &Path, chunk_type: u8, files: &[PathBuf]) -> Result<()> {
    let mut store = util::open_store(dir)?;
    let chunk_type = ChunkType(chunk_type);
    let mut stdout = io::stdout().lock();

    if files.is_empty() || (files.len() == 1 && files[0] == Path::new("-")) {
        let mut data = Vec::new();
        io::stdin()
            .lock()
            .read_to_end(&mut data)
            .context("Failed to read stdin")?;
        let score = store
            .write(chunk_type, &data)
            .context("Failed to store chunk from stdin")?;
        writeln!(stdout, "{}", score)?;
    } else {
        for path in files {
            let data = std::fs::read(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let score = store
                .write(chunk_type, &data)
                .with_context(|| format!("Failed to store {}", path.display()))?;
            debug!(path = %path.display(), %score, "stored");
            writeln!(stdout, "{}  {}", score, path.display())?;
        }
    }

    store.close()?;
    Ok(())
}

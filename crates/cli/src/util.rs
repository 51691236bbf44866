//! Shared utilities for CLI commands

use anyhow::{Context, Result};
use chunkstore_core::Store;
use std::path::{Path, PathBuf};

/// Environment variable naming the default store directory
pub const STORE_DIR_ENV: &str = "CHUNKSTORE_DIR";

/// Directory used when neither `--dir` nor the environment names one
pub const DEFAULT_STORE_DIR: &str = ".chunkstore";

/// Pick the store directory: flag, then environment, then default
pub fn resolve_store_dir(flag: Option<PathBuf>) -> PathBuf {
    flag.or_else(|| {
        std::env::var_os(STORE_DIR_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
    })
    .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_DIR))
}

/// Open the store, with a hint when it does not exist yet
pub fn open_store(dir: &Path) -> Result<Store> {
    Store::open(dir).with_context(|| {
        format!(
            "Failed to open store at {}. Run 'chunkstore init' first?",
            dir.display()
        )
    })
}

/// Format byte size in human-readable form
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_wins() {
        let dir = resolve_store_dir(Some(PathBuf::from("/tmp/x")));
        assert_eq!(dir, PathBuf::from("/tmp/x"));
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.00 KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.00 MB");
    }
}
